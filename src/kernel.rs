use crate::clouds::CloudsRenderer;
use crate::commands::{FilterMode, KernelId, KernelPass, ShaderLibrary};
use crate::error::{CloudsError, Result};
use crate::shader::{validated, ShaderHotReload};
use crate::textures::TextureRegistry;
use crate::uniforms::{PropertySheet, TextureHandle, TextureId, Uniform};
use std::sync::Arc;
use tracing::{info, trace, warn};
use wgpu::util::DeviceExt;

/// Colour format of every target the kernel reads and writes.
pub const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

const CLOUDS_SHADER: &str = "clouds.wgsl";
const BLIT_SHADER: &str = "blit.wgsl";

/// Uniform block of the cloud kernel. Scalars are packed four to a vec4.
#[repr(C)]
#[derive(Default, Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CloudsUniforms {
    pub bounds_min: [f32; 4],
    pub bounds_max: [f32; 4],
    pub color_a: [f32; 4],
    pub color_b: [f32; 4],
    pub weather_map_speed: [f32; 4],
    pub base_noise_speed: [f32; 4],
    pub detail_noise_speed: [f32; 4],
    pub blue_noise_coords: [f32; 4],
    /// step count, light step count, mie anisotropy, edge fade distance
    pub march: [f32; 4],
    /// absorption toward sun, absorption through cloud, density offset, density multiplier
    pub light: [f32; 4],
    /// weather map scale, shape noise weight, base noise scale, base noise strength
    pub shape: [f32; 4],
    /// detail scale, detail exponent, detail weight, blue noise strength
    pub detail: [f32; 4],
    /// sample index, then 1.0/0.0 for weather map, base noise, detail noise present
    pub flags: [f32; 4],
}

impl CloudsUniforms {
    pub fn from_sheet(sheet: &PropertySheet) -> Self {
        let f = |u: Uniform| sheet.float(u).unwrap_or(0.0);
        let v = |u: Uniform| sheet.vector(u).unwrap_or([0.0; 4]);
        let has = |u: Uniform| if sheet.texture(u).is_some() { 1.0 } else { 0.0 };

        Self {
            bounds_min: v(Uniform::BoundsMin),
            bounds_max: v(Uniform::BoundsMax),
            color_a: v(Uniform::ColorA),
            color_b: v(Uniform::ColorB),
            weather_map_speed: v(Uniform::WeatherMapSpeed),
            base_noise_speed: v(Uniform::BaseNoiseSpeed),
            detail_noise_speed: v(Uniform::DetailNoiseSpeed),
            blue_noise_coords: v(Uniform::BlueNoiseCoords),
            march: [
                f(Uniform::StepCount),
                f(Uniform::LightStepCount),
                f(Uniform::MieAnisotropy),
                f(Uniform::EdgeFadeDistance),
            ],
            light: [
                f(Uniform::LightAbsorptionTowardSun),
                f(Uniform::LightAbsorptionThroughCloud),
                f(Uniform::DensityOffset),
                f(Uniform::DensityMultiplier),
            ],
            shape: [
                f(Uniform::WeatherMapScale),
                f(Uniform::ShapeNoiseWeight),
                f(Uniform::BaseNoiseScale),
                f(Uniform::BaseNoiseStrength),
            ],
            detail: [
                f(Uniform::DetailNoiseScale),
                f(Uniform::DetailShapeExponent),
                f(Uniform::DetailNoiseWeight),
                f(Uniform::BlueNoiseStrength),
            ],
            flags: [
                f(Uniform::SampleIndex),
                has(Uniform::WeatherMap),
                has(Uniform::BaseNoiseTex),
                has(Uniform::DetailNoiseTex),
            ],
        }
    }
}

/// Camera and frame data shared by the sky, gizmo and cloud shaders.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ViewUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub inv_view_proj: [[f32; 4]; 4],
    pub camera_position: [f32; 4],
    pub sun_direction: [f32; 4],
    /// time, width, height, unused
    pub params: [f32; 4],
}

impl Default for ViewUniforms {
    fn default() -> Self {
        let identity = [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        Self {
            view_proj: identity,
            inv_view_proj: identity,
            camera_position: [0.0; 4],
            sun_direction: [0.0, 1.0, 0.0, 0.0],
            params: [0.0; 4],
        }
    }
}

/// Textures named by the last property sheet.
#[derive(Debug, Default, Clone, Copy)]
struct BoundTextures {
    blue_noise: Option<TextureId>,
    weather_map: Option<TextureId>,
    base_noise: Option<TextureId>,
    detail_noise: Option<TextureId>,
}

struct DefaultTextures {
    black: TextureHandle,
    white: TextureHandle,
    cube: TextureHandle,
}

struct KernelPipelines {
    downsample: wgpu::RenderPipeline,
    composite: wgpu::RenderPipeline,
}

/// Views a kernel pass samples besides the uniforms.
pub struct PassInputs<'a> {
    pub source: &'a wgpu::TextureView,
    pub source_filter: FilterMode,
    pub depth: &'a wgpu::TextureView,
    /// Whatever is bound under the clouds colour global, if anything
    pub clouds_color: Option<&'a wgpu::TextureView>,
    pub textures: &'a TextureRegistry,
}

/// GPU side of the cloud kernel: the slot pipelines, the plain copy, and
/// the uniform buffers they read.
pub struct CloudsKernel {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    uniform_buffer: wgpu::Buffer,
    view_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    texture_bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    passes: Option<KernelPipelines>,
    blit_bind_group_layout: wgpu::BindGroupLayout,
    copy_pipeline: wgpu::RenderPipeline,
    linear_sampler: wgpu::Sampler,
    nearest_sampler: wgpu::Sampler,
    repeat_sampler: wgpu::Sampler,
    defaults: DefaultTextures,
    bound: BoundTextures,
}

impl CloudsKernel {
    pub const ID: KernelId = KernelId(1);

    pub fn new(
        shaders: &ShaderHotReload,
        queue: Arc<wgpu::Queue>,
        textures: &mut TextureRegistry,
    ) -> Result<Self> {
        let device = Arc::clone(shaders.device());

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Clouds Uniform Buffer"),
            contents: bytemuck::cast_slice(&[CloudsUniforms::default()]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let view_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Clouds View Buffer"),
            contents: bytemuck::cast_slice(&[ViewUniforms::default()]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let uniform_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let uniform_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("clouds_uniform_bind_group_layout"),
                entries: &[uniform_entry(0), uniform_entry(1)],
            });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("clouds_uniform_bind_group"),
            layout: &uniform_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: view_buffer.as_entire_binding(),
                },
            ],
        });

        let texture_entry = |binding: u32, view_dimension, sample_type| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                multisampled: false,
                view_dimension,
                sample_type,
            },
            count: None,
        };
        let filterable = wgpu::TextureSampleType::Float { filterable: true };
        let d2 = wgpu::TextureViewDimension::D2;
        let d3 = wgpu::TextureViewDimension::D3;
        let texture_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("clouds_texture_bind_group_layout"),
                entries: &[
                    texture_entry(0, d2, filterable),
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                    texture_entry(2, d2, wgpu::TextureSampleType::Depth),
                    texture_entry(3, d2, filterable),
                    texture_entry(4, d2, filterable),
                    texture_entry(5, d2, filterable),
                    texture_entry(6, d3, filterable),
                    texture_entry(7, d3, filterable),
                    wgpu::BindGroupLayoutEntry {
                        binding: 8,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Clouds Pipeline Layout"),
            bind_group_layouts: &[&uniform_bind_group_layout, &texture_bind_group_layout],
            push_constant_ranges: &[],
        });

        let blit_bind_group_layout = create_blit_bind_group_layout(&device);
        let blit_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Blit Pipeline Layout"),
            bind_group_layouts: &[&blit_bind_group_layout],
            push_constant_ranges: &[],
        });
        let blit_shader = shaders
            .load(BLIT_SHADER)
            .ok_or_else(|| CloudsError::Shader(BLIT_SHADER.to_string()))?;
        let copy_pipeline = fullscreen_pipeline(
            &device,
            "Copy Pipeline",
            &blit_layout,
            &blit_shader,
            "fs_copy",
            HDR_FORMAT,
        );

        let clamp_sampler = |label: &str, filter: wgpu::FilterMode| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(label),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                address_mode_w: wgpu::AddressMode::ClampToEdge,
                mag_filter: filter,
                min_filter: filter,
                mipmap_filter: wgpu::FilterMode::Nearest,
                ..Default::default()
            })
        };
        let linear_sampler = clamp_sampler("Clouds Linear Sampler", wgpu::FilterMode::Linear);
        let nearest_sampler = clamp_sampler("Clouds Nearest Sampler", wgpu::FilterMode::Nearest);
        let repeat_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Clouds Repeat Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let defaults = DefaultTextures {
            black: textures.solid_2d("Default Black", [0, 0, 0, 0])?,
            white: textures.solid_2d("Default White", [255, 255, 255, 255])?,
            cube: textures.solid_3d("Default Cube", 255)?,
        };

        let mut kernel = Self {
            device,
            queue,
            uniform_buffer,
            view_buffer,
            uniform_bind_group,
            texture_bind_group_layout,
            pipeline_layout,
            passes: None,
            blit_bind_group_layout,
            copy_pipeline,
            linear_sampler,
            nearest_sampler,
            repeat_sampler,
            defaults,
            bound: BoundTextures::default(),
        };
        kernel.reload(shaders);
        Ok(kernel)
    }

    pub fn is_ready(&self) -> bool {
        self.passes.is_some()
    }

    /// Recompile the slot pipelines. On failure the kernel becomes
    /// unresolvable and the renderer copies through until the next reload.
    pub fn reload(&mut self, shaders: &ShaderHotReload) {
        self.passes = shaders.load(CLOUDS_SHADER).and_then(|module| {
            validated(&self.device, "clouds pipelines", || KernelPipelines {
                downsample: fullscreen_pipeline(
                    &self.device,
                    "Clouds Downsample Pipeline",
                    &self.pipeline_layout,
                    &module,
                    "fs_downsample",
                    HDR_FORMAT,
                ),
                composite: fullscreen_pipeline(
                    &self.device,
                    "Clouds Composite Pipeline",
                    &self.pipeline_layout,
                    &module,
                    "fs_composite",
                    HDR_FORMAT,
                ),
            })
        });

        if self.passes.is_some() {
            info!("Cloud kernel ready");
        } else {
            warn!("Cloud kernel unavailable");
        }
    }

    pub fn check_shader_updates(&mut self, shaders: &ShaderHotReload) {
        if shaders
            .check_for_updates()
            .iter()
            .any(|name| name == CLOUDS_SHADER)
        {
            info!("Reloading cloud shader");
            self.reload(shaders);
        }
    }

    pub fn blit_bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.blit_bind_group_layout
    }

    pub fn view_buffer(&self) -> &wgpu::Buffer {
        &self.view_buffer
    }

    pub fn update_view(&self, view: &ViewUniforms) {
        self.queue
            .write_buffer(&self.view_buffer, 0, bytemuck::cast_slice(&[*view]));
    }

    /// Upload a property sheet. The buffer write lands before the encoder
    /// runs, so only one sheet per submission takes effect.
    pub fn set_properties(&mut self, sheet: &PropertySheet) {
        trace!(
            "Cloud uniforms: {}",
            sheet
                .iter()
                .map(|(uniform, _)| uniform.name())
                .collect::<Vec<_>>()
                .join(", ")
        );
        let uniforms = CloudsUniforms::from_sheet(sheet);
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));

        let id = |u: Uniform| sheet.texture(u).map(|t| t.id);
        self.bound = BoundTextures {
            blue_noise: id(Uniform::BlueNoiseTex),
            weather_map: id(Uniform::WeatherMap),
            base_noise: id(Uniform::BaseNoiseTex),
            detail_noise: id(Uniform::DetailNoiseTex),
        };
    }

    fn sampler(&self, filter: FilterMode) -> &wgpu::Sampler {
        match filter {
            FilterMode::Point => &self.nearest_sampler,
            FilterMode::Bilinear => &self.linear_sampler,
        }
    }

    /// Plain fullscreen copy of `source` into `destination`.
    pub fn copy(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        source: &wgpu::TextureView,
        filter: FilterMode,
        destination: &wgpu::TextureView,
    ) {
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("copy_bind_group"),
            layout: &self.blit_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(source),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(self.sampler(filter)),
                },
            ],
        });

        let mut rpass = begin_fullscreen_pass(encoder, "Copy Pass", destination);
        rpass.set_pipeline(&self.copy_pipeline);
        rpass.set_bind_group(0, &bind_group, &[]);
        rpass.draw(0..3, 0..1);
    }

    /// Run one kernel slot into `destination`. Does nothing if the kernel
    /// isn't compiled.
    pub fn draw(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pass: KernelPass,
        inputs: &PassInputs<'_>,
        destination: &wgpu::TextureView,
    ) {
        let Some(passes) = &self.passes else {
            return;
        };
        let pipeline = match pass {
            KernelPass::Downsample => &passes.downsample,
            KernelPass::Composite => &passes.composite,
        };

        let view_or = |id: Option<TextureId>, fallback: TextureHandle| {
            id.and_then(|id| inputs.textures.view(id))
                .or_else(|| inputs.textures.view(fallback.id))
        };
        let (Some(blue_noise), Some(weather_map), Some(base_noise), Some(detail_noise), Some(black)) = (
            view_or(self.bound.blue_noise, self.defaults.black),
            view_or(self.bound.weather_map, self.defaults.white),
            view_or(self.bound.base_noise, self.defaults.cube),
            view_or(self.bound.detail_noise, self.defaults.cube),
            inputs.textures.view(self.defaults.black.id),
        ) else {
            warn!("Cloud kernel textures missing from registry, skipping {:?}", pass);
            return;
        };
        let clouds_color = inputs.clouds_color.unwrap_or(black);

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("clouds_texture_bind_group"),
            layout: &self.texture_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(inputs.source),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(self.sampler(inputs.source_filter)),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(inputs.depth),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(clouds_color),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(blue_noise),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::TextureView(weather_map),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: wgpu::BindingResource::TextureView(base_noise),
                },
                wgpu::BindGroupEntry {
                    binding: 7,
                    resource: wgpu::BindingResource::TextureView(detail_noise),
                },
                wgpu::BindGroupEntry {
                    binding: 8,
                    resource: wgpu::BindingResource::Sampler(&self.repeat_sampler),
                },
            ],
        });

        let mut rpass = begin_fullscreen_pass(encoder, "Clouds Pass", destination);
        rpass.set_pipeline(pipeline);
        rpass.set_bind_group(0, &self.uniform_bind_group, &[]);
        rpass.set_bind_group(1, &bind_group, &[]);
        rpass.draw(0..3, 0..1);
    }
}

impl ShaderLibrary for CloudsKernel {
    fn find(&self, name: &str) -> Option<KernelId> {
        (name == CloudsRenderer::KERNEL_NAME && self.is_ready()).then_some(Self::ID)
    }
}

/// Texture plus filtering sampler at group 0, the layout `blit.wgsl` uses.
pub fn create_blit_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("blit_bind_group_layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

/// Pipeline drawing one fullscreen triangle with `vs_main` and `fs_entry`.
pub fn fullscreen_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    fs_entry: &str,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some(fs_entry),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

fn begin_fullscreen_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    label: &str,
    destination: &wgpu::TextureView,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: destination,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clouds::settings_sheet;
    use crate::settings::CloudSettings;
    use crate::uniforms::TextureHandle;

    #[test]
    fn uniform_block_is_vec4_aligned() {
        assert_eq!(std::mem::size_of::<CloudsUniforms>() % 16, 0);
        assert_eq!(std::mem::size_of::<ViewUniforms>() % 16, 0);
    }

    #[test]
    fn sheet_values_land_in_packed_slots() {
        let mut settings = CloudSettings::default();
        settings.set_step_count(20.0);
        settings.set_density_multiplier(3.0);
        settings.set_detail_noise(Some(TextureHandle::new_3d(TextureId(5), 32, 32, 32)));

        let mut sheet = settings_sheet(&settings);
        sheet.set_int(Uniform::SampleIndex, 2);
        let uniforms = CloudsUniforms::from_sheet(&sheet);

        assert_eq!(uniforms.march[0], 20.0);
        assert_eq!(uniforms.light[3], 3.0);
        assert_eq!(uniforms.flags, [2.0, 0.0, 0.0, 1.0]);
        assert_eq!(uniforms.color_a, settings.color_a());
    }
}
