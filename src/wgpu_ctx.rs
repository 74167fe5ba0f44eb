use anyhow::{anyhow, Context};
use cgmath::{Matrix4, SquareMatrix};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use wgpu::util::DeviceExt;
use wgpu::MemoryHints;
use winit::window::Window;

use volumetric_clouds::{
    draw_bounds, fullscreen_pipeline, BlueNoisePool, CloudSettings, CloudsKernel, CloudsRenderer,
    CommandBuffer, CommandExecutor, DebugLines, FrameContext, FrameTargets, LineVertex,
    PostProcessEffect, ShaderHotReload, TextureRegistry, ViewUniforms, ViewerConfig, HDR_FORMAT,
};

use crate::camera::Camera;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const SUN_DIRECTION: [f32; 4] = [0.4, 0.6, 0.3, 0.0];

// cgmath's projection maps depth to -1..1, wgpu wants 0..1
#[rustfmt::skip]
const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Offscreen targets: the scene colour, one post-processing buffer to
/// ping-pong with, and depth.
struct FrameTextures {
    _scene: wgpu::Texture,
    scene_view: wgpu::TextureView,
    _post: wgpu::Texture,
    post_view: wgpu::TextureView,
    _depth: wgpu::Texture,
    depth_view: wgpu::TextureView,
}

impl FrameTextures {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let create = |label: &str, format: wgpu::TextureFormat| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            (texture, view)
        };

        let (scene, scene_view) = create("Scene Texture", HDR_FORMAT);
        let (post, post_view) = create("Post Process Texture", HDR_FORMAT);
        let (depth, depth_view) = create("Depth Texture", DEPTH_FORMAT);
        Self {
            _scene: scene,
            scene_view,
            _post: post,
            post_view,
            _depth: depth,
            depth_view,
        }
    }
}

pub struct WgpuCtx<'window> {
    surface: wgpu::Surface<'window>,
    surface_config: wgpu::SurfaceConfiguration,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    shaders: Arc<ShaderHotReload>,
    textures: TextureRegistry,
    kernel: CloudsKernel,
    executor: CommandExecutor,
    commands: CommandBuffer,
    clouds: CloudsRenderer,
    frame: FrameTextures,
    view_bind_group: wgpu::BindGroup,
    sky_pipeline: wgpu::RenderPipeline,
    gizmo_pipeline: wgpu::RenderPipeline,
    debug_lines: DebugLines,
    present_pipeline: wgpu::RenderPipeline,
    present_sampler: wgpu::Sampler,
    time: Instant,
}

impl<'window> WgpuCtx<'window> {
    pub async fn new_async(window: Arc<Window>, config: &ViewerConfig) -> anyhow::Result<Self> {
        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(Arc::clone(&window))
            .context("Failed to create surface")?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                force_fallback_adapter: false,
                compatible_surface: Some(&surface),
            })
            .await
            .ok_or_else(|| anyhow!("Failed to find an appropriate adapter"))?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: None,
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: MemoryHints::Performance,
                },
                None,
            )
            .await
            .context("Failed to create device")?;
        let device = Arc::new(device);
        let queue = Arc::new(queue);

        let size = window.inner_size();
        let width = size.width.max(1);
        let height = size.height.max(1);
        let mut surface_config = surface
            .get_default_config(&adapter, width, height)
            .ok_or_else(|| anyhow!("Surface isn't supported by the adapter"))?;
        surface_config.present_mode = wgpu::PresentMode::Fifo;
        surface.configure(&device, &surface_config);

        let shaders = Arc::new(ShaderHotReload::new(
            Arc::clone(&device),
            &config.assets.shader_dir,
        ));
        let mut textures = TextureRegistry::new(Arc::clone(&device), Arc::clone(&queue));
        let kernel = CloudsKernel::new(&shaders, Arc::clone(&queue), &mut textures)?;

        let blue_noise = textures.load_blue_noise_dir(&config.assets.blue_noise_dir)?;
        let pool = Arc::new(BlueNoisePool::new(blue_noise)?);
        let mut settings = config.clouds.clone();
        attach_optional_textures(&mut settings, config, &mut textures);
        let clouds = CloudsRenderer::new(settings, pool);

        let view_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
                label: Some("view_bind_group_layout"),
            });
        let view_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &view_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: kernel.view_buffer().as_entire_binding(),
            }],
            label: Some("view_bind_group"),
        });
        let view_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("View Pipeline Layout"),
            bind_group_layouts: &[&view_bind_group_layout],
            push_constant_ranges: &[],
        });

        let sky_shader = shaders
            .load("sky.wgsl")
            .ok_or_else(|| anyhow!("Sky shader failed to compile"))?;
        let sky_pipeline = create_sky_pipeline(&device, &view_layout, &sky_shader);

        let gizmo_shader = shaders
            .load("gizmo.wgsl")
            .ok_or_else(|| anyhow!("Gizmo shader failed to compile"))?;
        let gizmo_pipeline = create_gizmo_pipeline(&device, &view_layout, &gizmo_shader);

        let blit_shader = shaders
            .load("blit.wgsl")
            .ok_or_else(|| anyhow!("Blit shader failed to compile"))?;
        let present_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Present Pipeline Layout"),
            bind_group_layouts: &[kernel.blit_bind_group_layout()],
            push_constant_ranges: &[],
        });
        let present_pipeline = fullscreen_pipeline(
            &device,
            "Present Pipeline",
            &present_layout,
            &blit_shader,
            "fs_present",
            surface_config.format,
        );
        let present_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Present Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let frame = FrameTextures::new(&device, surface_config.width, surface_config.height);
        let executor = CommandExecutor::new(Arc::clone(&device));

        info!(
            "Renderer ready at {}x{} ({:?})",
            surface_config.width, surface_config.height, surface_config.format
        );

        Ok(Self {
            surface,
            surface_config,
            device,
            queue,
            shaders,
            textures,
            kernel,
            executor,
            commands: CommandBuffer::new(),
            clouds,
            frame,
            view_bind_group,
            sky_pipeline,
            gizmo_pipeline,
            debug_lines: DebugLines::new(),
            present_pipeline,
            present_sampler,
            time: Instant::now(),
        })
    }

    pub fn new(window: Arc<Window>, config: &ViewerConfig) -> anyhow::Result<Self> {
        pollster::block_on(Self::new_async(window, config))
    }

    pub fn clouds_mut(&mut self) -> &mut CloudsRenderer {
        &mut self.clouds
    }

    pub fn resize(&mut self, new_size: (u32, u32)) {
        let (width, height) = new_size;
        self.surface_config.width = width.max(1);
        self.surface_config.height = height.max(1);
        self.surface.configure(&self.device, &self.surface_config);
        self.frame = FrameTextures::new(
            &self.device,
            self.surface_config.width,
            self.surface_config.height,
        );
    }

    fn update_view(&mut self, camera: &Camera) {
        let aspect = self.surface_config.width as f32 / self.surface_config.height as f32;
        let view_proj = OPENGL_TO_WGPU_MATRIX * camera.projection_matrix(aspect) * camera.view_matrix();
        let inv_view_proj = view_proj.invert().unwrap_or_else(Matrix4::identity);
        let view = ViewUniforms {
            view_proj: view_proj.into(),
            inv_view_proj: inv_view_proj.into(),
            camera_position: [camera.position.x, camera.position.y, camera.position.z, 1.0],
            sun_direction: SUN_DIRECTION,
            params: [
                self.time.elapsed().as_secs_f32(),
                self.surface_config.width as f32,
                self.surface_config.height as f32,
                0.0,
            ],
        };
        // Shared by the sky, the gizmo and the clouds kernel
        self.kernel.update_view(&view);
    }

    pub fn draw(&mut self, camera: &Camera, show_gizmo: bool) {
        self.kernel.check_shader_updates(&self.shaders);
        self.update_view(camera);

        let surface_texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.surface_config);
                return;
            }
            Err(e) => {
                warn!("Skipping frame: {}", e);
                return;
            }
        };
        let surface_texture_view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });

        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Sky Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.frame.scene_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.frame.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            rpass.set_pipeline(&self.sky_pipeline);
            rpass.set_bind_group(0, &self.view_bind_group, &[]);
            rpass.draw(0..3, 0..1);
        }

        let output_view = self.run_post_chain(&mut encoder, camera);

        if show_gizmo {
            self.draw_gizmo(&mut encoder, output_view);
        }

        let present_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("present_bind_group"),
            layout: self.kernel.blit_bind_group_layout(),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(self.frame_view(output_view)),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.present_sampler),
                },
            ],
        });
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Final Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &surface_texture_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            rpass.set_pipeline(&self.present_pipeline);
            rpass.set_bind_group(0, &present_bind_group, &[]);
            rpass.draw(0..3, 0..1);
        }

        self.queue.submit(Some(encoder.finish()));
        surface_texture.present();
    }

    fn frame_view(&self, output: ChainOutput) -> &wgpu::TextureView {
        match output {
            ChainOutput::Scene => &self.frame.scene_view,
            ChainOutput::Post => &self.frame.post_view,
        }
    }

    /// Run every enabled effect, ping-ponging between the scene and post
    /// textures. Returns whichever holds the result.
    fn run_post_chain(&mut self, encoder: &mut wgpu::CommandEncoder, camera: &Camera) -> ChainOutput {
        let mut output = ChainOutput::Scene;
        let effects: [&mut dyn PostProcessEffect; 1] = [&mut self.clouds];

        for effect in effects {
            if !effect.is_enabled() {
                continue;
            }

            let (source, destination) = match output {
                ChainOutput::Scene => (&self.frame.scene_view, &self.frame.post_view),
                ChainOutput::Post => (&self.frame.post_view, &self.frame.scene_view),
            };

            let mut ctx = FrameContext {
                screen_width: self.surface_config.width,
                screen_height: self.surface_config.height,
                camera: camera.pose(),
                depth_available: true,
                scene_view: false,
                shaders: &self.kernel,
                commands: &mut self.commands,
            };
            effect.render(&mut ctx);

            self.executor.execute(
                encoder,
                self.commands.drain(),
                &FrameTargets {
                    source,
                    destination,
                    depth: &self.frame.depth_view,
                },
                &mut self.kernel,
                &self.textures,
            );
            output = output.flipped();
        }

        output
    }

    fn draw_gizmo(&mut self, encoder: &mut wgpu::CommandEncoder, output: ChainOutput) {
        self.debug_lines.clear();
        draw_bounds(self.clouds.settings(), &mut self.debug_lines);
        if self.debug_lines.vertices().is_empty() {
            return;
        }

        let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Gizmo Vertex Buffer"),
            contents: bytemuck::cast_slice(self.debug_lines.vertices()),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Gizmo Render Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: self.frame_view(output),
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.frame.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        rpass.set_pipeline(&self.gizmo_pipeline);
        rpass.set_bind_group(0, &self.view_bind_group, &[]);
        rpass.set_vertex_buffer(0, vertex_buffer.slice(..));
        rpass.draw(0..self.debug_lines.vertices().len() as u32, 0..1);
    }

    /// Free the clouds' persistent history on the GPU side.
    pub fn shutdown(&mut self) {
        self.clouds.release(&mut self.commands);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Shutdown Encoder"),
            });
        self.executor.execute(
            &mut encoder,
            self.commands.drain(),
            &FrameTargets {
                source: &self.frame.scene_view,
                destination: &self.frame.post_view,
                depth: &self.frame.depth_view,
            },
            &mut self.kernel,
            &self.textures,
        );
        self.queue.submit(Some(encoder.finish()));
        info!(
            "Renderer shut down, {} persistent targets left",
            self.executor.persistent_count()
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChainOutput {
    Scene,
    Post,
}

impl ChainOutput {
    fn flipped(self) -> Self {
        match self {
            ChainOutput::Scene => ChainOutput::Post,
            ChainOutput::Post => ChainOutput::Scene,
        }
    }
}

/// Load whichever optional noise textures the config names. A texture that
/// fails to load is left unset; the kernel substitutes a neutral input.
fn attach_optional_textures(
    settings: &mut CloudSettings,
    config: &ViewerConfig,
    textures: &mut TextureRegistry,
) {
    let assets = &config.assets;
    if let Some(path) = &assets.weather_map {
        match textures.load_png(path) {
            Ok(handle) => settings.set_weather_map(Some(handle)),
            Err(e) => warn!("Weather map not loaded: {}", e),
        }
    }
    if let Some(path) = &assets.base_noise {
        match textures.load_noise_cube(path, assets.noise_cube_size) {
            Ok(handle) => settings.set_base_noise(Some(handle)),
            Err(e) => warn!("Base noise not loaded: {}", e),
        }
    }
    if let Some(path) = &assets.detail_noise {
        match textures.load_noise_cube(path, assets.noise_cube_size) {
            Ok(handle) => settings.set_detail_noise(Some(handle)),
            Err(e) => warn!("Detail noise not loaded: {}", e),
        }
    }
}

fn create_sky_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Sky Render Pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[], // Vertex positions generated in shader
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: HDR_FORMAT,
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
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Always,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

fn create_gizmo_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Gizmo Render Pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[LineVertex::layout()],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: HDR_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::LineList,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: false,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}
