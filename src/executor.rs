use crate::clouds::CLOUDS_COLOR_GLOBAL;
use crate::commands::{Command, FilterMode, PersistentId, RenderTarget, TargetDesc, TemporaryId};
use crate::kernel::{CloudsKernel, PassInputs, HDR_FORMAT};
use crate::textures::TextureRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

struct GpuTarget {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    desc: TargetDesc,
}

impl GpuTarget {
    fn new(device: &wgpu::Device, label: &str, desc: TargetDesc) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: desc.width.max(1),
                height: desc.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: HDR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
            desc,
        }
    }
}

/// The host's views for the two frame roles plus the depth the effect
/// asked for.
pub struct FrameTargets<'a> {
    pub source: &'a wgpu::TextureView,
    pub destination: &'a wgpu::TextureView,
    pub depth: &'a wgpu::TextureView,
}

/// Replays recorded [`Command`]s onto a wgpu encoder.
///
/// Persistent targets live until released. Temporaries go back to a free
/// list on release and are reused when a later request has the same size
/// and filter.
pub struct CommandExecutor {
    device: Arc<wgpu::Device>,
    persistent: HashMap<PersistentId, GpuTarget>,
    temporaries: HashMap<TemporaryId, GpuTarget>,
    free_temporaries: Vec<GpuTarget>,
    globals: HashMap<&'static str, RenderTarget>,
}

impl CommandExecutor {
    pub fn new(device: Arc<wgpu::Device>) -> Self {
        Self {
            device,
            persistent: HashMap::new(),
            temporaries: HashMap::new(),
            free_temporaries: Vec::new(),
            globals: HashMap::new(),
        }
    }

    pub fn persistent_count(&self) -> usize {
        self.persistent.len()
    }

    pub fn execute(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        commands: impl IntoIterator<Item = Command>,
        frame: &FrameTargets<'_>,
        kernel: &mut CloudsKernel,
        textures: &TextureRegistry,
    ) {
        for command in commands {
            match command {
                Command::SetProperties { sheet, .. } => kernel.set_properties(&sheet),
                Command::AllocatePersistent { id, desc } => {
                    debug!("Allocating persistent target {:?} {}x{}", id, desc.width, desc.height);
                    let target = GpuTarget::new(&self.device, "Persistent Target", desc);
                    self.persistent.insert(id, target);
                }
                Command::ReleasePersistent { id } => {
                    self.persistent.remove(&id);
                    self.globals
                        .retain(|_, bound| *bound != RenderTarget::Persistent(id));
                }
                Command::GetTemporary { id, desc } => {
                    let target = match self.free_temporaries.iter().position(|t| t.desc == desc) {
                        Some(index) => self.free_temporaries.swap_remove(index),
                        None => GpuTarget::new(&self.device, id.0, desc),
                    };
                    if let Some(previous) = self.temporaries.insert(id, target) {
                        self.free_temporaries.push(previous);
                    }
                }
                Command::ReleaseTemporary { id } => {
                    if let Some(target) = self.temporaries.remove(&id) {
                        self.free_temporaries.push(target);
                    }
                    self.globals
                        .retain(|_, bound| *bound != RenderTarget::Temporary(id));
                }
                Command::ClearTarget { target } => {
                    if let Some((view, _)) = self.resolve(target, frame) {
                        clear(encoder, view);
                    }
                }
                Command::SetGlobalTexture { name, target } => {
                    self.globals.insert(name, target);
                }
                Command::Blit {
                    source,
                    destination,
                    program,
                } => {
                    let (Some((src, filter)), Some((dst, _))) =
                        (self.resolve(source, frame), self.resolve(destination, frame))
                    else {
                        warn!("Blit {:?} -> {:?} has an unknown target, skipped", source, destination);
                        continue;
                    };

                    match program {
                        None => kernel.copy(encoder, src, filter, dst),
                        Some(program) => {
                            let clouds_color = self
                                .globals
                                .get(CLOUDS_COLOR_GLOBAL)
                                .and_then(|bound| self.resolve(*bound, frame))
                                .map(|(view, _)| view);
                            let inputs = PassInputs {
                                source: src,
                                source_filter: filter,
                                depth: frame.depth,
                                clouds_color,
                                textures,
                            };
                            kernel.draw(encoder, program.pass, &inputs, dst);
                        }
                    }
                }
            }
        }
    }

    fn resolve<'a>(
        &'a self,
        target: RenderTarget,
        frame: &FrameTargets<'a>,
    ) -> Option<(&'a wgpu::TextureView, FilterMode)> {
        match target {
            RenderTarget::Source => Some((frame.source, FilterMode::Bilinear)),
            RenderTarget::Destination => Some((frame.destination, FilterMode::Bilinear)),
            RenderTarget::Temporary(id) => self.temporaries.get(&id).map(|t| (&t.view, t.desc.filter)),
            RenderTarget::Persistent(id) => self.persistent.get(&id).map(|t| (&t.view, t.desc.filter)),
        }
    }
}

fn clear(encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Clear Target"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
}
