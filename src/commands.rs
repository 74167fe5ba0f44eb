//! Recorded GPU work.
//!
//! The renderer never touches the GPU. It appends [`Command`]s to a
//! [`CommandBuffer`] and the host replays them, in order, on its own device.

use crate::uniforms::PropertySheet;
use std::sync::atomic::{AtomicU64, Ordering};

/// Handle to a shader kernel resolved through a [`ShaderLibrary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelId(pub u32);

/// Resolves kernels by name. Returning `None` sends the renderer down its
/// copy-only fallback path.
pub trait ShaderLibrary {
    fn find(&self, name: &str) -> Option<KernelId>;
}

/// Sub-program slots of the cloud kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelPass {
    /// Raymarch at working resolution, blended over the history input.
    Downsample = 0,
    /// Full resolution composite of the source with the accumulated clouds.
    Composite = 2,
}

impl KernelPass {
    pub fn slot(self) -> u32 {
        self as u32
    }
}

/// A kernel plus the sub-program slot a blit should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubProgram {
    pub kernel: KernelId,
    pub pass: KernelPass,
}

/// Temporary target id, named the way the host's scratch pool keys them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TemporaryId(pub &'static str);

/// Persistent target id. Unique per process so several renderers can share
/// one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PersistentId(pub u64);

static NEXT_PERSISTENT_ID: AtomicU64 = AtomicU64::new(1);

impl PersistentId {
    pub fn next() -> Self {
        Self(NEXT_PERSISTENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Colour buffer roles a command can read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    /// The frame's input colour, supplied by the host
    Source,
    /// Where the effect's output must end up
    Destination,
    Temporary(TemporaryId),
    Persistent(PersistentId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    Point,
    #[default]
    Bilinear,
}

/// Size and sampling of a target. The colour format always matches the
/// host's source format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetDesc {
    pub width: u32,
    pub height: u32,
    pub filter: FilterMode,
}

impl TargetDesc {
    pub fn new(width: u32, height: u32, filter: FilterMode) -> Self {
        Self {
            width,
            height,
            filter,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Replace the kernel's uniform state
    SetProperties {
        kernel: KernelId,
        sheet: PropertySheet,
    },
    AllocatePersistent {
        id: PersistentId,
        desc: TargetDesc,
    },
    ReleasePersistent {
        id: PersistentId,
    },
    GetTemporary {
        id: TemporaryId,
        desc: TargetDesc,
    },
    ReleaseTemporary {
        id: TemporaryId,
    },
    /// Clear to transparent black
    ClearTarget {
        target: RenderTarget,
    },
    /// Bind a target under a global name visible to every later pass
    SetGlobalTexture {
        name: &'static str,
        target: RenderTarget,
    },
    /// Fullscreen pass from `source` into `destination`; `None` is a plain copy
    Blit {
        source: RenderTarget,
        destination: RenderTarget,
        program: Option<SubProgram>,
    },
}

/// Ordered list of commands for one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandBuffer {
    commands: Vec<Command>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn set_properties(&mut self, kernel: KernelId, sheet: PropertySheet) {
        self.push(Command::SetProperties { kernel, sheet });
    }

    pub fn get_temporary(&mut self, id: TemporaryId, desc: TargetDesc) -> RenderTarget {
        self.push(Command::GetTemporary { id, desc });
        RenderTarget::Temporary(id)
    }

    pub fn release_temporary(&mut self, id: TemporaryId) {
        self.push(Command::ReleaseTemporary { id });
    }

    pub fn set_global_texture(&mut self, name: &'static str, target: RenderTarget) {
        self.push(Command::SetGlobalTexture { name, target });
    }

    pub fn blit(&mut self, source: RenderTarget, destination: RenderTarget, program: SubProgram) {
        self.push(Command::Blit {
            source,
            destination,
            program: Some(program),
        });
    }

    pub fn copy(&mut self, source: RenderTarget, destination: RenderTarget) {
        self.push(Command::Blit {
            source,
            destination,
            program: None,
        });
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Hand the recorded commands to the executor, leaving the buffer empty
    /// for the next frame.
    pub fn drain(&mut self) -> std::vec::Drain<'_, Command> {
        self.commands.drain(..)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistent_ids_are_unique() {
        let a = PersistentId::next();
        let b = PersistentId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn helpers_record_in_order() {
        let mut cmd = CommandBuffer::new();
        let tmp = cmd.get_temporary(
            TemporaryId("scratch"),
            TargetDesc::new(4, 4, FilterMode::Point),
        );
        cmd.copy(RenderTarget::Source, tmp);
        cmd.release_temporary(TemporaryId("scratch"));

        assert_eq!(cmd.len(), 3);
        assert_eq!(
            cmd.commands()[1],
            Command::Blit {
                source: RenderTarget::Source,
                destination: RenderTarget::Temporary(TemporaryId("scratch")),
                program: None,
            }
        );

        let drained: Vec<_> = cmd.drain().collect();
        assert_eq!(drained.len(), 3);
        assert!(cmd.is_empty());
    }

    #[test]
    fn pass_slots_match_kernel_layout() {
        assert_eq!(KernelPass::Downsample.slot(), 0);
        assert_eq!(KernelPass::Composite.slot(), 2);
    }
}
