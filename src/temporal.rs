use crate::blue_noise::BlueNoiseCursor;
use crate::commands::{Command, CommandBuffer, FilterMode, PersistentId, RenderTarget, TargetDesc};
use crate::settings::Downsample;
use cgmath::{One, Quaternion, Vector3};
use tracing::debug;

/// Highest sample index; the kernel stops shrinking its history blend
/// weight beyond this many accumulated frames.
pub const HISTORY_LIMIT: u32 = 4;

/// Camera position and orientation as the host reports them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub position: Vector3<f32>,
    pub rotation: Quaternion<f32>,
}

impl CameraPose {
    pub fn new(position: Vector3<f32>, rotation: Quaternion<f32>) -> Self {
        Self { position, rotation }
    }

    pub fn identity() -> Self {
        Self {
            position: Vector3::new(0.0, 0.0, 0.0),
            rotation: Quaternion::one(),
        }
    }
}

impl Default for CameraPose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Working resolution for the raymarch passes. Never smaller than 1x1, even
/// when the factor exceeds the screen size.
pub fn working_resolution(screen: (u32, u32), downsample: Downsample) -> (u32, u32) {
    let factor = downsample.factor();
    ((screen.0 / factor).max(1), (screen.1 / factor).max(1))
}

/// Result of one [`TemporalState::advance`] step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalFrame {
    pub sample_index: u32,
    /// Blue-noise entry to bind this frame
    pub noise_index: usize,
    pub working: (u32, u32),
    pub resolution_changed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryBuffer {
    pub id: PersistentId,
    pub size: (u32, u32),
}

/// Per-renderer state carried from one frame to the next.
#[derive(Debug)]
pub struct TemporalState {
    previous_pose: CameraPose,
    sample_index: u32,
    noise_cursor: BlueNoiseCursor,
    working: Option<(u32, u32)>,
    history: Option<HistoryBuffer>,
}

impl TemporalState {
    pub fn new(noise_pool_len: usize) -> Self {
        Self {
            previous_pose: CameraPose::identity(),
            sample_index: 0,
            noise_cursor: BlueNoiseCursor::new(noise_pool_len),
            working: None,
            history: None,
        }
    }

    pub fn previous_pose(&self) -> CameraPose {
        self.previous_pose
    }

    pub fn sample_index(&self) -> u32 {
        self.sample_index
    }

    pub fn noise_cursor(&self) -> usize {
        self.noise_cursor.index()
    }

    pub fn history(&self) -> Option<HistoryBuffer> {
        self.history
    }

    /// Step the state forward one frame.
    ///
    /// The sample index counts frames since the camera last moved. Pose
    /// comparison is exact: any change in any component resets it.
    pub fn advance(
        &mut self,
        pose: CameraPose,
        screen: (u32, u32),
        downsample: Downsample,
    ) -> TemporalFrame {
        let working = working_resolution(screen, downsample);
        let resolution_changed = self.working != Some(working);
        self.working = Some(working);

        let noise_index = self.noise_cursor.index();
        self.noise_cursor.advance();

        if pose != self.previous_pose {
            self.sample_index = 0;
        } else {
            self.sample_index = (self.sample_index + 1).min(HISTORY_LIMIT);
        }
        self.previous_pose = pose;

        TemporalFrame {
            sample_index: self.sample_index,
            noise_index,
            working,
            resolution_changed,
        }
    }

    /// Make sure the history buffer exists at `size`, recording whatever
    /// allocation is needed. A fresh buffer is cleared since its contents
    /// can't be trusted.
    pub fn acquire_history(&mut self, size: (u32, u32), commands: &mut CommandBuffer) -> PersistentId {
        if let Some(history) = self.history {
            if history.size == size {
                return history.id;
            }
            debug!(
                "Resizing cloud history {}x{} -> {}x{}",
                history.size.0, history.size.1, size.0, size.1
            );
            commands.push(Command::ReleasePersistent { id: history.id });
        }

        let id = PersistentId::next();
        commands.push(Command::AllocatePersistent {
            id,
            desc: TargetDesc::new(size.0, size.1, FilterMode::Bilinear),
        });
        commands.push(Command::ClearTarget {
            target: RenderTarget::Persistent(id),
        });
        self.history = Some(HistoryBuffer { id, size });
        id
    }

    /// Free the history buffer, if any.
    pub fn release_history(&mut self, commands: &mut CommandBuffer) {
        if let Some(history) = self.history.take() {
            commands.push(Command::ReleasePersistent { id: history.id });
        }
        self.working = None;
    }
}
