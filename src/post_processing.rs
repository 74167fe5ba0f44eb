use crate::commands::{CommandBuffer, RenderTarget, ShaderLibrary};
use crate::temporal::CameraPose;

/// What the host must render into its depth texture for an effect to work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepthTextureMode {
    #[default]
    None,
    Depth,
}

/// Everything the host hands an effect for one frame.
///
/// The source and destination are the [`RenderTarget::Source`] and
/// [`RenderTarget::Destination`] roles; the host decides what they map to.
pub struct FrameContext<'a> {
    pub screen_width: u32,
    pub screen_height: u32,
    pub camera: CameraPose,
    /// The host rendered the depth the effect asked for
    pub depth_available: bool,
    /// Editor scene view during play; effects pass straight through
    pub scene_view: bool,
    pub shaders: &'a dyn ShaderLibrary,
    pub commands: &'a mut CommandBuffer,
}

impl<'a> FrameContext<'a> {
    pub fn screen_size(&self) -> (u32, u32) {
        (self.screen_width, self.screen_height)
    }

    /// Identity copy from source to destination.
    pub fn pass_through(&mut self) {
        self.commands
            .copy(RenderTarget::Source, RenderTarget::Destination);
    }
}

// Trait for all post-processing effects
pub trait PostProcessEffect {
    /// Record this frame's work into `ctx.commands`. Always leaves the
    /// destination written, even when the effect can't run.
    fn render(&mut self, ctx: &mut FrameContext<'_>);

    fn camera_flags(&self) -> DepthTextureMode {
        DepthTextureMode::None
    }

    fn is_enabled(&self) -> bool;
    fn set_enabled(&mut self, enabled: bool);

    fn name(&self) -> &str;
}
