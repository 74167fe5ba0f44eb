use crate::blue_noise::BlueNoisePool;
use crate::commands::{
    CommandBuffer, FilterMode, KernelId, KernelPass, RenderTarget, SubProgram, TargetDesc,
    TemporaryId,
};
use crate::post_processing::{DepthTextureMode, FrameContext, PostProcessEffect};
use crate::settings::CloudSettings;
use crate::temporal::{TemporalFrame, TemporalState};
use crate::uniforms::{PropertySheet, Uniform};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Global name the accumulated cloud colour is bound under before the
/// composite pass.
pub const CLOUDS_COLOR_GLOBAL: &str = "clouds_downsample_color";

const SCRATCH: TemporaryId = TemporaryId("clouds_color_tmp");

#[derive(Debug, Default)]
struct FallbackWarnings {
    missing_kernel: bool,
    missing_depth: bool,
}

/// Screen-space volumetric clouds with temporal accumulation.
///
/// Each frame records:
/// history -> scratch (raymarch + blend), scratch -> history (commit),
/// then source -> destination (composite against the new history).
pub struct CloudsRenderer {
    settings: CloudSettings,
    blue_noise: Arc<BlueNoisePool>,
    temporal: TemporalState,
    sheet_cache: Option<(u64, PropertySheet)>,
    warnings: FallbackWarnings,
    name: String,
}

impl CloudsRenderer {
    pub const KERNEL_NAME: &'static str = "hidden/volumetric_clouds";

    pub fn new(settings: CloudSettings, blue_noise: Arc<BlueNoisePool>) -> Self {
        let temporal = TemporalState::new(blue_noise.len());
        Self {
            settings,
            blue_noise,
            temporal,
            sheet_cache: None,
            warnings: FallbackWarnings::default(),
            name: "Volumetric Clouds".to_string(),
        }
    }

    pub fn settings(&self) -> &CloudSettings {
        &self.settings
    }

    /// Settings are edited in place; every setter restamps the revision, which
    /// is what the uniform cache keys on.
    pub fn settings_mut(&mut self) -> &mut CloudSettings {
        &mut self.settings
    }

    pub fn temporal(&self) -> &TemporalState {
        &self.temporal
    }

    /// Free the persistent history buffer. Call before dropping the renderer
    /// so the host can reclaim the target.
    pub fn release(&mut self, commands: &mut CommandBuffer) {
        if self.temporal.history().is_some() {
            info!("Releasing cloud history buffer");
        }
        self.temporal.release_history(commands);
    }

    pub fn render_frame(&mut self, ctx: &mut FrameContext<'_>) {
        if !self.settings.enabled() || ctx.scene_view {
            ctx.pass_through();
            return;
        }

        let Some(kernel) = ctx.shaders.find(Self::KERNEL_NAME) else {
            if !self.warnings.missing_kernel {
                warn!(
                    "Shader kernel {} not found, clouds fall back to a plain copy",
                    Self::KERNEL_NAME
                );
                self.warnings.missing_kernel = true;
            }
            ctx.pass_through();
            return;
        };
        self.warnings.missing_kernel = false;

        if !ctx.depth_available {
            if !self.warnings.missing_depth {
                warn!("No depth texture from host, clouds fall back to a plain copy");
                self.warnings.missing_depth = true;
            }
            ctx.pass_through();
            return;
        }
        self.warnings.missing_depth = false;

        let frame = self.temporal.advance(
            ctx.camera,
            ctx.screen_size(),
            self.settings.downsample(),
        );
        if frame.resolution_changed {
            debug!(
                "Cloud working resolution {}x{} (x{} downsample)",
                frame.working.0,
                frame.working.1,
                self.settings.downsample().factor()
            );
        }

        let sheet = self.frame_sheet(&frame);
        ctx.commands.set_properties(kernel, sheet);

        self.record_passes(kernel, &frame, ctx.commands);
    }

    fn record_passes(&mut self, kernel: KernelId, frame: &TemporalFrame, cmd: &mut CommandBuffer) {
        let (width, height) = frame.working;

        let history = RenderTarget::Persistent(self.temporal.acquire_history(frame.working, cmd));
        let scratch = cmd.get_temporary(SCRATCH, TargetDesc::new(width, height, FilterMode::Bilinear));

        // Raymarch at low resolution over the accumulated history, then make
        // the blend the new history.
        cmd.blit(
            history,
            scratch,
            SubProgram {
                kernel,
                pass: KernelPass::Downsample,
            },
        );
        cmd.copy(scratch, history);

        cmd.set_global_texture(CLOUDS_COLOR_GLOBAL, history);
        cmd.blit(
            RenderTarget::Source,
            RenderTarget::Destination,
            SubProgram {
                kernel,
                pass: KernelPass::Composite,
            },
        );

        cmd.release_temporary(SCRATCH);
    }

    /// Settings uniforms (cached per revision) plus this frame's blue-noise
    /// and sample-index values.
    fn frame_sheet(&mut self, frame: &TemporalFrame) -> PropertySheet {
        let revision = self.settings.revision();
        let mut sheet = match &self.sheet_cache {
            Some((cached, sheet)) if *cached == revision => sheet.clone(),
            _ => {
                let sheet = settings_sheet(&self.settings);
                self.sheet_cache = Some((revision, sheet.clone()));
                sheet
            }
        };

        let noise = self.blue_noise.get(frame.noise_index);
        let scale = self.settings.blue_noise_scale();
        let coords = [
            frame.working.0 as f32 / noise.width.max(1) as f32 * scale,
            frame.working.1 as f32 / noise.height.max(1) as f32 * scale,
            0.0,
            0.0,
        ];
        sheet.set_texture(Uniform::BlueNoiseTex, noise);
        sheet.set_vector(Uniform::BlueNoiseCoords, coords);
        sheet.set_float(Uniform::BlueNoiseStrength, self.settings.blue_noise_strength());

        sheet.set_int(Uniform::SampleIndex, frame.sample_index as i32);
        sheet
    }
}

fn vec3(v: cgmath::Vector3<f32>) -> [f32; 4] {
    [v.x, v.y, v.z, 0.0]
}

/// Marshal the parameter set into kernel uniforms. Optional textures are only
/// present when set; the kernel supplies its own neutral input otherwise.
pub fn settings_sheet(settings: &CloudSettings) -> PropertySheet {
    let mut sheet = PropertySheet::new();

    let (bounds_min, bounds_max) = settings.bounds();
    sheet.set_vector(Uniform::BoundsMin, vec3(bounds_min));
    sheet.set_vector(Uniform::BoundsMax, vec3(bounds_max));
    sheet.set_float(Uniform::StepCount, settings.step_count());

    // shade
    sheet.set_float(
        Uniform::LightAbsorptionTowardSun,
        settings.light_absorption_toward_sun(),
    );
    sheet.set_float(
        Uniform::LightAbsorptionThroughCloud,
        settings.light_absorption_through_cloud(),
    );
    sheet.set_color(Uniform::ColorA, settings.color_a());
    sheet.set_color(Uniform::ColorB, settings.color_b());
    sheet.set_float(Uniform::MieAnisotropy, settings.mie_anisotropy());
    sheet.set_float(Uniform::LightStepCount, settings.light_step_count());

    // shape
    if let Some(weather_map) = settings.weather_map() {
        sheet.set_texture(Uniform::WeatherMap, weather_map);
    }
    sheet.set_float(Uniform::WeatherMapScale, settings.weather_map_scale());
    let speed = settings.weather_map_speed();
    sheet.set_vector(Uniform::WeatherMapSpeed, [speed.x, speed.y, 0.0, 0.0]);
    sheet.set_float(Uniform::EdgeFadeDistance, settings.edge_fade_distance());
    sheet.set_float(Uniform::ShapeNoiseWeight, settings.shape_noise_weight());
    sheet.set_float(Uniform::DensityOffset, settings.density_offset());
    sheet.set_float(Uniform::DensityMultiplier, settings.density_multiplier());

    if let Some(base_noise) = settings.base_noise() {
        sheet.set_texture(Uniform::BaseNoiseTex, base_noise);
    }
    sheet.set_float(Uniform::BaseNoiseScale, settings.base_noise_scale());
    sheet.set_float(Uniform::BaseNoiseStrength, settings.base_noise_strength());
    sheet.set_vector(Uniform::BaseNoiseSpeed, vec3(settings.base_noise_speed()));

    // detail
    if let Some(detail_noise) = settings.detail_noise() {
        sheet.set_texture(Uniform::DetailNoiseTex, detail_noise);
    }
    sheet.set_float(Uniform::DetailNoiseScale, settings.detail_noise_scale());
    sheet.set_vector(Uniform::DetailNoiseSpeed, vec3(settings.detail_noise_speed()));
    sheet.set_float(Uniform::DetailShapeExponent, settings.detail_shape_exponent());
    sheet.set_float(Uniform::DetailNoiseWeight, settings.detail_noise_weight());

    sheet
}

impl PostProcessEffect for CloudsRenderer {
    fn render(&mut self, ctx: &mut FrameContext<'_>) {
        self.render_frame(ctx);
    }

    fn camera_flags(&self) -> DepthTextureMode {
        DepthTextureMode::Depth
    }

    fn is_enabled(&self) -> bool {
        self.settings.enabled()
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.settings.set_enabled(enabled);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uniforms::{TextureHandle, TextureId};
    use cgmath::Vector3;

    #[test]
    fn optional_textures_only_bound_when_present() {
        let mut settings = CloudSettings::default();
        let sheet = settings_sheet(&settings);
        assert!(!sheet.contains(Uniform::WeatherMap));
        assert!(!sheet.contains(Uniform::BaseNoiseTex));
        assert!(!sheet.contains(Uniform::DetailNoiseTex));

        let weather = TextureHandle::new_2d(TextureId(9), 512, 512);
        settings.set_weather_map(Some(weather));
        let sheet = settings_sheet(&settings);
        assert_eq!(sheet.texture(Uniform::WeatherMap), Some(weather));
        assert!(!sheet.contains(Uniform::DetailNoiseTex));
    }

    #[test]
    fn bounds_uniforms_follow_center_and_size() {
        let mut settings = CloudSettings::default();
        settings.set_center(Vector3::new(0.0, 100.0, 0.0));
        settings.set_size(Vector3::new(400.0, 50.0, 400.0));
        let sheet = settings_sheet(&settings);
        assert_eq!(sheet.vector(Uniform::BoundsMin), Some([-200.0, 75.0, -200.0, 0.0]));
        assert_eq!(sheet.vector(Uniform::BoundsMax), Some([200.0, 125.0, 200.0, 0.0]));
    }

    #[test]
    fn effect_reports_depth_requirement() {
        let pool = BlueNoisePool::new(vec![TextureHandle::new_2d(TextureId(0), 64, 64)]).unwrap();
        let renderer = CloudsRenderer::new(CloudSettings::default(), Arc::new(pool));
        assert_eq!(renderer.camera_flags(), DepthTextureMode::Depth);
        assert_eq!(renderer.name(), "Volumetric Clouds");
    }
}
