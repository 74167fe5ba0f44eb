use crate::error::{CloudsError, Result};
use crate::uniforms::TextureHandle;
use cgmath::{Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_REVISION: AtomicU64 = AtomicU64::new(1);

/// Closed interval a parameter is clamped into on write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange {
    pub min: f32,
    pub max: f32,
}

impl ParamRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub const fn at_least(min: f32) -> Self {
        Self {
            min,
            max: f32::INFINITY,
        }
    }

    /// Clamp into range. NaN lands on `min`.
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            self.min
        } else {
            value.clamp(self.min, self.max)
        }
    }
}

/// Declared ranges for every numeric cloud parameter.
pub mod ranges {
    use super::ParamRange;

    pub const SIZE: ParamRange = ParamRange::at_least(0.0);
    pub const STEP_COUNT: ParamRange = ParamRange::new(0.0, 32.0);

    pub const LIGHT_ABSORPTION_TOWARD_SUN: ParamRange = ParamRange::new(0.0, 20.0);
    pub const LIGHT_ABSORPTION_THROUGH_CLOUD: ParamRange = ParamRange::new(0.0, 5.0);
    pub const MIE_ANISOTROPY: ParamRange = ParamRange::new(0.0, 1.0);
    pub const LIGHT_STEP_COUNT: ParamRange = ParamRange::new(0.0, 16.0);

    pub const WEATHER_MAP_SCALE: ParamRange = ParamRange::at_least(0.0);
    pub const EDGE_FADE_DISTANCE: ParamRange = ParamRange::at_least(0.0);
    pub const SHAPE_NOISE_WEIGHT: ParamRange = ParamRange::new(0.0, 2.0);
    pub const DENSITY_OFFSET: ParamRange = ParamRange::new(-1.0, 1.0);
    pub const DENSITY_MULTIPLIER: ParamRange = ParamRange::new(0.0, 10.0);

    pub const BASE_NOISE_SCALE: ParamRange = ParamRange::new(0.0, 0.5);
    pub const BASE_NOISE_STRENGTH: ParamRange = ParamRange::new(0.0, 0.1);

    pub const DETAIL_NOISE_SCALE: ParamRange = ParamRange::new(0.0, 0.5);
    pub const DETAIL_SHAPE_EXPONENT: ParamRange = ParamRange::at_least(0.0);
    pub const DETAIL_NOISE_WEIGHT: ParamRange = ParamRange::new(0.0, 1.0);

    pub const BLUE_NOISE_SCALE: ParamRange = ParamRange::new(0.0, 10.0);
    pub const BLUE_NOISE_STRENGTH: ParamRange = ParamRange::new(0.0, 10.0);
}

/// Divisor applied to the screen size before the raymarch passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum Downsample {
    X1,
    X2,
    #[default]
    X4,
    X8,
    X16,
    X32,
}

impl Downsample {
    pub const ALL: [Downsample; 6] = [
        Downsample::X1,
        Downsample::X2,
        Downsample::X4,
        Downsample::X8,
        Downsample::X16,
        Downsample::X32,
    ];

    pub fn factor(self) -> u32 {
        match self {
            Downsample::X1 => 1,
            Downsample::X2 => 2,
            Downsample::X4 => 4,
            Downsample::X8 => 8,
            Downsample::X16 => 16,
            Downsample::X32 => 32,
        }
    }

    /// Snap an arbitrary factor onto the allowed set: 0 becomes 1, anything
    /// above 32 becomes 32, everything else rounds down to a power of two.
    pub fn from_factor(factor: u32) -> Self {
        match factor {
            0..=1 => Downsample::X1,
            2..=3 => Downsample::X2,
            4..=7 => Downsample::X4,
            8..=15 => Downsample::X8,
            16..=31 => Downsample::X16,
            _ => Downsample::X32,
        }
    }
}

impl From<u32> for Downsample {
    fn from(factor: u32) -> Self {
        Self::from_factor(factor)
    }
}

impl From<Downsample> for u32 {
    fn from(downsample: Downsample) -> Self {
        downsample.factor()
    }
}

fn clamp_non_negative3(v: Vector3<f32>) -> Vector3<f32> {
    Vector3::new(
        ranges::SIZE.clamp(v.x),
        ranges::SIZE.clamp(v.y),
        ranges::SIZE.clamp(v.z),
    )
}

fn clamp_count(range: ParamRange, value: f32) -> f32 {
    range.clamp(value).round()
}

/// Parameters for one cloud volume.
///
/// Every write goes through a setter that clamps into the declared range, so
/// the stored values always satisfy [`ranges`]. Each write also restamps
/// [`CloudSettings::revision`]. Deserialized values are clamped and
/// stamped the same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawCloudSettings")]
pub struct CloudSettings {
    enabled: bool,

    // Geometry
    center: Vector3<f32>,
    size: Vector3<f32>,

    // Raymarch
    step_count: f32,

    // Lighting
    light_absorption_toward_sun: f32,
    light_absorption_through_cloud: f32,
    color_a: [f32; 4],
    color_b: [f32; 4],
    mie_anisotropy: f32,
    light_step_count: f32,

    // Shape
    #[serde(skip)]
    weather_map: Option<TextureHandle>,
    weather_map_scale: f32,
    weather_map_speed: Vector2<f32>,
    edge_fade_distance: f32,
    shape_noise_weight: f32,
    density_offset: f32,
    density_multiplier: f32,

    // Base noise
    #[serde(skip)]
    base_noise: Option<TextureHandle>,
    base_noise_scale: f32,
    base_noise_strength: f32,
    base_noise_speed: Vector3<f32>,

    // Detail noise
    #[serde(skip)]
    detail_noise: Option<TextureHandle>,
    detail_noise_scale: f32,
    detail_noise_speed: Vector3<f32>,
    detail_shape_exponent: f32,
    detail_noise_weight: f32,

    // Blue noise
    blue_noise_scale: f32,
    blue_noise_strength: f32,

    downsample: Downsample,

    #[serde(skip)]
    revision: u64,
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            center: Vector3::new(0.0, 0.0, 0.0),
            size: Vector3::new(1.0, 1.0, 1.0),
            step_count: 32.0,
            light_absorption_toward_sun: 1.0,
            light_absorption_through_cloud: 1.0,
            color_a: [1.0, 1.0, 1.0, 1.0],
            color_b: [0.5, 0.5, 0.5, 1.0],
            mie_anisotropy: 0.6,
            light_step_count: 8.0,
            weather_map: None,
            weather_map_scale: 1.0,
            weather_map_speed: Vector2::new(0.0, 0.0),
            edge_fade_distance: 10.0,
            shape_noise_weight: 1.0,
            density_offset: 0.0,
            density_multiplier: 1.0,
            base_noise: None,
            base_noise_scale: 0.1,
            base_noise_strength: 0.05,
            base_noise_speed: Vector3::new(0.0, 0.0, 0.0),
            detail_noise: None,
            detail_noise_scale: 0.2,
            detail_noise_speed: Vector3::new(0.0, 0.0, 0.0),
            detail_shape_exponent: 1.0,
            detail_noise_weight: 1.0,
            blue_noise_scale: 1.0,
            blue_noise_strength: 1.0,
            downsample: Downsample::X4,
            revision: 0,
        }
    }
}

/// Serialized form of [`CloudSettings`]: every field except the runtime
/// texture handles and the revision. Converting it clamps and restamps.
#[derive(Deserialize)]
#[serde(default)]
struct RawCloudSettings {
    enabled: bool,
    center: Vector3<f32>,
    size: Vector3<f32>,
    step_count: f32,
    light_absorption_toward_sun: f32,
    light_absorption_through_cloud: f32,
    color_a: [f32; 4],
    color_b: [f32; 4],
    mie_anisotropy: f32,
    light_step_count: f32,
    weather_map_scale: f32,
    weather_map_speed: Vector2<f32>,
    edge_fade_distance: f32,
    shape_noise_weight: f32,
    density_offset: f32,
    density_multiplier: f32,
    base_noise_scale: f32,
    base_noise_strength: f32,
    base_noise_speed: Vector3<f32>,
    detail_noise_scale: f32,
    detail_noise_speed: Vector3<f32>,
    detail_shape_exponent: f32,
    detail_noise_weight: f32,
    blue_noise_scale: f32,
    blue_noise_strength: f32,
    downsample: Downsample,
}

impl Default for RawCloudSettings {
    fn default() -> Self {
        let d = CloudSettings::default();
        Self {
            enabled: d.enabled,
            center: d.center,
            size: d.size,
            step_count: d.step_count,
            light_absorption_toward_sun: d.light_absorption_toward_sun,
            light_absorption_through_cloud: d.light_absorption_through_cloud,
            color_a: d.color_a,
            color_b: d.color_b,
            mie_anisotropy: d.mie_anisotropy,
            light_step_count: d.light_step_count,
            weather_map_scale: d.weather_map_scale,
            weather_map_speed: d.weather_map_speed,
            edge_fade_distance: d.edge_fade_distance,
            shape_noise_weight: d.shape_noise_weight,
            density_offset: d.density_offset,
            density_multiplier: d.density_multiplier,
            base_noise_scale: d.base_noise_scale,
            base_noise_strength: d.base_noise_strength,
            base_noise_speed: d.base_noise_speed,
            detail_noise_scale: d.detail_noise_scale,
            detail_noise_speed: d.detail_noise_speed,
            detail_shape_exponent: d.detail_shape_exponent,
            detail_noise_weight: d.detail_noise_weight,
            blue_noise_scale: d.blue_noise_scale,
            blue_noise_strength: d.blue_noise_strength,
            downsample: d.downsample,
        }
    }
}

impl From<RawCloudSettings> for CloudSettings {
    fn from(raw: RawCloudSettings) -> Self {
        CloudSettings {
            enabled: raw.enabled,
            center: raw.center,
            size: raw.size,
            step_count: raw.step_count,
            light_absorption_toward_sun: raw.light_absorption_toward_sun,
            light_absorption_through_cloud: raw.light_absorption_through_cloud,
            color_a: raw.color_a,
            color_b: raw.color_b,
            mie_anisotropy: raw.mie_anisotropy,
            light_step_count: raw.light_step_count,
            weather_map: None,
            weather_map_scale: raw.weather_map_scale,
            weather_map_speed: raw.weather_map_speed,
            edge_fade_distance: raw.edge_fade_distance,
            shape_noise_weight: raw.shape_noise_weight,
            density_offset: raw.density_offset,
            density_multiplier: raw.density_multiplier,
            base_noise: None,
            base_noise_scale: raw.base_noise_scale,
            base_noise_strength: raw.base_noise_strength,
            base_noise_speed: raw.base_noise_speed,
            detail_noise: None,
            detail_noise_scale: raw.detail_noise_scale,
            detail_noise_speed: raw.detail_noise_speed,
            detail_shape_exponent: raw.detail_shape_exponent,
            detail_noise_weight: raw.detail_noise_weight,
            blue_noise_scale: raw.blue_noise_scale,
            blue_noise_strength: raw.blue_noise_strength,
            downsample: raw.downsample,
            revision: 0,
        }
        .clamped()
    }
}

macro_rules! clamped_f32 {
    ($(#[$doc:meta])* $get:ident, $set:ident, $range:expr) => {
        $(#[$doc])*
        pub fn $get(&self) -> f32 {
            self.$get
        }

        pub fn $set(&mut self, value: f32) {
            self.$get = $range.clamp(value);
            self.touch();
        }
    };
}

macro_rules! plain_value {
    ($get:ident, $set:ident, $ty:ty) => {
        pub fn $get(&self) -> $ty {
            self.$get
        }

        pub fn $set(&mut self, value: $ty) {
            self.$get = value;
            self.touch();
        }
    };
}

impl CloudSettings {
    /// Load settings from a TOML file, clamping everything on the way in.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| CloudsError::io(path.as_ref(), e))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Re-apply every declared range and restamp the revision. Every
    /// deserialized value passes through here.
    pub fn clamped(mut self) -> Self {
        self.size = clamp_non_negative3(self.size);
        self.step_count = clamp_count(ranges::STEP_COUNT, self.step_count);
        self.light_absorption_toward_sun =
            ranges::LIGHT_ABSORPTION_TOWARD_SUN.clamp(self.light_absorption_toward_sun);
        self.light_absorption_through_cloud =
            ranges::LIGHT_ABSORPTION_THROUGH_CLOUD.clamp(self.light_absorption_through_cloud);
        self.mie_anisotropy = ranges::MIE_ANISOTROPY.clamp(self.mie_anisotropy);
        self.light_step_count = clamp_count(ranges::LIGHT_STEP_COUNT, self.light_step_count);
        self.weather_map_scale = ranges::WEATHER_MAP_SCALE.clamp(self.weather_map_scale);
        self.edge_fade_distance = ranges::EDGE_FADE_DISTANCE.clamp(self.edge_fade_distance);
        self.shape_noise_weight = ranges::SHAPE_NOISE_WEIGHT.clamp(self.shape_noise_weight);
        self.density_offset = ranges::DENSITY_OFFSET.clamp(self.density_offset);
        self.density_multiplier = ranges::DENSITY_MULTIPLIER.clamp(self.density_multiplier);
        self.base_noise_scale = ranges::BASE_NOISE_SCALE.clamp(self.base_noise_scale);
        self.base_noise_strength = ranges::BASE_NOISE_STRENGTH.clamp(self.base_noise_strength);
        self.detail_noise_scale = ranges::DETAIL_NOISE_SCALE.clamp(self.detail_noise_scale);
        self.detail_shape_exponent =
            ranges::DETAIL_SHAPE_EXPONENT.clamp(self.detail_shape_exponent);
        self.detail_noise_weight = ranges::DETAIL_NOISE_WEIGHT.clamp(self.detail_noise_weight);
        self.blue_noise_scale = ranges::BLUE_NOISE_SCALE.clamp(self.blue_noise_scale);
        self.blue_noise_strength = ranges::BLUE_NOISE_STRENGTH.clamp(self.blue_noise_strength);
        self.touch();
        self
    }

    /// Stamp of the last write. Stamps come from a process-wide counter, so
    /// two settings values with the same revision hold the same data.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.revision = NEXT_REVISION.fetch_add(1, Ordering::Relaxed);
    }

    /// Axis-aligned bounds of the cloud volume as (min, max).
    pub fn bounds(&self) -> (Vector3<f32>, Vector3<f32>) {
        let half = self.size * 0.5;
        (self.center - half, self.center + half)
    }

    plain_value!(enabled, set_enabled, bool);
    plain_value!(center, set_center, Vector3<f32>);

    pub fn size(&self) -> Vector3<f32> {
        self.size
    }

    /// Negative components are clamped to zero.
    pub fn set_size(&mut self, size: Vector3<f32>) {
        self.size = clamp_non_negative3(size);
        self.touch();
    }

    pub fn step_count(&self) -> f32 {
        self.step_count
    }

    pub fn set_step_count(&mut self, value: f32) {
        self.step_count = clamp_count(ranges::STEP_COUNT, value);
        self.touch();
    }

    clamped_f32!(
        light_absorption_toward_sun,
        set_light_absorption_toward_sun,
        ranges::LIGHT_ABSORPTION_TOWARD_SUN
    );
    clamped_f32!(
        light_absorption_through_cloud,
        set_light_absorption_through_cloud,
        ranges::LIGHT_ABSORPTION_THROUGH_CLOUD
    );
    plain_value!(color_a, set_color_a, [f32; 4]);
    plain_value!(color_b, set_color_b, [f32; 4]);
    clamped_f32!(
        /// Henyey-Greenstein `g` for the Mie lobe.
        mie_anisotropy,
        set_mie_anisotropy,
        ranges::MIE_ANISOTROPY
    );

    pub fn light_step_count(&self) -> f32 {
        self.light_step_count
    }

    pub fn set_light_step_count(&mut self, value: f32) {
        self.light_step_count = clamp_count(ranges::LIGHT_STEP_COUNT, value);
        self.touch();
    }

    plain_value!(weather_map, set_weather_map, Option<TextureHandle>);
    clamped_f32!(weather_map_scale, set_weather_map_scale, ranges::WEATHER_MAP_SCALE);
    plain_value!(weather_map_speed, set_weather_map_speed, Vector2<f32>);
    clamped_f32!(edge_fade_distance, set_edge_fade_distance, ranges::EDGE_FADE_DISTANCE);
    clamped_f32!(shape_noise_weight, set_shape_noise_weight, ranges::SHAPE_NOISE_WEIGHT);
    clamped_f32!(density_offset, set_density_offset, ranges::DENSITY_OFFSET);
    clamped_f32!(density_multiplier, set_density_multiplier, ranges::DENSITY_MULTIPLIER);

    plain_value!(base_noise, set_base_noise, Option<TextureHandle>);
    clamped_f32!(base_noise_scale, set_base_noise_scale, ranges::BASE_NOISE_SCALE);
    clamped_f32!(base_noise_strength, set_base_noise_strength, ranges::BASE_NOISE_STRENGTH);
    plain_value!(base_noise_speed, set_base_noise_speed, Vector3<f32>);

    plain_value!(detail_noise, set_detail_noise, Option<TextureHandle>);
    clamped_f32!(detail_noise_scale, set_detail_noise_scale, ranges::DETAIL_NOISE_SCALE);
    plain_value!(detail_noise_speed, set_detail_noise_speed, Vector3<f32>);
    clamped_f32!(
        detail_shape_exponent,
        set_detail_shape_exponent,
        ranges::DETAIL_SHAPE_EXPONENT
    );
    clamped_f32!(detail_noise_weight, set_detail_noise_weight, ranges::DETAIL_NOISE_WEIGHT);

    clamped_f32!(blue_noise_scale, set_blue_noise_scale, ranges::BLUE_NOISE_SCALE);
    clamped_f32!(blue_noise_strength, set_blue_noise_strength, ranges::BLUE_NOISE_STRENGTH);

    plain_value!(downsample, set_downsample, Downsample);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uniforms::TextureId;

    #[test]
    fn out_of_range_writes_land_on_nearest_bound() {
        let mut s = CloudSettings::default();

        s.set_step_count(100.0);
        assert_eq!(s.step_count(), 32.0);
        s.set_step_count(-3.0);
        assert_eq!(s.step_count(), 0.0);

        s.set_light_absorption_toward_sun(25.0);
        assert_eq!(s.light_absorption_toward_sun(), 20.0);
        s.set_light_absorption_through_cloud(-1.0);
        assert_eq!(s.light_absorption_through_cloud(), 0.0);

        s.set_density_offset(-4.0);
        assert_eq!(s.density_offset(), -1.0);
        s.set_density_offset(4.0);
        assert_eq!(s.density_offset(), 1.0);

        s.set_base_noise_strength(0.5);
        assert_eq!(s.base_noise_strength(), 0.1);
        s.set_detail_noise_scale(1.0);
        assert_eq!(s.detail_noise_scale(), 0.5);
        s.set_blue_noise_strength(11.0);
        assert_eq!(s.blue_noise_strength(), 10.0);

        // one-sided ranges have no upper bound
        s.set_edge_fade_distance(1.0e6);
        assert_eq!(s.edge_fade_distance(), 1.0e6);
        s.set_edge_fade_distance(-0.5);
        assert_eq!(s.edge_fade_distance(), 0.0);
    }

    #[test]
    fn clamping_is_idempotent() {
        let mut s = CloudSettings::default();
        s.set_mie_anisotropy(3.0);
        let once = s.mie_anisotropy();
        s.set_mie_anisotropy(once);
        assert_eq!(s.mie_anisotropy(), once);

        for v in [-10.0_f32, -1.0, 0.0, 0.3, 1.0, 7.5, 1.0e9] {
            let r = ranges::SHAPE_NOISE_WEIGHT;
            assert_eq!(r.clamp(r.clamp(v)), r.clamp(v));
        }
    }

    #[test]
    fn nan_clamps_to_lower_bound() {
        let mut s = CloudSettings::default();
        s.set_density_multiplier(f32::NAN);
        assert_eq!(s.density_multiplier(), 0.0);
        s.set_density_offset(f32::NAN);
        assert_eq!(s.density_offset(), -1.0);
    }

    #[test]
    fn step_counts_are_whole_numbers() {
        let mut s = CloudSettings::default();
        s.set_step_count(12.6);
        assert_eq!(s.step_count(), 13.0);
        s.set_light_step_count(40.0);
        assert_eq!(s.light_step_count(), 16.0);
    }

    #[test]
    fn size_clamps_per_component_but_center_may_be_negative() {
        let mut s = CloudSettings::default();
        s.set_size(Vector3::new(-2.0, 4.0, -0.0));
        assert_eq!(s.size(), Vector3::new(0.0, 4.0, 0.0));

        s.set_center(Vector3::new(-10.0, -20.0, 5.0));
        assert_eq!(s.center(), Vector3::new(-10.0, -20.0, 5.0));
    }

    #[test]
    fn bounds_are_center_plus_minus_half_size() {
        let mut s = CloudSettings::default();
        s.set_center(Vector3::new(10.0, 50.0, -4.0));
        s.set_size(Vector3::new(20.0, 8.0, 2.0));
        let (min, max) = s.bounds();
        assert_eq!(min, Vector3::new(0.0, 46.0, -5.0));
        assert_eq!(max, Vector3::new(20.0, 54.0, -3.0));
    }

    #[test]
    fn every_write_bumps_revision() {
        let mut s = CloudSettings::default();
        let r0 = s.revision();
        s.set_blue_noise_scale(2.0);
        let r1 = s.revision();
        assert!(r1 > r0);
        s.set_weather_map(Some(TextureHandle::new_2d(TextureId(3), 64, 64)));
        assert!(s.revision() > r1);
    }

    #[test]
    fn downsample_snaps_to_allowed_set() {
        assert_eq!(Downsample::from_factor(0), Downsample::X1);
        assert_eq!(Downsample::from_factor(3), Downsample::X2);
        assert_eq!(Downsample::from_factor(4), Downsample::X4);
        assert_eq!(Downsample::from_factor(31), Downsample::X16);
        assert_eq!(Downsample::from_factor(1000), Downsample::X32);
        for d in Downsample::ALL {
            assert_eq!(Downsample::from_factor(d.factor()), d);
        }
    }

    #[test]
    fn toml_values_are_clamped_on_load() {
        let s = CloudSettings::from_toml_str(
            r#"
            step_count = 64.0
            density_multiplier = -2.0
            downsample = 6
            size = { x = -1.0, y = 2.0, z = 3.0 }
            "#,
        )
        .unwrap();

        assert_eq!(s.step_count(), 32.0);
        assert_eq!(s.density_multiplier(), 0.0);
        assert_eq!(s.downsample(), Downsample::X4);
        assert_eq!(s.size(), Vector3::new(0.0, 2.0, 3.0));
        // untouched fields keep their defaults
        assert_eq!(s.blue_noise_scale(), CloudSettings::default().blue_noise_scale());
        assert!(s.weather_map().is_none());
    }

    #[test]
    fn every_setter_clamps_to_its_range() {
        type Setter = fn(&mut CloudSettings, f32);
        type Getter = fn(&CloudSettings) -> f32;
        let cases: [(&str, Setter, Getter, ParamRange); 17] = [
            ("step_count", CloudSettings::set_step_count, CloudSettings::step_count, ranges::STEP_COUNT),
            (
                "light_absorption_toward_sun",
                CloudSettings::set_light_absorption_toward_sun,
                CloudSettings::light_absorption_toward_sun,
                ranges::LIGHT_ABSORPTION_TOWARD_SUN,
            ),
            (
                "light_absorption_through_cloud",
                CloudSettings::set_light_absorption_through_cloud,
                CloudSettings::light_absorption_through_cloud,
                ranges::LIGHT_ABSORPTION_THROUGH_CLOUD,
            ),
            ("mie_anisotropy", CloudSettings::set_mie_anisotropy, CloudSettings::mie_anisotropy, ranges::MIE_ANISOTROPY),
            (
                "light_step_count",
                CloudSettings::set_light_step_count,
                CloudSettings::light_step_count,
                ranges::LIGHT_STEP_COUNT,
            ),
            (
                "weather_map_scale",
                CloudSettings::set_weather_map_scale,
                CloudSettings::weather_map_scale,
                ranges::WEATHER_MAP_SCALE,
            ),
            (
                "edge_fade_distance",
                CloudSettings::set_edge_fade_distance,
                CloudSettings::edge_fade_distance,
                ranges::EDGE_FADE_DISTANCE,
            ),
            (
                "shape_noise_weight",
                CloudSettings::set_shape_noise_weight,
                CloudSettings::shape_noise_weight,
                ranges::SHAPE_NOISE_WEIGHT,
            ),
            ("density_offset", CloudSettings::set_density_offset, CloudSettings::density_offset, ranges::DENSITY_OFFSET),
            (
                "density_multiplier",
                CloudSettings::set_density_multiplier,
                CloudSettings::density_multiplier,
                ranges::DENSITY_MULTIPLIER,
            ),
            (
                "base_noise_scale",
                CloudSettings::set_base_noise_scale,
                CloudSettings::base_noise_scale,
                ranges::BASE_NOISE_SCALE,
            ),
            (
                "base_noise_strength",
                CloudSettings::set_base_noise_strength,
                CloudSettings::base_noise_strength,
                ranges::BASE_NOISE_STRENGTH,
            ),
            (
                "detail_noise_scale",
                CloudSettings::set_detail_noise_scale,
                CloudSettings::detail_noise_scale,
                ranges::DETAIL_NOISE_SCALE,
            ),
            (
                "detail_shape_exponent",
                CloudSettings::set_detail_shape_exponent,
                CloudSettings::detail_shape_exponent,
                ranges::DETAIL_SHAPE_EXPONENT,
            ),
            (
                "detail_noise_weight",
                CloudSettings::set_detail_noise_weight,
                CloudSettings::detail_noise_weight,
                ranges::DETAIL_NOISE_WEIGHT,
            ),
            (
                "blue_noise_scale",
                CloudSettings::set_blue_noise_scale,
                CloudSettings::blue_noise_scale,
                ranges::BLUE_NOISE_SCALE,
            ),
            (
                "blue_noise_strength",
                CloudSettings::set_blue_noise_strength,
                CloudSettings::blue_noise_strength,
                ranges::BLUE_NOISE_STRENGTH,
            ),
        ];

        for (name, set, get, range) in cases {
            let mut s = CloudSettings::default();

            set(&mut s, range.min - 1.0);
            assert_eq!(get(&s), range.min, "{} below range", name);

            set(&mut s, f32::NAN);
            assert_eq!(get(&s), range.min, "{} NaN", name);

            if range.max.is_finite() {
                set(&mut s, range.max + 1.0);
                assert_eq!(get(&s), range.max, "{} above range", name);
                set(&mut s, range.max);
                assert_eq!(get(&s), range.max, "{} at bound", name);
            } else {
                set(&mut s, 1.0e6);
                assert_eq!(get(&s), 1.0e6, "{} has no upper bound", name);
            }
        }
    }

    #[test]
    fn plain_deserialize_clamps_and_stamps() {
        let a: CloudSettings = toml::from_str("step_count = 100.0\nmie_anisotropy = -2.0").unwrap();
        assert_eq!(a.step_count(), 32.0);
        assert_eq!(a.mie_anisotropy(), 0.0);
        assert_ne!(a.revision(), 0);

        let b: CloudSettings = toml::from_str("step_count = 5.0").unwrap();
        assert_eq!(b.step_count(), 5.0);
        assert_ne!(b.revision(), a.revision());
        assert_ne!(b.revision(), CloudSettings::default().revision());
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let err = CloudSettings::from_toml_str("step_count = \"many\"").unwrap_err();
        assert!(matches!(err, CloudsError::ConfigParse(_)));
    }
}
