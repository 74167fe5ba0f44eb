use std::collections::BTreeMap;

/// Opaque id of a texture owned by the host's texture registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    D2,
    D3,
}

/// A texture reference plus the size information the orchestrator needs
/// (blue-noise UV scaling reads width/height).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureHandle {
    pub id: TextureId,
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl TextureHandle {
    pub fn new_2d(id: TextureId, width: u32, height: u32) -> Self {
        Self {
            id,
            kind: TextureKind::D2,
            width,
            height,
            depth: 1,
        }
    }

    pub fn new_3d(id: TextureId, width: u32, height: u32, depth: u32) -> Self {
        Self {
            id,
            kind: TextureKind::D3,
            width,
            height,
            depth,
        }
    }
}

/// Every input the cloud kernel understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Uniform {
    // bounds / raymarch
    BoundsMin,
    BoundsMax,
    StepCount,

    // lighting
    LightAbsorptionTowardSun,
    LightAbsorptionThroughCloud,
    ColorA,
    ColorB,
    MieAnisotropy,
    LightStepCount,

    // shape
    WeatherMap,
    WeatherMapScale,
    WeatherMapSpeed,
    EdgeFadeDistance,
    ShapeNoiseWeight,
    DensityOffset,
    DensityMultiplier,

    // base noise
    BaseNoiseTex,
    BaseNoiseScale,
    BaseNoiseStrength,
    BaseNoiseSpeed,

    // detail noise
    DetailNoiseTex,
    DetailNoiseScale,
    DetailNoiseSpeed,
    DetailShapeExponent,
    DetailNoiseWeight,

    // per-frame
    BlueNoiseTex,
    BlueNoiseCoords,
    BlueNoiseStrength,
    SampleIndex,
}

impl Uniform {
    /// Name used when uniform uploads are traced.
    pub fn name(self) -> &'static str {
        match self {
            Uniform::BoundsMin => "clouds_bounds_min",
            Uniform::BoundsMax => "clouds_bounds_max",
            Uniform::StepCount => "clouds_step_count",
            Uniform::LightAbsorptionTowardSun => "light_absorption_toward_sun",
            Uniform::LightAbsorptionThroughCloud => "light_absorption_through_cloud",
            Uniform::ColorA => "color_a",
            Uniform::ColorB => "color_b",
            Uniform::MieAnisotropy => "mie_anisotropy",
            Uniform::LightStepCount => "light_step_count",
            Uniform::WeatherMap => "weather_map",
            Uniform::WeatherMapScale => "weather_map_scale",
            Uniform::WeatherMapSpeed => "weather_map_speed",
            Uniform::EdgeFadeDistance => "edge_fade_distance",
            Uniform::ShapeNoiseWeight => "shape_noise_weight",
            Uniform::DensityOffset => "density_offset",
            Uniform::DensityMultiplier => "density_multiplier",
            Uniform::BaseNoiseTex => "base_noise_tex",
            Uniform::BaseNoiseScale => "base_noise_scale",
            Uniform::BaseNoiseStrength => "base_noise_strength",
            Uniform::BaseNoiseSpeed => "base_noise_speed",
            Uniform::DetailNoiseTex => "detail_noise_tex",
            Uniform::DetailNoiseScale => "detail_noise_scale",
            Uniform::DetailNoiseSpeed => "detail_noise_speed",
            Uniform::DetailShapeExponent => "detail_shape_exponent",
            Uniform::DetailNoiseWeight => "detail_noise_weight",
            Uniform::BlueNoiseTex => "blue_noise_tex",
            Uniform::BlueNoiseCoords => "blue_noise_coords",
            Uniform::BlueNoiseStrength => "blue_noise_strength",
            Uniform::SampleIndex => "sample_index",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vector([f32; 4]),
    Color([f32; 4]),
    Texture(TextureHandle),
}

/// The kernel's uniform state for one frame, keyed by [`Uniform`].
///
/// Ordered so that two sheets built from the same inputs compare equal and
/// iterate the same way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertySheet {
    values: BTreeMap<Uniform, UniformValue>,
}

impl PropertySheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_float(&mut self, uniform: Uniform, value: f32) {
        self.values.insert(uniform, UniformValue::Float(value));
    }

    pub fn set_int(&mut self, uniform: Uniform, value: i32) {
        self.values.insert(uniform, UniformValue::Int(value));
    }

    pub fn set_vector(&mut self, uniform: Uniform, value: [f32; 4]) {
        self.values.insert(uniform, UniformValue::Vector(value));
    }

    pub fn set_color(&mut self, uniform: Uniform, value: [f32; 4]) {
        self.values.insert(uniform, UniformValue::Color(value));
    }

    pub fn set_texture(&mut self, uniform: Uniform, texture: TextureHandle) {
        self.values.insert(uniform, UniformValue::Texture(texture));
    }

    pub fn get(&self, uniform: Uniform) -> Option<&UniformValue> {
        self.values.get(&uniform)
    }

    pub fn contains(&self, uniform: Uniform) -> bool {
        self.values.contains_key(&uniform)
    }

    pub fn float(&self, uniform: Uniform) -> Option<f32> {
        match self.values.get(&uniform)? {
            UniformValue::Float(v) => Some(*v),
            UniformValue::Int(v) => Some(*v as f32),
            _ => None,
        }
    }

    pub fn int(&self, uniform: Uniform) -> Option<i32> {
        match self.values.get(&uniform)? {
            UniformValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Vectors and colors both come back as four floats.
    pub fn vector(&self, uniform: Uniform) -> Option<[f32; 4]> {
        match self.values.get(&uniform)? {
            UniformValue::Vector(v) | UniformValue::Color(v) => Some(*v),
            _ => None,
        }
    }

    pub fn texture(&self, uniform: Uniform) -> Option<TextureHandle> {
        match self.values.get(&uniform)? {
            UniformValue::Texture(t) => Some(*t),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Uniform, &UniformValue)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_getters_reject_wrong_kind() {
        let mut sheet = PropertySheet::new();
        sheet.set_float(Uniform::StepCount, 16.0);
        sheet.set_int(Uniform::SampleIndex, 3);
        sheet.set_color(Uniform::ColorA, [1.0, 0.5, 0.25, 1.0]);

        assert_eq!(sheet.float(Uniform::StepCount), Some(16.0));
        assert_eq!(sheet.float(Uniform::SampleIndex), Some(3.0));
        assert_eq!(sheet.int(Uniform::StepCount), None);
        assert_eq!(sheet.vector(Uniform::ColorA), Some([1.0, 0.5, 0.25, 1.0]));
        assert_eq!(sheet.texture(Uniform::ColorA), None);
        assert!(!sheet.contains(Uniform::WeatherMap));
    }

    #[test]
    fn uniform_names_are_distinct() {
        let mut sheet = PropertySheet::new();
        for (i, uniform) in [
            Uniform::BoundsMin,
            Uniform::StepCount,
            Uniform::WeatherMap,
            Uniform::BaseNoiseTex,
            Uniform::DetailNoiseTex,
            Uniform::BlueNoiseTex,
            Uniform::SampleIndex,
        ]
        .into_iter()
        .enumerate()
        {
            sheet.set_int(uniform, i as i32);
        }
        let names: std::collections::BTreeSet<_> = sheet.iter().map(|(u, _)| u.name()).collect();
        assert_eq!(names.len(), sheet.len());
        assert!(names.contains("blue_noise_tex"));
        assert!(names.contains("sample_index"));
    }

    #[test]
    fn setting_twice_overwrites() {
        let mut sheet = PropertySheet::new();
        sheet.set_float(Uniform::DensityOffset, 0.1);
        sheet.set_float(Uniform::DensityOffset, -0.2);
        assert_eq!(sheet.len(), 1);
        assert_eq!(sheet.float(Uniform::DensityOffset), Some(-0.2));
    }
}
