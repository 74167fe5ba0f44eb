use crate::error::{CloudsError, Result};
use crate::settings::CloudSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_CONFIG_FILE: &str = "clouds.toml";

/// Where the viewer finds its shaders and noise textures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    pub shader_dir: PathBuf,
    pub blue_noise_dir: PathBuf,
    pub weather_map: Option<PathBuf>,
    pub base_noise: Option<PathBuf>,
    pub detail_noise: Option<PathBuf>,
    /// Edge length of the `.bin` noise cubes
    pub noise_cube_size: u32,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            shader_dir: PathBuf::from("src/shaders"),
            blue_noise_dir: PathBuf::from("assets/blue_noise"),
            weather_map: None,
            base_noise: None,
            detail_noise: None,
            noise_cube_size: 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub clouds: CloudSettings,
    pub assets: AssetConfig,
}

impl ViewerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| CloudsError::io(path, e))?;
        Self::from_toml_str(&content)
    }

    /// Like [`ViewerConfig::load`], but a missing file gives the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let config = Self::load(path)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }
}
