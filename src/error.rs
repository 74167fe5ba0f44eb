use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while setting up the cloud effect.
///
/// Frame rendering itself never fails; these only come out of construction
/// and asset/config loading.
#[derive(Error, Debug)]
pub enum CloudsError {
    /// The blue-noise pool needs at least one texture
    #[error("Blue-noise pool is empty")]
    EmptyBlueNoisePool,

    /// Reading a config, shader or texture file failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A TOML config file could not be parsed
    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Image decoding failed
    #[error("Failed to decode image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Texture data doesn't match what the loader expected
    #[error("Invalid texture {0}")]
    InvalidTexture(String),

    /// A shader the backend can't run without failed to compile
    #[error("Shader {0} failed to compile")]
    Shader(String),
}

impl CloudsError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_texture(msg: impl Into<String>) -> Self {
        Self::InvalidTexture(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CloudsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = CloudsError::EmptyBlueNoisePool;
        assert!(e.to_string().contains("empty"));

        let e = CloudsError::invalid_texture("noise.bin: expected 32768 bytes, got 12");
        assert!(e.to_string().contains("32768"));
    }

    #[test]
    fn test_error_from_toml() {
        let parse_err = toml::from_str::<toml::Table>("this is = = not toml").unwrap_err();
        let err: CloudsError = parse_err.into();
        assert!(matches!(err, CloudsError::ConfigParse(_)));
    }
}
