use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use tracing::{debug, error, info, warn};

fn embedded_source(name: &str) -> Option<&'static str> {
    match name {
        "clouds.wgsl" => Some(include_str!("shaders/clouds.wgsl")),
        "blit.wgsl" => Some(include_str!("shaders/blit.wgsl")),
        "gizmo.wgsl" => Some(include_str!("shaders/gizmo.wgsl")),
        "sky.wgsl" => Some(include_str!("shaders/sky.wgsl")),
        _ => None,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Loads WGSL from a directory on disk, falling back to the copies built
/// into the binary, and notices when files change.
pub struct ShaderHotReload {
    device: Arc<wgpu::Device>,
    shader_dir: PathBuf,
    modified: Mutex<HashMap<String, SystemTime>>,
    last_check: Mutex<SystemTime>,
}

impl ShaderHotReload {
    pub fn new(device: Arc<wgpu::Device>, shader_dir: impl AsRef<Path>) -> Self {
        Self {
            device,
            shader_dir: shader_dir.as_ref().to_path_buf(),
            modified: Mutex::new(HashMap::new()),
            last_check: Mutex::new(SystemTime::now()),
        }
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    fn source(&self, name: &str) -> Option<Cow<'static, str>> {
        let path = self.shader_dir.join(name);
        match fs::read_to_string(&path) {
            Ok(source) => {
                let modified = fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .unwrap_or_else(|_| SystemTime::now());
                lock(&self.modified).insert(name.to_string(), modified);
                debug!("Read shader {} from {}", name, path.display());
                Some(Cow::Owned(source))
            }
            Err(e) => {
                debug!(
                    "Couldn't read {}: {}, using embedded source",
                    path.display(),
                    e
                );
                embedded_source(name).map(Cow::Borrowed)
            }
        }
    }

    /// Compile `name`, returning `None` if there is no source for it or the
    /// WGSL fails validation.
    pub fn load(&self, name: &str) -> Option<wgpu::ShaderModule> {
        let Some(source) = self.source(name) else {
            warn!("Unknown shader: {}", name);
            return None;
        };

        let module = validated(&self.device, name, || {
            self.device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(name),
                    source: wgpu::ShaderSource::Wgsl(source),
                })
        });
        if module.is_some() {
            info!("Compiled shader {}", name);
        }
        module
    }

    /// Names of loaded shaders whose files changed since they were read.
    /// Checks at most once per second.
    pub fn check_for_updates(&self) -> Vec<String> {
        let mut last_check = lock(&self.last_check);
        let now = SystemTime::now();
        let mut updated_shaders = Vec::new();

        if now
            .duration_since(*last_check)
            .unwrap_or(Duration::from_secs(0))
            < Duration::from_secs(1)
        {
            return updated_shaders;
        }
        *last_check = now;

        let modified = lock(&self.modified);
        for (name, last_modified) in modified.iter() {
            let path = self.shader_dir.join(name);
            if let Ok(current) = fs::metadata(&path).and_then(|m| m.modified()) {
                if current > *last_modified {
                    updated_shaders.push(name.clone());
                }
            }
        }

        updated_shaders
    }
}

/// Run `create` inside a validation error scope. Any validation error is
/// logged and turns the result into `None`.
pub fn validated<T>(device: &wgpu::Device, label: &str, create: impl FnOnce() -> T) -> Option<T> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = create();
    match pollster::block_on(device.pop_error_scope()) {
        None => Some(value),
        Some(err) => {
            error!("{} failed validation: {}", label, err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_pipeline_shader_is_embedded() {
        for name in ["clouds.wgsl", "blit.wgsl", "gizmo.wgsl", "sky.wgsl"] {
            let source = embedded_source(name).unwrap();
            assert!(source.contains("fn vs_main"), "{} has no vertex entry", name);
        }
        assert!(embedded_source("missing.wgsl").is_none());
    }
}
