use crate::error::{CloudsError, Result};
use crate::uniforms::{TextureHandle, TextureId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Bytes before the voxel payload in the `.bin` noise cubes.
pub const NOISE_CUBE_HEADER: usize = 20;

const FALLBACK_NOISE_TILES: u32 = 4;
const FALLBACK_NOISE_SIZE: u32 = 64;

struct RegisteredTexture {
    // keeps the GPU allocation alive for the view
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// Owns every texture the clouds can reference and hands out
/// [`TextureHandle`]s for them.
pub struct TextureRegistry {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    textures: HashMap<TextureId, RegisteredTexture>,
    next_id: u32,
}

impl TextureRegistry {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            textures: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn view(&self, id: TextureId) -> Option<&wgpu::TextureView> {
        self.textures.get(&id).map(|t| &t.view)
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    fn register(
        &mut self,
        texture: wgpu::Texture,
        handle_for: impl FnOnce(TextureId) -> TextureHandle,
    ) -> TextureHandle {
        let id = TextureId(self.next_id);
        self.next_id += 1;
        let handle = handle_for(id);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.textures.insert(
            id,
            RegisteredTexture {
                _texture: texture,
                view,
            },
        );
        handle
    }

    /// Upload tightly packed RGBA8 pixels as a linear 2D texture.
    pub fn upload_rgba8(&mut self, label: &str, width: u32, height: u32, pixels: &[u8]) -> Result<TextureHandle> {
        let expected = 4 * width as usize * height as usize;
        if width == 0 || height == 0 || pixels.len() != expected {
            return Err(CloudsError::invalid_texture(format!(
                "{}: {}x{} needs {} bytes, got {}",
                label,
                width,
                height,
                expected,
                pixels.len()
            )));
        }

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            // data textures, not colour
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );

        Ok(self.register(texture, |id| TextureHandle::new_2d(id, width, height)))
    }

    /// Single-channel cube of `size`^3 voxels.
    pub fn upload_r8_cube(&mut self, label: &str, size: u32, voxels: &[u8]) -> Result<TextureHandle> {
        let expected = (size as usize).pow(3);
        if size == 0 || voxels.len() != expected {
            return Err(CloudsError::invalid_texture(format!(
                "{}: {}^3 cube needs {} bytes, got {}",
                label,
                size,
                expected,
                voxels.len()
            )));
        }

        let extent = wgpu::Extent3d {
            width: size,
            height: size,
            depth_or_array_layers: size,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D3,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            voxels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(size),
                rows_per_image: Some(size),
            },
            extent,
        );

        Ok(self.register(texture, |id| TextureHandle::new_3d(id, size, size, size)))
    }

    pub fn load_png(&mut self, path: impl AsRef<Path>) -> Result<TextureHandle> {
        let path = path.as_ref();
        let img = image::open(path)
            .map_err(|source| CloudsError::Image {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgba8();
        let (width, height) = img.dimensions();
        debug!("Loaded {} ({}x{})", path.display(), width, height);
        self.upload_rgba8(&path.display().to_string(), width, height, img.as_raw())
    }

    /// Raw R8 noise cube: a fixed header followed by `size`^3 bytes.
    pub fn load_noise_cube(&mut self, path: impl AsRef<Path>, size: u32) -> Result<TextureHandle> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| CloudsError::io(path, e))?;
        let voxels = noise_cube_payload(&bytes, size).ok_or_else(|| {
            CloudsError::invalid_texture(format!(
                "{} is too short for a {}^3 noise cube ({} bytes)",
                path.display(),
                size,
                bytes.len()
            ))
        })?;
        self.upload_r8_cube(&path.display().to_string(), size, voxels)
    }

    /// Every PNG in `dir`, sorted by file name. A missing directory yields
    /// generated white-noise tiles so the effect still has dithering input.
    pub fn load_blue_noise_dir(&mut self, dir: impl AsRef<Path>) -> Result<Vec<TextureHandle>> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            warn!(
                "Blue noise directory {} not found, using generated white noise",
                dir.display()
            );
            return self.white_noise_tiles(FALLBACK_NOISE_TILES, FALLBACK_NOISE_SIZE);
        }

        let files = png_files(dir)?;
        if files.is_empty() {
            warn!(
                "No PNGs in {}, using generated white noise",
                dir.display()
            );
            return self.white_noise_tiles(FALLBACK_NOISE_TILES, FALLBACK_NOISE_SIZE);
        }

        let handles = files
            .iter()
            .map(|path| self.load_png(path))
            .collect::<Result<Vec<_>>>()?;
        info!("Loaded {} blue noise textures from {}", handles.len(), dir.display());
        Ok(handles)
    }

    pub fn white_noise_tiles(&mut self, count: u32, size: u32) -> Result<Vec<TextureHandle>> {
        (0..count)
            .map(|seed| {
                let pixels = white_noise_rgba(size, seed);
                self.upload_rgba8(&format!("White Noise {}", seed), size, size, &pixels)
            })
            .collect()
    }

    /// 1x1 texture of a single colour, for bindings with nothing to show.
    pub fn solid_2d(&mut self, label: &str, rgba: [u8; 4]) -> Result<TextureHandle> {
        self.upload_rgba8(label, 1, 1, &rgba)
    }

    /// 1x1x1 cube, for 3D bindings with nothing to show.
    pub fn solid_3d(&mut self, label: &str, value: u8) -> Result<TextureHandle> {
        self.upload_r8_cube(label, 1, &[value])
    }
}

fn png_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| CloudsError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| CloudsError::io(dir, e))?.path();
        let is_png = path
            .extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("png"))
            .unwrap_or(false);
        if path.is_file() && is_png {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Strip the header from a noise cube file. `None` if it's too short.
pub fn noise_cube_payload(bytes: &[u8], size: u32) -> Option<&[u8]> {
    let len = (size as usize).pow(3);
    bytes.get(NOISE_CUBE_HEADER..NOISE_CUBE_HEADER + len)
}

/// Deterministic per-pixel hash noise in every channel.
pub fn white_noise_rgba(size: u32, seed: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(4 * (size * size) as usize);
    for i in 0..size * size {
        let h = hash(i ^ seed.wrapping_mul(0x9E37_79B9));
        pixels.extend_from_slice(&[h as u8, (h >> 8) as u8, (h >> 16) as u8, 255]);
    }
    pixels
}

// lowbias32
fn hash(mut x: u32) -> u32 {
    x ^= x >> 16;
    x = x.wrapping_mul(0x7feb_352d);
    x ^= x >> 15;
    x = x.wrapping_mul(0x846c_a68b);
    x ^= x >> 16;
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_payload_skips_header() {
        let mut bytes = vec![0xAA; NOISE_CUBE_HEADER];
        bytes.extend((0..8u8).collect::<Vec<_>>());
        bytes.push(0xFF);
        assert_eq!(noise_cube_payload(&bytes, 2), Some(&[0, 1, 2, 3, 4, 5, 6, 7][..]));
        assert_eq!(noise_cube_payload(&bytes, 3), None);
    }

    #[test]
    fn white_noise_tiles_differ_by_seed() {
        let a = white_noise_rgba(8, 0);
        let b = white_noise_rgba(8, 1);
        assert_eq!(a.len(), 8 * 8 * 4);
        assert_ne!(a, b);
        assert_eq!(a, white_noise_rgba(8, 0));
        assert!(a.chunks(4).all(|p| p[3] == 255));
    }
}
