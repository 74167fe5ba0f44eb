use crate::error::{CloudsError, Result};
use crate::uniforms::TextureHandle;

/// Fixed set of blue-noise tiles, rotated through one per frame.
///
/// Immutable once built; share it between renderers with an `Arc`.
#[derive(Debug, Clone)]
pub struct BlueNoisePool {
    textures: Vec<TextureHandle>,
}

impl BlueNoisePool {
    pub fn new(textures: Vec<TextureHandle>) -> Result<Self> {
        if textures.is_empty() {
            return Err(CloudsError::EmptyBlueNoisePool);
        }
        Ok(Self { textures })
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        // never true, construction rejects empty pools
        self.textures.is_empty()
    }

    /// Entry at `index`, wrapped into range.
    pub fn get(&self, index: usize) -> TextureHandle {
        self.textures[index % self.textures.len()]
    }

    /// Advance `cursor` and return the entry it now points at.
    pub fn next(&self, cursor: &mut BlueNoiseCursor) -> TextureHandle {
        cursor.advance();
        self.get(cursor.index())
    }

    pub fn cursor(&self) -> BlueNoiseCursor {
        BlueNoiseCursor::new(self.len())
    }
}

/// Round-robin position into a [`BlueNoisePool`]. Lives in the renderer's
/// temporal state, not in the pool, so the pool can stay shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlueNoiseCursor {
    index: usize,
    len: usize,
}

impl BlueNoiseCursor {
    pub fn new(len: usize) -> Self {
        Self {
            index: 0,
            len: len.max(1),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn advance(&mut self) {
        self.index = (self.index + 1) % self.len;
    }
}
