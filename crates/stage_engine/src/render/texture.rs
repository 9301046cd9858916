//! Texture handles with per-use UV offsets

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use image::RgbaImage;

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identity of a texture handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(u64);

/// Decoded pixels plus the sampling state owned by one material
///
/// Cloning gives a new handle (new id, own offset) over the same pixels.
#[derive(Debug)]
pub struct Texture {
    id: TextureId,
    image: Arc<RgbaImage>,
    /// UV offset applied when sampling
    pub offset: [f32; 2],
}

impl Texture {
    /// Wrap decoded pixels in a fresh handle
    pub fn new(image: Arc<RgbaImage>) -> Self {
        Self {
            id: TextureId(NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed)),
            image,
            offset: [0.0, 0.0],
        }
    }

    /// Unique identity
    pub fn id(&self) -> TextureId {
        self.id
    }

    /// Shared pixel data
    pub fn image(&self) -> &Arc<RgbaImage> {
        &self.image
    }

    /// Width and height in pixels
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Bytes of pixel data behind this handle
    pub fn byte_size(&self) -> usize {
        self.image.as_raw().len()
    }
}

impl Clone for Texture {
    fn clone(&self) -> Self {
        let mut texture = Texture::new(Arc::clone(&self.image));
        texture.offset = self.offset;
        texture
    }
}
