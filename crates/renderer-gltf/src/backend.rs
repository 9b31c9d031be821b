//! The renderer the decoded scene is handed to.
//!
//! The loader never draws anything. It only asks the backend to take
//! ownership of raw vertex/index bytes and pixel data, and keeps the
//! returned opaque handles inside the scene descriptors.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Mutex, PoisonError,
};

use gltf::texture::{MagFilter, MinFilter, WrappingMode};

use crate::texture::ColorEncoding;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    Index,
    Vertex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba8,
}

#[derive(Debug, Clone)]
pub struct TextureDescriptor<'a> {
    pub width: u32,
    pub height: u32,
    pub data: &'a [u8],
    pub format: PixelFormat,
    pub encoding: ColorEncoding,
    pub wrap_s: WrappingMode,
    pub wrap_t: WrappingMode,
    pub min_filter: MinFilter,
    pub mag_filter: MagFilter,
    pub flip_y: bool,
}

pub trait RenderBackend: Send + Sync {
    fn create_buffer(&self, usage: BufferUsage, data: &[u8]) -> BufferHandle;

    fn create_texture(&self, descriptor: &TextureDescriptor<'_>) -> TextureHandle;

    fn generate_mipmaps(&self, texture: TextureHandle);
}

#[derive(Debug, Clone)]
pub struct BufferRecord {
    pub handle: BufferHandle,
    pub usage: BufferUsage,
    pub length: usize,
}

#[derive(Debug, Clone)]
pub struct TextureRecord {
    pub handle: TextureHandle,
    pub width: u32,
    pub height: u32,
    pub encoding: ColorEncoding,
    pub wrap_s: WrappingMode,
    pub wrap_t: WrappingMode,
    pub min_filter: MinFilter,
    pub mag_filter: MagFilter,
    pub mipmapped: bool,
}

/// Backend without a GPU. Hands out sequential handles and remembers
/// what was uploaded.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_id: AtomicU64,
    buffers: Mutex<Vec<BufferRecord>>,
    textures: Mutex<Vec<TextureRecord>>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn buffers(&self) -> Vec<BufferRecord> {
        self.buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn textures(&self) -> Vec<TextureRecord> {
        self.textures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<TextureRecord> {
        self.textures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|record| record.handle == handle)
            .cloned()
    }
}

impl RenderBackend for HeadlessBackend {
    fn create_buffer(&self, usage: BufferUsage, data: &[u8]) -> BufferHandle {
        let handle = BufferHandle(self.next_id());
        self.buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(BufferRecord {
                handle,
                usage,
                length: data.len(),
            });
        handle
    }

    fn create_texture(&self, descriptor: &TextureDescriptor<'_>) -> TextureHandle {
        let handle = TextureHandle(self.next_id());
        self.textures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(TextureRecord {
                handle,
                width: descriptor.width,
                height: descriptor.height,
                encoding: descriptor.encoding,
                wrap_s: descriptor.wrap_s,
                wrap_t: descriptor.wrap_t,
                min_filter: descriptor.min_filter,
                mag_filter: descriptor.mag_filter,
                mipmapped: false,
            });
        handle
    }

    fn generate_mipmaps(&self, texture: TextureHandle) {
        let mut textures = self.textures.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = textures.iter_mut().find(|record| record.handle == texture) {
            record.mipmapped = true;
        }
    }
}
