//! Render textures
//!
//! A [`RenderTexture`] owns the GPU image a render target draws into. Shadow
//! maps usually share one layered depth texture, each writing its own layer,
//! so the texture is handed around as a [`SharedTexture`].

use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::GraphicsBackend;
use crate::error::{RenderError, RenderResult};
use crate::resource::{TextureDesc, TextureFormat, TextureId, TextureUsage};

/// Render texture shared between render targets and the renderer
pub type SharedTexture = Arc<RwLock<RenderTexture>>;

/// GPU-sampleable image plus its backend allocation
#[derive(Debug)]
pub struct RenderTexture {
    desc: TextureDesc,
    gpu: Option<TextureId>,
}

impl RenderTexture {
    /// Describe a texture; no GPU memory is allocated until [`Self::allocate`]
    pub fn new(desc: TextureDesc) -> RenderResult<Self> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RenderError::Configuration(format!(
                "texture '{}' has zero size {}x{}",
                desc.label, desc.width, desc.height
            )));
        }
        if desc.layers == 0 {
            return Err(RenderError::Configuration(format!(
                "texture '{}' has no layers",
                desc.label
            )));
        }
        Ok(Self { desc, gpu: None })
    }

    /// Layered depth texture for shadow maps, one layer per light
    pub fn shadow_array(size: u32, layers: u32, format: TextureFormat) -> RenderResult<Self> {
        if !format.is_depth() {
            return Err(RenderError::Configuration(format!(
                "shadow texture needs a depth format, got {:?}",
                format
            )));
        }
        Self::new(TextureDesc {
            label: String::from("shadow map array"),
            width: size,
            height: size,
            layers,
            format,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        })
    }

    /// Wrap into the shared form used by render targets
    pub fn into_shared(self) -> SharedTexture {
        Arc::new(RwLock::new(self))
    }

    /// Allocate the GPU image. Allocating twice is a no-op.
    pub fn allocate(&mut self, backend: &mut dyn GraphicsBackend) -> RenderResult<()> {
        if self.gpu.is_some() {
            return Ok(());
        }

        let id = backend.create_texture(&self.desc).map_err(|e| {
            log::error!("Failed to allocate texture '{}': {}", self.desc.label, e);
            match e {
                RenderError::FatalResource(_) => e,
                other => RenderError::FatalResource(other.to_string()),
            }
        })?;

        log::debug!(
            "Allocated texture '{}' {}x{}x{} ({:?})",
            self.desc.label,
            self.desc.width,
            self.desc.height,
            self.desc.layers,
            self.desc.format
        );
        self.gpu = Some(id);
        Ok(())
    }

    /// Free the GPU image
    pub fn release(&mut self, backend: &mut dyn GraphicsBackend) {
        if let Some(id) = self.gpu.take() {
            backend.destroy_texture(id);
        }
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    pub fn label(&self) -> &str {
        &self.desc.label
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn layer_count(&self) -> u32 {
        self.desc.layers
    }

    /// Whether this is an array texture that targets bind by layer
    pub fn is_layered(&self) -> bool {
        self.desc.layers > 1
    }

    pub fn format(&self) -> TextureFormat {
        self.desc.format
    }

    pub fn is_allocated(&self) -> bool {
        self.gpu.is_some()
    }

    pub fn gpu_id(&self) -> Option<TextureId> {
        self.gpu
    }

    /// Image memory across all layers, in bytes
    pub fn memory_bytes(&self) -> u64 {
        self.desc.width as u64
            * self.desc.height as u64
            * self.desc.layers as u64
            * self.desc.format.bytes_per_pixel() as u64
    }
}
