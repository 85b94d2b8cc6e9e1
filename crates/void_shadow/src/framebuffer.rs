//! Off-screen framebuffers
//!
//! A [`FrameBuffer`] is the GPU object bound while a render target draws. It
//! attaches a [`RenderTexture`] as depth attachment (or color attachment for
//! color formats) and can select a single layer of a layered texture at bind
//! time.

use crate::backend::{FramebufferDesc, GraphicsBackend};
use crate::error::{BindingError, RenderError, RenderResult};
use crate::resource::{FramebufferId, TextureId};
use crate::texture::RenderTexture;

/// Framebuffer completeness
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    /// An attachment exists but cannot be rendered to
    IncompleteAttachment,
    /// No attachment at all
    MissingAttachment,
    /// Attachment combination rejected by the driver
    Unsupported,
}

impl FramebufferStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// Framebuffer object owned by a render target
#[derive(Debug)]
pub struct FrameBuffer {
    label: String,
    gpu: Option<FramebufferId>,
    attachment: Option<TextureId>,
}

impl FrameBuffer {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            gpu: None,
            attachment: None,
        }
    }

    /// Create the GPU framebuffer around an allocated texture
    pub fn allocate(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        texture: &RenderTexture,
    ) -> RenderResult<()> {
        let texture_id = texture.gpu_id().ok_or_else(|| {
            RenderError::FatalResource(format!(
                "framebuffer '{}' needs texture '{}' to be allocated first",
                self.label,
                texture.label()
            ))
        })?;

        if let Some(id) = self.gpu {
            if self.attachment == Some(texture_id) {
                return Ok(());
            }
            backend.destroy_framebuffer(id);
            self.gpu = None;
        }

        let (depth_attachment, color_attachment) = if texture.format().is_depth() {
            (Some(texture_id), None)
        } else {
            (None, Some(texture_id))
        };

        let id = backend
            .create_framebuffer(&FramebufferDesc {
                label: self.label.clone(),
                depth_attachment,
                color_attachment,
            })
            .map_err(|e| match e {
                RenderError::FatalResource(_) => e,
                other => RenderError::FatalResource(other.to_string()),
            })?;

        self.gpu = Some(id);
        self.attachment = Some(texture_id);
        Ok(())
    }

    pub fn release(&mut self, backend: &mut dyn GraphicsBackend) {
        if let Some(id) = self.gpu.take() {
            backend.destroy_framebuffer(id);
        }
        self.attachment = None;
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_allocated(&self) -> bool {
        self.gpu.is_some()
    }

    pub fn gpu_id(&self) -> Option<FramebufferId> {
        self.gpu
    }

    /// Completeness as reported by the backend
    pub fn status(&self, backend: &dyn GraphicsBackend) -> FramebufferStatus {
        match self.gpu {
            Some(id) => backend.framebuffer_status(id),
            None => FramebufferStatus::MissingAttachment,
        }
    }

    /// Check the framebuffer can be bound, without binding it
    pub fn validate(&self, backend: &dyn GraphicsBackend) -> RenderResult<FramebufferId> {
        let id = self.gpu.ok_or_else(|| {
            RenderError::FatalResource(format!("framebuffer '{}' was never allocated", self.label))
        })?;

        let status = backend.framebuffer_status(id);
        if !status.is_complete() {
            return Err(BindingError::IncompleteFramebuffer {
                label: self.label.clone(),
                status,
            }
            .into());
        }
        Ok(id)
    }

    /// Bind for drawing, optionally at a single layer
    pub fn bind(&self, backend: &mut dyn GraphicsBackend, layer: Option<u32>) -> RenderResult<()> {
        let id = self.validate(backend)?;
        backend.bind_framebuffer(id, layer)?;
        log::trace!("Bound framebuffer '{}' layer {:?}", self.label, layer);
        Ok(())
    }

    pub fn unbind(&self, backend: &mut dyn GraphicsBackend) {
        backend.unbind_framebuffer();
    }
}
