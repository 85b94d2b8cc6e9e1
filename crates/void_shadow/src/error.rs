//! Shadow renderer error types

use thiserror::Error;

use crate::framebuffer::FramebufferStatus;
use crate::shadow::LightId;

/// Failures that happen while binding a render target for a pass.
///
/// These are recoverable: the renderer skips the target for the current
/// frame and keeps going.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindingError {
    #[error("layer {layer} out of range for texture with {layer_count} layer(s)")]
    LayerOutOfRange { layer: u32, layer_count: u32 },

    #[error("framebuffer '{label}' is incomplete: {status:?}")]
    IncompleteFramebuffer {
        label: String,
        status: FramebufferStatus,
    },

    #[error("material '{0}' has no compiled shader program")]
    MaterialNotReady(String),

    #[error("render target {0} is disabled")]
    TargetDisabled(String),
}

/// Shadow renderer errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Binding error: {0}")]
    Binding(#[from] BindingError),

    #[error("Render target {target} is already rendering")]
    Reentrancy { target: String },

    #[error("Render target {active} is still active, cannot begin {requested}")]
    ContextBusy { active: String, requested: String },

    #[error("Render target {target} is not rendering")]
    NotRendering { target: String },

    #[error("Fatal resource error: {0}")]
    FatalResource(String),

    #[error("Shadow atlas is full ({layer_count} layers)")]
    AtlasFull { layer_count: u32 },

    #[error("Unknown shadow light {0}")]
    UnknownLight(LightId),
}

impl RenderError {
    /// Whether the renderer may skip the failing target and continue the frame
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Binding(_))
    }

    /// Whether the current frame has to be abandoned
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalResource(_))
    }
}

/// Result type for shadow renderer operations
pub type RenderResult<T> = Result<T, RenderError>;
