//! # void_shadow - Shadow Map Render Targets
//!
//! Shadow mapping for the Void engine:
//! - Render targets that draw into textures through off-screen framebuffers
//! - Shadow maps that render one light's depth into a layer of a shared
//!   texture array
//! - A renderer that runs the shadow pass and hands the result to lighting
//!
//! ## Architecture
//!
//! 1. **Resources**: [`RenderTexture`] and [`FrameBuffer`] over a
//!    [`GraphicsBackend`]
//! 2. **Targets**: the [`RenderTarget`] trait with its bind / begin / end
//!    protocol, and the [`ShadowMap`] variant
//! 3. **Driver**: [`Renderer`] owning the context, materials, atlas and maps
//!
//! ## Example
//!
//! ```ignore
//! use void_shadow::prelude::*;
//!
//! let mut renderer = Renderer::new(HeadlessBackend::new(), ShadowConfig::default())?;
//! let depth = renderer.materials_mut().insert(ShaderData::shadow_depth(
//!     ShaderProgram::new("shadow_depth", ProgramId(1)),
//!     &LightShadowSettings::directional(),
//! ));
//!
//! renderer.add_shadow_light(1, depth, LightShadowSettings::directional())?;
//! renderer.update_light(1, Camera::directional_light(Vec3::NEG_Y, Vec3::ZERO, 50.0))?;
//!
//! let report = renderer.render_shadow_pass(&casters)?;
//! for (light, err) in &report.skipped {
//!     log::warn!("light {} skipped: {}", light, err);
//! }
//! ```

pub mod backend;
pub mod debug;
pub mod error;
pub mod framebuffer;
pub mod material;
pub mod renderer;
pub mod resource;
pub mod shadow;
pub mod target;
pub mod texture;

pub use backend::{BackendCommand, CommandRecorder, DrawCall, GraphicsBackend, HeadlessBackend};
pub use error::{BindingError, RenderError, RenderResult};
pub use framebuffer::{FrameBuffer, FramebufferStatus};
pub use material::{MaterialHandle, MaterialLibrary, ShaderData, ShaderProgram, UniformValue};
pub use renderer::{Renderer, ShadowCaster, ShadowPassReport, ShadowStats};
pub use shadow::{LightId, ShadowMap};
pub use target::{Camera, RenderContext, RenderTarget, RenderTargetKind, TargetState, TextureTarget};
pub use texture::{RenderTexture, SharedTexture};

/// Prelude - commonly used types
pub mod prelude {
    pub use crate::backend::{GraphicsBackend, HeadlessBackend};
    pub use crate::debug::{install_crash_hook, print_stack_trace, DEFAULT_MAX_FRAMES};
    pub use crate::error::{BindingError, RenderError, RenderResult};
    pub use crate::material::{MaterialHandle, MaterialLibrary, ShaderData, ShaderProgram};
    pub use crate::renderer::{Renderer, ShadowCaster, ShadowPassReport};
    pub use crate::resource::{MeshId, ProgramId, TextureFormat, Viewport};
    pub use crate::shadow::{
        LightId, LightShadowSettings, ShadowConfig, ShadowMap, ShadowQuality, ShadowUpdateMode,
    };
    pub use crate::target::{Camera, RenderContext, RenderTarget, TextureTarget};
    pub use crate::texture::{RenderTexture, SharedTexture};
    pub use glam::{Mat4, Vec3};
}
