//! Shadow Mapping
//!
//! Shadow maps are render targets that draw a light's view of the scene into
//! one layer of a shared depth texture.
//!
//! The module is split into:
//!
//! - **Config**: Global and per-light shadow settings
//! - **Atlas**: Layer allocation in the shared shadow texture
//! - **Map**: The [`ShadowMap`] render target
//! - **Data**: GPU-ready records for main-pass sampling
//!
//! # Usage
//!
//! ```ignore
//! use void_shadow::prelude::*;
//!
//! let mut renderer = Renderer::new(HeadlessBackend::new(), ShadowConfig::default())?;
//!
//! let material = renderer.materials_mut().insert(ShaderData::shadow_depth(
//!     ShaderProgram::new("depth", ProgramId(1)),
//!     &LightShadowSettings::directional(),
//! ));
//! renderer.add_shadow_light(sun_id, material, LightShadowSettings::directional())?;
//! renderer.update_light(sun_id, Camera::directional_light(dir, Vec3::ZERO, 50.0))?;
//!
//! let report = renderer.render_shadow_pass(&casters)?;
//! let bytes = renderer.shadow_buffer().as_bytes();
//! ```

pub mod atlas;
pub mod config;
pub mod data;
pub mod map;

pub use atlas::{AtlasStats, LightId, ShadowAllocation, ShadowAtlas, ShadowAtlasState};
pub use config::{LightShadowSettings, ShadowConfig, ShadowQuality, ShadowUpdateMode};
pub use data::{GpuShadowLight, ShadowBuffer, MAX_SHADOW_LIGHTS};
pub use map::{ShadowMap, NO_LAYER};
