//! Shadow map render target
//!
//! A [`ShadowMap`] renders one light's depth pass. On top of the generic
//! render target protocol it selects a layer of the (usually layered) shadow
//! texture and binds the light's shadow material.
//!
//! `begin_rendering` runs every check up front (pass state, context, texture,
//! framebuffer, layer range, material) so a failed begin leaves no GPU state
//! behind and the map stays Idle.

use std::sync::Arc;

use glam::Mat4;

use crate::error::{BindingError, RenderError, RenderResult};
use crate::material::{MaterialHandle, MaterialLibrary, ShaderData, U_LIGHT_VIEW_PROJECTION};
use crate::resource::{ClearValues, CompareFunction, DepthState};
use crate::shadow::LightShadowSettings;
use crate::target::{Camera, RenderContext, RenderTarget, RenderTargetCore, RenderTargetKind};
use crate::texture::SharedTexture;

/// Raw layer index meaning "single-layer texture, bind without a layer"
pub const NO_LAYER: i32 = -1;

/// Render target for one light's shadow pass
#[derive(Debug)]
pub struct ShadowMap {
    core: RenderTargetCore,
    layer_index: Option<u32>,
    material: Arc<ShaderData>,
    settings: Option<LightShadowSettings>,
}

impl ShadowMap {
    /// Create a shadow map drawing into `texture` with `material`.
    ///
    /// Fails with a configuration error if the material has no shader
    /// program. GPU resources are not touched; call [`Self::allocate`] once
    /// the texture is allocated.
    pub fn new(
        label: impl Into<String>,
        material: Arc<ShaderData>,
        texture: SharedTexture,
    ) -> RenderResult<Self> {
        let label = label.into();
        if !material.is_ready() {
            return Err(RenderError::Configuration(format!(
                "shadow map '{}' needs a material with a shader program, '{}' has none",
                label,
                material.name()
            )));
        }

        let mut core = RenderTargetCore::new(label, texture);
        core.set_clear_values(ClearValues::depth_only());
        core.set_depth_state(DepthState {
            compare: CompareFunction::LessEqual,
            ..Default::default()
        });

        Ok(Self {
            core,
            layer_index: None,
            material,
            settings: None,
        })
    }

    /// Create a shadow map from a material owned by a library.
    ///
    /// A null or stale handle is a configuration error.
    pub fn from_library(
        label: impl Into<String>,
        library: &MaterialLibrary,
        handle: MaterialHandle,
        texture: SharedTexture,
    ) -> RenderResult<Self> {
        let label = label.into();
        let material = library.get(handle).cloned().ok_or_else(|| {
            RenderError::Configuration(format!(
                "shadow map '{}' references missing material {:?}",
                label, handle
            ))
        })?;
        Self::new(label, material, texture)
    }

    /// Create the framebuffer around the shadow texture
    pub fn allocate(&mut self, ctx: &mut RenderContext) -> RenderResult<()> {
        self.core.allocate(ctx.backend_mut())
    }

    /// Free the framebuffer
    pub fn release(&mut self, ctx: &mut RenderContext) {
        self.core.release(ctx.backend_mut());
    }

    /// Select the texture layer written by this map.
    ///
    /// Not validated here; `begin_rendering` checks it against the texture.
    pub fn set_layer_index(&mut self, index: u32) {
        self.layer_index = Some(index);
    }

    /// Go back to binding the texture without a layer
    pub fn clear_layer_index(&mut self) {
        self.layer_index = None;
    }

    pub fn layer_index(&self) -> Option<u32> {
        self.layer_index
    }

    /// Layer index in the form shaders expect, [`NO_LAYER`] when unset
    pub fn raw_layer_index(&self) -> i32 {
        self.layer_index.map_or(NO_LAYER, |layer| layer as i32)
    }

    /// Material used for the depth pass
    pub fn shadow_material(&self) -> &Arc<ShaderData> {
        &self.material
    }

    /// Bias and compare settings written into the material on every
    /// `begin_rendering`. Without them the material's uniforms are used as is.
    pub fn set_shadow_settings(&mut self, settings: LightShadowSettings) {
        self.settings = Some(settings);
    }

    pub fn shadow_settings(&self) -> Option<&LightShadowSettings> {
        self.settings.as_ref()
    }

    fn check_material(&self) -> RenderResult<()> {
        if self.material.is_ready() {
            Ok(())
        } else {
            Err(BindingError::MaterialNotReady(self.material.name().to_owned()).into())
        }
    }

    // Materials can be shared between maps; per-light uniforms are rewritten
    // on every bind
    fn bind_material(&self, ctx: &mut RenderContext) -> RenderResult<()> {
        if let Some(settings) = &self.settings {
            self.material.apply_shadow_settings(settings);
        }
        let view_projection = self
            .core
            .camera()
            .map_or(Mat4::IDENTITY, Camera::view_projection);
        self.material
            .set_uniform(U_LIGHT_VIEW_PROJECTION, view_projection);
        self.material.bind(ctx.backend_mut())
    }
}

impl RenderTarget for ShadowMap {
    fn core(&self) -> &RenderTargetCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RenderTargetCore {
        &mut self.core
    }

    fn kind(&self) -> RenderTargetKind {
        RenderTargetKind::Shadow
    }

    /// Generic binding steps at the configured layer
    fn bind(&mut self, ctx: &mut RenderContext) -> RenderResult<()> {
        let layer = self.layer_index;
        self.core.bind_base(ctx, layer)
    }

    fn begin_rendering(&mut self, ctx: &mut RenderContext) -> RenderResult<()> {
        self.core.check_can_begin(ctx)?;
        self.core.check_layer(self.layer_index)?;
        self.check_material()?;

        self.bind(ctx)?;
        if let Err(e) = self.bind_material(ctx) {
            self.core.abort_bind(ctx);
            return Err(e);
        }

        self.core.activate(ctx);
        log::debug!(
            "Shadow pass {} begins at layer {:?} with '{}'",
            self.core.label(),
            self.layer_index,
            self.material.name()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCommand, HeadlessBackend};
    use crate::material::{ShaderProgram, UniformValue, U_DEPTH_BIAS};
    use crate::resource::{ProgramId, TextureFormat};
    use crate::target::TargetState;
    use crate::texture::RenderTexture;
    use glam::Vec3;

    fn material(id: u64) -> Arc<ShaderData> {
        Arc::new(ShaderData::shadow_depth(
            ShaderProgram::new("depth", ProgramId(id)),
            &LightShadowSettings::default(),
        ))
    }

    fn shadow_texture(ctx: &mut RenderContext, layers: u32) -> SharedTexture {
        let mut texture = RenderTexture::shadow_array(512, layers, TextureFormat::Depth32Float).unwrap();
        texture.allocate(ctx.backend_mut()).unwrap();
        texture.into_shared()
    }

    #[test]
    fn test_material_identity() {
        let mut ctx = RenderContext::new(HeadlessBackend::new());
        let m1 = material(1);
        let map = ShadowMap::new("sun", m1.clone(), shadow_texture(&mut ctx, 4)).unwrap();
        assert!(Arc::ptr_eq(map.shadow_material(), &m1));
    }

    #[test]
    fn test_material_without_program_rejected() {
        let mut ctx = RenderContext::new(HeadlessBackend::new());
        let err = ShadowMap::new(
            "sun",
            Arc::new(ShaderData::without_program("missing")),
            shadow_texture(&mut ctx, 1),
        )
        .unwrap_err();
        assert!(matches!(err, RenderError::Configuration(_)));
    }

    #[test]
    fn test_from_library_rejects_stale_handle() {
        let mut ctx = RenderContext::new(HeadlessBackend::new());
        let texture = shadow_texture(&mut ctx, 1);
        let mut library = MaterialLibrary::new();
        let handle = library.insert(ShaderData::new(
            "depth",
            ShaderProgram::new("depth", ProgramId(3)),
        ));

        let map = ShadowMap::from_library("spot", &library, handle, texture.clone()).unwrap();
        assert!(Arc::ptr_eq(map.shadow_material(), library.get(handle).unwrap()));

        library.remove(handle);
        let err = ShadowMap::from_library("spot", &library, handle, texture.clone()).unwrap_err();
        assert!(matches!(err, RenderError::Configuration(_)));

        let err =
            ShadowMap::from_library("spot", &library, MaterialHandle::null(), texture).unwrap_err();
        assert!(matches!(err, RenderError::Configuration(_)));
    }

    #[test]
    fn test_default_layer_is_unset() {
        let mut ctx = RenderContext::new(HeadlessBackend::new());
        let mut map = ShadowMap::new("sun", material(1), shadow_texture(&mut ctx, 4)).unwrap();
        assert_eq!(map.layer_index(), None);
        assert_eq!(map.raw_layer_index(), NO_LAYER);

        map.set_layer_index(3);
        assert_eq!(map.raw_layer_index(), 3);
        map.clear_layer_index();
        assert_eq!(map.layer_index(), None);
    }

    #[test]
    fn test_begin_rendering_binds_layer_and_material() {
        let backend = HeadlessBackend::new();
        let recorder = backend.recorder();
        let mut ctx = RenderContext::new(backend);
        let texture = shadow_texture(&mut ctx, 4);

        let mut map = ShadowMap::new("sun", material(11), texture).unwrap();
        map.allocate(&mut ctx).unwrap();
        map.set_layer_index(2);
        recorder.clear();

        map.begin_rendering(&mut ctx).unwrap();

        let fb = map.core().framebuffer().gpu_id().unwrap();
        assert_eq!(recorder.bound_framebuffer(), Some((fb, Some(2))));
        assert_eq!(recorder.active_program(), Some(ProgramId(11)));
        assert_eq!(map.state(), TargetState::Rendering);

        // Generic steps come before the material
        let commands = recorder.commands();
        let bind = commands
            .iter()
            .position(|c| matches!(c, BackendCommand::BindFramebuffer { .. }))
            .unwrap();
        let viewport = commands
            .iter()
            .position(|c| matches!(c, BackendCommand::SetViewport(_)))
            .unwrap();
        let program = commands
            .iter()
            .position(|c| matches!(c, BackendCommand::UseProgram(_)))
            .unwrap();
        assert!(bind < viewport && viewport < program);
        assert_eq!(
            commands[viewport],
            BackendCommand::SetViewport(crate::resource::Viewport::full(512, 512))
        );
    }

    #[test]
    fn test_layer_out_of_range_stays_idle() {
        let backend = HeadlessBackend::new();
        let recorder = backend.recorder();
        let mut ctx = RenderContext::new(backend);
        let texture = shadow_texture(&mut ctx, 4);

        let mut map = ShadowMap::new("sun", material(1), texture).unwrap();
        map.allocate(&mut ctx).unwrap();
        map.set_layer_index(10);
        recorder.clear();

        let err = map.begin_rendering(&mut ctx).unwrap_err();
        assert_eq!(
            err,
            RenderError::Binding(BindingError::LayerOutOfRange {
                layer: 10,
                layer_count: 4
            })
        );
        assert_eq!(map.state(), TargetState::Idle);
        assert!(ctx.is_idle());
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_single_layer_binds_without_layer() {
        let backend = HeadlessBackend::new();
        let recorder = backend.recorder();
        let mut ctx = RenderContext::new(backend);
        let texture = shadow_texture(&mut ctx, 1);

        let mut map = ShadowMap::new("spot", material(1), texture).unwrap();
        map.allocate(&mut ctx).unwrap();
        map.begin_rendering(&mut ctx).unwrap();

        let fb = map.core().framebuffer().gpu_id().unwrap();
        assert_eq!(recorder.bound_framebuffer(), Some((fb, None)));
    }

    #[test]
    fn test_second_begin_is_reentrant() {
        let mut ctx = RenderContext::new(HeadlessBackend::new());
        let texture = shadow_texture(&mut ctx, 2);
        let mut map = ShadowMap::new("sun", material(1), texture).unwrap();
        map.allocate(&mut ctx).unwrap();

        map.begin_rendering(&mut ctx).unwrap();
        let err = map.begin_rendering(&mut ctx).unwrap_err();
        assert!(matches!(err, RenderError::Reentrancy { .. }));

        map.end_rendering(&mut ctx).unwrap();
        assert_eq!(map.state(), TargetState::Idle);
        map.begin_rendering(&mut ctx).unwrap();
    }

    #[test]
    fn test_camera_uploaded_as_light_matrix() {
        let backend = HeadlessBackend::new();
        let recorder = backend.recorder();
        let mut ctx = RenderContext::new(backend);
        let texture = shadow_texture(&mut ctx, 1);
        let mut map = ShadowMap::new("sun", material(1), texture).unwrap();
        map.allocate(&mut ctx).unwrap();

        let camera = Camera::directional_light(Vec3::new(0.3, -1.0, 0.2), Vec3::ZERO, 25.0);
        map.core_mut().set_camera(camera);
        map.begin_rendering(&mut ctx).unwrap();

        let expected = UniformValue::from(camera.view_projection());
        assert_eq!(recorder.last_uniform(U_LIGHT_VIEW_PROJECTION), Some(expected.clone()));
        assert_eq!(map.shadow_material().uniform(U_LIGHT_VIEW_PROJECTION), Some(expected));
    }

    #[test]
    fn test_shared_material_gets_each_maps_uniforms() {
        let backend = HeadlessBackend::new();
        let recorder = backend.recorder();
        let mut ctx = RenderContext::new(backend);
        let texture = shadow_texture(&mut ctx, 2);
        let shared = material(1);

        let mut near = ShadowMap::new("near", shared.clone(), texture.clone()).unwrap();
        near.set_shadow_settings(LightShadowSettings::default().with_depth_bias(0.001));
        near.core_mut()
            .set_camera(Camera::directional_light(Vec3::NEG_Y, Vec3::ZERO, 10.0));
        let mut far = ShadowMap::new("far", shared.clone(), texture).unwrap();
        far.set_shadow_settings(LightShadowSettings::default().with_depth_bias(0.5));
        for map in [&mut near, &mut far] {
            map.allocate(&mut ctx).unwrap();
        }

        near.begin_rendering(&mut ctx).unwrap();
        assert_eq!(recorder.last_uniform(U_DEPTH_BIAS), Some(UniformValue::Float(0.001)));
        near.end_rendering(&mut ctx).unwrap();

        far.begin_rendering(&mut ctx).unwrap();
        assert_eq!(recorder.last_uniform(U_DEPTH_BIAS), Some(UniformValue::Float(0.5)));
        // No camera on this map: the previous map's matrix must not leak through
        assert_eq!(recorder.last_uniform(U_LIGHT_VIEW_PROJECTION), Some(UniformValue::from(Mat4::IDENTITY)));
        far.end_rendering(&mut ctx).unwrap();
    }

    #[test]
    fn test_unallocated_framebuffer_is_fatal() {
        let mut ctx = RenderContext::new(HeadlessBackend::new());
        let texture = shadow_texture(&mut ctx, 2);
        let mut map = ShadowMap::new("sun", material(1), texture).unwrap();

        let err = map.begin_rendering(&mut ctx).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(map.state(), TargetState::Idle);
    }
}
