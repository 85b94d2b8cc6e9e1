//! Render targets
//!
//! A render target renders the scene from a camera into an off-screen
//! texture. The capability set is the [`RenderTarget`] trait; the state every
//! variant shares (texture, framebuffer, camera, viewport, pass state) lives
//! in [`RenderTargetCore`], and the trait's provided methods implement the
//! generic protocol on top of it.
//!
//! ```text
//!            begin_rendering
//!   Idle  ───────────────────▶  Rendering
//!    ▲                              │
//!    └────────── end_rendering ─────┘
//! ```
//!
//! Variants override [`RenderTarget::bind`] or
//! [`RenderTarget::begin_rendering`] and call back into the core for the
//! generic steps, see [`crate::shadow::ShadowMap`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::{Mat4, Vec3};

use crate::backend::GraphicsBackend;
use crate::error::{BindingError, RenderError, RenderResult};
use crate::framebuffer::FrameBuffer;
use crate::resource::{ClearValues, DepthState, Viewport};
use crate::texture::SharedTexture;

static NEXT_TARGET_ID: AtomicU64 = AtomicU64::new(1);

/// Unique render target identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetId(u64);

impl TargetId {
    fn next() -> Self {
        Self(NEXT_TARGET_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Pass state of a render target
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetState {
    Idle,
    Rendering,
}

/// Render target variant tag
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderTargetKind {
    /// Plain render-to-texture
    Texture,
    /// Depth pass from a light
    Shadow,
}

/// Viewpoint a target renders from
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub view: Mat4,
    pub projection: Mat4,
}

impl Camera {
    pub fn new(view: Mat4, projection: Mat4) -> Self {
        Self { view, projection }
    }

    /// Orthographic light camera looking at `center` along `direction`,
    /// covering a cube of half-size `extent`
    pub fn directional_light(direction: Vec3, center: Vec3, extent: f32) -> Self {
        let direction = direction.normalize_or_zero();
        let up = if direction.abs_diff_eq(Vec3::Y, 1e-3) || direction.abs_diff_eq(-Vec3::Y, 1e-3) {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let eye = center - direction * extent * 2.0;
        let view = Mat4::look_at_rh(eye, center, up);
        let projection =
            Mat4::orthographic_rh(-extent, extent, -extent, extent, 0.0, extent * 4.0);
        Self { view, projection }
    }

    /// Perspective light camera for spot lights
    pub fn spot_light(position: Vec3, direction: Vec3, fov_y: f32, near: f32, far: f32) -> Self {
        let direction = direction.normalize_or_zero();
        let up = if direction.abs_diff_eq(Vec3::Y, 1e-3) || direction.abs_diff_eq(-Vec3::Y, 1e-3) {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let view = Mat4::look_at_rh(position, position + direction, up);
        let projection = Mat4::perspective_rh(fov_y, 1.0, near, far);
        Self { view, projection }
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
        }
    }
}

/// Graphics context the renderer drives targets through
///
/// Owns the backend and enforces that at most one target is active at a time.
pub struct RenderContext {
    backend: Box<dyn GraphicsBackend>,
    active: Option<(TargetId, String)>,
    frame: u64,
}

impl RenderContext {
    pub fn new(backend: impl GraphicsBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            active: None,
            frame: 0,
        }
    }

    pub fn backend(&self) -> &dyn GraphicsBackend {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> &mut dyn GraphicsBackend {
        self.backend.as_mut()
    }

    /// Target currently rendering, if any
    pub fn active_target(&self) -> Option<TargetId> {
        self.active.as_ref().map(|(id, _)| *id)
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    pub fn begin_frame(&mut self) -> u64 {
        self.frame += 1;
        self.frame
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Forget the active target without ending its pass.
    ///
    /// Recovery for a target dropped while Rendering, which otherwise keeps
    /// the context busy. Returns the target that was active.
    pub fn reset_active(&mut self) -> Option<TargetId> {
        let (id, label) = self.active.take()?;
        log::warn!("Render target {} ({}) abandoned mid-pass, context reset", label, id);
        self.backend.unbind_framebuffer();
        Some(id)
    }

    fn ensure_available(&self, id: TargetId, label: &str) -> RenderResult<()> {
        match &self.active {
            Some((active, _)) if *active == id => Err(RenderError::Reentrancy {
                target: label.to_owned(),
            }),
            Some((_, active_label)) => Err(RenderError::ContextBusy {
                active: active_label.clone(),
                requested: label.to_owned(),
            }),
            None => Ok(()),
        }
    }

    fn acquire(&mut self, id: TargetId, label: &str) {
        self.active = Some((id, label.to_owned()));
    }

    fn release(&mut self, id: TargetId) {
        if self.active_target() == Some(id) {
            self.active = None;
        }
    }
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("backend", &self.backend.name())
            .field("active", &self.active)
            .field("frame", &self.frame)
            .finish()
    }
}

/// State shared by every render target variant
#[derive(Debug)]
pub struct RenderTargetCore {
    id: TargetId,
    label: String,
    texture: SharedTexture,
    framebuffer: FrameBuffer,
    camera: Option<Camera>,
    viewport: Option<Viewport>,
    depth_state: DepthState,
    clear: ClearValues,
    enabled: bool,
    state: TargetState,
}

impl RenderTargetCore {
    pub fn new(label: impl Into<String>, texture: SharedTexture) -> Self {
        let label = label.into();
        Self {
            id: TargetId::next(),
            framebuffer: FrameBuffer::new(format!("{} framebuffer", label)),
            label,
            texture,
            camera: None,
            viewport: None,
            depth_state: DepthState::default(),
            clear: ClearValues::default(),
            enabled: true,
            state: TargetState::Idle,
        }
    }

    /// Create the framebuffer around the (already allocated) texture
    pub fn allocate(&mut self, backend: &mut dyn GraphicsBackend) -> RenderResult<()> {
        let texture = self.texture.read();
        self.framebuffer.allocate(backend, &texture)
    }

    /// Free the framebuffer. The texture is shared and stays alive.
    pub fn release(&mut self, backend: &mut dyn GraphicsBackend) {
        self.framebuffer.release(backend);
    }

    pub fn id(&self) -> TargetId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn texture(&self) -> &SharedTexture {
        &self.texture
    }

    pub fn framebuffer(&self) -> &FrameBuffer {
        &self.framebuffer
    }

    pub fn camera(&self) -> Option<&Camera> {
        self.camera.as_ref()
    }

    pub fn set_camera(&mut self, camera: Camera) {
        self.camera = Some(camera);
    }

    /// Explicit viewport; by default the whole texture is used
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = Some(viewport);
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport.unwrap_or_else(|| {
            let texture = self.texture.read();
            Viewport::full(texture.width(), texture.height())
        })
    }

    pub fn depth_state(&self) -> DepthState {
        self.depth_state
    }

    pub fn set_depth_state(&mut self, state: DepthState) {
        self.depth_state = state;
    }

    pub fn clear_values(&self) -> ClearValues {
        self.clear
    }

    pub fn set_clear_values(&mut self, clear: ClearValues) {
        self.clear = clear;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn state(&self) -> TargetState {
        self.state
    }

    pub fn is_rendering(&self) -> bool {
        self.state == TargetState::Rendering
    }

    /// Checks that must pass before any GPU state is touched
    pub fn check_can_begin(&self, ctx: &RenderContext) -> RenderResult<()> {
        if self.is_rendering() {
            log::error!("begin_rendering called on {} while it is already rendering", self.label);
            return Err(RenderError::Reentrancy {
                target: self.label.clone(),
            });
        }
        ctx.ensure_available(self.id, &self.label)?;

        if !self.enabled {
            return Err(BindingError::TargetDisabled(self.label.clone()).into());
        }

        if !self.texture.read().is_allocated() {
            return Err(RenderError::FatalResource(format!(
                "texture of {} was never allocated",
                self.label
            )));
        }

        self.framebuffer.validate(ctx.backend())?;
        Ok(())
    }

    /// Check a layer selection against the texture's layer count
    pub fn check_layer(&self, layer: Option<u32>) -> RenderResult<()> {
        if let Some(layer) = layer {
            let layer_count = self.texture.read().layer_count();
            if layer >= layer_count {
                return Err(BindingError::LayerOutOfRange { layer, layer_count }.into());
            }
        }
        Ok(())
    }

    /// Generic binding steps: framebuffer (at `layer`), viewport, depth state
    /// and clear
    pub fn bind_base(&mut self, ctx: &mut RenderContext, layer: Option<u32>) -> RenderResult<()> {
        let viewport = self.viewport();
        let backend = ctx.backend_mut();

        self.framebuffer.bind(backend, layer)?;
        backend.set_viewport(viewport);
        backend.set_depth_state(self.depth_state);
        backend.clear(self.clear);
        Ok(())
    }

    /// Mark the target (and the context) as rendering
    pub fn activate(&mut self, ctx: &mut RenderContext) {
        ctx.acquire(self.id, &self.label);
        self.state = TargetState::Rendering;
        log::trace!("{} ({}) rendering, frame {}", self.label, self.id, ctx.frame());
    }

    /// Undo a bind that could not be completed
    pub fn abort_bind(&mut self, ctx: &mut RenderContext) {
        self.framebuffer.unbind(ctx.backend_mut());
    }

    /// Generic end-of-pass: unbind and return to Idle
    pub fn finish(&mut self, ctx: &mut RenderContext) -> RenderResult<()> {
        if !self.is_rendering() {
            return Err(RenderError::NotRendering {
                target: self.label.clone(),
            });
        }

        self.framebuffer.unbind(ctx.backend_mut());
        ctx.release(self.id);
        self.state = TargetState::Idle;
        Ok(())
    }
}

/// Render-into-texture capability set
///
/// A pass must be ended with `end_rendering` before the target is dropped;
/// otherwise the context stays busy until [`RenderContext::reset_active`].
pub trait RenderTarget: Send {
    fn core(&self) -> &RenderTargetCore;

    fn core_mut(&mut self) -> &mut RenderTargetCore;

    fn kind(&self) -> RenderTargetKind;

    fn id(&self) -> TargetId {
        self.core().id()
    }

    fn state(&self) -> TargetState {
        self.core().state()
    }

    /// Bind the target's framebuffer and fixed-function state.
    ///
    /// Called by `begin_rendering` once every check has passed.
    fn bind(&mut self, ctx: &mut RenderContext) -> RenderResult<()> {
        self.core_mut().bind_base(ctx, None)
    }

    /// Start a pass: validate, bind, then mark Rendering.
    ///
    /// On error the target stays Idle. Calling it on a target that is
    /// already Rendering is logged at error level and returned as
    /// `RenderError::Reentrancy` in every build profile, so callers and
    /// tests can observe it; no debug assertion fires.
    fn begin_rendering(&mut self, ctx: &mut RenderContext) -> RenderResult<()> {
        self.core().check_can_begin(ctx)?;
        self.bind(ctx)?;
        self.core_mut().activate(ctx);
        Ok(())
    }

    /// End the pass started by `begin_rendering`
    fn end_rendering(&mut self, ctx: &mut RenderContext) -> RenderResult<()> {
        self.core_mut().finish(ctx)
    }
}

/// Plain render-to-texture target
#[derive(Debug)]
pub struct TextureTarget {
    core: RenderTargetCore,
}

impl TextureTarget {
    pub fn new(label: impl Into<String>, texture: SharedTexture) -> Self {
        Self {
            core: RenderTargetCore::new(label, texture),
        }
    }
}

impl RenderTarget for TextureTarget {
    fn core(&self) -> &RenderTargetCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RenderTargetCore {
        &mut self.core
    }

    fn kind(&self) -> RenderTargetKind {
        RenderTargetKind::Texture
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCommand, HeadlessBackend};
    use crate::resource::TextureDesc;
    use crate::texture::RenderTexture;

    fn color_target(ctx: &mut RenderContext) -> TextureTarget {
        let mut texture = RenderTexture::new(TextureDesc {
            label: "reflection".into(),
            width: 320,
            height: 240,
            ..Default::default()
        })
        .unwrap();
        texture.allocate(ctx.backend_mut()).unwrap();

        let mut target = TextureTarget::new("reflection target", texture.into_shared());
        target.core_mut().allocate(ctx.backend_mut()).unwrap();
        target
    }

    #[test]
    fn test_begin_end_cycle() {
        let backend = HeadlessBackend::new();
        let recorder = backend.recorder();
        let mut ctx = RenderContext::new(backend);
        let mut target = color_target(&mut ctx);
        recorder.clear();

        target.begin_rendering(&mut ctx).unwrap();
        assert_eq!(target.state(), TargetState::Rendering);
        assert_eq!(ctx.active_target(), Some(target.id()));

        let commands = recorder.commands();
        assert!(matches!(commands[0], BackendCommand::BindFramebuffer { layer: None, .. }));
        assert_eq!(commands[1], BackendCommand::SetViewport(Viewport::full(320, 240)));
        assert!(matches!(commands[2], BackendCommand::SetDepthState(_)));
        assert!(matches!(commands[3], BackendCommand::Clear(_)));

        target.end_rendering(&mut ctx).unwrap();
        assert_eq!(target.state(), TargetState::Idle);
        assert!(ctx.is_idle());
        assert_eq!(recorder.bound_framebuffer(), None);
    }

    #[test]
    fn test_reentrant_begin_fails() {
        let mut ctx = RenderContext::new(HeadlessBackend::new());
        let mut target = color_target(&mut ctx);

        target.begin_rendering(&mut ctx).unwrap();
        let err = target.begin_rendering(&mut ctx).unwrap_err();
        assert!(matches!(err, RenderError::Reentrancy { .. }));
        assert_eq!(target.state(), TargetState::Rendering);
    }

    #[test]
    fn test_second_target_while_active_fails() {
        let mut ctx = RenderContext::new(HeadlessBackend::new());
        let mut first = color_target(&mut ctx);
        let mut second = color_target(&mut ctx);

        first.begin_rendering(&mut ctx).unwrap();
        let err = second.begin_rendering(&mut ctx).unwrap_err();
        assert!(matches!(err, RenderError::ContextBusy { .. }));
        assert_eq!(second.state(), TargetState::Idle);

        first.end_rendering(&mut ctx).unwrap();
        second.begin_rendering(&mut ctx).unwrap();
    }

    #[test]
    fn test_dropped_target_blocks_context_until_reset() {
        let backend = HeadlessBackend::new();
        let recorder = backend.recorder();
        let mut ctx = RenderContext::new(backend);
        let mut abandoned = color_target(&mut ctx);
        let mut next = color_target(&mut ctx);

        abandoned.begin_rendering(&mut ctx).unwrap();
        let abandoned_id = abandoned.id();
        drop(abandoned);

        let err = next.begin_rendering(&mut ctx).unwrap_err();
        assert!(matches!(err, RenderError::ContextBusy { .. }));

        assert_eq!(ctx.reset_active(), Some(abandoned_id));
        assert_eq!(recorder.bound_framebuffer(), None);
        assert_eq!(ctx.reset_active(), None);

        next.begin_rendering(&mut ctx).unwrap();
        next.end_rendering(&mut ctx).unwrap();
    }

    #[test]
    fn test_end_while_idle_fails() {
        let mut ctx = RenderContext::new(HeadlessBackend::new());
        let mut target = color_target(&mut ctx);
        let err = target.end_rendering(&mut ctx).unwrap_err();
        assert!(matches!(err, RenderError::NotRendering { .. }));
    }

    #[test]
    fn test_disabled_target_is_skipped() {
        let mut ctx = RenderContext::new(HeadlessBackend::new());
        let mut target = color_target(&mut ctx);
        target.core_mut().set_enabled(false);

        let err = target.begin_rendering(&mut ctx).unwrap_err();
        assert!(err.is_recoverable());
        assert!(ctx.is_idle());
    }

    #[test]
    fn test_unallocated_texture_is_fatal() {
        let mut ctx = RenderContext::new(HeadlessBackend::new());
        let texture = RenderTexture::new(TextureDesc::default()).unwrap();
        let mut target = TextureTarget::new("never allocated", texture.into_shared());

        let err = target.begin_rendering(&mut ctx).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_explicit_viewport() {
        let mut ctx = RenderContext::new(HeadlessBackend::new());
        let mut target = color_target(&mut ctx);
        let viewport = Viewport {
            x: 10,
            y: 10,
            width: 100,
            height: 50,
        };
        target.core_mut().set_viewport(viewport);
        assert_eq!(target.core().viewport(), viewport);
    }

    #[test]
    fn test_light_cameras() {
        let camera = Camera::directional_light(Vec3::new(0.0, -1.0, 0.0), Vec3::ZERO, 10.0);
        let clip = camera.view_projection().project_point3(Vec3::ZERO);
        assert!(clip.x.abs() < 1e-4 && clip.y.abs() < 1e-4);

        let spot = Camera::spot_light(Vec3::new(0.0, 5.0, 0.0), Vec3::NEG_Y, 1.0, 0.1, 50.0);
        let clip = spot.view_projection().project_point3(Vec3::ZERO);
        assert!(clip.x.abs() < 1e-4 && clip.y.abs() < 1e-4);
    }
}
