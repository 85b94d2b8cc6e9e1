//! Shadow pass driver
//!
//! The [`Renderer`] owns the graphics context, the shared layered shadow
//! texture and one [`ShadowMap`] per shadow-casting light. Each frame it runs
//! the shadow pass light by light:
//!
//! 1. Skip lights whose update mode says their map is still valid
//! 2. `begin_rendering` on the light's map
//!    - Binding error: skip the light for this frame, log a warning
//!    - Fatal resource error: abort the frame
//! 3. Draw every caster with the light-space transform
//! 4. `end_rendering`
//!
//! The texture and [`ShadowBuffer`] are then handed to the main pass.

use std::collections::BTreeMap;

use glam::Mat4;

use crate::backend::{DrawCall, GraphicsBackend};
use crate::error::{RenderError, RenderResult};
use crate::material::{MaterialHandle, MaterialLibrary};
use crate::resource::MeshId;
use crate::shadow::{
    GpuShadowLight, LightId, LightShadowSettings, ShadowAtlas, ShadowBuffer, ShadowConfig,
    ShadowMap,
};
use crate::target::{Camera, RenderContext, RenderTarget};
use crate::texture::{RenderTexture, SharedTexture};

/// Geometry drawn into shadow maps
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadowCaster {
    pub mesh: MeshId,
    pub model: Mat4,
    pub index_count: u32,
}

/// What happened to each light during one shadow pass
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShadowPassReport {
    pub frame: u64,
    /// Lights whose map was re-rendered
    pub rendered: Vec<LightId>,
    /// Lights whose map is still valid from an earlier frame
    pub up_to_date: Vec<LightId>,
    /// Lights skipped because their target could not be bound
    pub skipped: Vec<(LightId, RenderError)>,
    /// Lights removed after going stale
    pub evicted: Vec<LightId>,
    pub draw_calls: u32,
}

impl ShadowPassReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Running totals across frames
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShadowStats {
    pub frames: u64,
    pub maps_rendered: u64,
    pub maps_skipped: u64,
    pub draw_calls: u64,
    pub aborted_frames: u64,
}

#[derive(Debug)]
struct ShadowLight {
    map: ShadowMap,
    material: MaterialHandle,
    settings: LightShadowSettings,
    rendered_once: bool,
    changed: bool,
    valid: bool,
}

/// Issue one full pass into a render target: begin, draw every caster, end.
///
/// Returns the number of draw calls.
pub fn draw_pass(
    ctx: &mut RenderContext,
    target: &mut dyn RenderTarget,
    casters: &[ShadowCaster],
) -> RenderResult<u32> {
    target.begin_rendering(ctx)?;

    let view_projection = target
        .core()
        .camera()
        .map_or(Mat4::IDENTITY, Camera::view_projection);

    let backend = ctx.backend_mut();
    for caster in casters {
        backend.draw(&DrawCall {
            mesh: caster.mesh,
            index_count: caster.index_count,
            model_view_projection: (view_projection * caster.model).to_cols_array_2d(),
        });
    }

    target.end_rendering(ctx)?;
    log::trace!(
        "{:?} target {} drew {} casters",
        target.kind(),
        target.core().label(),
        casters.len()
    );
    Ok(casters.len() as u32)
}

/// Shadow renderer
#[derive(Debug)]
pub struct Renderer {
    context: RenderContext,
    config: ShadowConfig,
    materials: MaterialLibrary,
    texture: SharedTexture,
    atlas: ShadowAtlas,
    lights: BTreeMap<LightId, ShadowLight>,
    stats: ShadowStats,
}

impl Renderer {
    /// Create the renderer and allocate the shared shadow texture.
    ///
    /// Texture allocation failure is fatal.
    pub fn new(backend: impl GraphicsBackend + 'static, mut config: ShadowConfig) -> RenderResult<Self> {
        config.validate();

        let mut context = RenderContext::new(backend);
        let mut texture =
            RenderTexture::shadow_array(config.resolution, config.max_shadow_maps, config.depth_format)?;
        if config.enabled {
            texture.allocate(context.backend_mut())?;
        }

        log::info!(
            "Shadow renderer on {} backend: {} layer(s) at {}x{} ({:.1} MiB)",
            context.backend().name(),
            config.max_shadow_maps,
            config.resolution,
            config.resolution,
            texture.memory_bytes() as f64 / (1024.0 * 1024.0)
        );

        Ok(Self {
            context,
            atlas: ShadowAtlas::new(config.max_shadow_maps),
            config,
            materials: MaterialLibrary::new(),
            texture: texture.into_shared(),
            lights: BTreeMap::new(),
            stats: ShadowStats::default(),
        })
    }

    /// Give a light a shadow map.
    ///
    /// The material must live in [`Self::materials`]. Returns the layer the
    /// light renders into.
    pub fn add_shadow_light(
        &mut self,
        light_id: LightId,
        material: MaterialHandle,
        settings: LightShadowSettings,
    ) -> RenderResult<u32> {
        if self.lights.contains_key(&light_id) {
            return Err(RenderError::Configuration(format!(
                "light {} already has a shadow map",
                light_id
            )));
        }

        let mut map = ShadowMap::from_library(
            format!("shadow map {}", light_id),
            &self.materials,
            material,
            self.texture.clone(),
        )?;

        let alloc = self.atlas.allocate(light_id).ok_or(RenderError::AtlasFull {
            layer_count: self.atlas.layer_count(),
        })?;
        if self.texture.read().is_layered() {
            map.set_layer_index(alloc.layer);
        }
        map.set_shadow_settings(settings.clone());

        if self.config.enabled {
            if let Err(e) = map.allocate(&mut self.context) {
                self.atlas.deallocate(light_id);
                return Err(e);
            }
        }

        log::debug!("Light {} renders shadows into layer {}", light_id, alloc.layer);
        self.lights.insert(
            light_id,
            ShadowLight {
                map,
                material,
                settings,
                rendered_once: false,
                changed: true,
                valid: false,
            },
        );
        Ok(alloc.layer)
    }

    /// Drop a light's shadow map and free its layer
    pub fn remove_shadow_light(&mut self, light_id: LightId) -> RenderResult<()> {
        let mut light = self
            .lights
            .remove(&light_id)
            .ok_or(RenderError::UnknownLight(light_id))?;

        light.map.release(&mut self.context);
        self.atlas.deallocate(light_id);
        log::debug!("Removed shadow map for light {}", light_id);
        Ok(())
    }

    /// Set the light camera used for the next pass
    pub fn update_light(&mut self, light_id: LightId, camera: Camera) -> RenderResult<()> {
        let light = self
            .lights
            .get_mut(&light_id)
            .ok_or(RenderError::UnknownLight(light_id))?;

        if light.map.core().camera() != Some(&camera) {
            light.map.core_mut().set_camera(camera);
            light.changed = true;
        }
        Ok(())
    }

    /// Flag a light's map for re-rendering (e.g. casters moved)
    pub fn mark_changed(&mut self, light_id: LightId) -> RenderResult<()> {
        let light = self
            .lights
            .get_mut(&light_id)
            .ok_or(RenderError::UnknownLight(light_id))?;
        light.changed = true;
        Ok(())
    }

    /// Run the shadow pass for every light.
    ///
    /// Recoverable binding errors skip the light; any other error aborts the
    /// frame and is returned.
    pub fn render_shadow_pass(&mut self, casters: &[ShadowCaster]) -> RenderResult<ShadowPassReport> {
        // A target dropped mid-pass outside the renderer must not block the frame
        self.context.reset_active();

        let frame = self.context.begin_frame();
        self.atlas.begin_frame();
        self.stats.frames += 1;

        let mut report = ShadowPassReport {
            frame,
            ..Default::default()
        };
        if !self.config.enabled {
            return Ok(report);
        }

        for (&light_id, light) in self.lights.iter_mut() {
            if !light
                .settings
                .update_mode
                .should_update(frame, light.rendered_once, light.changed)
            {
                self.atlas.touch(light_id);
                report.up_to_date.push(light_id);
                continue;
            }

            match draw_pass(&mut self.context, &mut light.map, casters) {
                Ok(draws) => {
                    light.rendered_once = true;
                    light.changed = false;
                    light.valid = true;
                    self.atlas.touch(light_id);
                    report.rendered.push(light_id);
                    report.draw_calls += draws;
                }
                Err(e) if e.is_recoverable() => {
                    log::warn!("Skipping shadow for light {} this frame: {}", light_id, e);
                    light.valid = false;
                    report.skipped.push((light_id, e));
                }
                Err(e) => {
                    log::error!("Shadow pass aborted at light {}: {}", light_id, e);
                    self.stats.aborted_frames += 1;
                    return Err(e);
                }
            }
        }

        if self.config.stale_after_frames > 0 {
            for light_id in self.atlas.stale_lights(self.config.stale_after_frames) {
                log::info!(
                    "Light {} produced no shadow for {} frames, freeing its layer",
                    light_id,
                    self.config.stale_after_frames
                );
                self.remove_shadow_light(light_id)?;
                report.evicted.push(light_id);
            }
        }

        self.stats.maps_rendered += report.rendered.len() as u64;
        self.stats.maps_skipped += report.skipped.len() as u64;
        self.stats.draw_calls += report.draw_calls as u64;
        Ok(report)
    }

    /// Render any target with the shadow renderer's context
    pub fn render_target(
        &mut self,
        target: &mut dyn RenderTarget,
        casters: &[ShadowCaster],
    ) -> RenderResult<u32> {
        draw_pass(&mut self.context, target, casters)
    }

    /// Per-light GPU records for the main pass, in light id order.
    ///
    /// Lights without a valid map this frame get a disabled record.
    pub fn shadow_buffer(&self) -> ShadowBuffer {
        let texel_size = 1.0 / self.config.resolution as f32;
        let mut buffer = ShadowBuffer::new();

        for light in self.lights.values() {
            if !light.valid {
                buffer.push(GpuShadowLight::disabled());
                continue;
            }

            let view_projection = light
                .map
                .core()
                .camera()
                .map_or(Mat4::IDENTITY, Camera::view_projection);
            buffer.push(GpuShadowLight {
                matrix: view_projection.to_cols_array_2d(),
                // Single-layer textures leave the layer unset but sample layer 0
                layer: light.map.layer_index().unwrap_or(0) as i32,
                bias: light.settings.depth_bias,
                normal_bias: light.settings.normal_bias,
                strength: light.settings.strength,
                texel_size,
                pcf_filter_size: self.config.pcf_filter_size,
                _padding: [0; 2],
            });
        }
        buffer
    }

    /// Texture the main pass samples shadows from
    pub fn shadow_texture(&self) -> &SharedTexture {
        &self.texture
    }

    pub fn shadow_map(&self, light_id: LightId) -> Option<&ShadowMap> {
        self.lights.get(&light_id).map(|l| &l.map)
    }

    pub fn shadow_map_mut(&mut self, light_id: LightId) -> Option<&mut ShadowMap> {
        self.lights.get_mut(&light_id).map(|l| &mut l.map)
    }

    /// Material handle a light was registered with
    pub fn light_material(&self, light_id: LightId) -> Option<MaterialHandle> {
        self.lights.get(&light_id).map(|l| l.material)
    }

    pub fn light_count(&self) -> usize {
        self.lights.len()
    }

    pub fn materials(&self) -> &MaterialLibrary {
        &self.materials
    }

    pub fn materials_mut(&mut self) -> &mut MaterialLibrary {
        &mut self.materials
    }

    pub fn atlas(&self) -> &ShadowAtlas {
        &self.atlas
    }

    pub fn config(&self) -> &ShadowConfig {
        &self.config
    }

    pub fn context(&self) -> &RenderContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut RenderContext {
        &mut self.context
    }

    pub fn stats(&self) -> &ShadowStats {
        &self.stats
    }

    /// Release every framebuffer and the shadow texture
    pub fn shutdown(&mut self) {
        let ids: Vec<LightId> = self.lights.keys().copied().collect();
        for light_id in ids {
            let _ = self.remove_shadow_light(light_id);
        }
        self.texture.write().release(self.context.backend_mut());
        log::info!("Shadow renderer shut down after {} frame(s)", self.stats.frames);
    }
}
