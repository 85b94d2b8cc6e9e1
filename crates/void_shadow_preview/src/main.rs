//! Shadow Preview
//!
//! Runs the shadow pass over a demo scene on the headless backend and logs
//! what happened to every light each frame.
//!
//! Run with: cargo run -p void_shadow_preview
//!       or: RUST_LOG=debug cargo run --bin shadow-preview

mod preview_config;

use std::process::ExitCode;

use preview_config::{PreviewConfig, PreviewLightKind};
use void_shadow::prelude::*;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = PreviewConfig::load();
    install_crash_hook(config.crash_trace_frames);
    config.print_summary();

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Shadow preview failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(config: &PreviewConfig) -> RenderResult<()> {
    let mut renderer = Renderer::new(HeadlessBackend::new(), config.shadows.clone())?;

    for (index, light) in config.lights.iter().enumerate() {
        let material = renderer.materials_mut().insert(ShaderData::shadow_depth(
            ShaderProgram::new(format!("shadow_depth_{}", light.id), ProgramId(index as u64 + 1)),
            &light.settings,
        ));

        match renderer.add_shadow_light(light.id, material, light.settings.clone()) {
            Ok(layer) => log::info!("Light {} ({:?}) -> layer {}", light.id, light.kind, layer),
            Err(e @ RenderError::AtlasFull { .. }) => {
                log::warn!("Light {} casts no shadow: {}", light.id, e);
                continue;
            }
            Err(e) => return Err(e),
        }
        renderer.update_light(light.id, light.camera())?;
    }

    let casters = demo_casters(config.grid_size);

    for frame in 0..config.frames {
        if config.orbit_every > 0 && frame > 0 && frame % config.orbit_every == 0 {
            if let Some(light) = config.lights.first() {
                let angle = frame as f32 * 0.25;
                let direction = Vec3::new(angle.cos(), -1.0, angle.sin());
                let camera = match light.kind {
                    PreviewLightKind::Directional => {
                        Camera::directional_light(direction, Vec3::ZERO, light.extent)
                    }
                    PreviewLightKind::Spot => light.camera(),
                };
                if renderer.update_light(light.id, camera).is_err() {
                    log::debug!("Light {} has no shadow map to orbit", light.id);
                }
            }
        }

        let report = renderer.render_shadow_pass(&casters)?;
        log::info!(
            "Frame {}: {} rendered, {} cached, {} skipped, {} draw call(s)",
            report.frame,
            report.rendered.len(),
            report.up_to_date.len(),
            report.skipped.len(),
            report.draw_calls
        );
        for (light, err) in &report.skipped {
            log::warn!("  light {}: {}", light, err);
        }
    }

    let buffer = renderer.shadow_buffer();
    let stats = renderer.stats().clone();
    log::info!(
        "Done: {} frame(s), {} map(s) rendered, {} skipped, {} draw call(s)",
        stats.frames,
        stats.maps_rendered,
        stats.maps_skipped,
        stats.draw_calls
    );
    log::info!(
        "Shadow buffer: {} light(s), {} enabled, {} byte(s); atlas {:.0}% used",
        buffer.len(),
        buffer.enabled_count(),
        buffer.as_bytes().len(),
        renderer.atlas().utilization() * 100.0
    );

    renderer.shutdown();
    Ok(())
}

/// Ground plane plus a grid of unit cubes
fn demo_casters(grid_size: u32) -> Vec<ShadowCaster> {
    let mut casters = vec![ShadowCaster {
        mesh: MeshId(0),
        model: Mat4::from_scale(Vec3::new(40.0, 0.1, 40.0)),
        index_count: 6,
    }];

    let half = grid_size as f32 / 2.0;
    for x in 0..grid_size {
        for z in 0..grid_size {
            let position = Vec3::new((x as f32 - half) * 3.0, 1.0, (z as f32 - half) * 3.0);
            casters.push(ShadowCaster {
                mesh: MeshId(1),
                model: Mat4::from_translation(position),
                index_count: 36,
            });
        }
    }
    casters
}
