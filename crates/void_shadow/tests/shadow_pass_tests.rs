//! Integration tests for the shadow pass

use void_shadow::backend::BackendCommand;
use void_shadow::material::U_LIGHT_VIEW_PROJECTION;
use void_shadow::prelude::*;
use void_shadow::resource::{TextureDesc, TextureUsage};
use void_shadow::{FramebufferStatus, TargetState, UniformValue};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn config(layers: u32) -> ShadowConfig {
    ShadowConfig {
        resolution: 256,
        max_shadow_maps: layers,
        ..Default::default()
    }
}

fn add_light(renderer: &mut Renderer, light_id: LightId) -> u32 {
    let settings = LightShadowSettings::spot();
    let material = renderer.materials_mut().insert(ShaderData::shadow_depth(
        ShaderProgram::new(format!("depth {}", light_id), ProgramId(100 + light_id)),
        &settings,
    ));
    renderer.add_shadow_light(light_id, material, settings).unwrap()
}

fn scene() -> Vec<ShadowCaster> {
    vec![
        ShadowCaster {
            mesh: MeshId(1),
            model: Mat4::IDENTITY,
            index_count: 36,
        },
        ShadowCaster {
            mesh: MeshId(2),
            model: Mat4::from_scale(Vec3::new(20.0, 0.1, 20.0)),
            index_count: 6,
        },
    ]
}

#[test]
fn test_out_of_range_layer_skips_only_that_light() {
    init_logging();

    let mut renderer = Renderer::new(HeadlessBackend::new(), config(4)).unwrap();
    for light in 1..=3 {
        add_light(&mut renderer, light);
    }
    renderer.shadow_map_mut(2).unwrap().set_layer_index(10);

    let report = renderer.render_shadow_pass(&scene()).unwrap();

    assert_eq!(report.rendered, vec![1, 3]);
    assert_eq!(
        report.skipped,
        vec![(
            2,
            RenderError::Binding(BindingError::LayerOutOfRange {
                layer: 10,
                layer_count: 4
            })
        )]
    );
    assert_eq!(report.draw_calls, 4);
    assert_eq!(renderer.shadow_map(2).unwrap().core().state(), TargetState::Idle);
    assert!(renderer.context().is_idle());

    let buffer = renderer.shadow_buffer();
    assert!(buffer.lights()[0].is_enabled());
    assert!(!buffer.lights()[1].is_enabled());
    assert!(buffer.lights()[2].is_enabled());
}

#[test]
fn test_incomplete_framebuffers_skip_every_light() {
    init_logging();

    let backend = HeadlessBackend::new().with_framebuffer_status(FramebufferStatus::IncompleteAttachment);
    let recorder = backend.recorder();
    let mut renderer = Renderer::new(backend, config(2)).unwrap();
    add_light(&mut renderer, 1);
    add_light(&mut renderer, 2);

    let report = renderer.render_shadow_pass(&scene()).unwrap();

    assert!(report.rendered.is_empty());
    assert_eq!(report.skipped.len(), 2);
    assert!(report.skipped.iter().all(|(_, e)| e.is_recoverable()));
    assert_eq!(recorder.draw_count(), 0);
    assert_eq!(renderer.stats().maps_skipped, 2);
}

#[test]
fn test_texture_allocation_failure_is_fatal() {
    init_logging();

    let err = Renderer::new(HeadlessBackend::new().with_failing_texture_allocation(), config(2))
        .unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn test_released_texture_aborts_pass() {
    init_logging();

    let mut renderer = Renderer::new(HeadlessBackend::new(), config(2)).unwrap();
    add_light(&mut renderer, 1);

    let texture = renderer.shadow_texture().clone();
    texture.write().release(renderer.context_mut().backend_mut());

    let err = renderer.render_shadow_pass(&scene()).unwrap_err();
    assert!(matches!(err, RenderError::FatalResource(_)));
    assert_eq!(renderer.stats().aborted_frames, 1);
    assert!(renderer.context().is_idle());
}

#[test]
fn test_light_camera_reaches_shader() {
    init_logging();

    let backend = HeadlessBackend::new();
    let recorder = backend.recorder();
    let mut renderer = Renderer::new(backend, config(2)).unwrap();
    add_light(&mut renderer, 1);

    let camera = Camera::spot_light(
        Vec3::new(0.0, 10.0, 0.0),
        Vec3::NEG_Y,
        std::f32::consts::FRAC_PI_2,
        0.1,
        50.0,
    );
    renderer.update_light(1, camera).unwrap();
    renderer.render_shadow_pass(&scene()).unwrap();

    assert_eq!(
        recorder.last_uniform(U_LIGHT_VIEW_PROJECTION),
        Some(UniformValue::from(camera.view_projection()))
    );
    assert_eq!(recorder.active_program(), Some(ProgramId(101)));

    let record = renderer.shadow_buffer().lights()[0];
    assert_eq!(record.matrix, camera.view_projection().to_cols_array_2d());
}

#[test]
fn test_pass_binds_layer_then_draws() {
    init_logging();

    let backend = HeadlessBackend::new();
    let recorder = backend.recorder();
    let mut renderer = Renderer::new(backend, config(4)).unwrap();
    add_light(&mut renderer, 1);
    add_light(&mut renderer, 2);
    recorder.clear();

    renderer.render_shadow_pass(&scene()[..1]).unwrap();

    let binds: Vec<Option<u32>> = recorder
        .commands()
        .iter()
        .filter_map(|c| match c {
            BackendCommand::BindFramebuffer { layer, .. } => Some(*layer),
            _ => None,
        })
        .collect();
    assert_eq!(binds, vec![Some(0), Some(1)]);

    let commands = recorder.commands();
    let first_draw = commands
        .iter()
        .position(|c| matches!(c, BackendCommand::Draw(_)))
        .unwrap();
    let first_program = commands
        .iter()
        .position(|c| matches!(c, BackendCommand::UseProgram(_)))
        .unwrap();
    assert!(first_program < first_draw);
    assert_eq!(commands.last(), Some(&BackendCommand::UnbindFramebuffer));
}

#[test]
fn test_render_plain_texture_target() {
    init_logging();

    let mut renderer = Renderer::new(HeadlessBackend::new(), config(1)).unwrap();

    let mut texture = RenderTexture::new(TextureDesc {
        label: "preview color".into(),
        width: 64,
        height: 64,
        layers: 1,
        format: TextureFormat::Rgba8Unorm,
        usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
    })
    .unwrap();
    texture.allocate(renderer.context_mut().backend_mut()).unwrap();

    let mut target = TextureTarget::new("preview", texture.into_shared());
    target.core_mut().allocate(renderer.context_mut().backend_mut()).unwrap();

    assert_eq!(renderer.render_target(&mut target, &scene()).unwrap(), 2);
    assert!(renderer.context().is_idle());
}

#[test]
fn test_config_from_json() {
    init_logging();

    let config: ShadowConfig =
        serde_json::from_str(r#"{ "resolution": 512, "max_shadow_maps": 3, "pcf_filter_size": 5 }"#)
            .unwrap();
    let mut renderer = Renderer::new(HeadlessBackend::new(), config).unwrap();

    for light in 0..3 {
        assert_eq!(add_light(&mut renderer, light), light as u32);
    }
    renderer.render_shadow_pass(&scene()).unwrap();

    let record = renderer.shadow_buffer().lights()[2];
    assert_eq!(record.layer, 2);
    assert_eq!(record.pcf_filter_size, 5);
    assert_eq!(renderer.shadow_texture().read().layer_count(), 3);
}

#[test]
fn test_interval_updates_over_frames() {
    init_logging();

    let mut renderer = Renderer::new(HeadlessBackend::new(), config(2)).unwrap();
    let settings = LightShadowSettings::default().with_update_mode(ShadowUpdateMode::Interval(2));
    let material = renderer.materials_mut().insert(ShaderData::shadow_depth(
        ShaderProgram::new("depth", ProgramId(1)),
        &settings,
    ));
    renderer.add_shadow_light(1, material, settings).unwrap();

    let rendered: Vec<bool> = (0..4)
        .map(|_| !renderer.render_shadow_pass(&[]).unwrap().rendered.is_empty())
        .collect();

    // Frame 1 always renders, then every second frame
    assert_eq!(rendered, vec![true, true, false, true]);
    assert_eq!(renderer.stats().frames, 4);
}
