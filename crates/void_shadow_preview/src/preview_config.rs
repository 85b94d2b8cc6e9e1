//! Preview configuration
//!
//! Read from the first existing file in the search path, then overridden by
//! environment variables:
//!
//! - `VOID_SHADOW_PREVIEW_FRAMES`: number of frames to run
//! - `VOID_SHADOW_QUALITY`: `off`, `low`, `medium` or `high`

use std::path::Path;

use serde::{Deserialize, Serialize};
use void_shadow::prelude::*;

const SEARCH_PATHS: &[&str] = &["shadow-preview.toml", "config/shadow-preview.toml"];

/// Kind of light in the demo scene
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewLightKind {
    Directional,
    Spot,
}

/// One shadow-casting light of the demo scene
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewLight {
    pub id: LightId,
    pub kind: PreviewLightKind,
    pub position: [f32; 3],
    pub direction: [f32; 3],
    /// Ortho half-extent for directional lights
    pub extent: f32,
    /// Vertical field of view in degrees for spot lights
    pub fov_degrees: f32,
    pub settings: LightShadowSettings,
}

impl Default for PreviewLight {
    fn default() -> Self {
        Self {
            id: 0,
            kind: PreviewLightKind::Directional,
            position: [0.0, 20.0, 0.0],
            direction: [-0.3, -1.0, -0.2],
            extent: 30.0,
            fov_degrees: 60.0,
            settings: LightShadowSettings::directional(),
        }
    }
}

impl PreviewLight {
    /// Light-space camera for this light
    pub fn camera(&self) -> Camera {
        let direction = Vec3::from(self.direction);
        match self.kind {
            PreviewLightKind::Directional => Camera::directional_light(direction, Vec3::ZERO, self.extent),
            PreviewLightKind::Spot => Camera::spot_light(
                Vec3::from(self.position),
                direction,
                self.fov_degrees.to_radians(),
                self.settings.near_plane,
                self.settings.far_plane,
            ),
        }
    }
}

/// Preview configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Frames to run before exiting
    pub frames: u32,

    /// Caster grid is `grid_size` x `grid_size` cubes
    pub grid_size: u32,

    /// Frames of backtrace logged on panic
    pub crash_trace_frames: usize,

    /// Re-aim the first light every N frames (0 = never)
    pub orbit_every: u32,

    pub shadows: ShadowConfig,

    pub lights: Vec<PreviewLight>,

    /// Path the config was loaded from
    #[serde(skip)]
    pub config_path: Option<String>,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            frames: 8,
            grid_size: 4,
            crash_trace_frames: DEFAULT_MAX_FRAMES,
            orbit_every: 2,
            shadows: ShadowConfig {
                resolution: 1024,
                max_shadow_maps: 4,
                ..Default::default()
            },
            lights: vec![
                PreviewLight {
                    id: 1,
                    ..Default::default()
                },
                PreviewLight {
                    id: 2,
                    kind: PreviewLightKind::Spot,
                    position: [6.0, 8.0, 6.0],
                    direction: [-1.0, -1.2, -1.0],
                    settings: LightShadowSettings::spot().with_update_mode(ShadowUpdateMode::OnChange),
                    ..Default::default()
                },
            ],
            config_path: None,
        }
    }
}

impl PreviewConfig {
    /// Load from the search path and environment
    pub fn load() -> Self {
        let mut config = SEARCH_PATHS
            .iter()
            .find_map(|path| match Self::load_from_file(path) {
                Ok(mut loaded) => {
                    log::info!("Loaded preview config from {}", path);
                    loaded.config_path = Some(path.to_string());
                    Some(loaded)
                }
                Err(e) => {
                    if Path::new(path).exists() {
                        log::warn!("Ignoring {}: {}", path, e);
                    }
                    None
                }
            })
            .unwrap_or_default();

        if let Ok(frames) = std::env::var("VOID_SHADOW_PREVIEW_FRAMES") {
            match frames.parse() {
                Ok(n) => config.frames = n,
                Err(_) => log::warn!("VOID_SHADOW_PREVIEW_FRAMES is not a number: {}", frames),
            }
        }

        if let Ok(quality) = std::env::var("VOID_SHADOW_QUALITY") {
            match parse_quality(&quality) {
                Some(q) => {
                    config.shadows = q.to_config();
                    log::info!("Shadow quality from env: {:?}", q);
                }
                None => log::warn!("Unknown VOID_SHADOW_QUALITY: {}", quality),
            }
        }

        config
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(toml::from_str(content)?)
    }

    pub fn print_summary(&self) {
        log::info!("Preview configuration:");
        log::info!("  Source: {}", self.config_path.as_deref().unwrap_or("defaults"));
        log::info!("  Frames: {}", self.frames);
        log::info!("  Casters: {}", self.grid_size * self.grid_size + 1);
        log::info!(
            "  Shadows: {} ({} layer(s) at {}px, {:.1} MiB)",
            if self.shadows.enabled { "on" } else { "off" },
            self.shadows.max_shadow_maps,
            self.shadows.resolution,
            self.shadows.texture_bytes() as f64 / (1024.0 * 1024.0)
        );
        log::info!("  Lights: {}", self.lights.len());
    }
}

fn parse_quality(s: &str) -> Option<ShadowQuality> {
    match s.to_lowercase().as_str() {
        "off" | "none" => Some(ShadowQuality::Off),
        "low" => Some(ShadowQuality::Low),
        "medium" => Some(ShadowQuality::Medium),
        "high" => Some(ShadowQuality::High),
        _ => None,
    }
}
