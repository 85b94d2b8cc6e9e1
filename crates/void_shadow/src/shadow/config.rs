//! Shadow settings
//!
//! [`ShadowConfig`] describes the shared shadow texture; [`LightShadowSettings`]
//! is what each light feeds into its depth material and GPU record. Both load
//! from partial files, missing fields keep their defaults.

use serde::{Deserialize, Serialize};

use crate::resource::{CompareFunction, TextureFormat};

/// Shared shadow texture and filtering setup
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    pub enabled: bool,

    /// Width and height of every layer, in texels
    pub resolution: u32,

    /// Layer count of the texture array, i.e. the most lights that can cast
    /// shadows at once
    pub max_shadow_maps: u32,

    pub depth_format: TextureFormat,

    /// Side of the PCF kernel the main pass uses (odd)
    pub pcf_filter_size: u32,

    /// Evict a light whose layer went unused this many frames (0 disables)
    pub stale_after_frames: u64,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            resolution: 2048,
            max_shadow_maps: 16,
            depth_format: TextureFormat::Depth32Float,
            pcf_filter_size: 3,
            stale_after_frames: 0,
        }
    }
}

impl ShadowConfig {
    pub fn high_quality() -> Self {
        Self {
            resolution: 4096,
            max_shadow_maps: 32,
            pcf_filter_size: 5,
            ..Self::default()
        }
    }

    /// Half resolution, 16-bit depth, no filtering
    pub fn low_quality() -> Self {
        Self {
            resolution: 1024,
            max_shadow_maps: 8,
            depth_format: TextureFormat::Depth16Unorm,
            pcf_filter_size: 1,
            ..Self::default()
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Force every field into a range the renderer can allocate
    pub fn validate(&mut self) {
        self.resolution = self.resolution.clamp(256, 8192).next_power_of_two();
        self.max_shadow_maps = self.max_shadow_maps.clamp(1, super::MAX_SHADOW_LIGHTS as u32);
        self.pcf_filter_size = match self.pcf_filter_size {
            0 | 1 => 1,
            n if n >= 7 => 7,
            n => n | 1,
        };
        if !self.depth_format.is_depth() {
            log::warn!(
                "{:?} cannot back a shadow map, falling back to Depth32Float",
                self.depth_format
            );
            self.depth_format = TextureFormat::Depth32Float;
        }
    }

    /// Bytes the shadow texture will occupy
    pub fn texture_bytes(&self) -> u64 {
        let texels = self.resolution as u64 * self.resolution as u64;
        texels * self.depth_format.bytes_per_pixel() as u64 * self.max_shadow_maps as u64
    }
}

/// Per-light bias, clip planes and refresh policy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightShadowSettings {
    /// Constant depth offset against acne
    pub depth_bias: f32,
    pub slope_bias: f32,
    /// Offset along the surface normal when sampling
    pub normal_bias: f32,

    pub near_plane: f32,
    pub far_plane: f32,

    pub compare: CompareFunction,
    pub update_mode: ShadowUpdateMode,

    /// 0 leaves the light unshadowed, 1 is full occlusion
    pub strength: f32,
}

impl Default for LightShadowSettings {
    fn default() -> Self {
        Self {
            depth_bias: 0.005,
            slope_bias: 2.0,
            normal_bias: 0.02,
            near_plane: 0.1,
            far_plane: 100.0,
            compare: CompareFunction::LessEqual,
            update_mode: ShadowUpdateMode::default(),
            strength: 1.0,
        }
    }
}

impl LightShadowSettings {
    /// Orthographic sun: less bias, the depth range is linear
    pub fn directional() -> Self {
        Self {
            depth_bias: 0.002,
            slope_bias: 1.5,
            normal_bias: 0.01,
            ..Self::default()
        }
    }

    pub fn spot() -> Self {
        Self::default()
    }

    pub fn point() -> Self {
        Self {
            depth_bias: 0.01,
            slope_bias: 3.0,
            normal_bias: 0.03,
            near_plane: 0.05,
            ..Self::default()
        }
    }

    /// Clamped to 0..=1
    pub fn with_strength(mut self, strength: f32) -> Self {
        self.strength = strength.clamp(0.0, 1.0);
        self
    }

    pub fn with_update_mode(mut self, update_mode: ShadowUpdateMode) -> Self {
        self.update_mode = update_mode;
        self
    }

    pub fn with_depth_bias(mut self, depth_bias: f32) -> Self {
        self.depth_bias = depth_bias;
        self
    }
}

/// When a light's shadow map is re-rendered
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShadowUpdateMode {
    #[default]
    EveryFrame,
    /// On frames divisible by N
    Interval(u32),
    /// After the light camera changed or the light was flagged
    OnChange,
    /// Once
    Static,
}

impl ShadowUpdateMode {
    /// Whether the map needs a pass in `frame`.
    ///
    /// A map that was never rendered always needs one.
    pub fn should_update(&self, frame: u64, rendered_before: bool, changed: bool) -> bool {
        if !rendered_before {
            return true;
        }
        match *self {
            Self::EveryFrame => true,
            Self::Interval(n) => frame % u64::from(n.max(1)) == 0,
            Self::OnChange => changed,
            Self::Static => false,
        }
    }
}

/// User-facing quality level
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShadowQuality {
    Off,
    Low,
    Medium,
    High,
}

impl ShadowQuality {
    pub fn to_config(self) -> ShadowConfig {
        match self {
            Self::Off => ShadowConfig::disabled(),
            Self::Low => ShadowConfig::low_quality(),
            Self::Medium => ShadowConfig::default(),
            Self::High => ShadowConfig::high_quality(),
        }
    }
}
