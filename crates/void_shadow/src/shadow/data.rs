//! Per-light shadow records for the main pass
//!
//! Laid out for a std140 uniform/storage buffer and uploaded as raw bytes.

use serde::{Deserialize, Serialize};

use super::map::NO_LAYER;

/// Maximum shadow-casting lights in one shadow buffer
pub const MAX_SHADOW_LIGHTS: usize = 64;

/// GPU shadow data for a single light
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuShadowLight {
    /// World to light clip space
    pub matrix: [[f32; 4]; 4],

    /// Shadow texture layer, -1 when the light has no valid shadow this frame
    pub layer: i32,

    /// Constant depth bias
    pub bias: f32,

    /// Normal bias
    pub normal_bias: f32,

    /// Shadow strength (0-1)
    pub strength: f32,

    /// 1 / layer resolution, PCF tap spacing
    pub texel_size: f32,

    /// PCF kernel size
    pub pcf_filter_size: u32,

    pub _padding: [u32; 2],
}

impl GpuShadowLight {
    /// Shadow record the shader treats as unshadowed
    pub fn disabled() -> Self {
        Self {
            layer: NO_LAYER,
            ..Default::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.layer >= 0
    }
}

/// Shadow records for every light, in light id order
#[derive(Clone, Debug, Default)]
pub struct ShadowBuffer {
    lights: Vec<GpuShadowLight>,
}

impl ShadowBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a light record. Returns false once the buffer is full.
    pub fn push(&mut self, light: GpuShadowLight) -> bool {
        if self.lights.len() >= MAX_SHADOW_LIGHTS {
            log::warn!("Shadow buffer full, dropping light record");
            return false;
        }
        self.lights.push(light);
        true
    }

    pub fn lights(&self) -> &[GpuShadowLight] {
        &self.lights
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    pub fn enabled_count(&self) -> usize {
        self.lights.iter().filter(|l| l.is_enabled()).count()
    }

    /// Raw bytes for upload
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.lights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_shadow_light_layout() {
        assert_eq!(std::mem::size_of::<GpuShadowLight>(), 96);
        assert_eq!(std::mem::size_of::<GpuShadowLight>() % 16, 0);
    }

    #[test]
    fn test_disabled_light() {
        let light = GpuShadowLight::disabled();
        assert!(!light.is_enabled());
        assert_eq!(light.layer, -1);
    }

    #[test]
    fn test_buffer_bytes() {
        let mut buffer = ShadowBuffer::new();
        buffer.push(GpuShadowLight {
            layer: 2,
            ..Default::default()
        });
        buffer.push(GpuShadowLight::disabled());

        assert_eq!(buffer.enabled_count(), 1);
        assert_eq!(buffer.as_bytes().len(), 2 * std::mem::size_of::<GpuShadowLight>());
    }

    #[test]
    fn test_buffer_capacity() {
        let mut buffer = ShadowBuffer::new();
        for _ in 0..MAX_SHADOW_LIGHTS {
            assert!(buffer.push(GpuShadowLight::disabled()));
        }
        assert!(!buffer.push(GpuShadowLight::disabled()));
        assert_eq!(buffer.len(), MAX_SHADOW_LIGHTS);
    }
}
