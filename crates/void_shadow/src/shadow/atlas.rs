//! Layer allocation for the shared shadow texture
//!
//! Every shadow-casting light owns one layer of the texture array. The atlas
//! only hands out indices; GPU memory belongs to the texture.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Light identifier, usually the light entity's id
pub type LightId = u64;

/// Hands out texture layers to lights, lowest free layer first
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShadowAtlas {
    layer_count: u32,
    by_light: BTreeMap<LightId, ShadowAllocation>,
    // Kept sorted descending so `pop` yields the lowest layer
    free: Vec<u32>,
    frame: u64,
    stats: AtlasStats,
}

impl ShadowAtlas {
    pub fn new(layer_count: u32) -> Self {
        Self {
            layer_count,
            by_light: BTreeMap::new(),
            free: (0..layer_count).rev().collect(),
            frame: 0,
            stats: AtlasStats::default(),
        }
    }

    pub fn begin_frame(&mut self) {
        self.frame += 1;
    }

    /// Layer for `light_id`, reusing its current one if it has one.
    ///
    /// `None` when every layer is taken.
    pub fn allocate(&mut self, light_id: LightId) -> Option<ShadowAllocation> {
        let frame = self.frame;
        if let Some(existing) = self.by_light.get_mut(&light_id) {
            existing.last_frame = frame;
            return Some(*existing);
        }

        let Some(layer) = self.free.pop() else {
            self.stats.failed_allocations += 1;
            return None;
        };

        let allocation = ShadowAllocation {
            layer,
            light_id,
            first_frame: frame,
            last_frame: frame,
        };
        self.by_light.insert(light_id, allocation);
        self.stats.total_allocations += 1;
        Some(allocation)
    }

    /// Mark the light's layer as used in the current frame
    pub fn touch(&mut self, light_id: LightId) {
        let frame = self.frame;
        if let Some(allocation) = self.by_light.get_mut(&light_id) {
            allocation.last_frame = frame;
        }
    }

    pub fn deallocate(&mut self, light_id: LightId) -> Option<ShadowAllocation> {
        let allocation = self.by_light.remove(&light_id)?;
        let at = self.free.partition_point(|&layer| layer > allocation.layer);
        self.free.insert(at, allocation.layer);
        self.stats.total_deallocations += 1;
        Some(allocation)
    }

    pub fn get(&self, light_id: LightId) -> Option<&ShadowAllocation> {
        self.by_light.get(&light_id)
    }

    pub fn contains(&self, light_id: LightId) -> bool {
        self.by_light.contains_key(&light_id)
    }

    /// Lights not touched for more than `max_age` frames
    pub fn stale_lights(&self, max_age: u64) -> Vec<LightId> {
        self.by_light
            .values()
            .filter(|a| self.frame.saturating_sub(a.last_frame) > max_age)
            .map(|a| a.light_id)
            .collect()
    }

    /// Free the layers of stale lights and return who lost theirs
    pub fn cleanup(&mut self, max_age: u64) -> Vec<LightId> {
        let stale = self.stale_lights(max_age);
        for &light_id in &stale {
            self.deallocate(light_id);
        }
        stale
    }

    pub fn layer_count(&self) -> u32 {
        self.layer_count
    }

    pub fn allocated_count(&self) -> usize {
        self.by_light.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    /// Fraction of layers in use
    pub fn utilization(&self) -> f32 {
        match self.layer_count {
            0 => 0.0,
            n => self.by_light.len() as f32 / n as f32,
        }
    }

    pub fn stats(&self) -> &AtlasStats {
        &self.stats
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn save_state(&self) -> ShadowAtlasState {
        ShadowAtlasState {
            layer_count: self.layer_count,
            allocations: self.by_light.values().copied().collect(),
            frame: self.frame,
        }
    }

    /// Rebuild from saved state. Allocations that no longer fit in
    /// `state.layer_count` are dropped with a warning.
    pub fn restore_state(&mut self, state: ShadowAtlasState) {
        let mut restored = Self::new(state.layer_count);
        restored.frame = state.frame;

        for allocation in state.allocations {
            let slot = restored.free.iter().position(|&l| l == allocation.layer);
            match slot {
                Some(index) => {
                    restored.free.remove(index);
                    restored.by_light.insert(allocation.light_id, allocation);
                }
                None => log::warn!(
                    "Dropping shadow layer {} of light {}: not available after restore",
                    allocation.layer,
                    allocation.light_id
                ),
            }
        }

        restored.stats = self.stats.clone();
        *self = restored;
    }
}

/// Layer owned by one light
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowAllocation {
    pub layer: u32,
    pub light_id: LightId,
    pub first_frame: u64,
    pub last_frame: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AtlasStats {
    pub total_allocations: u64,
    pub total_deallocations: u64,
    /// Requests refused because every layer was taken
    pub failed_allocations: u64,
}

/// Serializable snapshot of an atlas
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShadowAtlasState {
    pub layer_count: u32,
    pub allocations: Vec<ShadowAllocation>,
    pub frame: u64,
}
