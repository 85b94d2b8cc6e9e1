//! Materials used by render targets
//!
//! A [`ShaderData`] is a compiled program plus its uniform set. Materials are
//! owned by the lighting subsystem through a [`MaterialLibrary`] and shared
//! with shadow maps as `Arc<ShaderData>`, so a shadow map can never outlive
//! the material it draws with.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use glam::Mat4;
use parking_lot::RwLock;

use crate::backend::GraphicsBackend;
use crate::error::{BindingError, RenderResult};
use crate::resource::{CompareFunction, ProgramId};
use crate::shadow::LightShadowSettings;

pub const U_LIGHT_VIEW_PROJECTION: &str = "u_light_view_projection";
pub const U_DEPTH_BIAS: &str = "u_depth_bias";
pub const U_SLOPE_BIAS: &str = "u_slope_bias";
pub const U_NORMAL_BIAS: &str = "u_normal_bias";
pub const U_DEPTH_COMPARE: &str = "u_depth_compare";

/// Compiled shader program
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderProgram {
    pub name: String,
    pub id: ProgramId,
}

impl ShaderProgram {
    pub fn new(name: impl Into<String>, id: ProgramId) -> Self {
        Self {
            name: name.into(),
            id,
        }
    }
}

/// Value of a single uniform
#[derive(Clone, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec4([f32; 4]),
    Mat4([[f32; 4]; 4]),
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<Mat4> for UniformValue {
    fn from(m: Mat4) -> Self {
        Self::Mat4(m.to_cols_array_2d())
    }
}

/// Shader program plus uniform state
pub struct ShaderData {
    name: String,
    program: Option<ShaderProgram>,
    uniforms: RwLock<BTreeMap<String, UniformValue>>,
}

impl ShaderData {
    /// Create a material for a compiled program
    pub fn new(name: impl Into<String>, program: ShaderProgram) -> Self {
        Self {
            name: name.into(),
            program: Some(program),
            uniforms: RwLock::new(BTreeMap::new()),
        }
    }

    /// Material whose program has not been compiled (or failed to compile)
    pub fn without_program(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: None,
            uniforms: RwLock::new(BTreeMap::new()),
        }
    }

    /// Depth-only material for a light's shadow pass
    pub fn shadow_depth(program: ShaderProgram, settings: &LightShadowSettings) -> Self {
        let material = Self::new(format!("{} (shadow)", program.name), program);
        material.set_uniform(U_LIGHT_VIEW_PROJECTION, Mat4::IDENTITY);
        material.apply_shadow_settings(settings);
        material
    }

    /// Refresh bias and comparison uniforms from light settings
    pub fn apply_shadow_settings(&self, settings: &LightShadowSettings) {
        let mut uniforms = self.uniforms.write();
        uniforms.insert(U_DEPTH_BIAS.into(), settings.depth_bias.into());
        uniforms.insert(U_SLOPE_BIAS.into(), settings.slope_bias.into());
        uniforms.insert(U_NORMAL_BIAS.into(), settings.normal_bias.into());
        uniforms.insert(U_DEPTH_COMPARE.into(), settings.compare.code().into());
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> Option<&ShaderProgram> {
        self.program.as_ref()
    }

    /// A material can be used once its program exists
    pub fn is_ready(&self) -> bool {
        self.program.is_some()
    }

    pub fn set_uniform(&self, name: &str, value: impl Into<UniformValue>) {
        self.uniforms.write().insert(name.to_owned(), value.into());
    }

    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms.read().get(name).cloned()
    }

    pub fn uniform_count(&self) -> usize {
        self.uniforms.read().len()
    }

    /// Make this material current on the backend: program first, then every
    /// uniform in name order.
    pub fn bind(&self, backend: &mut dyn GraphicsBackend) -> RenderResult<()> {
        let program = self
            .program
            .as_ref()
            .ok_or_else(|| BindingError::MaterialNotReady(self.name.clone()))?;

        backend.use_program(program.id)?;
        for (name, value) in self.uniforms.read().iter() {
            backend.set_uniform(program.id, name, value);
        }
        Ok(())
    }
}

impl fmt::Debug for ShaderData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderData")
            .field("name", &self.name)
            .field("program", &self.program)
            .field("uniforms", &self.uniform_count())
            .finish()
    }
}

/// Generational handle into a [`MaterialLibrary`]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MaterialHandle {
    index: u32,
    generation: u32,
}

impl MaterialHandle {
    /// Handle that never resolves
    pub const fn null() -> Self {
        Self {
            index: u32::MAX,
            generation: u32::MAX,
        }
    }

    pub const fn is_null(&self) -> bool {
        self.index == u32::MAX
    }

    pub const fn index(&self) -> u32 {
        self.index
    }

    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

impl Default for MaterialHandle {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Debug for MaterialHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "MaterialHandle(null)")
        } else {
            write!(f, "MaterialHandle({}v{})", self.index, self.generation)
        }
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    material: Option<Arc<ShaderData>>,
}

/// Owner of the materials created by the lighting subsystem
///
/// Removing a material bumps its slot generation so stale handles stop
/// resolving. Shadow maps that already hold the `Arc` keep it alive.
#[derive(Debug, Default)]
pub struct MaterialLibrary {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
}

impl MaterialLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, material: ShaderData) -> MaterialHandle {
        let material = Some(Arc::new(material));

        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.material = material;
            return MaterialHandle {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            material,
        });
        MaterialHandle {
            index,
            generation: 0,
        }
    }

    pub fn get(&self, handle: MaterialHandle) -> Option<&Arc<ShaderData>> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.material.as_ref()
    }

    pub fn contains(&self, handle: MaterialHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn remove(&mut self, handle: MaterialHandle) -> Option<Arc<ShaderData>> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }

        let material = slot.material.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index);
        Some(material)
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
