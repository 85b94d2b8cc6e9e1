//! Graphics backend abstraction
//!
//! The render targets never talk to a GPU API directly. Everything they need
//! from the graphics context (allocate an image, bind a framebuffer, set the
//! viewport, use a material) goes through [`GraphicsBackend`].
//!
//! [`HeadlessBackend`] is the backend used for tooling and tests: it keeps
//! track of the objects it created and records every command into a shared
//! [`CommandRecorder`] that can be inspected after a pass.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{BindingError, RenderError, RenderResult};
use crate::framebuffer::FramebufferStatus;
use crate::material::UniformValue;
use crate::resource::{
    ClearValues, DepthState, FramebufferId, MeshId, ProgramId, TextureDesc, TextureId, Viewport,
};

/// Framebuffer creation parameters
#[derive(Clone, Debug, PartialEq)]
pub struct FramebufferDesc {
    pub label: String,
    pub depth_attachment: Option<TextureId>,
    pub color_attachment: Option<TextureId>,
}

/// A single indexed draw
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawCall {
    pub mesh: MeshId,
    pub index_count: u32,
    pub model_view_projection: [[f32; 4]; 4],
}

/// Surface of the graphics context used by render targets
pub trait GraphicsBackend: Send {
    /// Human-readable backend name
    fn name(&self) -> &'static str;

    fn create_texture(&mut self, desc: &TextureDesc) -> RenderResult<TextureId>;

    fn destroy_texture(&mut self, id: TextureId);

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> RenderResult<FramebufferId>;

    fn destroy_framebuffer(&mut self, id: FramebufferId);

    /// Completeness check, the equivalent of `glCheckFramebufferStatus`
    fn framebuffer_status(&self, id: FramebufferId) -> FramebufferStatus;

    /// Bind a framebuffer for drawing.
    ///
    /// `layer` attaches a single slice of a layered attachment; `None` binds
    /// the attachment as a whole.
    fn bind_framebuffer(&mut self, id: FramebufferId, layer: Option<u32>) -> RenderResult<()>;

    /// Restore the default framebuffer
    fn unbind_framebuffer(&mut self);

    fn set_viewport(&mut self, viewport: Viewport);

    fn set_depth_state(&mut self, state: DepthState);

    fn clear(&mut self, values: ClearValues);

    fn use_program(&mut self, program: ProgramId) -> RenderResult<()>;

    fn set_uniform(&mut self, program: ProgramId, name: &str, value: &UniformValue);

    fn draw(&mut self, call: &DrawCall);
}

/// Command recorded by the headless backend
#[derive(Clone, Debug, PartialEq)]
pub enum BackendCommand {
    CreateTexture { id: TextureId, label: String, layers: u32 },
    DestroyTexture(TextureId),
    CreateFramebuffer { id: FramebufferId, label: String },
    DestroyFramebuffer(FramebufferId),
    BindFramebuffer { id: FramebufferId, layer: Option<u32> },
    UnbindFramebuffer,
    SetViewport(Viewport),
    SetDepthState(DepthState),
    Clear(ClearValues),
    UseProgram(ProgramId),
    SetUniform { program: ProgramId, name: String, value: UniformValue },
    Draw(DrawCall),
}

/// Shared, cloneable command log
#[derive(Clone, Debug, Default)]
pub struct CommandRecorder {
    commands: Arc<Mutex<Vec<BackendCommand>>>,
}

impl CommandRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, command: BackendCommand) {
        self.commands.lock().push(command);
    }

    /// Snapshot of every recorded command
    pub fn commands(&self) -> Vec<BackendCommand> {
        self.commands.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.commands.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.commands.lock().clear();
    }

    /// Framebuffer and layer of the most recent bind, `None` if the last
    /// framebuffer operation was an unbind
    pub fn bound_framebuffer(&self) -> Option<(FramebufferId, Option<u32>)> {
        self.commands.lock().iter().rev().find_map(|c| match c {
            BackendCommand::BindFramebuffer { id, layer } => Some(Some((*id, *layer))),
            BackendCommand::UnbindFramebuffer => Some(None),
            _ => None,
        })?
    }

    /// Program selected by the most recent `UseProgram`
    pub fn active_program(&self) -> Option<ProgramId> {
        self.commands.lock().iter().rev().find_map(|c| match c {
            BackendCommand::UseProgram(program) => Some(*program),
            _ => None,
        })
    }

    /// Most recent value uploaded for a uniform
    pub fn last_uniform(&self, name: &str) -> Option<UniformValue> {
        self.commands.lock().iter().rev().find_map(|c| match c {
            BackendCommand::SetUniform { name: n, value, .. } if n == name => Some(value.clone()),
            _ => None,
        })
    }

    pub fn draw_count(&self) -> usize {
        self.commands
            .lock()
            .iter()
            .filter(|c| matches!(c, BackendCommand::Draw(_)))
            .count()
    }
}

#[derive(Clone, Debug)]
struct FramebufferRecord {
    desc: FramebufferDesc,
}

/// Backend without a GPU, for tests and offline tooling
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    recorder: CommandRecorder,
    next_id: u64,
    textures: BTreeMap<TextureId, TextureDesc>,
    framebuffers: BTreeMap<FramebufferId, FramebufferRecord>,
    fail_texture_allocation: bool,
    fail_framebuffer_allocation: bool,
    forced_status: Option<FramebufferStatus>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Command log shared with this backend
    pub fn recorder(&self) -> CommandRecorder {
        self.recorder.clone()
    }

    /// Make every texture allocation fail (simulates out of GPU memory)
    pub fn with_failing_texture_allocation(mut self) -> Self {
        self.fail_texture_allocation = true;
        self
    }

    /// Make every framebuffer allocation fail
    pub fn with_failing_framebuffer_allocation(mut self) -> Self {
        self.fail_framebuffer_allocation = true;
        self
    }

    /// Report `status` for every framebuffer instead of checking attachments
    pub fn with_framebuffer_status(mut self, status: FramebufferStatus) -> Self {
        self.forced_status = Some(status);
        self
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn attachment_layers(&self, id: FramebufferId) -> Option<u32> {
        let record = self.framebuffers.get(&id)?;
        let texture = record.desc.depth_attachment.or(record.desc.color_attachment)?;
        self.textures.get(&texture).map(|desc| desc.layers)
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn name(&self) -> &'static str {
        "Headless"
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> RenderResult<TextureId> {
        if self.fail_texture_allocation {
            return Err(RenderError::FatalResource(format!(
                "out of memory allocating texture '{}'",
                desc.label
            )));
        }

        let id = TextureId(self.next_id());
        self.textures.insert(id, desc.clone());
        self.recorder.push(BackendCommand::CreateTexture {
            id,
            label: desc.label.clone(),
            layers: desc.layers,
        });
        Ok(id)
    }

    fn destroy_texture(&mut self, id: TextureId) {
        if self.textures.remove(&id).is_some() {
            self.recorder.push(BackendCommand::DestroyTexture(id));
        }
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> RenderResult<FramebufferId> {
        if self.fail_framebuffer_allocation {
            return Err(RenderError::FatalResource(format!(
                "cannot create framebuffer '{}'",
                desc.label
            )));
        }

        let id = FramebufferId(self.next_id());
        self.framebuffers.insert(id, FramebufferRecord { desc: desc.clone() });
        self.recorder.push(BackendCommand::CreateFramebuffer {
            id,
            label: desc.label.clone(),
        });
        Ok(id)
    }

    fn destroy_framebuffer(&mut self, id: FramebufferId) {
        if self.framebuffers.remove(&id).is_some() {
            self.recorder.push(BackendCommand::DestroyFramebuffer(id));
        }
    }

    fn framebuffer_status(&self, id: FramebufferId) -> FramebufferStatus {
        if let Some(status) = self.forced_status {
            return status;
        }

        let Some(record) = self.framebuffers.get(&id) else {
            return FramebufferStatus::MissingAttachment;
        };

        let attachments = [record.desc.depth_attachment, record.desc.color_attachment];
        if attachments.iter().all(Option::is_none) {
            return FramebufferStatus::MissingAttachment;
        }
        if attachments
            .iter()
            .flatten()
            .any(|texture| !self.textures.contains_key(texture))
        {
            return FramebufferStatus::IncompleteAttachment;
        }
        FramebufferStatus::Complete
    }

    fn bind_framebuffer(&mut self, id: FramebufferId, layer: Option<u32>) -> RenderResult<()> {
        let status = self.framebuffer_status(id);
        if !status.is_complete() {
            let label = self
                .framebuffers
                .get(&id)
                .map(|r| r.desc.label.clone())
                .unwrap_or_else(|| format!("framebuffer {}", id.0));
            return Err(BindingError::IncompleteFramebuffer { label, status }.into());
        }

        if let Some(layer) = layer {
            let layer_count = self.attachment_layers(id).unwrap_or(0);
            if layer >= layer_count {
                return Err(BindingError::LayerOutOfRange { layer, layer_count }.into());
            }
        }

        self.recorder.push(BackendCommand::BindFramebuffer { id, layer });
        Ok(())
    }

    fn unbind_framebuffer(&mut self) {
        self.recorder.push(BackendCommand::UnbindFramebuffer);
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.recorder.push(BackendCommand::SetViewport(viewport));
    }

    fn set_depth_state(&mut self, state: DepthState) {
        self.recorder.push(BackendCommand::SetDepthState(state));
    }

    fn clear(&mut self, values: ClearValues) {
        self.recorder.push(BackendCommand::Clear(values));
    }

    fn use_program(&mut self, program: ProgramId) -> RenderResult<()> {
        self.recorder.push(BackendCommand::UseProgram(program));
        Ok(())
    }

    fn set_uniform(&mut self, program: ProgramId, name: &str, value: &UniformValue) {
        self.recorder.push(BackendCommand::SetUniform {
            program,
            name: name.to_owned(),
            value: value.clone(),
        });
    }

    fn draw(&mut self, call: &DrawCall) {
        self.recorder.push(BackendCommand::Draw(*call));
    }
}
