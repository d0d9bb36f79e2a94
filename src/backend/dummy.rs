//! Dummy backend for testing and headless runs.
//!
//! This backend doesn't touch a GPU. It hands out handles, remembers the
//! descriptors it was given and records every render pass of the current
//! frame so tests can inspect what the pipeline submitted.

use crate::backend::traits::*;
use crate::backend::types::*;
use std::collections::HashMap;
use std::ops::Range;

/// A command recorded inside a render pass
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    SetProgram(ProgramHandle),
    SetUniforms(Vec<u8>),
    SetTexture {
        unit: u32,
        view: TextureViewHandle,
        sampler: SamplerHandle,
    },
    SetVertexBuffer {
        slot: u32,
        buffer: BufferHandle,
    },
    DisableVertexAttribute {
        slot: u32,
    },
    SetViewport {
        width: f32,
        height: f32,
    },
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
}

/// A finished render pass with its commands in submission order
#[derive(Debug, Clone)]
pub struct RecordedPass {
    pub descriptor: RenderPassDescriptor,
    pub commands: Vec<RecordedCommand>,
}

impl RecordedPass {
    pub fn label(&self) -> &str {
        self.descriptor.label.as_deref().unwrap_or("")
    }

    /// Programs made current in this pass, in order
    pub fn programs(&self) -> Vec<ProgramHandle> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                RecordedCommand::SetProgram(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, RecordedCommand::Draw { .. }))
            .count()
    }

    /// Uniform snapshot active at each draw
    pub fn uniforms_per_draw(&self) -> Vec<Vec<u8>> {
        let mut current = Vec::new();
        let mut out = Vec::new();
        for command in &self.commands {
            match command {
                RecordedCommand::SetUniforms(data) => current = data.clone(),
                RecordedCommand::Draw { .. } => out.push(current.clone()),
                _ => {}
            }
        }
        out
    }
}

/// Recording dummy backend.
#[derive(Debug)]
pub struct DummyBackend {
    width: u32,
    height: u32,
    next_id: u64,
    buffers: HashMap<u64, u64>,
    textures: HashMap<u64, TextureDescriptor>,
    views: HashMap<u64, TextureHandle>,
    samplers: HashMap<u64, SamplerDescriptor>,
    programs: HashMap<u64, ProgramDescriptor>,
    textures_created: usize,
    buffers_created: usize,
    pending_pass: Option<RecordedPass>,
    frame_passes: Vec<RecordedPass>,
    last_frame: Vec<RecordedPass>,
    frames_presented: u64,
}

impl DummyBackend {
    /// Create a new dummy backend with a virtual surface of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            next_id: 1,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            views: HashMap::new(),
            samplers: HashMap::new(),
            programs: HashMap::new(),
            textures_created: 0,
            buffers_created: 0,
            pending_pass: None,
            frame_passes: Vec::new(),
            last_frame: Vec::new(),
            frames_presented: 0,
        }
    }

    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn record(&mut self, command: RecordedCommand) {
        match self.pending_pass.as_mut() {
            Some(pass) => pass.commands.push(command),
            None => log::warn!("DummyBackend: {:?} recorded outside a render pass", command),
        }
    }

    /// Passes of the last presented frame
    pub fn last_frame(&self) -> &[RecordedPass] {
        &self.last_frame
    }

    /// Passes recorded so far in the frame in flight
    pub fn current_frame(&self) -> &[RecordedPass] {
        &self.frame_passes
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Total number of textures ever created
    pub fn textures_created(&self) -> usize {
        self.textures_created
    }

    /// Total number of buffers ever created
    pub fn buffers_created(&self) -> usize {
        self.buffers_created
    }

    /// Number of buffers still alive
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_views(&self) -> usize {
        self.views.len()
    }

    pub fn texture_descriptor(&self, texture: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&texture.0)
    }

    /// Descriptor of the texture a view was created from
    pub fn view_descriptor(&self, view: TextureViewHandle) -> Option<&TextureDescriptor> {
        let texture = self.views.get(&view.0)?;
        self.textures.get(&texture.0)
    }

    pub fn sampler_descriptor(&self, sampler: SamplerHandle) -> Option<&SamplerDescriptor> {
        self.samplers.get(&sampler.0)
    }

    pub fn program_descriptor(&self, program: ProgramHandle) -> Option<&ProgramDescriptor> {
        self.programs.get(&program.0)
    }

    pub fn buffer_size(&self, buffer: BufferHandle) -> Option<u64> {
        self.buffers.get(&buffer.0).copied()
    }
}

impl GraphicsBackend for DummyBackend {
    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.width = width;
            self.height = height;
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn begin_frame(&mut self) -> BackendResult<FrameContext> {
        self.frame_passes.clear();
        let view = self.allocate_id();
        log::trace!("DummyBackend: begin frame {}", self.frames_presented);
        Ok(FrameContext {
            swapchain_view: TextureViewHandle(view),
            width: self.width,
            height: self.height,
        })
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        if self.pending_pass.is_some() {
            log::warn!("DummyBackend: frame ended inside a render pass");
            self.end_render_pass();
        }
        self.last_frame = std::mem::take(&mut self.frame_passes);
        self.frames_presented += 1;
        Ok(())
    }

    fn swapchain_format(&self) -> TextureFormat {
        TextureFormat::Bgra8UnormSrgb
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            desc.label,
            data.len()
        );
        let id = self.allocate_id();
        self.buffers.insert(id, data.len() as u64);
        self.buffers_created += 1;
        Ok(BufferHandle(id))
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{}, {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.format
        );
        let id = self.allocate_id();
        self.textures.insert(id, desc.clone());
        self.textures_created += 1;
        Ok(TextureHandle(id))
    }

    fn create_texture_view(&mut self, texture: TextureHandle) -> BackendResult<TextureViewHandle> {
        if !self.textures.contains_key(&texture.0) {
            return Err(BackendError::TextureCreationFailed(
                "Texture not found".into(),
            ));
        }
        let id = self.allocate_id();
        self.views.insert(id, texture);
        Ok(TextureViewHandle(id))
    }

    fn write_texture(
        &mut self,
        texture: TextureHandle,
        mip_level: u32,
        data: &[u8],
        width: u32,
        height: u32,
    ) {
        log::trace!(
            "DummyBackend: writing {} bytes to texture {:?} mip {} ({}x{})",
            data.len(),
            texture,
            mip_level,
            width,
            height
        );
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        log::trace!("DummyBackend: creating sampler {:?}", desc.label);
        let id = self.allocate_id();
        self.samplers.insert(id, desc.clone());
        Ok(SamplerHandle(id))
    }

    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle> {
        log::trace!(
            "DummyBackend: creating program {:?} ({} inputs, {} bindings)",
            desc.label,
            desc.vertex_inputs.len(),
            desc.resource_bindings.len()
        );
        let id = self.allocate_id();
        self.programs.insert(id, desc.clone());
        Ok(ProgramHandle(id))
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        if self.pending_pass.is_some() {
            log::warn!("DummyBackend: render pass begun inside another pass");
            self.end_render_pass();
        }
        self.pending_pass = Some(RecordedPass {
            descriptor: desc.clone(),
            commands: Vec::new(),
        });
    }

    fn end_render_pass(&mut self) {
        if let Some(pass) = self.pending_pass.take() {
            log::trace!(
                "DummyBackend: recorded pass {:?} ({} draws)",
                pass.descriptor.label,
                pass.draw_count()
            );
            self.frame_passes.push(pass);
        }
    }

    fn set_program(&mut self, program: ProgramHandle) {
        self.record(RecordedCommand::SetProgram(program));
    }

    fn set_uniforms(&mut self, data: &[u8]) {
        self.record(RecordedCommand::SetUniforms(data.to_vec()));
    }

    fn set_texture(&mut self, unit: u32, view: TextureViewHandle, sampler: SamplerHandle) {
        self.record(RecordedCommand::SetTexture {
            unit,
            view,
            sampler,
        });
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, _offset: u64) {
        self.record(RecordedCommand::SetVertexBuffer { slot, buffer });
    }

    fn disable_vertex_attribute(&mut self, slot: u32) {
        self.record(RecordedCommand::DisableVertexAttribute { slot });
    }

    fn set_viewport(&mut self, _x: f32, _y: f32, width: f32, height: f32, _min_depth: f32, _max_depth: f32) {
        self.record(RecordedCommand::SetViewport { width, height });
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.record(RecordedCommand::Draw {
            vertices,
            instances,
        });
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer.0);
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
        self.views.retain(|_, t| *t != texture);
    }
}
