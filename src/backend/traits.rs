//! Core backend abstraction traits
//!
//! The trait is object safe so render passes can record through
//! `&mut dyn GraphicsBackend` regardless of which backend drives the frame.

use crate::backend::types::*;
use std::ops::Range;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create surface: {0}")]
    SurfaceCreationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to acquire next image: {0}")]
    AcquireImageFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create program: {0}")]
    ProgramCreationFailed(String),
    #[error("Surface lost or outdated")]
    SurfaceLost,
    #[error("Out of memory")]
    OutOfMemory,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

/// Handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a texture view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureViewHandle(pub(crate) u64);

/// Handle to a sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerHandle(pub(crate) u64);

/// Handle to a linked vertex + fragment program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramHandle(pub(crate) u64);

/// Color attachment for render pass
#[derive(Debug, Clone)]
pub struct ColorAttachment {
    pub view: TextureViewHandle,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOp {
    Clear([f32; 4]),
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    Discard,
}

/// Depth attachment for render pass
#[derive(Debug, Clone)]
pub struct DepthStencilAttachment {
    pub view: TextureViewHandle,
    pub depth_load_op: LoadOp,
    pub depth_store_op: StoreOp,
    pub depth_clear_value: f32,
}

/// Render pass descriptor
#[derive(Debug, Clone)]
pub struct RenderPassDescriptor {
    pub label: Option<String>,
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_stencil_attachment: Option<DepthStencilAttachment>,
}

/// Frame context returned when beginning a frame
#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    pub swapchain_view: TextureViewHandle,
    pub width: u32,
    pub height: u32,
}

/// Main graphics backend trait
pub trait GraphicsBackend {
    /// Resize the swapchain
    fn resize(&mut self, width: u32, height: u32);

    /// Get the actual surface size (may be clamped by device limits)
    fn surface_size(&self) -> (u32, u32);

    /// Begin a new frame. Resets the per-frame uniform arena.
    fn begin_frame(&mut self) -> BackendResult<FrameContext>;

    /// End and present the frame
    fn end_frame(&mut self) -> BackendResult<()>;

    /// Get the swapchain format
    fn swapchain_format(&self) -> TextureFormat;

    // Resource creation

    /// Create a buffer with initial data
    fn create_buffer_init(&mut self, desc: &BufferDescriptor, data: &[u8])
        -> BackendResult<BufferHandle>;

    /// Create a texture
    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    /// Create a texture view
    fn create_texture_view(&mut self, texture: TextureHandle) -> BackendResult<TextureViewHandle>;

    /// Write tightly packed texel data into one mip level
    fn write_texture(
        &mut self,
        texture: TextureHandle,
        mip_level: u32,
        data: &[u8],
        width: u32,
        height: u32,
    );

    /// Create a sampler
    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle>;

    /// Create a program from already validated shader sources
    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle>;

    // Command recording and execution

    /// Begin a render pass
    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor);

    /// End the current render pass
    fn end_render_pass(&mut self);

    /// Make `program` current for the following draws
    fn set_program(&mut self, program: ProgramHandle);

    /// Snapshot the current program's uniform block for the following draws
    fn set_uniforms(&mut self, data: &[u8]);

    /// Bind a texture and sampler to a texture unit of the current program
    fn set_texture(&mut self, unit: u32, view: TextureViewHandle, sampler: SamplerHandle);

    /// Set the vertex buffer feeding the attribute at `slot`
    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64);

    /// Feed the attribute at `slot` a constant zero instead of a buffer
    fn disable_vertex_attribute(&mut self, slot: u32);

    /// Set viewport
    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32, min_depth: f32, max_depth: f32);

    /// Draw primitives
    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>);

    // Resource cleanup

    /// Destroy a buffer
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// Destroy a texture
    fn destroy_texture(&mut self, texture: TextureHandle);
}
