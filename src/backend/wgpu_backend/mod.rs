//! wgpu backend implementation
//!
//! Render commands are buffered while a pass is open and replayed in
//! [`GraphicsBackend::end_render_pass`]. Replay runs in two phases: first every
//! pipeline variant and texture bind group the pass needs is created, then
//! the pass is encoded with shared borrows only.
//!
//! A program is compiled into one pipeline per combination of attachment
//! formats and disabled vertex attributes, so the same program can draw into
//! a depth-only target, a moment target and the swapchain.

use crate::backend::traits::*;
use crate::backend::types::*;
use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroU64;
use std::ops::Range;
use std::sync::Arc;
use wgpu::util::DeviceExt;

/// Default capacity of the per-frame uniform arena
pub const DEFAULT_UNIFORM_ARENA_SIZE: u64 = 256 * 1024;

/// Buffered render pass command
#[derive(Clone)]
enum RenderCommand {
    SetProgram(ProgramHandle),
    SetUniforms { offset: u32 },
    SetTexture { unit: u32, view: TextureViewHandle, sampler: SamplerHandle },
    SetVertexBuffer { slot: u32, buffer: BufferHandle, offset: u64 },
    DisableVertexAttribute { slot: u32 },
    SetViewport { x: f32, y: f32, width: f32, height: f32, min_depth: f32, max_depth: f32 },
    Draw { vertices: Range<u32>, instances: Range<u32> },
}

/// Pending render pass with buffered commands
struct PendingRenderPass {
    descriptor: RenderPassDescriptor,
    commands: Vec<RenderCommand>,
}

/// GPU objects owned by a program
struct ProgramResources {
    desc: ProgramDescriptor,
    vertex_module: wgpu::ShaderModule,
    fragment_module: wgpu::ShaderModule,
    resource_layout: Option<wgpu::BindGroupLayout>,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_bind_group: wgpu::BindGroup,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: u64,
    color_formats: Vec<wgpu::TextureFormat>,
    depth_format: Option<wgpu::TextureFormat>,
    /// Bit `n` set when vertex slot `n` reads the constant zero attribute
    constant_slots: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ResourceGroupKey {
    program: u64,
    /// (view, sampler) per texture unit
    units: Vec<(u64, Option<u64>)>,
}

impl ResourceGroupKey {
    fn uses_any_view(&self, views: &[u64]) -> bool {
        self.units.iter().any(|(view, _)| views.contains(view))
    }
}

/// Forget every view created from `texture`, returning their ids
fn take_views_of(owners: &mut HashMap<u64, u64>, texture: u64) -> Vec<u64> {
    let views: Vec<u64> = owners
        .iter()
        .filter(|(_, owner)| **owner == texture)
        .map(|(view, _)| *view)
        .collect();
    for view in &views {
        owners.remove(view);
    }
    views
}

/// Fully resolved command, encoded without touching the caches
enum ResolvedCommand {
    Pipeline(PipelineKey),
    UniformGroup { program: u64, offset: u32 },
    ResourceGroup(ResourceGroupKey),
    VertexBuffer { slot: u32, buffer: u64, offset: u64 },
    ConstantAttribute { slot: u32 },
    Viewport { x: f32, y: f32, width: f32, height: f32, min_depth: f32, max_depth: f32 },
    Draw { vertices: Range<u32>, instances: Range<u32> },
}

/// wgpu backend implementation
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    surface: wgpu::Surface<'static>,
    #[allow(dead_code)]
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_config: wgpu::SurfaceConfiguration,
    current_texture: Option<wgpu::SurfaceTexture>,
    current_view_id: u64, // ID used to identify the swapchain view handle

    // Resource storage
    buffers: HashMap<u64, wgpu::Buffer>,
    textures: HashMap<u64, wgpu::Texture>,
    texture_formats: HashMap<u64, TextureFormat>,
    texture_views: HashMap<u64, wgpu::TextureView>,
    view_formats: HashMap<u64, wgpu::TextureFormat>,
    /// Owning texture of each view
    view_owners: HashMap<u64, u64>,
    samplers: HashMap<u64, wgpu::Sampler>,
    programs: HashMap<u64, ProgramResources>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    resource_groups: HashMap<ResourceGroupKey, wgpu::BindGroup>,

    // Handle counters
    next_buffer_id: u64,
    next_texture_id: u64,
    next_view_id: u64,
    next_sampler_id: u64,
    next_program_id: u64,

    // Per-frame uniform arena, addressed with dynamic offsets
    uniform_arena: wgpu::Buffer,
    uniform_arena_size: u64,
    uniform_alignment: u64,
    uniform_cursor: u64,
    uniform_overflow_logged: bool,

    // Fed to disabled vertex attributes
    zero_attribute: wgpu::Buffer,

    // Command encoding
    encoder: Option<wgpu::CommandEncoder>,

    // Pending pass - commands are buffered here and executed on end_render_pass
    pending_render_pass: Option<PendingRenderPass>,
}

impl WgpuBackend {
    fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
            TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
            TextureFormat::Rg32Float => wgpu::TextureFormat::Rg32Float,
        }
    }

    fn convert_texture_format_back(format: wgpu::TextureFormat) -> TextureFormat {
        match format {
            wgpu::TextureFormat::R8Unorm => TextureFormat::R8Unorm,
            wgpu::TextureFormat::Rgba8Unorm => TextureFormat::Rgba8Unorm,
            wgpu::TextureFormat::Rgba8UnormSrgb => TextureFormat::Rgba8UnormSrgb,
            wgpu::TextureFormat::Bgra8Unorm => TextureFormat::Bgra8Unorm,
            wgpu::TextureFormat::Bgra8UnormSrgb => TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Depth32Float => TextureFormat::Depth32Float,
            wgpu::TextureFormat::Rg32Float => TextureFormat::Rg32Float,
            _ => TextureFormat::Rgba8Unorm,
        }
    }

    fn convert_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
        let mut result = wgpu::BufferUsages::empty();
        if usage.contains(BufferUsage::COPY_DST) {
            result |= wgpu::BufferUsages::COPY_DST;
        }
        if usage.contains(BufferUsage::VERTEX) {
            result |= wgpu::BufferUsages::VERTEX;
        }
        if usage.contains(BufferUsage::UNIFORM) {
            result |= wgpu::BufferUsages::UNIFORM;
        }
        result
    }

    fn convert_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
        let mut result = wgpu::TextureUsages::empty();
        if usage.contains(TextureUsage::COPY_SRC) {
            result |= wgpu::TextureUsages::COPY_SRC;
        }
        if usage.contains(TextureUsage::COPY_DST) {
            result |= wgpu::TextureUsages::COPY_DST;
        }
        if usage.contains(TextureUsage::TEXTURE_BINDING) {
            result |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
            result |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        result
    }

    fn convert_vertex_format(format: VertexFormat) -> wgpu::VertexFormat {
        match format {
            VertexFormat::Float32 => wgpu::VertexFormat::Float32,
            VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
            VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
            VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
        }
    }

    fn convert_compare_function(func: CompareFunction) -> wgpu::CompareFunction {
        match func {
            CompareFunction::Never => wgpu::CompareFunction::Never,
            CompareFunction::Less => wgpu::CompareFunction::Less,
            CompareFunction::Equal => wgpu::CompareFunction::Equal,
            CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
            CompareFunction::Greater => wgpu::CompareFunction::Greater,
            CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
            CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
            CompareFunction::Always => wgpu::CompareFunction::Always,
        }
    }

    fn convert_sample_type(sample_type: TextureSampleType) -> wgpu::TextureSampleType {
        match sample_type {
            TextureSampleType::Float { filterable } => wgpu::TextureSampleType::Float { filterable },
            TextureSampleType::Depth => wgpu::TextureSampleType::Depth,
            TextureSampleType::Sint => wgpu::TextureSampleType::Sint,
            TextureSampleType::Uint => wgpu::TextureSampleType::Uint,
        }
    }

    fn convert_filter_mode(mode: FilterMode) -> wgpu::FilterMode {
        match mode {
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
            FilterMode::Linear => wgpu::FilterMode::Linear,
        }
    }

    fn convert_address_mode(mode: AddressMode) -> wgpu::AddressMode {
        match mode {
            AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            AddressMode::Repeat => wgpu::AddressMode::Repeat,
            AddressMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
        }
    }

    fn convert_load_op<V: Copy>(op: &LoadOp, clear: V) -> wgpu::LoadOp<V> {
        match op {
            LoadOp::Clear(_) => wgpu::LoadOp::Clear(clear),
            LoadOp::Load => wgpu::LoadOp::Load,
        }
    }

    fn convert_store_op(op: StoreOp) -> wgpu::StoreOp {
        match op {
            StoreOp::Store => wgpu::StoreOp::Store,
            StoreOp::Discard => wgpu::StoreOp::Discard,
        }
    }
}

impl WgpuBackend {
    /// Create the backend for `window`, blocking on adapter and device requests.
    pub fn new(
        window: Arc<winit::window::Window>,
        vsync: bool,
        uniform_arena_size: u64,
    ) -> BackendResult<Self> {
        pollster::block_on(Self::new_async(window, vsync, uniform_arena_size))
    }

    async fn new_async(
        window: Arc<winit::window::Window>,
        vsync: bool,
        uniform_arena_size: u64,
    ) -> BackendResult<Self> {
        let (instance, surface, adapter, device, queue) = Self::init_native(window.clone()).await?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| {
                BackendError::SurfaceCreationFailed("Surface reports no formats".into())
            })?;

        let present_mode = if vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };

        let (width, height) = Self::clamp_to_limits(&device, size.width, size.height);

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        surface.configure(&device, &surface_config);

        let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment as u64;
        let uniform_arena = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Uniform Arena"),
            size: uniform_arena_size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let zero_attribute = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Zero Attribute"),
            contents: &[0u8; 16],
            usage: wgpu::BufferUsages::VERTEX,
        });

        log::info!(
            "Surface configured: {}x{} {:?}, uniform alignment {}",
            width,
            height,
            surface_format,
            uniform_alignment
        );

        Ok(Self {
            instance,
            surface,
            adapter,
            device,
            queue,
            surface_config,
            current_texture: None,
            current_view_id: 0,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            texture_formats: HashMap::new(),
            texture_views: HashMap::new(),
            view_formats: HashMap::new(),
            view_owners: HashMap::new(),
            samplers: HashMap::new(),
            programs: HashMap::new(),
            pipelines: HashMap::new(),
            resource_groups: HashMap::new(),
            next_buffer_id: 1,
            next_texture_id: 1,
            next_view_id: 1,
            next_sampler_id: 1,
            next_program_id: 1,
            uniform_arena,
            uniform_arena_size,
            uniform_alignment,
            uniform_cursor: 0,
            uniform_overflow_logged: false,
            zero_attribute,
            encoder: None,
            pending_render_pass: None,
        })
    }

    /// Native initialization
    async fn init_native(
        window: Arc<winit::window::Window>,
    ) -> BackendResult<(
        wgpu::Instance,
        wgpu::Surface<'static>,
        wgpu::Adapter,
        wgpu::Device,
        wgpu::Queue,
    )> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BackendError::InitializationFailed("No suitable adapter found".into()))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?} backend)",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Shadow Lab Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

        Ok((instance, surface, adapter, device, queue))
    }

    /// Clamp to device limits while maintaining aspect ratio
    fn clamp_to_limits(device: &wgpu::Device, width: u32, height: u32) -> (u32, u32) {
        let max_size = device.limits().max_texture_dimension_2d;
        if width > max_size || height > max_size {
            let scale = (max_size as f32 / width as f32).min(max_size as f32 / height as f32);
            (
                ((width as f32 * scale) as u32).max(1),
                ((height as f32 * scale) as u32).max(1),
            )
        } else {
            (width.max(1), height.max(1))
        }
    }

    fn view_format(&self, view: TextureViewHandle) -> Option<wgpu::TextureFormat> {
        if view.0 == self.current_view_id && self.current_texture.is_some() {
            Some(self.surface_config.format)
        } else {
            self.view_formats.get(&view.0).copied()
        }
    }

    fn align_up(value: u64, alignment: u64) -> u64 {
        value.div_ceil(alignment) * alignment
    }

    fn create_pipeline(&self, key: &PipelineKey) -> BackendResult<wgpu::RenderPipeline> {
        let program = self.programs.get(&key.program).ok_or_else(|| {
            BackendError::ProgramCreationFailed(format!("Unknown program {}", key.program))
        })?;

        let attributes: Vec<[wgpu::VertexAttribute; 1]> = program
            .desc
            .vertex_inputs
            .iter()
            .map(|input| {
                [wgpu::VertexAttribute {
                    format: Self::convert_vertex_format(input.format),
                    offset: 0,
                    shader_location: input.location,
                }]
            })
            .collect();

        // One buffer per attribute; a disabled attribute steps per instance so
        // the 16-byte zero buffer covers the whole draw.
        let vertex_buffers: Vec<wgpu::VertexBufferLayout> = program
            .desc
            .vertex_inputs
            .iter()
            .zip(attributes.iter())
            .enumerate()
            .map(|(slot, (input, attrs))| wgpu::VertexBufferLayout {
                array_stride: input.format.size(),
                step_mode: if key.constant_slots & (1 << slot) != 0 {
                    wgpu::VertexStepMode::Instance
                } else {
                    wgpu::VertexStepMode::Vertex
                },
                attributes: attrs,
            })
            .collect();

        let color_targets: Vec<Option<wgpu::ColorTargetState>> = key
            .color_formats
            .iter()
            .map(|format| {
                Some(wgpu::ColorTargetState {
                    format: *format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        let depth_stencil = key.depth_format.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: program.desc.label.as_deref(),
                layout: Some(&program.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &program.vertex_module,
                    entry_point: &program.desc.vertex_entry,
                    buffers: &vertex_buffers,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                // Depth-only targets skip the fragment stage entirely
                fragment: if color_targets.is_empty() {
                    None
                } else {
                    Some(wgpu::FragmentState {
                        module: &program.fragment_module,
                        entry_point: &program.desc.fragment_entry,
                        targets: &color_targets,
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                    })
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BackendError::ProgramCreationFailed(error.to_string()));
        }

        log::debug!(
            "Created pipeline variant for {:?}: colors {:?}, depth {:?}, constant slots {:#b}",
            program.desc.label,
            key.color_formats,
            key.depth_format,
            key.constant_slots
        );

        Ok(pipeline)
    }

    fn create_resource_group(&self, key: &ResourceGroupKey) -> Option<wgpu::BindGroup> {
        let program = self.programs.get(&key.program)?;
        let layout = program.resource_layout.as_ref()?;

        let mut entries = Vec::new();
        let textures = program.desc.texture_bindings();
        let mut samplers = program.desc.sampler_bindings();
        for (binding, (view, sampler)) in textures.zip(key.units.iter()) {
            entries.push(wgpu::BindGroupEntry {
                binding: binding.binding,
                resource: wgpu::BindingResource::TextureView(self.texture_views.get(view)?),
            });
            if let (Some(sampler_binding), Some(sampler)) = (samplers.next(), sampler) {
                entries.push(wgpu::BindGroupEntry {
                    binding: sampler_binding.binding,
                    resource: wgpu::BindingResource::Sampler(self.samplers.get(sampler)?),
                });
            }
        }

        Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: program.desc.label.as_deref(),
            layout,
            entries: &entries,
        }))
    }

    /// First replay phase: track binding state, create missing pipeline
    /// variants and bind groups, and produce commands ready for encoding.
    fn resolve_commands(
        &mut self,
        commands: &[RenderCommand],
        color_formats: &[wgpu::TextureFormat],
        depth_format: Option<wgpu::TextureFormat>,
    ) -> Vec<ResolvedCommand> {
        let mut resolved = Vec::with_capacity(commands.len());
        let mut program: Option<u64> = None;
        let mut uniform_offset = 0u32;
        let mut units: BTreeMap<u32, (u64, u64)> = BTreeMap::new();
        let mut vertex_buffers: HashMap<u32, (u64, u64)> = HashMap::new();

        for command in commands {
            match command {
                RenderCommand::SetProgram(handle) => program = Some(handle.0),
                RenderCommand::SetUniforms { offset } => uniform_offset = *offset,
                RenderCommand::SetTexture { unit, view, sampler } => {
                    units.insert(*unit, (view.0, sampler.0));
                }
                RenderCommand::SetVertexBuffer { slot, buffer, offset } => {
                    vertex_buffers.insert(*slot, (buffer.0, *offset));
                }
                RenderCommand::DisableVertexAttribute { slot } => {
                    vertex_buffers.remove(slot);
                }
                RenderCommand::SetViewport { x, y, width, height, min_depth, max_depth } => {
                    resolved.push(ResolvedCommand::Viewport {
                        x: *x,
                        y: *y,
                        width: *width,
                        height: *height,
                        min_depth: *min_depth,
                        max_depth: *max_depth,
                    });
                }
                RenderCommand::Draw { vertices, instances } => {
                    let Some(program_id) = program else {
                        log::warn!("Draw without a program; skipped");
                        continue;
                    };
                    let Some(resources) = self.programs.get(&program_id) else {
                        continue;
                    };

                    let input_count = resources.desc.vertex_inputs.len() as u32;
                    let texture_count = resources.desc.texture_bindings().count() as u32;
                    let sampler_count = resources.desc.sampler_bindings().count() as u32;

                    let mut constant_slots = 0u32;
                    let mut feeds = Vec::with_capacity(input_count as usize);
                    for slot in 0..input_count {
                        match vertex_buffers.get(&slot) {
                            Some(&(buffer, offset)) => {
                                feeds.push(ResolvedCommand::VertexBuffer { slot, buffer, offset })
                            }
                            None => {
                                constant_slots |= 1 << slot;
                                feeds.push(ResolvedCommand::ConstantAttribute { slot });
                            }
                        }
                    }

                    let resource_key = if texture_count > 0 {
                        let bound: Option<Vec<(u64, Option<u64>)>> = (0..texture_count)
                            .map(|unit| {
                                units.get(&unit).map(|&(view, sampler)| {
                                    (view, (unit < sampler_count).then_some(sampler))
                                })
                            })
                            .collect();
                        let Some(bound) = bound else {
                            log::warn!(
                                "Draw with {:?} is missing texture units; skipped",
                                resources.desc.label
                            );
                            continue;
                        };
                        Some(ResourceGroupKey {
                            program: program_id,
                            units: bound,
                        })
                    } else {
                        None
                    };

                    let key = PipelineKey {
                        program: program_id,
                        color_formats: color_formats.to_vec(),
                        depth_format,
                        constant_slots,
                    };
                    if !self.pipelines.contains_key(&key) {
                        match self.create_pipeline(&key) {
                            Ok(pipeline) => {
                                self.pipelines.insert(key.clone(), pipeline);
                            }
                            Err(e) => {
                                log::error!("{e}");
                                continue;
                            }
                        }
                    }

                    if let Some(resource_key) = &resource_key {
                        if !self.resource_groups.contains_key(resource_key) {
                            let Some(group) = self.create_resource_group(resource_key) else {
                                log::warn!("Texture unit references a destroyed resource; skipped");
                                continue;
                            };
                            self.resource_groups.insert(resource_key.clone(), group);
                        }
                    }

                    resolved.push(ResolvedCommand::Pipeline(key));
                    resolved.push(ResolvedCommand::UniformGroup {
                        program: program_id,
                        offset: uniform_offset,
                    });
                    if let Some(resource_key) = resource_key {
                        resolved.push(ResolvedCommand::ResourceGroup(resource_key));
                    }
                    resolved.extend(feeds);
                    resolved.push(ResolvedCommand::Draw {
                        vertices: vertices.clone(),
                        instances: instances.clone(),
                    });
                }
            }
        }

        resolved
    }
}

impl GraphicsBackend for WgpuBackend {
    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            let (width, height) = Self::clamp_to_limits(&self.device, width, height);
            self.surface_config.width = width;
            self.surface_config.height = height;
            self.surface.configure(&self.device, &self.surface_config);
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    fn begin_frame(&mut self) -> BackendResult<FrameContext> {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.surface_config);
                return Err(BackendError::SurfaceLost);
            }
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(BackendError::OutOfMemory),
            Err(e) => return Err(BackendError::AcquireImageFailed(e.to_string())),
        };

        // Use a unique ID for the swapchain view - the view is created when a pass needs it
        let view_id = self.next_view_id;
        self.next_view_id += 1;
        self.current_view_id = view_id;

        self.uniform_cursor = 0;
        self.uniform_overflow_logged = false;

        self.current_texture = Some(output);
        self.encoder = Some(
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Frame Encoder"),
                }),
        );

        Ok(FrameContext {
            swapchain_view: TextureViewHandle(view_id),
            width: self.surface_config.width,
            height: self.surface_config.height,
        })
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        if self.pending_render_pass.is_some() {
            self.end_render_pass();
        }

        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }

        if let Some(texture) = self.current_texture.take() {
            texture.present();
        }

        Ok(())
    }

    fn swapchain_format(&self) -> TextureFormat {
        Self::convert_texture_format_back(self.surface_config.format)
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: desc.label.as_deref(),
            contents: data,
            usage: Self::convert_buffer_usage(desc.usage),
        });

        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        self.buffers.insert(id, buffer);

        Ok(BufferHandle(id))
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: desc.mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::convert_texture_format(desc.format),
            usage: Self::convert_texture_usage(desc.usage),
            view_formats: &[],
        });

        let id = self.next_texture_id;
        self.next_texture_id += 1;
        self.textures.insert(id, texture);
        self.texture_formats.insert(id, desc.format);

        Ok(TextureHandle(id))
    }

    fn create_texture_view(&mut self, texture: TextureHandle) -> BackendResult<TextureViewHandle> {
        let tex = self
            .textures
            .get(&texture.0)
            .ok_or_else(|| BackendError::TextureCreationFailed("Texture not found".into()))?;

        let view = tex.create_view(&wgpu::TextureViewDescriptor::default());
        let format = tex.format();

        let id = self.next_view_id;
        self.next_view_id += 1;
        self.texture_views.insert(id, view);
        self.view_formats.insert(id, format);
        self.view_owners.insert(id, texture.0);

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
        let Some(tex) = self.textures.get(&texture.0) else {
            return;
        };
        let bytes_per_pixel = self
            .texture_formats
            .get(&texture.0)
            .map(TextureFormat::bytes_per_pixel)
            .unwrap_or(4);

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: tex,
                mip_level,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(width * bytes_per_pixel),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: desc.label.as_deref(),
            address_mode_u: Self::convert_address_mode(desc.address_mode_u),
            address_mode_v: Self::convert_address_mode(desc.address_mode_v),
            address_mode_w: Self::convert_address_mode(desc.address_mode_w),
            mag_filter: Self::convert_filter_mode(desc.mag_filter),
            min_filter: Self::convert_filter_mode(desc.min_filter),
            mipmap_filter: Self::convert_filter_mode(desc.mipmap_filter),
            lod_min_clamp: 0.0,
            lod_max_clamp: 32.0,
            compare: desc.compare.map(Self::convert_compare_function),
            anisotropy_clamp: 1,
            border_color: None,
        });

        let id = self.next_sampler_id;
        self.next_sampler_id += 1;
        self.samplers.insert(id, sampler);

        Ok(SamplerHandle(id))
    }

    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let vertex_module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: desc.label.as_deref(),
                source: wgpu::ShaderSource::Wgsl(desc.vertex_source.as_str().into()),
            });
        let fragment_module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: desc.label.as_deref(),
                source: wgpu::ShaderSource::Wgsl(desc.fragment_source.as_str().into()),
            });

        let visibility = wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT;

        let uniform_entries: Vec<wgpu::BindGroupLayoutEntry> = desc
            .uniform_block_size
            .map(|_| wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: None,
                },
                count: None,
            })
            .into_iter()
            .collect();
        let uniform_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: desc.label.as_deref(),
                entries: &uniform_entries,
            });

        // Unfilterable textures (Rg32Float moments, depth) need non-filtering samplers
        let filtering = desc.texture_bindings().any(|b| {
            matches!(
                b.kind,
                ResourceBindingKind::Texture {
                    sample_type: TextureSampleType::Float { filterable: true }
                }
            )
        });
        let resource_entries: Vec<wgpu::BindGroupLayoutEntry> = desc
            .resource_bindings
            .iter()
            .map(|b| wgpu::BindGroupLayoutEntry {
                binding: b.binding,
                visibility,
                ty: match b.kind {
                    ResourceBindingKind::Texture { sample_type } => wgpu::BindingType::Texture {
                        sample_type: Self::convert_sample_type(sample_type),
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    ResourceBindingKind::Sampler => wgpu::BindingType::Sampler(if filtering {
                        wgpu::SamplerBindingType::Filtering
                    } else {
                        wgpu::SamplerBindingType::NonFiltering
                    }),
                },
                count: None,
            })
            .collect();
        let resource_layout = (!resource_entries.is_empty()).then(|| {
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: desc.label.as_deref(),
                    entries: &resource_entries,
                })
        });

        let mut layouts = vec![&uniform_layout];
        if let Some(layout) = &resource_layout {
            layouts.push(layout);
        }
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: desc.label.as_deref(),
                bind_group_layouts: &layouts,
                push_constant_ranges: &[],
            });

        let uniform_group_entries: Vec<wgpu::BindGroupEntry> = desc
            .uniform_block_size
            .map(|size| wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &self.uniform_arena,
                    offset: 0,
                    size: NonZeroU64::new(Self::align_up(size, 16)),
                }),
            })
            .into_iter()
            .collect();
        let uniform_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: desc.label.as_deref(),
            layout: &uniform_layout,
            entries: &uniform_group_entries,
        });

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BackendError::ProgramCreationFailed(error.to_string()));
        }

        let id = self.next_program_id;
        self.next_program_id += 1;
        self.programs.insert(
            id,
            ProgramResources {
                desc: desc.clone(),
                vertex_module,
                fragment_module,
                resource_layout,
                pipeline_layout,
                uniform_bind_group,
            },
        );

        Ok(ProgramHandle(id))
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        self.pending_render_pass = Some(PendingRenderPass {
            descriptor: desc.clone(),
            commands: Vec::new(),
        });
    }

    fn end_render_pass(&mut self) {
        let Some(pending) = self.pending_render_pass.take() else {
            return;
        };

        let color_formats: Vec<wgpu::TextureFormat> = pending
            .descriptor
            .color_attachments
            .iter()
            .filter_map(|att| self.view_format(att.view))
            .collect();
        let depth_format = pending
            .descriptor
            .depth_stencil_attachment
            .as_ref()
            .and_then(|att| self.view_format(att.view));

        let resolved = self.resolve_commands(&pending.commands, &color_formats, depth_format);

        let Some(mut encoder) = self.encoder.take() else {
            return;
        };

        let swapchain_view: Option<wgpu::TextureView> = self
            .current_texture
            .as_ref()
            .map(|tex| tex.texture.create_view(&wgpu::TextureViewDescriptor::default()));
        let current_view_id = self.current_view_id;

        {
            let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = pending
                .descriptor
                .color_attachments
                .iter()
                .filter_map(|att| {
                    let view = if att.view.0 == current_view_id {
                        swapchain_view.as_ref()?
                    } else {
                        self.texture_views.get(&att.view.0)?
                    };
                    let clear = match att.load_op {
                        LoadOp::Clear(c) => wgpu::Color {
                            r: c[0] as f64,
                            g: c[1] as f64,
                            b: c[2] as f64,
                            a: c[3] as f64,
                        },
                        LoadOp::Load => wgpu::Color::BLACK,
                    };
                    Some(Some(wgpu::RenderPassColorAttachment {
                        view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: Self::convert_load_op(&att.load_op, clear),
                            store: Self::convert_store_op(att.store_op),
                        },
                    }))
                })
                .collect();

            let depth_attachment = pending
                .descriptor
                .depth_stencil_attachment
                .as_ref()
                .and_then(|att| {
                    let view = self.texture_views.get(&att.view.0)?;
                    Some(wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: Some(wgpu::Operations {
                            load: Self::convert_load_op(&att.depth_load_op, att.depth_clear_value),
                            store: Self::convert_store_op(att.depth_store_op),
                        }),
                        stencil_ops: None,
                    })
                });

            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: pending.descriptor.label.as_deref(),
                color_attachments: &color_attachments,
                depth_stencil_attachment: depth_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for command in &resolved {
                match command {
                    ResolvedCommand::Pipeline(key) => {
                        if let Some(pipeline) = self.pipelines.get(key) {
                            render_pass.set_pipeline(pipeline);
                        }
                    }
                    ResolvedCommand::UniformGroup { program, offset } => {
                        if let Some(resources) = self.programs.get(program) {
                            if resources.desc.uniform_block_size.is_some() {
                                render_pass.set_bind_group(0, &resources.uniform_bind_group, &[*offset]);
                            } else {
                                render_pass.set_bind_group(0, &resources.uniform_bind_group, &[]);
                            }
                        }
                    }
                    ResolvedCommand::ResourceGroup(key) => {
                        if let Some(group) = self.resource_groups.get(key) {
                            render_pass.set_bind_group(1, group, &[]);
                        }
                    }
                    ResolvedCommand::VertexBuffer { slot, buffer, offset } => {
                        if let Some(buf) = self.buffers.get(buffer) {
                            render_pass.set_vertex_buffer(*slot, buf.slice(*offset..));
                        }
                    }
                    ResolvedCommand::ConstantAttribute { slot } => {
                        render_pass.set_vertex_buffer(*slot, self.zero_attribute.slice(..));
                    }
                    ResolvedCommand::Viewport { x, y, width, height, min_depth, max_depth } => {
                        render_pass.set_viewport(*x, *y, *width, *height, *min_depth, *max_depth);
                    }
                    ResolvedCommand::Draw { vertices, instances } => {
                        render_pass.draw(vertices.clone(), instances.clone());
                    }
                }
            }
            // render_pass is dropped here, ending the pass
        }

        self.encoder = Some(encoder);
    }

    fn set_program(&mut self, program: ProgramHandle) {
        if let Some(ref mut pending) = self.pending_render_pass {
            pending.commands.push(RenderCommand::SetProgram(program));
        }
    }

    fn set_uniforms(&mut self, data: &[u8]) {
        if self.pending_render_pass.is_none() {
            return;
        }

        let size = Self::align_up(data.len().max(1) as u64, 16);
        if self.uniform_cursor + size > self.uniform_arena_size {
            if !self.uniform_overflow_logged {
                log::error!(
                    "Uniform arena exhausted ({} bytes); later draws reuse stale uniforms",
                    self.uniform_arena_size
                );
                self.uniform_overflow_logged = true;
            }
            return;
        }

        let offset = self.uniform_cursor;
        let mut padded = data.to_vec();
        padded.resize(size as usize, 0);
        self.queue.write_buffer(&self.uniform_arena, offset, &padded);
        self.uniform_cursor = Self::align_up(offset + size, self.uniform_alignment);

        if let Some(ref mut pending) = self.pending_render_pass {
            pending.commands.push(RenderCommand::SetUniforms {
                offset: offset as u32,
            });
        }
    }

    fn set_texture(&mut self, unit: u32, view: TextureViewHandle, sampler: SamplerHandle) {
        if let Some(ref mut pending) = self.pending_render_pass {
            pending.commands.push(RenderCommand::SetTexture { unit, view, sampler });
        }
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64) {
        if let Some(ref mut pending) = self.pending_render_pass {
            pending.commands.push(RenderCommand::SetVertexBuffer { slot, buffer, offset });
        }
    }

    fn disable_vertex_attribute(&mut self, slot: u32) {
        if let Some(ref mut pending) = self.pending_render_pass {
            pending.commands.push(RenderCommand::DisableVertexAttribute { slot });
        }
    }

    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32, min_depth: f32, max_depth: f32) {
        if let Some(ref mut pending) = self.pending_render_pass {
            pending.commands.push(RenderCommand::SetViewport { x, y, width, height, min_depth, max_depth });
        }
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        if let Some(ref mut pending) = self.pending_render_pass {
            pending.commands.push(RenderCommand::Draw { vertices, instances });
        }
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer.0);
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
        self.texture_formats.remove(&texture.0);

        let views = take_views_of(&mut self.view_owners, texture.0);
        if views.is_empty() {
            return;
        }
        for view in &views {
            self.texture_views.remove(view);
            self.view_formats.remove(view);
        }
        self.resource_groups.retain(|key, _| !key.uses_any_view(&views));
    }
}

// Additional methods for the egui overlay
impl WgpuBackend {
    /// Get reference to the wgpu device (for egui-wgpu Renderer creation)
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Get the surface format as wgpu type (for egui-wgpu Renderer creation)
    pub fn wgpu_surface_format(&self) -> wgpu::TextureFormat {
        self.surface_config.format
    }

    /// Get device, queue, and encoder together for operations that need all three.
    /// This avoids borrow checker issues when calling external libraries like egui.
    pub fn device_queue_encoder(
        &mut self,
    ) -> (&wgpu::Device, &wgpu::Queue, Option<&mut wgpu::CommandEncoder>) {
        (&self.device, &self.queue, self.encoder.as_mut())
    }

    /// Render egui on top of the swapchain image of the current frame.
    pub fn render_egui(
        &mut self,
        renderer: &egui_wgpu::Renderer,
        paint_jobs: &[egui::ClippedPrimitive],
        screen_descriptor: &egui_wgpu::ScreenDescriptor,
        swapchain_view: TextureViewHandle,
    ) {
        if swapchain_view.0 != self.current_view_id {
            return;
        }
        let Some(encoder) = self.encoder.as_mut() else {
            return;
        };
        let Some(view) = self
            .current_texture
            .as_ref()
            .map(|tex| tex.texture.create_view(&wgpu::TextureViewDescriptor::default()))
        else {
            return;
        };

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("egui Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load, // Preserve the shaded scene
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        renderer.render(&mut render_pass, paint_jobs, screen_descriptor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_views_of_only_removes_owned_views() {
        let mut owners = HashMap::from([(1, 10), (2, 10), (3, 11)]);

        let mut views = take_views_of(&mut owners, 10);
        views.sort_unstable();

        assert_eq!(views, vec![1, 2]);
        assert_eq!(owners, HashMap::from([(3, 11)]));
        assert!(take_views_of(&mut owners, 10).is_empty());
    }

    #[test]
    fn test_resource_group_key_matches_destroyed_views() {
        let key = ResourceGroupKey {
            program: 1,
            units: vec![(4, Some(7)), (5, None)],
        };
        assert!(key.uses_any_view(&[5]));
        assert!(!key.uses_any_view(&[6, 7]));
    }
}
