//! Common types shared between backends

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    R8Unorm,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Depth32Float,
    Rg32Float,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::R8Unorm => 1,
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Bgra8Unorm
            | TextureFormat::Bgra8UnormSrgb
            | TextureFormat::Depth32Float => 4,
            TextureFormat::Rg32Float => 8,
        }
    }
}

/// Texture usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureUsage(u32);

impl TextureUsage {
    pub const COPY_SRC: Self = Self(1 << 0);
    pub const COPY_DST: Self = Self(1 << 1);
    pub const TEXTURE_BINDING: Self = Self(1 << 2);
    pub const RENDER_ATTACHMENT: Self = Self(1 << 4);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for TextureUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Buffer usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferUsage(u32);

impl BufferUsage {
    pub const COPY_DST: Self = Self(1 << 3);
    pub const VERTEX: Self = Self(1 << 5);
    pub const UNIFORM: Self = Self(1 << 6);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for BufferUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Texture descriptor
#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            mip_levels: 1,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        }
    }
}

/// Buffer descriptor
#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    pub size: u64,
    pub usage: BufferUsage,
}

/// Vertex attribute format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
}

impl VertexFormat {
    pub fn size(&self) -> u64 {
        match self {
            VertexFormat::Float32 => 4,
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }
}

/// A vertex shader input, one buffer per attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexInput {
    pub name: String,
    pub location: u32,
    pub format: VertexFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSampleType {
    Float { filterable: bool },
    Depth,
    Sint,
    Uint,
}

/// Kind of a `@group(1)` resource binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceBindingKind {
    Texture { sample_type: TextureSampleType },
    Sampler,
}

/// A reflected texture or sampler binding in `@group(1)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceBindingLayout {
    pub name: String,
    pub binding: u32,
    pub kind: ResourceBindingKind,
}

/// Everything the backend needs to build pipelines for a linked program.
///
/// The uniform block always lives at `@group(0) @binding(0)` and is bound
/// with a dynamic offset. Textures and samplers live in `@group(1)`.
#[derive(Debug, Clone)]
pub struct ProgramDescriptor {
    pub label: Option<String>,
    pub vertex_source: String,
    pub vertex_entry: String,
    pub fragment_source: String,
    pub fragment_entry: String,
    /// Size in bytes of the uniform block, `None` when neither stage declares one
    pub uniform_block_size: Option<u64>,
    pub vertex_inputs: Vec<VertexInput>,
    pub resource_bindings: Vec<ResourceBindingLayout>,
}

impl ProgramDescriptor {
    /// Texture bindings in unit order
    pub fn texture_bindings(&self) -> impl Iterator<Item = &ResourceBindingLayout> {
        self.resource_bindings
            .iter()
            .filter(|b| matches!(b.kind, ResourceBindingKind::Texture { .. }))
    }

    /// Sampler bindings in unit order
    pub fn sampler_bindings(&self) -> impl Iterator<Item = &ResourceBindingLayout> {
        self.resource_bindings
            .iter()
            .filter(|b| matches!(b.kind, ResourceBindingKind::Sampler))
    }
}

/// Compare function for depth/stencil
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Shader stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
        }
    }
}

/// Filter mode for samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Address mode for samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    ClampToEdge,
    Repeat,
    MirrorRepeat,
}

/// Sampler descriptor
#[derive(Debug, Clone)]
pub struct SamplerDescriptor {
    pub label: Option<String>,
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub mipmap_filter: FilterMode,
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
    pub address_mode_w: AddressMode,
    pub compare: Option<CompareFunction>,
}

impl SamplerDescriptor {
    /// Nearest filtering with repeat wrapping, used for every shadow target
    pub fn nearest_repeat(label: &str) -> Self {
        Self {
            label: Some(label.to_string()),
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            mipmap_filter: FilterMode::Nearest,
            address_mode_u: AddressMode::Repeat,
            address_mode_v: AddressMode::Repeat,
            address_mode_w: AddressMode::Repeat,
            compare: None,
        }
    }

    /// Trilinear filtering with repeat wrapping, used for loaded images
    pub fn trilinear_repeat(label: &str) -> Self {
        Self {
            label: Some(label.to_string()),
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_filter: FilterMode::Linear,
            address_mode_u: AddressMode::Repeat,
            address_mode_v: AddressMode::Repeat,
            address_mode_w: AddressMode::Repeat,
            compare: None,
        }
    }
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_filter: FilterMode::Linear,
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            compare: None,
        }
    }
}
