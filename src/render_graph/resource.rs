//! Resources referenced by the render graph
//!
//! Targets are owned by the render target manager and imported into the
//! graph by name; the executor binds each one to concrete views.

/// Unique identifier for a render graph resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub(crate) u32);

/// Resource type enumeration
#[derive(Debug, Clone)]
pub enum VirtualResource {
    /// A persistent off-screen target
    Imported { id: ResourceId, name: String },
    /// Rebound every frame (the swapchain and window depth)
    External { id: ResourceId, name: String },
}

impl VirtualResource {
    pub fn id(&self) -> ResourceId {
        match self {
            VirtualResource::Imported { id, .. } | VirtualResource::External { id, .. } => *id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            VirtualResource::Imported { name, .. } | VirtualResource::External { name, .. } => name,
        }
    }
}

/// How a pass uses a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceUsage {
    /// Read as a texture (sampled)
    TextureRead,
    /// Write as a color attachment
    RenderTarget,
    /// Depth attachment
    DepthStencilWrite,
}

/// Resource access declaration for a pass
#[derive(Debug, Clone)]
pub struct ResourceAccess {
    pub resource: ResourceId,
    pub usage: ResourceUsage,
}

impl ResourceAccess {
    pub fn is_read(&self) -> bool {
        matches!(self.usage, ResourceUsage::TextureRead)
    }

    pub fn is_write(&self) -> bool {
        matches!(
            self.usage,
            ResourceUsage::RenderTarget | ResourceUsage::DepthStencilWrite
        )
    }
}
