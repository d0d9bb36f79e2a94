//! Off-screen shadow targets and the window depth buffer
//!
//! Shadow targets have a fixed size chosen at startup and are never
//! recreated. Only [`WindowTargets`] follows the window size.

use crate::backend::*;

/// Default edge length of every shadow target
pub const SHADOW_MAP_SIZE: u32 = 1024;

/// A texture with its view, as attached to a render pass
#[derive(Debug, Clone, Copy)]
pub struct Attachment {
    pub texture: TextureHandle,
    pub view: TextureViewHandle,
}

impl Attachment {
    fn create(backend: &mut dyn GraphicsBackend, desc: &TextureDescriptor) -> BackendResult<Self> {
        let texture = backend.create_texture(desc)?;
        let view = backend.create_texture_view(texture)?;
        Ok(Self { texture, view })
    }
}

/// An off-screen render target
#[derive(Debug, Clone)]
pub struct RenderTarget {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Color attachment, `None` for depth-only targets
    pub color: Option<Attachment>,
    pub depth: Option<Attachment>,
    /// The attachment later passes sample
    pub sampled: Attachment,
    pub sampler: SamplerHandle,
}

impl RenderTarget {
    pub fn view(&self) -> TargetView {
        TargetView {
            color: self.color.map(|a| a.view),
            depth: self.depth.map(|a| a.view),
            sampled: Some((self.sampled.view, self.sampler)),
            width: self.width,
            height: self.height,
        }
    }

    /// Every texture owned by this target
    pub fn textures(&self) -> impl Iterator<Item = TextureHandle> + '_ {
        self.color.iter().chain(self.depth.iter()).map(|a| a.texture)
    }
}

/// Handles a pass needs to render into or sample from a target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetView {
    pub color: Option<TextureViewHandle>,
    pub depth: Option<TextureViewHandle>,
    pub sampled: Option<(TextureViewHandle, SamplerHandle)>,
    pub width: u32,
    pub height: u32,
}

fn shadow_descriptor(name: &str, size: u32, format: TextureFormat) -> TextureDescriptor {
    TextureDescriptor {
        label: Some(name.to_string()),
        width: size,
        height: size,
        mip_levels: 1,
        format,
        usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
    }
}

/// Depth-only target rendered from the light
pub fn create_depth_target(backend: &mut dyn GraphicsBackend, size: u32) -> BackendResult<RenderTarget> {
    let depth = Attachment::create(
        backend,
        &shadow_descriptor("shadow depth", size, TextureFormat::Depth32Float),
    )?;
    let sampler = backend.create_sampler(&SamplerDescriptor::nearest_repeat("shadow depth"))?;

    Ok(RenderTarget {
        name: "shadow depth".into(),
        width: size,
        height: size,
        color: None,
        depth: Some(depth),
        sampled: depth,
        sampler,
    })
}

fn create_moment_target(
    backend: &mut dyn GraphicsBackend,
    name: &str,
    size: u32,
    with_depth: bool,
) -> BackendResult<RenderTarget> {
    let color = Attachment::create(backend, &shadow_descriptor(name, size, TextureFormat::Rg32Float))?;
    let depth = if with_depth {
        Some(Attachment::create(
            backend,
            &TextureDescriptor {
                usage: TextureUsage::RENDER_ATTACHMENT,
                ..shadow_descriptor(&format!("{name} depth"), size, TextureFormat::Depth32Float)
            },
        )?)
    } else {
        None
    };
    let sampler = backend.create_sampler(&SamplerDescriptor::nearest_repeat(name))?;

    Ok(RenderTarget {
        name: name.to_string(),
        width: size,
        height: size,
        color: Some(color),
        depth,
        sampled: color,
        sampler,
    })
}

/// Raw moment target plus the two ping-pong blur targets.
///
/// The moment target owns a private depth attachment so the moment pass
/// depth-tests like the depth pass does.
pub fn create_moment_targets(
    backend: &mut dyn GraphicsBackend,
    size: u32,
) -> BackendResult<(RenderTarget, [RenderTarget; 2])> {
    let moments = create_moment_target(backend, "moments", size, true)?;
    let blur = [
        create_moment_target(backend, "moments blur 0", size, false)?,
        create_moment_target(backend, "moments blur 1", size, false)?,
    ];
    Ok((moments, blur))
}

/// Every shadow-related target, created once at startup
#[derive(Debug)]
pub struct ShadowTargets {
    pub depth: RenderTarget,
    pub moments: RenderTarget,
    pub blur: [RenderTarget; 2],
}

impl ShadowTargets {
    pub fn create(backend: &mut dyn GraphicsBackend, size: u32) -> BackendResult<Self> {
        let depth = create_depth_target(backend, size)?;
        let (moments, blur) = create_moment_targets(backend, size)?;
        log::info!("Created shadow targets ({size}x{size})");
        Ok(Self { depth, moments, blur })
    }

    pub fn iter(&self) -> impl Iterator<Item = &RenderTarget> {
        [&self.depth, &self.moments, &self.blur[0], &self.blur[1]].into_iter()
    }
}

/// Window-sized depth buffer used by the shading pass
#[derive(Debug)]
pub struct WindowTargets {
    pub depth: Attachment,
    pub width: u32,
    pub height: u32,
}

impl WindowTargets {
    pub fn create(backend: &mut dyn GraphicsBackend, width: u32, height: u32) -> BackendResult<Self> {
        let depth = Attachment::create(
            backend,
            &TextureDescriptor {
                label: Some("window depth".into()),
                width: width.max(1),
                height: height.max(1),
                mip_levels: 1,
                format: TextureFormat::Depth32Float,
                usage: TextureUsage::RENDER_ATTACHMENT,
            },
        )?;
        Ok(Self {
            depth,
            width: width.max(1),
            height: height.max(1),
        })
    }

    /// Recreate the depth buffer if the size changed. Returns whether it did.
    pub fn resize(&mut self, backend: &mut dyn GraphicsBackend, width: u32, height: u32) -> BackendResult<bool> {
        if width == 0 || height == 0 || (width, height) == (self.width, self.height) {
            return Ok(false);
        }
        let replacement = Self::create(backend, width, height)?;
        backend.destroy_texture(self.depth.texture);
        *self = replacement;
        Ok(true)
    }

    /// Screen view for a frame: the swapchain plus this depth buffer
    pub fn screen_view(&self, frame: &FrameContext) -> TargetView {
        TargetView {
            color: Some(frame.swapchain_view),
            depth: Some(self.depth.view),
            sampled: None,
            width: frame.width,
            height: frame.height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;

    #[test]
    fn test_shadow_targets_are_fixed_size() {
        let mut backend = DummyBackend::new(1600, 1200);
        let targets = ShadowTargets::create(&mut backend, SHADOW_MAP_SIZE).unwrap();

        for target in targets.iter() {
            let desc = backend.view_descriptor(target.sampled.view).unwrap();
            assert_eq!((desc.width, desc.height), (1024, 1024), "{}", target.name);
            let sampler = backend.sampler_descriptor(target.sampler).unwrap();
            assert_eq!(sampler.min_filter, FilterMode::Nearest);
            assert_eq!(sampler.mag_filter, FilterMode::Nearest);
            assert_eq!(sampler.address_mode_u, AddressMode::Repeat);
            assert_eq!(sampler.address_mode_v, AddressMode::Repeat);
        }
    }

    #[test]
    fn test_target_formats() {
        let mut backend = DummyBackend::new(8, 8);
        let depth = create_depth_target(&mut backend, 1024).unwrap();
        assert!(depth.color.is_none());
        assert_eq!(
            backend.view_descriptor(depth.sampled.view).unwrap().format,
            TextureFormat::Depth32Float
        );

        let (moments, blur) = create_moment_targets(&mut backend, 1024).unwrap();
        assert!(moments.depth.is_some());
        assert!(blur.iter().all(|t| t.depth.is_none()));
        for target in std::iter::once(&moments).chain(blur.iter()) {
            let desc = backend.view_descriptor(target.sampled.view).unwrap();
            assert_eq!(desc.format, TextureFormat::Rg32Float);
        }
    }

    #[test]
    fn test_window_resize_recreates_only_on_change() {
        let mut backend = DummyBackend::new(800, 600);
        let mut window = WindowTargets::create(&mut backend, 800, 600).unwrap();
        let created = backend.textures_created();

        assert!(!window.resize(&mut backend, 800, 600).unwrap());
        assert!(!window.resize(&mut backend, 0, 600).unwrap());
        assert_eq!(backend.textures_created(), created);

        let old = window.depth.texture;
        assert!(window.resize(&mut backend, 1024, 768).unwrap());
        assert_eq!(backend.textures_created(), created + 1);
        assert!(backend.texture_descriptor(old).is_none());
        assert_eq!((window.width, window.height), (1024, 768));
    }
}
