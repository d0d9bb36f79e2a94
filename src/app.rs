//! The demo application: startup, the per-frame loop and the two runners

use winit::event::Event;
use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};

use crate::backend::dummy::DummyBackend;
use crate::backend::wgpu_backend::WgpuBackend;
use crate::backend::{BackendError, FrameContext, GraphicsBackend};
use crate::overlay::TextOverlay;
use crate::pipeline::{ProgramTable, ShadowPipeline};
use crate::render_graph::FrameInputs;
use crate::resources::{load_mesh, load_texture, GeometryCache, GpuTexture, MeshLibrary};
use crate::scene::{FrameMatrices, Scene, SceneMeshes};
use crate::shader::ShaderRegistry;
use crate::state::{FrameState, InputEvent, InputQueue};
use crate::window::Window;
use crate::{DemoConfig, DemoError};

/// Frames rendered by the headless runner when no limit is given
pub const HEADLESS_FRAMES: u64 = 3;

/// Models loaded at startup, by asset name
pub const MODEL_NAMES: [&str; 4] = ["teapot", "bunny", "square", "board"];

/// Texture loaded at startup and kept resident
pub const BRICK_WALL_TEXTURE: &str = "brickwall.png";

/// Owns every resource of the demo and drives one frame at a time
pub struct ShadowDemo {
    shaders: ShaderRegistry,
    meshes: MeshLibrary,
    geometry: GeometryCache,
    scene_meshes: SceneMeshes,
    scene: Scene,
    pipeline: ShadowPipeline,
    state: FrameState,
    input: InputQueue,
    brick_wall: Option<GpuTexture>,
    frames_rendered: u64,
}

impl ShadowDemo {
    /// Load assets, compile every program and build the per-algorithm graphs.
    ///
    /// Shader and backend failures are fatal. A mesh that fails to load is
    /// replaced by an empty one and a missing texture is simply absent.
    pub fn new(backend: &mut dyn GraphicsBackend, config: &DemoConfig) -> Result<Self, DemoError> {
        let assets = config.assets();
        log::info!("Loading assets from {}", assets.root().display());

        let mut meshes = MeshLibrary::new();
        let [teapot, bunny, _square, board] =
            MODEL_NAMES.map(|name| meshes.add(load_mesh(assets.model(name))));
        let scene_meshes = SceneMeshes {
            teapot,
            bunny,
            board,
        };

        let brick_wall = load_texture(backend, assets.texture(BRICK_WALL_TEXTURE));

        let mut shaders = ShaderRegistry::new();
        let programs = ProgramTable::compile(&mut shaders, backend, &assets)?;
        let pipeline = ShadowPipeline::new(backend, programs, &mut meshes, &config.pipeline())?;

        let mut geometry = GeometryCache::new();
        for (id, _) in meshes.iter() {
            geometry.upload(backend, &meshes, id)?;
        }

        let (width, height) = backend.surface_size();
        let mut scene = Scene::demo(scene_meshes);
        scene.camera.set_aspect(width, height);

        log::info!(
            "Scene ready: {} instances, {} meshes, starting with {}",
            scene.instances().len(),
            meshes.len(),
            config.algorithm
        );

        Ok(Self {
            shaders,
            meshes,
            geometry,
            scene_meshes,
            scene,
            pipeline,
            state: FrameState::new(width, height, config.algorithm),
            input: InputQueue::new(),
            brick_wall,
            frames_rendered: 0,
        })
    }

    /// Queue input for the next frame
    pub fn queue_input(&mut self, event: InputEvent) {
        self.input.push(event);
    }

    pub fn state(&self) -> &FrameState {
        &self.state
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_meshes(&self) -> SceneMeshes {
        self.scene_meshes
    }

    pub fn meshes(&self) -> &MeshLibrary {
        &self.meshes
    }

    pub fn shaders(&self) -> &ShaderRegistry {
        &self.shaders
    }

    pub fn pipeline(&self) -> &ShadowPipeline {
        &self.pipeline
    }

    pub fn brick_wall(&self) -> Option<&GpuTexture> {
        self.brick_wall.as_ref()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn should_close(&self) -> bool {
        self.state.close_requested
    }

    /// Apply queued input and follow window size changes
    pub fn update(&mut self, backend: &mut dyn GraphicsBackend) -> Result<(), DemoError> {
        if self.input.apply_to(&mut self.state) {
            backend.resize(self.state.width, self.state.height);
            let (width, height) = backend.surface_size();
            self.pipeline.resize(backend, width, height)?;
        }

        self.scene.camera.position = self.state.camera_position;
        self.scene.light.position = self.state.light_position;
        Ok(())
    }

    /// Begin a frame and record every pass of the current algorithm.
    ///
    /// Returns `None` when the surface was lost and the frame is skipped.
    /// The caller presents the frame with `end_frame`.
    pub fn render(
        &mut self,
        backend: &mut dyn GraphicsBackend,
    ) -> Result<Option<FrameContext>, DemoError> {
        let frame = match backend.begin_frame() {
            Ok(frame) => frame,
            Err(BackendError::SurfaceLost) => {
                log::warn!("Surface lost, skipping frame");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        self.scene.camera.set_aspect(frame.width, frame.height);
        let matrices = FrameMatrices::compute(&self.scene.camera, &self.scene.light);

        self.pipeline.render_frame(
            self.state.algorithm,
            &frame,
            FrameInputs {
                backend,
                shaders: &mut self.shaders,
                geometry: &mut self.geometry,
                meshes: &self.meshes,
                scene: &self.scene,
                frame: &matrices,
            },
        )?;

        self.frames_rendered += 1;
        Ok(Some(frame))
    }

    /// Update, render and present one frame without an overlay.
    ///
    /// Returns `false` once a close was requested.
    pub fn frame(&mut self, backend: &mut dyn GraphicsBackend) -> Result<bool, DemoError> {
        self.update(backend)?;
        if self.should_close() {
            return Ok(false);
        }
        if self.render(backend)?.is_some() {
            backend.end_frame()?;
        }
        Ok(true)
    }
}

/// Run the demo through [`DummyBackend`] without opening a window
pub fn run_headless(config: &DemoConfig) -> Result<(), DemoError> {
    let mut backend = DummyBackend::new(config.width, config.height);
    log::info!("Using {}", backend.name());

    let mut demo = ShadowDemo::new(&mut backend, config)?;
    let frames = config.max_frames.unwrap_or(HEADLESS_FRAMES);

    for _ in 0..frames {
        if !demo.frame(&mut backend)? {
            break;
        }
        let passes: Vec<&str> = backend.last_frame().iter().map(|p| p.label()).collect();
        log::info!(
            "Frame {} ({}): {}",
            demo.frames_rendered(),
            demo.state().algorithm,
            passes.join(" -> ")
        );
    }

    log::info!("Headless run finished after {} frames", demo.frames_rendered());
    Ok(())
}

/// Open a window and run the demo until it is closed
pub fn run_windowed(config: &DemoConfig) -> Result<(), DemoError> {
    let event_loop = EventLoop::new()?;
    let mut window = Window::new(&event_loop, &config.title, config.width, config.height)?;
    let mut backend =
        WgpuBackend::new(window.window_arc(), config.vsync, config.uniform_arena_size)?;
    let mut demo = ShadowDemo::new(&mut backend, config)?;
    let mut overlay = TextOverlay::new(&backend, window.window());

    let max_frames = config.max_frames;
    let mut failure: Option<DemoError> = None;

    event_loop.run(|event, elwt: &EventLoopWindowTarget<()>| {
        elwt.set_control_flow(ControlFlow::Poll);

        match event {
            Event::WindowEvent { event, .. } => {
                overlay.on_window_event(window.window(), &event);
                if let Some(input) = window.handle_event(&event) {
                    demo.queue_input(input);
                }
            }
            Event::AboutToWait => {
                if let Err(e) = windowed_frame(&mut demo, &mut backend, &mut overlay, &window) {
                    failure = Some(e);
                    elwt.exit();
                    return;
                }

                let done = max_frames.is_some_and(|max| demo.frames_rendered() >= max);
                if demo.should_close() || done {
                    elwt.exit();
                } else {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    })?;

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn windowed_frame(
    demo: &mut ShadowDemo,
    backend: &mut WgpuBackend,
    overlay: &mut TextOverlay,
    window: &Window,
) -> Result<(), DemoError> {
    demo.update(backend)?;
    if demo.should_close() {
        return Ok(());
    }

    let Some(frame) = demo.render(backend)? else {
        return Ok(());
    };

    overlay.prepare(window.window(), demo.state().algorithm);
    overlay.render(backend, frame.swapchain_view, frame.width, frame.height);

    backend.end_frame()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ShadowAlgorithm;

    fn config() -> DemoConfig {
        DemoConfig {
            asset_root: concat!(env!("CARGO_MANIFEST_DIR"), "/assets").into(),
            ..DemoConfig::default()
        }
    }

    #[test]
    fn test_close_stops_frames() {
        let mut backend = DummyBackend::new(320, 240);
        let mut demo = ShadowDemo::new(&mut backend, &config()).unwrap();

        assert!(demo.frame(&mut backend).unwrap());
        demo.queue_input(InputEvent::Close);
        assert!(!demo.frame(&mut backend).unwrap());
        assert_eq!(backend.frames_presented(), 1);
        assert_eq!(demo.frames_rendered(), 1);
    }

    #[test]
    fn test_scroll_moves_camera_on_next_frame() {
        let mut backend = DummyBackend::new(320, 240);
        let mut demo = ShadowDemo::new(&mut backend, &config()).unwrap();

        demo.queue_input(InputEvent::ScrollUp);
        demo.queue_input(InputEvent::ScrollUp);
        assert_eq!(demo.scene().camera.position.x, -13.0);

        demo.frame(&mut backend).unwrap();
        assert_eq!(demo.scene().camera.position.x, -11.0);
    }

    #[test]
    fn test_resize_follows_window() {
        let mut backend = DummyBackend::new(320, 240);
        let mut demo = ShadowDemo::new(&mut backend, &config()).unwrap();

        demo.queue_input(InputEvent::Resized {
            width: 640,
            height: 480,
        });
        demo.frame(&mut backend).unwrap();

        assert_eq!(backend.surface_size(), (640, 480));
        assert_eq!(demo.pipeline().window_targets().width, 640);
        assert_eq!(demo.state().algorithm, ShadowAlgorithm::Basic);
    }

    #[test]
    fn test_brick_wall_loaded() {
        let mut backend = DummyBackend::new(320, 240);
        let demo = ShadowDemo::new(&mut backend, &config()).unwrap();
        assert!(demo.brick_wall().is_some());
    }
}
