//! egui rendering of the overlay on the wgpu backend

use egui::ViewportId;
use egui_wgpu::ScreenDescriptor;
use winit::event::WindowEvent;
use winit::window::Window;

use crate::backend::traits::TextureViewHandle;
use crate::backend::wgpu_backend::WgpuBackend;
use crate::overlay::{label_position, label_text};
use crate::pipeline::ShadowAlgorithm;

/// Text overlay drawn into the swapchain image
pub struct TextOverlay {
    /// egui context (shared state for UI)
    ctx: egui::Context,
    /// egui-winit state for input handling
    winit_state: egui_winit::State,
    /// egui-wgpu renderer for drawing
    renderer: egui_wgpu::Renderer,
    /// Cached paint jobs from last frame
    paint_jobs: Vec<egui::ClippedPrimitive>,
    /// Cached textures delta
    textures_delta: egui::TexturesDelta,
}

impl TextOverlay {
    pub fn new(backend: &WgpuBackend, window: &Window) -> Self {
        let ctx = egui::Context::default();

        let winit_state = egui_winit::State::new(
            ctx.clone(),
            ViewportId::ROOT,
            window,
            Some(window.scale_factor() as f32),
            None,
        );

        let renderer = egui_wgpu::Renderer::new(
            backend.device(),
            backend.wgpu_surface_format(),
            None,
            1,
        );

        Self {
            ctx,
            winit_state,
            renderer,
            paint_jobs: Vec::new(),
            textures_delta: egui::TexturesDelta::default(),
        }
    }

    /// Feed a window event to egui (scale factor and size changes)
    pub fn on_window_event(&mut self, window: &Window, event: &WindowEvent) {
        let _ = self.winit_state.on_window_event(window, event);
    }

    /// Lay out the label for `algorithm` and tessellate it
    pub fn prepare(&mut self, window: &Window, algorithm: ShadowAlgorithm) {
        let raw_input = self.winit_state.take_egui_input(window);
        let pixels_per_point = self.ctx.pixels_per_point();

        let full_output = self.ctx.run(raw_input, |ctx| {
            egui::Area::new(egui::Id::new("algorithm label"))
                .fixed_pos(label_position(algorithm, pixels_per_point))
                .interactable(false)
                .show(ctx, |ui| {
                    ui.label(label_text(algorithm, pixels_per_point));
                });
        });

        self.winit_state
            .handle_platform_output(window, full_output.platform_output);
        self.paint_jobs = self
            .ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);
        self.textures_delta = full_output.textures_delta;
    }

    /// Draw the prepared label over the frame in flight
    pub fn render(
        &mut self,
        backend: &mut WgpuBackend,
        swapchain_view: TextureViewHandle,
        screen_width: u32,
        screen_height: u32,
    ) {
        let screen_descriptor = ScreenDescriptor {
            size_in_pixels: [screen_width, screen_height],
            pixels_per_point: self.ctx.pixels_per_point(),
        };

        let (device, queue, encoder) = backend.device_queue_encoder();

        for (id, image_delta) in &self.textures_delta.set {
            self.renderer.update_texture(device, queue, *id, image_delta);
        }

        if let Some(encoder) = encoder {
            self.renderer.update_buffers(
                device,
                queue,
                encoder,
                &self.paint_jobs,
                &screen_descriptor,
            );
        }

        backend.render_egui(
            &self.renderer,
            &self.paint_jobs,
            &screen_descriptor,
            swapchain_view,
        );

        for id in &self.textures_delta.free {
            self.renderer.free_texture(id);
        }

        self.textures_delta = egui::TexturesDelta::default();
    }
}
