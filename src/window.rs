//! Window management using winit

use std::sync::Arc;
use winit::{
    dpi::{PhysicalPosition, PhysicalSize},
    event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::EventLoop,
    keyboard::{Key, NamedKey},
    window::{Window as WinitWindow, WindowBuilder},
};

use crate::state::InputEvent;
use crate::DemoError;

/// Wrapper around winit window with additional state
pub struct Window {
    window: Arc<WinitWindow>,
    width: u32,
    height: u32,
    cursor: PhysicalPosition<f64>,
    close_requested: bool,
}

impl Window {
    /// Create a new window with the given title and dimensions
    pub fn new(
        event_loop: &EventLoop<()>,
        title: &str,
        width: u32,
        height: u32,
    ) -> Result<Self, DemoError> {
        let window = Arc::new(
            WindowBuilder::new()
                .with_title(title)
                .with_inner_size(PhysicalSize::new(width, height))
                .build(event_loop)?,
        );

        let size = window.inner_size();
        Ok(Self {
            window,
            width: size.width,
            height: size.height,
            cursor: PhysicalPosition::new(0.0, 0.0),
            close_requested: false,
        })
    }

    /// Get the raw window
    pub fn window(&self) -> &WinitWindow {
        &self.window
    }

    /// Get arc reference to window for backend initialization
    pub fn window_arc(&self) -> Arc<WinitWindow> {
        Arc::clone(&self.window)
    }

    /// Get current window dimensions
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Check if close was requested
    pub fn should_close(&self) -> bool {
        self.close_requested
    }

    /// Track window state and translate the event into demo input, if it is one.
    pub fn handle_event(&mut self, event: &WindowEvent) -> Option<InputEvent> {
        match event {
            WindowEvent::Resized(size) => {
                self.width = size.width;
                self.height = size.height;
            }
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = *position;
            }
            _ => {}
        }
        translate_event(event, self.cursor)
    }

    /// Request a redraw
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

/// Map a winit window event onto the demo's input vocabulary.
///
/// `cursor` is the last known cursor position in physical pixels, used for
/// mouse presses which carry no position of their own.
pub fn translate_event(event: &WindowEvent, cursor: PhysicalPosition<f64>) -> Option<InputEvent> {
    match event {
        WindowEvent::CloseRequested => Some(InputEvent::Close),
        WindowEvent::Resized(size) => Some(InputEvent::Resized {
            width: size.width,
            height: size.height,
        }),
        WindowEvent::KeyboardInput { event, .. } => translate_key(event),
        WindowEvent::MouseWheel { delta, .. } => {
            let amount = match delta {
                MouseScrollDelta::LineDelta(_, y) => *y as f64,
                MouseScrollDelta::PixelDelta(position) => position.y,
            };
            if amount > 0.0 {
                Some(InputEvent::ScrollUp)
            } else if amount < 0.0 {
                Some(InputEvent::ScrollDown)
            } else {
                None
            }
        }
        WindowEvent::MouseInput {
            state: ElementState::Pressed,
            button: MouseButton::Left,
            ..
        } => Some(InputEvent::LeftPress {
            x: cursor.x,
            y: cursor.y,
        }),
        _ => None,
    }
}

fn translate_key(event: &KeyEvent) -> Option<InputEvent> {
    if event.state != ElementState::Pressed {
        return None;
    }
    match &event.logical_key {
        Key::Named(NamedKey::Escape) => Some(InputEvent::Close),
        Key::Character(text) => text
            .chars()
            .next()
            .map(|c| InputEvent::Key(c.to_ascii_lowercase())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> PhysicalPosition<f64> {
        PhysicalPosition::new(0.0, 0.0)
    }

    #[test]
    fn test_close_and_resize() {
        assert_eq!(
            translate_event(&WindowEvent::CloseRequested, origin()),
            Some(InputEvent::Close)
        );
        assert_eq!(
            translate_event(&WindowEvent::Resized(PhysicalSize::new(800, 600)), origin()),
            Some(InputEvent::Resized {
                width: 800,
                height: 600
            })
        );
    }

    #[test]
    fn test_ignored_events() {
        assert_eq!(
            translate_event(&WindowEvent::Focused(true), origin()),
            None
        );
        assert_eq!(
            translate_event(
                &WindowEvent::CursorMoved {
                    device_id: unsafe { winit::event::DeviceId::dummy() },
                    position: PhysicalPosition::new(3.0, 4.0),
                },
                origin()
            ),
            None
        );
    }

    #[test]
    fn test_left_press_uses_cursor() {
        let event = WindowEvent::MouseInput {
            device_id: unsafe { winit::event::DeviceId::dummy() },
            state: ElementState::Pressed,
            button: MouseButton::Left,
        };
        assert_eq!(
            translate_event(&event, PhysicalPosition::new(120.0, 40.0)),
            Some(InputEvent::LeftPress { x: 120.0, y: 40.0 })
        );
    }

    #[test]
    fn test_wheel_direction() {
        let up = WindowEvent::MouseWheel {
            device_id: unsafe { winit::event::DeviceId::dummy() },
            delta: MouseScrollDelta::LineDelta(0.0, 1.0),
            phase: winit::event::TouchPhase::Moved,
        };
        let down = WindowEvent::MouseWheel {
            device_id: unsafe { winit::event::DeviceId::dummy() },
            delta: MouseScrollDelta::LineDelta(0.0, -2.0),
            phase: winit::event::TouchPhase::Moved,
        };
        assert_eq!(translate_event(&up, origin()), Some(InputEvent::ScrollUp));
        assert_eq!(translate_event(&down, origin()), Some(InputEvent::ScrollDown));
    }
}
