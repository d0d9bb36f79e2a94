//! Per-frame mutable state and the input that drives it
//!
//! Window callbacks only queue [`InputEvent`]s. The queue is drained into
//! [`FrameState`] at the top of the next frame, so a pass never observes a
//! half-applied change.

use crate::pipeline::ShadowAlgorithm;
use glam::Vec3;
use std::collections::VecDeque;

/// Input the demo reacts to
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// A character key was pressed
    Key(char),
    /// Mouse wheel moved one notch up
    ScrollUp,
    /// Mouse wheel moved one notch down
    ScrollDown,
    /// Left mouse button pressed at a window position
    LeftPress { x: f64, y: f64 },
    /// Window framebuffer resized
    Resized { width: u32, height: u32 },
    /// Escape or window close
    Close,
}

/// Everything the frame loop reads that input can change
#[derive(Debug, Clone, PartialEq)]
pub struct FrameState {
    pub camera_position: Vec3,
    /// Degrees
    pub yaw: f32,
    /// Degrees, clamped to ±89
    pub pitch: f32,
    /// Derived from yaw and pitch. Not used by the view matrix.
    pub camera_direction: Vec3,
    pub light_position: Vec3,
    pub width: u32,
    pub height: u32,
    pub algorithm: ShadowAlgorithm,
    pub close_requested: bool,
}

impl FrameState {
    pub fn new(width: u32, height: u32, algorithm: ShadowAlgorithm) -> Self {
        let camera_position = Vec3::new(-13.0, 0.0, 0.0);
        Self {
            camera_position,
            yaw: 0.0,
            pitch: 0.0,
            camera_direction: -camera_position,
            light_position: Vec3::new(10.0, 5.0, 0.0),
            width,
            height,
            algorithm,
            close_requested: false,
        }
    }

    /// Apply one event. Returns `true` when the window size changed.
    pub fn apply(&mut self, event: &InputEvent) -> bool {
        match *event {
            InputEvent::Key(key) => {
                if let Some(algorithm) = ShadowAlgorithm::from_key(key) {
                    if algorithm != self.algorithm {
                        log::info!("Switching to {}", algorithm);
                    }
                    self.algorithm = algorithm;
                }
            }
            InputEvent::ScrollUp => self.camera_position.x += 1.0,
            InputEvent::ScrollDown => self.camera_position.x -= 1.0,
            InputEvent::LeftPress { x, y } => self.look_towards(x as f32, y as f32),
            InputEvent::Resized { width, height } => {
                let changed = (width, height) != (self.width, self.height);
                self.width = width;
                self.height = height;
                return changed;
            }
            InputEvent::Close => self.close_requested = true,
        }
        false
    }

    /// Nudge yaw and pitch by the cursor's offset from the window centre
    fn look_towards(&mut self, x: f32, y: f32) {
        let width = self.width.max(1) as f32;
        let height = self.height.max(1) as f32;

        self.yaw += (x - width / 2.0) / width;
        self.yaw = (self.yaw + 180.0).rem_euclid(360.0) - 180.0;
        self.pitch -= (y - height / 2.0) / height;
        self.pitch = self.pitch.clamp(-89.0, 89.0);

        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        self.camera_direction = Vec3::new(
            pitch.cos() * yaw.sin(),
            pitch.sin(),
            -pitch.cos() * yaw.cos(),
        );
    }
}

/// Events waiting for the next frame
#[derive(Debug, Default)]
pub struct InputQueue {
    events: VecDeque<InputEvent>,
}

impl InputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: InputEvent) {
        self.events.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Apply every queued event in arrival order. Returns `true` when the
    /// window size changed.
    pub fn apply_to(&mut self, state: &mut FrameState) -> bool {
        let mut resized = false;
        while let Some(event) = self.events.pop_front() {
            resized |= state.apply(&event);
        }
        resized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> FrameState {
        FrameState::new(1600, 1200, ShadowAlgorithm::Basic)
    }

    #[test]
    fn test_digit_keys_switch_algorithm() {
        let mut state = state();
        state.apply(&InputEvent::Key('3'));
        assert_eq!(state.algorithm, ShadowAlgorithm::Pcf);
        state.apply(&InputEvent::Key('5'));
        assert_eq!(state.algorithm, ShadowAlgorithm::Vssm);
    }

    #[test]
    fn test_unknown_keys_are_no_ops() {
        let mut state = state();
        let before = state.clone();
        for key in ['0', '7', 'w', ' '] {
            assert!(!state.apply(&InputEvent::Key(key)));
        }
        assert_eq!(state, before);
    }

    #[test]
    fn test_scroll_moves_camera_along_x() {
        let mut state = state();
        state.apply(&InputEvent::ScrollUp);
        state.apply(&InputEvent::ScrollUp);
        state.apply(&InputEvent::ScrollDown);
        assert_eq!(state.camera_position, Vec3::new(-12.0, 0.0, 0.0));
    }

    #[test]
    fn test_left_press_at_centre_keeps_orientation() {
        let mut state = state();
        state.apply(&InputEvent::LeftPress { x: 800.0, y: 600.0 });
        assert_eq!(state.yaw, 0.0);
        assert_eq!(state.pitch, 0.0);
        assert!((state.camera_direction - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-6);
    }

    #[test]
    fn test_left_press_offsets_yaw_and_pitch() {
        let mut state = state();
        // Right edge, top edge
        state.apply(&InputEvent::LeftPress { x: 1600.0, y: 0.0 });
        assert!((state.yaw - 0.5).abs() < 1e-6);
        assert!((state.pitch - 0.5).abs() < 1e-6);
        assert!((state.camera_direction.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut state = state();
        state.pitch = 88.9;
        state.apply(&InputEvent::LeftPress { x: 800.0, y: 0.0 });
        assert_eq!(state.pitch, 89.0);
    }

    #[test]
    fn test_camera_position_unaffected_by_look() {
        let mut state = state();
        state.apply(&InputEvent::LeftPress { x: 10.0, y: 10.0 });
        assert_eq!(state.camera_position, Vec3::new(-13.0, 0.0, 0.0));
    }

    #[test]
    fn test_queue_applies_in_order() {
        let mut state = state();
        let mut queue = InputQueue::new();
        queue.push(InputEvent::Key('4'));
        queue.push(InputEvent::Key('2'));
        queue.push(InputEvent::Resized {
            width: 800,
            height: 600,
        });
        assert_eq!(state.algorithm, ShadowAlgorithm::Basic);

        assert!(queue.apply_to(&mut state));
        assert!(queue.is_empty());
        assert_eq!(state.algorithm, ShadowAlgorithm::Biased);
        assert_eq!((state.width, state.height), (800, 600));
    }

    #[test]
    fn test_same_size_is_not_a_resize() {
        let mut state = state();
        assert!(!state.apply(&InputEvent::Resized {
            width: 1600,
            height: 1200
        }));
    }
}
