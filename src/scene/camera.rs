//! Camera, light rig and per-frame matrices

use glam::{Mat4, Vec3};

/// Camera projection type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective {
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    },
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Perspective {
            fov_y: std::f32::consts::FRAC_PI_4, // 45 degrees
            aspect: 4.0 / 3.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Projection {
    pub fn perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Projection::Perspective {
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near,
            far,
        }
    }

    pub fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Self {
        Projection::Orthographic {
            left,
            right,
            bottom,
            top,
            near,
            far,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        match self {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh(*fov_y, *aspect, *near, *far),
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => Mat4::orthographic_rh(*left, *right, *bottom, *top, *near, *far),
        }
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if let Projection::Perspective { aspect: a, .. } = self {
            *a = aspect;
        }
    }
}

/// Camera for viewing the scene
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub projection: Projection,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(-13.0, 0.0, 0.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            projection: Projection::default(),
        }
    }
}

impl Camera {
    pub fn new(position: Vec3, target: Vec3) -> Self {
        Self {
            position,
            target,
            ..Default::default()
        }
    }

    /// Get the view matrix
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Get the projection matrix
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection.matrix()
    }

    /// Update aspect ratio for perspective projection
    pub fn set_aspect(&mut self, width: u32, height: u32) {
        self.projection
            .set_aspect(width.max(1) as f32 / height.max(1) as f32);
    }
}

/// The single directional shadow caster
#[derive(Debug, Clone)]
pub struct LightRig {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub projection: Projection,
}

impl Default for LightRig {
    fn default() -> Self {
        Self {
            position: Vec3::new(10.0, 5.0, 0.0),
            target: Vec3::ZERO,
            up: Vec3::ONE,
            projection: Projection::orthographic(-15.0, 25.0, -8.0, 8.0, -15.0, 25.0),
        }
    }
}

impl LightRig {
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// World space to light clip space: projection × view
    pub fn light_space_matrix(&self) -> Mat4 {
        self.projection.matrix() * self.view_matrix()
    }
}

/// Matrices and positions shared by every pass of a frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameMatrices {
    pub proj: Mat4,
    pub view: Mat4,
    pub view_pos: Vec3,
    pub light_pos: Vec3,
    pub light_space_matrix: Mat4,
}

impl FrameMatrices {
    pub fn compute(camera: &Camera, light: &LightRig) -> Self {
        Self {
            proj: camera.projection_matrix(),
            view: camera.view_matrix(),
            view_pos: camera.position,
            light_pos: light.position,
            light_space_matrix: light.light_space_matrix(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_looks_at_origin() {
        let camera = Camera::default();
        let origin_in_view = camera.view_matrix().transform_point3(Vec3::ZERO);
        // Right-handed view space looks down -Z
        assert!(origin_in_view.x.abs() < 1e-5);
        assert!(origin_in_view.y.abs() < 1e-5);
        assert!((origin_in_view.z + 13.0).abs() < 1e-5);
    }

    #[test]
    fn test_aspect_follows_window() {
        let mut camera = Camera::default();
        camera.set_aspect(1600, 1200);
        match camera.projection {
            Projection::Perspective { aspect, fov_y, .. } => {
                assert!((aspect - 4.0 / 3.0).abs() < 1e-6);
                assert!((fov_y - 45f32.to_radians()).abs() < 1e-6);
            }
            _ => panic!("camera should use a perspective projection"),
        }

        camera.set_aspect(800, 0);
        assert!(camera.projection_matrix().is_finite());
    }

    #[test]
    fn test_light_volume_contains_scene() {
        let light = LightRig::default();
        let m = light.light_space_matrix();
        for p in [
            Vec3::ZERO,
            Vec3::new(0.0, -0.5, 2.5),
            Vec3::new(0.0, -1.0, -3.0),
            Vec3::new(-5.0, -2.0, 0.0),
        ] {
            let clip = m.project_point3(p);
            assert!(clip.x.abs() <= 1.0 && clip.y.abs() <= 1.0, "{p:?} -> {clip:?}");
            assert!((0.0..=1.0).contains(&clip.z), "{p:?} -> {clip:?}");
        }
    }

    #[test]
    fn test_frame_matrices_copy_positions() {
        let frame = FrameMatrices::compute(&Camera::default(), &LightRig::default());
        assert_eq!(frame.view_pos, Vec3::new(-13.0, 0.0, 0.0));
        assert_eq!(frame.light_pos, Vec3::new(10.0, 5.0, 0.0));
        assert_eq!(
            frame.light_space_matrix,
            LightRig::default().light_space_matrix()
        );
    }
}
