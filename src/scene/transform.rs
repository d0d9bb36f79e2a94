//! Instance transforms

use glam::{Mat4, Vec3};

/// Fixed orientations used by the scene's instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationTag {
    #[default]
    None,
    /// 90° about X, then 90° about the rotated Z axis
    XThenZ90,
    /// 90° about Y
    Y90,
}

impl RotationTag {
    pub fn matrix(&self) -> Mat4 {
        let quarter = std::f32::consts::FRAC_PI_2;
        match self {
            RotationTag::None => Mat4::IDENTITY,
            RotationTag::XThenZ90 => Mat4::from_rotation_x(quarter) * Mat4::from_rotation_z(quarter),
            RotationTag::Y90 => Mat4::from_rotation_y(quarter),
        }
    }
}

/// Position, fixed rotation and uniform scale of an instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: RotationTag,
    pub scale: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: RotationTag::None,
            scale: 1.0,
        }
    }
}

impl Transform {
    pub fn new(position: Vec3, rotation: RotationTag, scale: f32) -> Self {
        Self {
            position,
            rotation,
            scale,
        }
    }

    /// Model matrix: translation × rotation × uniform scale
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_translation(self.position)
            * self.rotation.matrix()
            * Mat4::from_scale(Vec3::splat(self.scale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_vec_eq(a: Vec3, b: Vec3) {
        assert!((a - b).length() < 1e-5, "{a:?} != {b:?}");
    }

    #[test]
    fn test_identity_transform() {
        assert_eq!(Transform::default().matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_x_then_z_rotation() {
        let m = RotationTag::XThenZ90.matrix();
        // Local X lands on world Z after both quarter turns
        assert_vec_eq(m.transform_vector3(Vec3::X), Vec3::Z);
        assert_vec_eq(m.transform_vector3(Vec3::Y), -Vec3::X);
        assert_vec_eq(m.transform_vector3(Vec3::Z), -Vec3::Y);
    }

    #[test]
    fn test_y_rotation() {
        let m = RotationTag::Y90.matrix();
        assert_vec_eq(m.transform_vector3(Vec3::X), -Vec3::Z);
        assert_vec_eq(m.transform_vector3(Vec3::Y), Vec3::Y);
    }

    #[test]
    fn test_scale_then_translate() {
        let t = Transform::new(Vec3::new(-5.0, -2.0, 0.0), RotationTag::None, 0.2);
        assert_vec_eq(t.matrix().transform_point3(Vec3::new(5.0, 0.0, 0.0)), Vec3::new(-4.0, -2.0, 0.0));
    }
}
