//! Typed values that can be written into a program's uniform block by name.

use glam::{Mat4, Vec2, Vec3, Vec4};

/// Shape of a uniform block member as reflected from WGSL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
    /// `array<vec4<f32>, N>`
    Vec4Array(u32),
}

impl UniformKind {
    /// Size in bytes of the value as stored in the block
    pub fn size(&self) -> usize {
        match self {
            UniformKind::Float => 4,
            UniformKind::Vec2 => 8,
            UniformKind::Vec3 => 12,
            UniformKind::Vec4 => 16,
            UniformKind::Mat4 => 64,
            UniformKind::Vec4Array(n) => 16 * *n as usize,
        }
    }
}

impl std::fmt::Display for UniformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UniformKind::Float => write!(f, "f32"),
            UniformKind::Vec2 => write!(f, "vec2<f32>"),
            UniformKind::Vec3 => write!(f, "vec3<f32>"),
            UniformKind::Vec4 => write!(f, "vec4<f32>"),
            UniformKind::Mat4 => write!(f, "mat4x4<f32>"),
            UniformKind::Vec4Array(n) => write!(f, "array<vec4<f32>, {n}>"),
        }
    }
}

/// A CPU value that can be stored in a uniform block member.
pub trait UniformValue {
    fn kind(&self) -> UniformKind;

    /// Raw bytes, exactly `self.kind().size()` long
    fn bytes(&self) -> &[u8];
}

impl UniformValue for f32 {
    fn kind(&self) -> UniformKind {
        UniformKind::Float
    }

    fn bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

impl UniformValue for Vec2 {
    fn kind(&self) -> UniformKind {
        UniformKind::Vec2
    }

    fn bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

impl UniformValue for Vec3 {
    fn kind(&self) -> UniformKind {
        UniformKind::Vec3
    }

    fn bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

impl UniformValue for Vec4 {
    fn kind(&self) -> UniformKind {
        UniformKind::Vec4
    }

    fn bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

impl UniformValue for Mat4 {
    fn kind(&self) -> UniformKind {
        UniformKind::Mat4
    }

    fn bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

impl UniformValue for &[Vec4] {
    fn kind(&self) -> UniformKind {
        UniformKind::Vec4Array(self.len() as u32)
    }

    fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self)
    }
}

impl<const N: usize> UniformValue for [Vec4; N] {
    fn kind(&self) -> UniformKind {
        UniformKind::Vec4Array(N as u32)
    }

    fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_bytes_match_kind_size() {
        assert_eq!(1.5f32.bytes().len(), UniformKind::Float.size());
        assert_eq!(Vec3::ONE.bytes().len(), UniformKind::Vec3.size());
        assert_eq!(Mat4::IDENTITY.bytes().len(), UniformKind::Mat4.size());

        let weights = [Vec4::ONE, Vec4::ZERO];
        assert_eq!(weights.kind(), UniformKind::Vec4Array(2));
        assert_eq!(weights.bytes().len(), 32);
    }

    #[test]
    fn test_matrix_bytes_are_column_major() {
        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let floats: &[f32] = bytemuck::cast_slice(m.bytes());
        assert_eq!(&floats[12..15], &[1.0, 2.0, 3.0]);
    }
}
