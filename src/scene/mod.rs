//! Scene description
//!
//! A fixed list of mesh instances shared by every pass of a frame, plus the
//! camera and light the frame matrices are derived from.

mod camera;
mod transform;

pub use camera::*;
pub use transform::*;

use crate::resources::MeshId;
use glam::{Mat4, Vec3};

/// One placed mesh
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneInstance {
    pub mesh: MeshId,
    pub transform: Transform,
}

impl SceneInstance {
    pub fn new(mesh: MeshId, position: Vec3, rotation: RotationTag, scale: f32) -> Self {
        Self {
            mesh,
            transform: Transform::new(position, rotation, scale),
        }
    }

    pub fn model_matrix(&self) -> Mat4 {
        self.transform.matrix()
    }
}

/// Meshes the demo scene is built from
#[derive(Debug, Clone, Copy)]
pub struct SceneMeshes {
    pub teapot: MeshId,
    pub bunny: MeshId,
    pub board: MeshId,
}

/// The scene containing all renderable content
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub camera: Camera,
    pub light: LightRig,
    instances: Vec<SceneInstance>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Two teapots and a bunny standing in front of a board
    pub fn demo(meshes: SceneMeshes) -> Self {
        let mut scene = Self::new();
        scene.add_instance(SceneInstance::new(
            meshes.teapot,
            Vec3::new(0.0, -0.5, 2.5),
            RotationTag::XThenZ90,
            0.2,
        ));
        scene.add_instance(SceneInstance::new(
            meshes.bunny,
            Vec3::new(0.0, -1.0, -3.0),
            RotationTag::Y90,
            1.0,
        ));
        scene.add_instance(SceneInstance::new(
            meshes.teapot,
            Vec3::new(-3.0, -1.0, 0.0),
            RotationTag::XThenZ90,
            0.1,
        ));
        scene.add_instance(SceneInstance::new(
            meshes.board,
            Vec3::new(-5.0, -2.0, 0.0),
            RotationTag::Y90,
            0.2,
        ));
        scene
    }

    pub fn add_instance(&mut self, instance: SceneInstance) {
        self.instances.push(instance);
    }

    pub fn instances(&self) -> &[SceneInstance] {
        &self.instances
    }

    /// Visit every instance in draw order with its model matrix
    pub fn for_each_instance<E>(
        &self,
        mut f: impl FnMut(&SceneInstance, Mat4) -> Result<(), E>,
    ) -> Result<(), E> {
        for instance in &self.instances {
            f(instance, instance.model_matrix())?;
        }
        Ok(())
    }
}
