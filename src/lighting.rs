use glam::Vec3;

use crate::scene::{NodeKind, Scene, SceneNode};

/// Uniform fill light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientLight {
    pub color: Vec3,
    pub intensity: f32,
}

/// Light arriving from a fixed direction. `direction` points towards the light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub color: Vec3,
    pub intensity: f32,
    pub direction: Vec3,
}

/// The backdrop's static light rig: one ambient and one directional light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lighting {
    pub ambient: AmbientLight,
    pub directional: DirectionalLight,
}

impl Default for Lighting {
    fn default() -> Self {
        Self {
            ambient: AmbientLight {
                color: rgb_hex(0xcccccc),
                intensity: 1.0,
            },
            directional: DirectionalLight {
                color: Vec3::ONE,
                intensity: 0.5,
                direction: Vec3::new(1.0, 1.0, 0.5).normalize(),
            },
        }
    }
}

impl Lighting {
    /// Adds both lights to the root of `scene`.
    pub fn attach(&self, scene: &mut Scene) {
        scene.add(SceneNode::new(
            "ambient-light",
            NodeKind::AmbientLight(self.ambient),
        ));
        scene.add(
            SceneNode::new(
                "directional-light",
                NodeKind::DirectionalLight(self.directional),
            )
            .with_position(self.directional.direction),
        );
    }
}

/// Converts a packed `0xRRGGBB` colour into linear 0..1 components.
pub fn rgb_hex(hex: u32) -> Vec3 {
    Vec3::new(
        ((hex >> 16) & 0xff) as f32 / 255.0,
        ((hex >> 8) & 0xff) as f32 / 255.0,
        (hex & 0xff) as f32 / 255.0,
    )
}
