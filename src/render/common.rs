use glam::{Mat4, Vec3};

use crate::camera::PerspectiveCamera;
use crate::lighting::Lighting;
use crate::scene::Scene;

/// Camera parameters consumed by the renderer's uniform buffer.
#[derive(Clone, Debug)]
pub struct CameraParams {
    pub view_proj: Mat4,
    pub position: Vec3,
}

impl CameraParams {
    pub fn from_camera(camera: &PerspectiveCamera) -> Self {
        Self {
            view_proj: camera.view_proj(),
            position: camera.position,
        }
    }
}

/// Lighting state consumed by the renderer's uniform buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct LightParams {
    pub ambient: Vec3,
    pub direction: Vec3,
    pub directional: Vec3,
}

impl LightParams {
    /// Collects the first ambient and directional light in `scene`.
    ///
    /// Scenes without lights render unlit-bright so that a cleared scene
    /// still produces a sensible frame.
    pub fn from_scene(scene: &Scene) -> Self {
        let rig = Lighting::default();
        let ambient = scene
            .ambient_light()
            .map(|light| light.color * light.intensity)
            .unwrap_or(Vec3::ONE);
        let (direction, directional) = scene
            .directional_light()
            .map(|light| (light.direction, light.color * light.intensity))
            .unwrap_or((rig.directional.direction, Vec3::ZERO));
        Self {
            ambient,
            direction: direction.normalize_or_zero(),
            directional,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn light_params_scale_color_by_intensity() {
        let mut scene = Scene::new(Vec3::ZERO);
        Lighting::default().attach(&mut scene);
        let params = LightParams::from_scene(&scene);
        assert_eq!(params.ambient, Vec3::splat(0.8));
        assert_eq!(params.directional, Vec3::splat(0.5));
    }

    #[test]
    fn empty_scene_falls_back_to_full_ambient() {
        let params = LightParams::from_scene(&Scene::new(Vec3::ZERO));
        assert_eq!(params.ambient, Vec3::ONE);
        assert_eq!(params.directional, Vec3::ZERO);
    }
}
