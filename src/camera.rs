use glam::{Mat4, Vec3};

/// Perspective camera parked at the origin looking down -Z.
#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveCamera {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
    projection: Mat4,
}

impl PerspectiveCamera {
    pub fn new(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut camera = Self {
            fov,
            aspect,
            near,
            far,
            position: Vec3::ZERO,
            projection: Mat4::IDENTITY,
        };
        camera.update_projection_matrix();
        camera
    }

    /// Recomputes the cached projection after any field changed.
    pub fn update_projection_matrix(&mut self) {
        self.projection =
            Mat4::perspective_rh(self.fov.to_radians(), self.aspect.max(0.01), self.near, self.far);
    }

    /// Adopts the aspect ratio of a `width` x `height` surface.
    ///
    /// Degenerate sizes keep the previous aspect.
    pub fn resize(&mut self, width: u32, height: u32) {
        if let Some(aspect) = aspect_ratio(width, height) {
            self.aspect = aspect;
            self.update_projection_matrix();
        }
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, Vec3::NEG_Z, Vec3::Y)
    }

    pub fn view_proj(&self) -> Mat4 {
        self.projection * self.view()
    }
}

/// `width / height`, or `None` when either side is zero.
pub fn aspect_ratio(width: u32, height: u32) -> Option<f32> {
    (width > 0 && height > 0).then(|| width as f32 / height as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_tracks_surface_aspect() {
        let mut camera = PerspectiveCamera::new(85.0, 1.0, 0.05, 1000.0);
        let before = camera.projection();
        camera.resize(1920, 1080);
        assert!((camera.aspect - 16.0 / 9.0).abs() < 1e-6);
        assert_ne!(camera.projection(), before);
    }

    #[test]
    fn zero_sized_surface_keeps_previous_aspect() {
        let mut camera = PerspectiveCamera::new(85.0, 2.0, 0.05, 1000.0);
        camera.resize(800, 0);
        assert_eq!(camera.aspect, 2.0);
        assert_eq!(aspect_ratio(0, 600), None);
    }

    #[test]
    fn far_plane_encloses_the_panorama_box() {
        let camera = PerspectiveCamera::new(85.0, 1.0, 0.05, 1000.0);
        let corner = camera.view_proj().project_point3(Vec3::new(0.0, 0.0, -500.0));
        assert!(corner.z > 0.0 && corner.z < 1.0);
    }
}
