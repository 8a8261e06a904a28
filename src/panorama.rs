//! Classic menu panorama: a huge inward-facing cube whose six faces fade in
//! one by one while the whole box spins slowly around the camera.

use std::f32::consts::PI;
use std::sync::Arc;

use glam::{Mat3, Vec3};
use log::info;

use crate::clock::Clock;
use crate::entities::DecorativeEntitySpawner;
use crate::error::BackdropError;
use crate::mesh::MeshData;
use crate::scene::{Material, Mesh, NodeId, Scene, SceneNode};
use crate::texture::TextureLoader;

pub const PANORAMA_FACE_COUNT: usize = 6;

/// Face images in cube face order (`+x, -x, +y, -y, +z, -z`).
pub const PANORAMA_FILES: [&str; PANORAMA_FACE_COUNT] = [
    "panorama_3.png",
    "panorama_1.png",
    "panorama_4.png",
    "panorama_5.png",
    "panorama_0.png",
    "panorama_2.png",
];

pub const PANORAMA_DIR: &str = "background";

/// Edge length of the cube. The camera sits at its centre.
pub const PANORAMA_BOX_SIZE: f32 = 1000.0;

pub const FADE_IN_MILLIS: f64 = 200.0;

/// Added to the animation accumulator on every pre-render pass.
pub const TIME_STEP: f64 = 0.01;

/// Radians of spin per unit of accumulated time.
pub const SPIN_RATE: f64 = 0.01;

/// Mirrors U (`u' = 1 - u`) so the images read correctly from inside the cube.
pub const INWARD_UV_TRANSFORM: Mat3 = Mat3::from_cols(
    Vec3::new(-1.0, 0.0, 0.0),
    Vec3::new(0.0, 1.0, 0.0),
    Vec3::new(1.0, 0.0, 1.0),
);

/// The six texture paths of the panorama, in face order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanoramaFaceSet {
    paths: [String; PANORAMA_FACE_COUNT],
}

impl PanoramaFaceSet {
    /// The stock menu panorama under `background/`.
    pub fn classic() -> Self {
        Self {
            paths: PANORAMA_FILES.map(|file| format!("{PANORAMA_DIR}/{file}")),
        }
    }

    pub fn paths(&self) -> &[String; PANORAMA_FACE_COUNT] {
        &self.paths
    }
}

impl Default for PanoramaFaceSet {
    fn default() -> Self {
        Self::classic()
    }
}

/// Opacity of a face `elapsed_millis` after its fade started.
pub fn fade_opacity(elapsed_millis: f64) -> f32 {
    (elapsed_millis.max(0.0) / FADE_IN_MILLIS).min(1.0) as f32
}

/// Write-once fade start time per face.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FadeClock {
    started: [Option<f64>; PANORAMA_FACE_COUNT],
}

impl FadeClock {
    /// Records `now` for `face` unless the face already has an entry.
    pub fn start(&mut self, face: usize, now: f64) -> bool {
        match self.started.get_mut(face) {
            Some(slot @ None) => {
                *slot = Some(now);
                true
            }
            _ => false,
        }
    }

    pub fn started_at(&self, face: usize) -> Option<f64> {
        self.started.get(face).copied().flatten()
    }

    /// Number of faces with a recorded start.
    pub fn len(&self) -> usize {
        self.started.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Target opacity of `face` at `now`, or `None` when the face has no entry.
    pub fn opacity(&self, face: usize, now: f64) -> Option<f32> {
        self.started_at(face).map(|start| fade_opacity(now - start))
    }
}

/// Ever-growing time accumulator that drives the spin.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AnimationState {
    time: f64,
}

impl AnimationState {
    pub fn tick(&mut self) {
        self.time += TIME_STEP;
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Rotation about the vertical axis, offset by half a turn.
    pub fn rotation_y(&self) -> f32 {
        (PI as f64 + self.time * SPIN_RATE) as f32
    }
}

/// Scene content of the classic panorama and its per-frame animation.
#[derive(Debug)]
pub struct ClassicPanorama {
    group: NodeId,
    mesh: NodeId,
    fade_clock: FadeClock,
    animation: AnimationState,
}

impl ClassicPanorama {
    /// Loads all six faces, builds the cube (plus decorations when a spawner
    /// is given) and attaches it to `scene`.
    ///
    /// Any asset failure aborts the build before the scene is touched.
    pub fn build(
        scene: &mut Scene,
        faces: &PanoramaFaceSet,
        textures: &dyn TextureLoader,
        clock: &dyn Clock,
        spawner: Option<&DecorativeEntitySpawner>,
    ) -> Result<Self, BackdropError> {
        let mut fade_clock = FadeClock::default();
        let mut materials = Vec::with_capacity(PANORAMA_FACE_COUNT);

        for (face, path) in faces.paths().iter().enumerate() {
            let mut texture =
                textures
                    .load_texture(path)
                    .map_err(|source| BackdropError::Texture {
                        path: path.clone(),
                        source,
                    })?;
            texture.set_uv_transform(INWARD_UV_TRANSFORM);
            materials.push(Material::panorama_face(texture));
            fade_clock.start(face, clock.now_millis());
        }

        let geometry = Arc::new(MeshData::cuboid(Vec3::splat(PANORAMA_BOX_SIZE)));
        let animation = AnimationState::default();
        let mut cube = SceneNode::mesh("panorama-box", Mesh::new(geometry, materials));
        cube.rotation.y = animation.rotation_y();

        let mut group = SceneNode::group("panorama");
        let mesh = group.add(cube);
        if let Some(spawner) = spawner {
            let spawned = spawner.spawn(&mut group)?;
            info!("spawned {} decorative entities", spawned.len());
        }
        let group = scene.add(group);
        info!("classic panorama attached");

        Ok(Self {
            group,
            mesh,
            fade_clock,
            animation,
        })
    }

    /// Advances the spin and the face fades. Runs right before every draw.
    ///
    /// Returns false when the cube is no longer part of `scene`.
    pub fn before_render(&mut self, scene: &mut Scene, now: f64) -> bool {
        let Some(node) = scene.find_mut(self.mesh) else {
            return false;
        };

        self.animation.tick();
        node.rotation.y = self.animation.rotation_y();

        if let Some(mesh) = node.as_mesh_mut() {
            for (face, material) in mesh.materials.iter_mut().enumerate() {
                let Some(opacity) = self.fade_clock.opacity(face, now) else {
                    continue;
                };
                material.opacity = material.opacity.max(opacity);
            }
        }
        true
    }

    pub fn group_id(&self) -> NodeId {
        self.group
    }

    pub fn mesh_id(&self) -> NodeId {
        self.mesh
    }

    pub fn fade_clock(&self) -> &FadeClock {
        &self.fade_clock
    }

    pub fn animation(&self) -> AnimationState {
        self.animation
    }

    /// Current opacity of each face, if the cube is still in `scene`.
    pub fn face_opacities(&self, scene: &Scene) -> Option<Vec<f32>> {
        let mesh = scene.find(self.mesh)?.as_mesh()?;
        Some(mesh.materials.iter().map(|material| material.opacity).collect())
    }

    #[cfg(test)]
    fn forget_face(&mut self, face: usize) {
        self.fade_clock.started[face] = None;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::f32::consts::TAU;
    use std::rc::Rc;

    use anyhow::{anyhow, Result};
    use glam::Vec2;

    use super::*;
    use crate::clock::ManualClock;
    use crate::entities::{BoxEntityFactory, DECORATIVE_ENTITY_COUNT};
    use crate::texture::Texture;

    /// Hands out solid textures and remembers the request order. Each load
    /// moves the shared clock forward so faces start at different times.
    struct RecordingLoader {
        requested: RefCell<Vec<String>>,
        clock: Rc<ManualClock>,
        step_millis: f64,
        fail_on: Option<&'static str>,
    }

    impl RecordingLoader {
        fn new(clock: Rc<ManualClock>, step_millis: f64) -> Self {
            Self {
                requested: RefCell::new(Vec::new()),
                clock,
                step_millis,
                fail_on: None,
            }
        }
    }

    impl TextureLoader for RecordingLoader {
        fn load_texture(&self, path: &str) -> Result<Texture> {
            self.requested.borrow_mut().push(path.to_string());
            if self.fail_on == Some(path) {
                return Err(anyhow!("{path} not found"));
            }
            self.clock.advance(self.step_millis);
            Ok(Texture::solid(path, [255, 255, 255, 255]))
        }
    }

    fn build(step_millis: f64) -> (Scene, ClassicPanorama, Rc<ManualClock>) {
        let clock = Rc::new(ManualClock::new(10_000.0));
        let loader = RecordingLoader::new(Rc::clone(&clock), step_millis);
        let mut scene = Scene::new(Vec3::ZERO);
        let panorama = ClassicPanorama::build(
            &mut scene,
            &PanoramaFaceSet::classic(),
            &loader,
            clock.as_ref(),
            None,
        )
        .unwrap();
        (scene, panorama, clock)
    }

    fn assert_close(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() < 1e-5,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn classic_face_set_keeps_cube_order() {
        let faces = PanoramaFaceSet::classic();
        assert_eq!(faces.paths()[0], "background/panorama_3.png");
        assert_eq!(faces.paths()[4], "background/panorama_0.png");
        assert_eq!(faces.paths()[5], "background/panorama_2.png");
    }

    #[test]
    fn textures_are_requested_in_face_order() {
        let clock = Rc::new(ManualClock::new(0.0));
        let loader = RecordingLoader::new(Rc::clone(&clock), 0.0);
        let mut scene = Scene::new(Vec3::ZERO);
        ClassicPanorama::build(
            &mut scene,
            &PanoramaFaceSet::classic(),
            &loader,
            clock.as_ref(),
            None,
        )
        .unwrap();
        assert_eq!(
            *loader.requested.borrow(),
            PanoramaFaceSet::classic().paths().to_vec()
        );
    }

    #[test]
    fn every_face_gets_one_fade_entry() {
        let (_, panorama, _) = build(5.0);
        let clock = panorama.fade_clock();
        assert_eq!(clock.len(), PANORAMA_FACE_COUNT);
        // Each face was stamped after its own texture load.
        for face in 0..PANORAMA_FACE_COUNT {
            assert_eq!(clock.started_at(face), Some(10_005.0 + 5.0 * face as f64));
        }
    }

    #[test]
    fn fade_clock_entries_are_write_once() {
        let mut clock = FadeClock::default();
        assert!(clock.is_empty());
        assert!(clock.start(2, 100.0));
        assert!(!clock.start(2, 500.0));
        assert!(!clock.start(PANORAMA_FACE_COUNT, 1.0));
        assert_eq!(clock.started_at(2), Some(100.0));
        assert_eq!(clock.len(), 1);
    }

    #[test]
    fn face_materials_start_invisible_and_never_write_depth() {
        let (scene, panorama, _) = build(0.0);
        let mesh = scene.find(panorama.mesh_id()).unwrap().as_mesh().unwrap();
        assert_eq!(mesh.materials.len(), PANORAMA_FACE_COUNT);
        for material in &mesh.materials {
            assert_eq!(material.opacity, 0.0);
            assert!(material.transparent);
            assert!(material.double_sided);
            assert!(!material.depth_write);
            let texture = material.texture.as_ref().unwrap();
            assert!(!texture.matrix_auto_update);
            assert_eq!(texture.transform_uv(Vec2::new(0.0, 0.3)), Vec2::new(1.0, 0.3));
        }
    }

    #[test]
    fn cube_is_wrapped_in_a_group() {
        let (scene, panorama, _) = build(0.0);
        assert_eq!(scene.len(), 1);
        let group = scene.find(panorama.group_id()).unwrap();
        assert_eq!(group.children.len(), 1);
        assert_eq!(group.children[0].id(), panorama.mesh_id());
    }

    #[test]
    fn opacity_follows_linear_fade() {
        assert_eq!(fade_opacity(0.0), 0.0);
        assert_eq!(fade_opacity(50.0), 0.25);
        assert_eq!(fade_opacity(200.0), 1.0);
        assert_eq!(fade_opacity(500.0), 1.0);
        assert_eq!(fade_opacity(-30.0), 0.0);
    }

    #[test]
    fn before_render_applies_elapsed_time_per_face() {
        let (mut scene, mut panorama, _) = build(0.0);
        let start = panorama.fade_clock().started_at(0).unwrap();

        panorama.before_render(&mut scene, start);
        assert!(panorama
            .face_opacities(&scene)
            .unwrap()
            .iter()
            .all(|opacity| *opacity == 0.0));

        panorama.before_render(&mut scene, start + 100.0);
        assert!(panorama
            .face_opacities(&scene)
            .unwrap()
            .iter()
            .all(|opacity| *opacity == 0.5));

        panorama.before_render(&mut scene, start + 200.0);
        assert!(panorama
            .face_opacities(&scene)
            .unwrap()
            .iter()
            .all(|opacity| *opacity == 1.0));
    }

    #[test]
    fn staggered_faces_fade_independently_and_monotonically() {
        let (mut scene, mut panorama, clock) = build(40.0);
        let mut previous = vec![0.0; PANORAMA_FACE_COUNT];
        for _ in 0..30 {
            clock.advance(16.0);
            panorama.before_render(&mut scene, clock.now_millis());
            let current = panorama.face_opacities(&scene).unwrap();
            for (before, now) in previous.iter().zip(&current) {
                assert!(now >= before);
            }
            previous = current;
        }
        assert!(previous.iter().all(|opacity| *opacity == 1.0));

        let (mut scene, mut panorama, clock) = build(40.0);
        clock.advance(16.0);
        panorama.before_render(&mut scene, clock.now_millis());
        let opacities = panorama.face_opacities(&scene).unwrap();
        assert!(opacities[0] > opacities[5]);
    }

    #[test]
    fn fade_never_reverses_when_clock_steps_back() {
        let (mut scene, mut panorama, clock) = build(0.0);
        clock.advance(300.0);
        panorama.before_render(&mut scene, clock.now_millis());
        clock.set(0.0);
        panorama.before_render(&mut scene, clock.now_millis());
        assert!(panorama
            .face_opacities(&scene)
            .unwrap()
            .iter()
            .all(|opacity| *opacity == 1.0));
    }

    #[test]
    fn missing_fade_entry_is_skipped() {
        let (mut scene, mut panorama, clock) = build(0.0);
        panorama.forget_face(3);
        clock.advance(100.0);
        assert!(panorama.before_render(&mut scene, clock.now_millis()));
        let opacities = panorama.face_opacities(&scene).unwrap();
        assert_eq!(opacities[3], 0.0);
        assert_eq!(opacities[2], 0.5);
    }

    #[test]
    fn rotation_after_k_ticks() {
        let (mut scene, mut panorama, clock) = build(0.0);
        let rotation = |scene: &Scene| scene.find(panorama.mesh_id()).unwrap().rotation.y;
        assert_close(rotation(&scene), PI);

        for k in 1..=500u32 {
            panorama.before_render(&mut scene, clock.now_millis());
            let expected = PI + (0.01 * k as f32) * 0.01;
            let actual = scene.find(panorama.mesh_id()).unwrap().rotation.y;
            assert_close(actual.rem_euclid(TAU), expected.rem_euclid(TAU));
        }
        assert!((panorama.animation().time() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn before_render_is_noop_once_scene_is_cleared() {
        let (mut scene, mut panorama, _) = build(0.0);
        scene.clear();
        assert!(!panorama.before_render(&mut scene, 0.0));
        assert_eq!(panorama.animation().time(), 0.0);
        assert!(panorama.face_opacities(&scene).is_none());
    }

    #[test]
    fn texture_failure_leaves_scene_untouched() {
        let clock = Rc::new(ManualClock::new(0.0));
        let mut loader = RecordingLoader::new(Rc::clone(&clock), 0.0);
        loader.fail_on = Some("background/panorama_4.png");
        let mut scene = Scene::new(Vec3::ZERO);
        let err = ClassicPanorama::build(
            &mut scene,
            &PanoramaFaceSet::classic(),
            &loader,
            clock.as_ref(),
            None,
        )
        .unwrap_err();

        assert!(matches!(err, BackdropError::Texture { ref path, .. } if path == "background/panorama_4.png"));
        assert!(scene.is_empty());
        assert_eq!(loader.requested.borrow().len(), 3);
    }

    #[test]
    fn spawner_adds_decorations_to_the_panorama_group() {
        let clock = ManualClock::new(0.0);
        let loader = RecordingLoader::new(Rc::new(ManualClock::new(0.0)), 0.0);
        let spawner = DecorativeEntitySpawner::new(Rc::new(BoxEntityFactory::default()));
        let mut scene = Scene::new(Vec3::ZERO);
        let panorama = ClassicPanorama::build(
            &mut scene,
            &PanoramaFaceSet::classic(),
            &loader,
            &clock,
            Some(&spawner),
        )
        .unwrap();
        let group = scene.find(panorama.group_id()).unwrap();
        assert_eq!(group.children.len(), 1 + DECORATIVE_ENTITY_COUNT);
    }
}
