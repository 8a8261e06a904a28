//! Animated 3D backdrop for a game's main menu.
//!
//! A [`SceneOrchestrator`] owns the scene graph, camera and lights, fills the
//! scene with either the classic six-face panorama or a snapshot of a live
//! world, and installs a per-frame render hook into a [`DocumentDriver`].
//! The driver owns the surface and the frame loop; [`HeadlessDriver`] lets the
//! whole pipeline run without a window, while the binary drives a wgpu
//! [`Renderer`] through winit.

pub mod camera;
pub mod clock;
pub mod config;
pub mod driver;
pub mod entities;
pub mod error;
pub mod lifecycle;
pub mod lighting;
pub mod mesh;
pub mod orchestrator;
pub mod panorama;
pub mod render;
pub mod scene;
pub mod texture;
pub mod world;

pub use camera::PerspectiveCamera;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::BackdropOptions;
pub use driver::{
    DocumentDriver, FrameRecord, HeadlessDriver, HookRegistration, RenderHook, RenderHookSlot,
};
pub use entities::{
    BoxEntityFactory, DecorativeEntitySpawner, EntityMeshFactory, ObjEntityFactory,
    DECORATIVE_ENTITY_COUNT, DECORATIVE_ENTITY_KIND,
};
pub use error::BackdropError;
pub use lifecycle::{LifecycleGuard, LifecycleToken};
pub use lighting::Lighting;
pub use mesh::{load_obj_from_str, MeshData, Vertex};
pub use orchestrator::{BackdropMode, SceneOrchestrator, SceneSummary};
pub use panorama::{ClassicPanorama, PanoramaFaceSet};
pub use render::{CameraParams, LightParams, Renderer};
pub use scene::{Material, Mesh, NodeId, NodeKind, Scene, SceneNode};
pub use texture::{FsTextureLoader, Texture, TextureLoader};
pub use world::{SceneFragment, WorldHandle, WorldRenderer, WorldSnapshotProvider};
