use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::ops::Range;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{Context, Result};
use glam::Vec3;
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::BackdropError;
use crate::lighting::rgb_hex;
use crate::mesh::{load_obj_from_str, MeshData};
use crate::scene::{Material, Mesh, NodeId, SceneNode};

pub const DECORATIVE_ENTITY_COUNT: usize = 20;
pub const DECORATIVE_ENTITY_KIND: &str = "squid";

pub const SPAWN_RANGE_X: Range<f32> = -15.0..15.0;
pub const SPAWN_RANGE_Y: Range<f32> = -10.0..10.0;
pub const SPAWN_RANGE_Z: Range<f32> = -17.0..-7.0;

/// Produces meshes for decorative creatures.
pub trait EntityMeshFactory {
    fn make_decorative_mesh(&self, kind: &str) -> Result<Mesh>;
}

impl<T> EntityMeshFactory for Rc<T>
where
    T: EntityMeshFactory + ?Sized,
{
    fn make_decorative_mesh(&self, kind: &str) -> Result<Mesh> {
        (**self).make_decorative_mesh(kind)
    }
}

/// Stand-in creature: a small lit cube. Every kind looks the same.
#[derive(Debug, Clone)]
pub struct BoxEntityFactory {
    geometry: Arc<MeshData>,
    color: Vec3,
}

impl BoxEntityFactory {
    pub fn new(size: f32, color: Vec3) -> Self {
        Self {
            geometry: Arc::new(MeshData::cuboid(Vec3::splat(size))),
            color,
        }
    }

    pub fn default_color() -> Vec3 {
        rgb_hex(0x3b5f8a)
    }
}

impl Default for BoxEntityFactory {
    fn default() -> Self {
        Self::new(1.0, Self::default_color())
    }
}

impl EntityMeshFactory for BoxEntityFactory {
    fn make_decorative_mesh(&self, _kind: &str) -> Result<Mesh> {
        Ok(Mesh::new(
            Arc::clone(&self.geometry),
            vec![Material::lit(self.color)],
        ))
    }
}

/// Loads `<root>/<kind>.obj`, parsing each kind once.
#[derive(Debug)]
pub struct ObjEntityFactory {
    root: PathBuf,
    color: Vec3,
    cache: RefCell<HashMap<String, Arc<MeshData>>>,
}

impl ObjEntityFactory {
    pub fn new(root: impl Into<PathBuf>, color: Vec3) -> Self {
        Self {
            root: root.into(),
            color,
            cache: RefCell::new(HashMap::new()),
        }
    }

    fn geometry(&self, kind: &str) -> Result<Arc<MeshData>> {
        if let Some(geometry) = self.cache.borrow().get(kind) {
            return Ok(Arc::clone(geometry));
        }
        let path = self.root.join(format!("{kind}.obj"));
        let source = fs::read_to_string(&path)
            .with_context(|| format!("unable to read {}", path.display()))?;
        let geometry = Arc::new(
            load_obj_from_str(&source)
                .with_context(|| format!("failed to parse OBJ mesh {}", path.display()))?,
        );
        debug!("loaded decorative mesh {kind} from {}", path.display());
        self.cache
            .borrow_mut()
            .insert(kind.to_string(), Arc::clone(&geometry));
        Ok(geometry)
    }
}

impl EntityMeshFactory for ObjEntityFactory {
    fn make_decorative_mesh(&self, kind: &str) -> Result<Mesh> {
        Ok(Mesh::new(self.geometry(kind)?, vec![Material::lit(self.color)]))
    }
}

/// Scatters decorative creatures around the origin.
pub struct DecorativeEntitySpawner {
    factory: Rc<dyn EntityMeshFactory>,
    seed: Option<u64>,
}

impl DecorativeEntitySpawner {
    pub fn new(factory: Rc<dyn EntityMeshFactory>) -> Self {
        Self {
            factory,
            seed: None,
        }
    }

    /// Makes placement reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Adds [`DECORATIVE_ENTITY_COUNT`] meshes under `parent`.
    ///
    /// Nothing is attached unless every mesh was created.
    pub fn spawn(&self, parent: &mut SceneNode) -> Result<Vec<NodeId>, BackdropError> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut spawned = Vec::with_capacity(DECORATIVE_ENTITY_COUNT);
        for index in 0..DECORATIVE_ENTITY_COUNT {
            let mesh = self
                .factory
                .make_decorative_mesh(DECORATIVE_ENTITY_KIND)
                .map_err(|source| BackdropError::DecorativeMesh {
                    kind: DECORATIVE_ENTITY_KIND.to_string(),
                    source,
                })?;
            spawned.push(
                SceneNode::mesh(format!("{DECORATIVE_ENTITY_KIND}-{index}"), mesh)
                    .with_position(random_spawn_position(&mut rng)),
            );
        }
        Ok(spawned.into_iter().map(|node| parent.add(node)).collect())
    }
}

/// Uniform position inside the spawn box, each axis drawn independently.
pub fn random_spawn_position(rng: &mut impl Rng) -> Vec3 {
    Vec3::new(
        rng.gen_range(SPAWN_RANGE_X),
        rng.gen_range(SPAWN_RANGE_Y),
        rng.gen_range(SPAWN_RANGE_Z),
    )
}
