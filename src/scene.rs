use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glam::{EulerRot, Mat4, Quat, Vec3};

use crate::lighting::{AmbientLight, DirectionalLight};
use crate::mesh::MeshData;
use crate::texture::Texture;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a scene node, assigned when the node is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Surface state for one material slot of a mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub texture: Option<Texture>,
    pub color: Vec3,
    pub opacity: f32,
    pub transparent: bool,
    pub double_sided: bool,
    pub depth_write: bool,
    /// Unlit materials ignore the scene lights.
    pub lit: bool,
}

impl Material {
    /// Panorama face: unlit, transparent, double sided, never writes depth
    /// and starts fully transparent.
    pub fn panorama_face(texture: Texture) -> Self {
        Self {
            texture: Some(texture),
            color: Vec3::ONE,
            opacity: 0.0,
            transparent: true,
            double_sided: true,
            depth_write: false,
            lit: false,
        }
    }

    /// Opaque material shaded by the scene lights.
    pub fn lit(color: Vec3) -> Self {
        Self {
            texture: None,
            color,
            opacity: 1.0,
            transparent: false,
            double_sided: false,
            depth_write: true,
            lit: true,
        }
    }
}

/// Geometry plus one material per geometry group.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub geometry: Arc<MeshData>,
    pub materials: Vec<Material>,
}

impl Mesh {
    pub fn new(geometry: Arc<MeshData>, materials: Vec<Material>) -> Self {
        Self {
            geometry,
            materials,
        }
    }

    /// Material used for `slot`; slots past the end reuse the last material.
    pub fn material(&self, slot: usize) -> Option<&Material> {
        self.materials
            .get(slot)
            .or_else(|| self.materials.last())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Group,
    Mesh(Mesh),
    AmbientLight(AmbientLight),
    DirectionalLight(DirectionalLight),
}

/// Node of the backdrop scene graph. Children are owned by their parent.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    id: NodeId,
    pub name: String,
    pub position: Vec3,
    /// Euler angles in radians, applied in XYZ order.
    pub rotation: Vec3,
    pub scale: Vec3,
    pub kind: NodeKind,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: NodeId::next(),
            name: name.into(),
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
            kind,
            children: Vec::new(),
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Group)
    }

    pub fn mesh(name: impl Into<String>, mesh: Mesh) -> Self {
        Self::new(name, NodeKind::Mesh(mesh))
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Appends `child` and returns its id.
    pub fn add(&mut self, child: SceneNode) -> NodeId {
        let id = child.id;
        self.children.push(child);
        id
    }

    pub fn as_mesh(&self) -> Option<&Mesh> {
        match &self.kind {
            NodeKind::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    pub fn as_mesh_mut(&mut self) -> Option<&mut Mesh> {
        match &mut self.kind {
            NodeKind::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    pub fn local_matrix(&self) -> Mat4 {
        let rotation = Quat::from_euler(
            EulerRot::XYZ,
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
        );
        Mat4::from_scale_rotation_translation(self.scale, rotation, self.position)
    }

    fn find(&self, id: NodeId) -> Option<&SceneNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    fn find_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        if self.id == id {
            return Some(self);
        }
        self.children
            .iter_mut()
            .find_map(|child| child.find_mut(id))
    }

    fn count(&self) -> usize {
        1 + self.children.iter().map(SceneNode::count).sum::<usize>()
    }

    fn walk<'a>(&'a self, parent: Mat4, visit: &mut impl FnMut(Mat4, &'a SceneNode)) {
        let world = parent * self.local_matrix();
        visit(world, self);
        for child in &self.children {
            child.walk(world, visit);
        }
    }
}

/// Root of the backdrop scene graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub background: Vec3,
    nodes: Vec<SceneNode>,
}

impl Scene {
    pub fn new(background: Vec3) -> Self {
        Self {
            background,
            nodes: Vec::new(),
        }
    }

    /// Attaches a top-level node and returns its id.
    pub fn add(&mut self, node: SceneNode) -> NodeId {
        let id = node.id;
        self.nodes.push(node);
        id
    }

    /// Drops every node so nothing stays reachable from the scene.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of top-level nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Number of nodes at every depth.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().map(SceneNode::count).sum()
    }

    pub fn find(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.iter().find_map(|node| node.find(id))
    }

    pub fn find_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.iter_mut().find_map(|node| node.find_mut(id))
    }

    /// Visits every node depth-first together with its world matrix.
    pub fn visit<'a>(&'a self, mut visit: impl FnMut(Mat4, &'a SceneNode)) {
        for node in &self.nodes {
            node.walk(Mat4::IDENTITY, &mut visit);
        }
    }

    /// Every mesh in draw order with its world matrix.
    pub fn meshes(&self) -> Vec<(Mat4, &Mesh)> {
        let mut meshes = Vec::new();
        self.visit(|world, node| {
            if let Some(mesh) = node.as_mesh() {
                meshes.push((world, mesh));
            }
        });
        meshes
    }

    pub fn ambient_light(&self) -> Option<AmbientLight> {
        self.first_light(|kind| match kind {
            NodeKind::AmbientLight(light) => Some(*light),
            _ => None,
        })
    }

    pub fn directional_light(&self) -> Option<DirectionalLight> {
        self.first_light(|kind| match kind {
            NodeKind::DirectionalLight(light) => Some(*light),
            _ => None,
        })
    }

    fn first_light<T>(&self, extract: impl Fn(&NodeKind) -> Option<T>) -> Option<T> {
        let mut found = None;
        self.visit(|_, node| {
            if found.is_none() {
                found = extract(&node.kind);
            }
        });
        found
    }
}
