//! Boundary to the live world-snapshot renderer. The backdrop only awaits a
//! [`SceneFragment`] and owns whatever renderer comes with it.

use std::fmt;

use anyhow::Result;
use futures::future::LocalBoxFuture;

use crate::lifecycle::LifecycleToken;
use crate::scene::SceneNode;

/// Opaque reference to the world whose snapshot becomes the backdrop.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorldHandle {
    pub label: String,
    pub version: String,
}

impl WorldHandle {
    pub fn new(label: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for WorldHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.version)
    }
}

/// Extra rendering machinery owned by a snapshot. Destroyed on disposal.
pub trait WorldRenderer {
    fn destroy(&mut self);
}

/// Content produced by a [`WorldSnapshotProvider`].
#[derive(Default)]
pub struct SceneFragment {
    pub nodes: Vec<SceneNode>,
    pub renderer: Option<Box<dyn WorldRenderer>>,
}

impl SceneFragment {
    pub fn new(nodes: Vec<SceneNode>) -> Self {
        Self {
            nodes,
            renderer: None,
        }
    }

    pub fn with_renderer(mut self, renderer: impl WorldRenderer + 'static) -> Self {
        self.renderer = Some(Box::new(renderer));
        self
    }

    /// Tears the fragment down without attaching it anywhere.
    pub fn discard(mut self) {
        if let Some(mut renderer) = self.renderer.take() {
            renderer.destroy();
        }
    }
}

impl fmt::Debug for SceneFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneFragment")
            .field("nodes", &self.nodes.len())
            .field("renderer", &self.renderer.is_some())
            .finish()
    }
}

/// Builds a scene fragment showing a snapshot of a live world.
///
/// Implementations should watch `token` and stop early once it fires. The
/// backdrop also drops the returned future on disposal.
pub trait WorldSnapshotProvider {
    fn build_snapshot_scene<'a>(
        &'a self,
        world: &'a WorldHandle,
        token: &'a LifecycleToken,
    ) -> LocalBoxFuture<'a, Result<SceneFragment>>;
}
