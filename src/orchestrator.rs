use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use futures::future::Aborted;
use log::{debug, info, warn};

use crate::camera::{aspect_ratio, PerspectiveCamera};
use crate::clock::{Clock, SystemClock};
use crate::config::BackdropOptions;
use crate::driver::{DocumentDriver, HookRegistration};
use crate::entities::{BoxEntityFactory, DecorativeEntitySpawner, EntityMeshFactory};
use crate::error::BackdropError;
use crate::lifecycle::{LifecycleGuard, LifecycleToken};
use crate::lighting::Lighting;
use crate::panorama::{ClassicPanorama, PanoramaFaceSet};
use crate::scene::Scene;
use crate::texture::TextureLoader;
use crate::world::{SceneFragment, WorldHandle, WorldRenderer, WorldSnapshotProvider};

/// Which content fills the backdrop. Exactly one per orchestrator.
#[derive(Clone)]
pub enum BackdropMode {
    /// Six-face fading panorama.
    Classic,
    /// Snapshot of a live world, built by `provider`.
    WorldSnapshot {
        provider: Rc<dyn WorldSnapshotProvider>,
        world: WorldHandle,
    },
}

impl fmt::Debug for BackdropMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackdropMode::Classic => f.write_str("Classic"),
            BackdropMode::WorldSnapshot { world, .. } => f
                .debug_struct("WorldSnapshot")
                .field("world", world)
                .finish_non_exhaustive(),
        }
    }
}

/// Node and mesh counts of the current scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneSummary {
    pub nodes: usize,
    pub meshes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Starting,
    Running,
    Failed,
}

/// Everything the render hook touches. Shared between the orchestrator and
/// the hook it installs.
struct BackdropState {
    scene: Scene,
    camera: PerspectiveCamera,
    panorama: Option<ClassicPanorama>,
    world_renderer: Option<Box<dyn WorldRenderer>>,
}

impl BackdropState {
    fn render_frame<D: DocumentDriver>(&mut self, driver: &D, now: f64, surface_size_changed: bool) {
        if surface_size_changed {
            let (width, height) = driver.surface_size();
            self.camera.resize(width, height);
        }
        if let Some(panorama) = self.panorama.as_mut() {
            panorama.before_render(&mut self.scene, now);
        }
        if let Err(err) = driver.draw(&self.scene, &self.camera) {
            warn!("backdrop frame failed: {err:#}");
        }
    }

    /// Idempotent.
    fn teardown(&mut self) {
        self.scene.clear();
        self.panorama = None;
        if let Some(mut renderer) = self.world_renderer.take() {
            renderer.destroy();
        }
    }

    fn attach(&mut self, fragment: SceneFragment) {
        let SceneFragment { nodes, renderer } = fragment;
        for node in nodes {
            self.scene.add(node);
        }
        self.world_renderer = renderer;
    }
}

/// Owns the menu backdrop: scene, camera, lights, the content strategy and
/// the render hook installed into the driver.
pub struct SceneOrchestrator<D: DocumentDriver + 'static> {
    driver: Rc<D>,
    options: BackdropOptions,
    mode: BackdropMode,
    faces: PanoramaFaceSet,
    textures: Rc<dyn TextureLoader>,
    entities: Rc<dyn EntityMeshFactory>,
    clock: Rc<dyn Clock>,
    state: Rc<RefCell<BackdropState>>,
    // Readable while a frame holds `state`.
    disposed: Rc<Cell<bool>>,
    token: LifecycleToken,
    guard: RefCell<Option<LifecycleGuard>>,
    phase: Cell<Phase>,
    hook: Cell<Option<HookRegistration>>,
}

impl<D: DocumentDriver + 'static> SceneOrchestrator<D> {
    /// Sets up the scene, camera and lights. Content is only built by
    /// [`SceneOrchestrator::start`].
    pub fn new(
        driver: Rc<D>,
        options: BackdropOptions,
        mode: BackdropMode,
        textures: Rc<dyn TextureLoader>,
    ) -> Self {
        let (width, height) = driver.surface_size();
        let aspect = aspect_ratio(width, height).unwrap_or(1.0);
        let camera = PerspectiveCamera::new(options.fov, aspect, options.near, options.far);

        let mut scene = Scene::new(options.background);
        Lighting::default().attach(&mut scene);

        let (token, guard) = LifecycleToken::pair();
        Self {
            driver,
            options,
            mode,
            faces: PanoramaFaceSet::classic(),
            textures,
            entities: Rc::new(BoxEntityFactory::default()),
            clock: Rc::new(SystemClock),
            state: Rc::new(RefCell::new(BackdropState {
                scene,
                camera,
                panorama: None,
                world_renderer: None,
            })),
            disposed: Rc::new(Cell::new(false)),
            token,
            guard: RefCell::new(Some(guard)),
            phase: Cell::new(Phase::Idle),
            hook: Cell::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_entity_factory(mut self, factory: Rc<dyn EntityMeshFactory>) -> Self {
        self.entities = factory;
        self
    }

    /// Builds the content for the selected mode, then installs the render
    /// hook.
    ///
    /// Only world-snapshot mode suspends. Disposing while it waits makes
    /// this return [`BackdropError::Cancelled`] and nothing is attached.
    pub async fn start(&self) -> Result<(), BackdropError> {
        if self.token.is_cancelled() {
            return Err(BackdropError::Cancelled);
        }
        if self.phase.get() != Phase::Idle {
            return Err(BackdropError::AlreadyStarted);
        }
        self.phase.set(Phase::Starting);

        let built = match &self.mode {
            BackdropMode::Classic => self.build_classic(),
            BackdropMode::WorldSnapshot { provider, world } => {
                self.build_world(provider.as_ref(), world).await
            }
        };
        if let Err(err) = built {
            self.phase.set(Phase::Failed);
            return Err(err);
        }

        self.install_render_hook();
        self.phase.set(Phase::Running);
        info!("menu backdrop started in {:?} mode", self.mode);
        Ok(())
    }

    fn build_classic(&self) -> Result<(), BackdropError> {
        let spawner = self
            .options
            .enable_decorative_entities
            .then(|| DecorativeEntitySpawner::new(Rc::clone(&self.entities)));

        let mut state = self.state.borrow_mut();
        let panorama = ClassicPanorama::build(
            &mut state.scene,
            &self.faces,
            self.textures.as_ref(),
            self.clock.as_ref(),
            spawner.as_ref(),
        )?;
        state.panorama = Some(panorama);
        Ok(())
    }

    async fn build_world(
        &self,
        provider: &dyn WorldSnapshotProvider,
        world: &WorldHandle,
    ) -> Result<(), BackdropError> {
        let guard = self
            .guard
            .borrow_mut()
            .take()
            .ok_or(BackdropError::AlreadyStarted)?;

        info!("building world snapshot for {world}");
        let fragment = match guard
            .guard(provider.build_snapshot_scene(world, &self.token))
            .await
        {
            Ok(result) => result.map_err(BackdropError::Snapshot)?,
            Err(Aborted) => return Err(BackdropError::Cancelled),
        };

        if self.disposed.get() || self.token.is_cancelled() {
            fragment.discard();
            return Err(BackdropError::Cancelled);
        }
        self.state.borrow_mut().attach(fragment);
        Ok(())
    }

    fn install_render_hook(&self) {
        let driver = Rc::downgrade(&self.driver);
        let state = Rc::clone(&self.state);
        let disposed = Rc::clone(&self.disposed);
        let clock = Rc::clone(&self.clock);
        let registration =
            self.driver
                .set_render_hook(Some(Box::new(move |surface_size_changed: bool| {
                    if disposed.get() {
                        return;
                    }
                    let Some(driver) = driver.upgrade() else {
                        return;
                    };
                    let mut state = state.borrow_mut();
                    state.render_frame(&*driver, clock.now_millis(), surface_size_changed);
                    // Disposed from inside the frame; finish what dispose deferred.
                    if disposed.get() {
                        state.teardown();
                    }
                })));
        self.hook.set(Some(registration));
    }

    /// Tears the backdrop down. Safe to call any number of times, before or
    /// after a failed start, and from inside a frame.
    ///
    /// The render hook is only removed if it is still the one `start`
    /// installed; a hook some other component put in its place is left
    /// alone.
    pub fn dispose(&self) {
        let first = self.token.cancel();
        self.disposed.set(true);
        if let Some(registration) = self.hook.take() {
            if !self.driver.remove_render_hook(registration) {
                debug!("render hook was replaced; leaving it installed");
            }
        }

        match self.state.try_borrow_mut() {
            Ok(mut state) => state.teardown(),
            Err(_) => debug!("backdrop disposed mid-frame; teardown deferred"),
        }

        if first {
            info!("menu backdrop disposed");
        }
    }

    /// True once content is attached and the render hook is installed.
    pub fn is_started(&self) -> bool {
        self.phase.get() == Phase::Running
    }

    pub fn is_disposed(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn camera(&self) -> PerspectiveCamera {
        self.state.borrow().camera.clone()
    }

    pub fn scene_summary(&self) -> SceneSummary {
        let state = self.state.borrow();
        SceneSummary {
            nodes: state.scene.node_count(),
            meshes: state.scene.meshes().len(),
        }
    }
}
