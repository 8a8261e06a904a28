use std::cell::{Cell, RefCell};

use anyhow::Result;

use crate::camera::PerspectiveCamera;
use crate::scene::Scene;

/// Per-frame callback registered with a [`DocumentDriver`].
///
/// The argument is true when the drawable surface changed size since the
/// previous frame.
pub type RenderHook = Box<dyn FnMut(bool)>;

/// Identifies one [`DocumentDriver::set_render_hook`] call.
///
/// Removal through [`DocumentDriver::remove_render_hook`] only succeeds
/// while that hook is still the installed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookRegistration(u64);

/// Owner of the drawable surface and of the frame loop.
///
/// Drivers are single-threaded and take `&self` everywhere so that a hook
/// can call back into [`DocumentDriver::draw`] while the driver is
/// invoking it.
pub trait DocumentDriver {
    /// Current surface size in physical pixels.
    fn surface_size(&self) -> (u32, u32);

    /// Replaces the registered render hook. `None` uninstalls it.
    fn set_render_hook(&self, hook: Option<RenderHook>) -> HookRegistration;

    /// Uninstalls the hook only if nothing replaced it since `registration`.
    /// Returns whether a hook was removed.
    fn remove_render_hook(&self, registration: HookRegistration) -> bool;

    /// Draws `scene` as seen from `camera`.
    fn draw(&self, scene: &Scene, camera: &PerspectiveCamera) -> Result<()>;
}

/// Summary of one frame drawn by the [`HeadlessDriver`].
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
    pub index: usize,
    pub aspect: f32,
    pub node_count: usize,
    pub mesh_count: usize,
    /// Opacity of every material slot in draw order.
    pub opacities: Vec<f32>,
    /// Y rotation of every mesh node in draw order.
    pub rotations: Vec<f32>,
}

/// Storage for a driver's [`RenderHook`].
///
/// The hook is taken out while it runs so it can call back into the
/// driver, including replacing or removing itself.
#[derive(Default)]
pub struct RenderHookSlot {
    inner: RefCell<HookState>,
}

#[derive(Default)]
struct HookState {
    hook: Option<RenderHook>,
    generation: u64,
}

impl RenderHookSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, hook: Option<RenderHook>) -> HookRegistration {
        let mut state = self.inner.borrow_mut();
        state.generation += 1;
        state.hook = hook;
        HookRegistration(state.generation)
    }

    /// Clears the slot if `registration` is still current. Works while the
    /// hook is running, in which case it is not put back afterwards.
    pub fn remove(&self, registration: HookRegistration) -> bool {
        let mut state = self.inner.borrow_mut();
        if state.generation != registration.0 {
            return false;
        }
        state.generation += 1;
        state.hook = None;
        true
    }

    pub fn is_installed(&self) -> bool {
        self.inner.borrow().hook.is_some()
    }

    /// Runs the hook once. Returns false when none is installed.
    pub fn invoke(&self, surface_size_changed: bool) -> bool {
        let taken = {
            let mut state = self.inner.borrow_mut();
            let generation = state.generation;
            state.hook.take().map(|hook| (hook, generation))
        };
        let Some((mut hook, generation)) = taken else {
            return false;
        };

        hook(surface_size_changed);

        let mut state = self.inner.borrow_mut();
        if state.generation == generation {
            state.hook = Some(hook);
        }
        true
    }
}

/// Driver without a window. Frames are pumped explicitly with
/// [`HeadlessDriver::frame`] and recorded instead of rasterised.
pub struct HeadlessDriver {
    size: Cell<(u32, u32)>,
    resized: Cell<bool>,
    hook: RenderHookSlot,
    frames: RefCell<Vec<FrameRecord>>,
}

impl HeadlessDriver {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: Cell::new((width, height)),
            resized: Cell::new(false),
            hook: RenderHookSlot::new(),
            frames: RefCell::new(Vec::new()),
        }
    }

    /// Changes the surface size; the next frame reports the change.
    pub fn resize(&self, width: u32, height: u32) {
        if self.size.get() != (width, height) {
            self.size.set((width, height));
            self.resized.set(true);
        }
    }

    pub fn has_render_hook(&self) -> bool {
        self.hook.is_installed()
    }

    /// Invokes the render hook once. Returns false when no hook is installed.
    pub fn frame(&self) -> bool {
        if !self.hook.is_installed() {
            return false;
        }
        self.hook.invoke(self.resized.replace(false))
    }

    /// Pumps up to `count` frames and returns how many ran.
    pub fn run(&self, count: usize) -> usize {
        (0..count).take_while(|_| self.frame()).count()
    }

    pub fn frames(&self) -> Vec<FrameRecord> {
        self.frames.borrow().clone()
    }

    pub fn last_frame(&self) -> Option<FrameRecord> {
        self.frames.borrow().last().cloned()
    }
}

impl DocumentDriver for HeadlessDriver {
    fn surface_size(&self) -> (u32, u32) {
        self.size.get()
    }

    fn set_render_hook(&self, hook: Option<RenderHook>) -> HookRegistration {
        self.hook.set(hook)
    }

    fn remove_render_hook(&self, registration: HookRegistration) -> bool {
        self.hook.remove(registration)
    }

    fn draw(&self, scene: &Scene, camera: &PerspectiveCamera) -> Result<()> {
        let mut opacities = Vec::new();
        let mut rotations = Vec::new();
        scene.visit(|_, node| {
            if let Some(mesh) = node.as_mesh() {
                rotations.push(node.rotation.y);
                opacities.extend(mesh.materials.iter().map(|material| material.opacity));
            }
        });

        let mut frames = self.frames.borrow_mut();
        let index = frames.len();
        frames.push(FrameRecord {
            index,
            aspect: camera.aspect,
            node_count: scene.node_count(),
            mesh_count: rotations.len(),
            opacities,
            rotations,
        });
        Ok(())
    }
}
