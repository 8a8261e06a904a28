use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::info;
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::window::{Window, WindowId};

use menu_backdrop::{
    BackdropMode, BackdropOptions, BoxEntityFactory, DocumentDriver, EntityMeshFactory,
    FsTextureLoader, HeadlessDriver, HookRegistration, ManualClock, ObjEntityFactory,
    PerspectiveCamera, RenderHook, RenderHookSlot, Renderer, Scene, SceneOrchestrator,
    TextureLoader, DECORATIVE_ENTITY_KIND,
};

/// Simulated frame time used by headless runs.
const HEADLESS_FRAME_MILLIS: f64 = 1000.0 / 60.0;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = CliOptions::parse();
    let options = cli.backdrop_options()?;
    println!(
        "Loading menu backdrop from {}",
        options.asset_root.display()
    );

    if cli.headless {
        return run_headless(options, cli.frames, cli.width, cli.height);
    }

    match run_windowed(options.clone(), cli.width, cli.height) {
        Ok(()) => Ok(()),
        Err(err) => {
            if err.downcast_ref::<WindowInitError>().is_some() {
                eprintln!("{err}. Falling back to --headless mode.");
                run_headless(options, cli.frames, cli.width, cli.height)
            } else {
                Err(err)
            }
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "menu-backdrop")]
#[command(about = "Animated 3D main-menu backdrop", long_about = None)]
struct CliOptions {
    /// Directory containing `background/panorama_*.png`
    #[arg(long)]
    assets: Option<PathBuf>,

    /// XML options file with a `<backdrop>` root
    #[arg(long)]
    config: Option<PathBuf>,

    /// Scatter decorative creatures around the camera
    #[arg(long)]
    decorative: bool,

    /// Run without a window and print a summary
    #[arg(long)]
    headless: bool,

    /// Frames to simulate in headless mode
    #[arg(long, default_value_t = 120)]
    frames: usize,

    #[arg(long, default_value_t = 1280)]
    width: u32,

    #[arg(long, default_value_t = 720)]
    height: u32,
}

impl CliOptions {
    /// Config file first, command-line flags on top.
    fn backdrop_options(&self) -> Result<BackdropOptions> {
        let mut options = match &self.config {
            Some(path) => BackdropOptions::from_file(path)?,
            None => BackdropOptions::default(),
        };
        if let Some(assets) = &self.assets {
            options.asset_root = assets.clone();
        }
        if self.decorative {
            options.enable_decorative_entities = true;
        }
        Ok(options)
    }
}

fn entity_factory(options: &BackdropOptions) -> Rc<dyn EntityMeshFactory> {
    let models = options.asset_root.join("models");
    if models.join(format!("{DECORATIVE_ENTITY_KIND}.obj")).is_file() {
        info!("using decorative meshes from {}", models.display());
        Rc::new(ObjEntityFactory::new(models, BoxEntityFactory::default_color()))
    } else {
        Rc::new(BoxEntityFactory::default())
    }
}

fn run_headless(options: BackdropOptions, frames: usize, width: u32, height: u32) -> Result<()> {
    let driver = Rc::new(HeadlessDriver::new(width, height));
    let clock = Rc::new(ManualClock::new(0.0));
    let textures: Rc<dyn TextureLoader> = Rc::new(FsTextureLoader::new(&options.asset_root));
    let entities = entity_factory(&options);

    let backdrop =
        SceneOrchestrator::new(Rc::clone(&driver), options, BackdropMode::Classic, textures)
            .with_clock(clock.clone())
            .with_entity_factory(entities);
    block_on(backdrop.start()).context("failed to start menu backdrop")?;

    let summary = backdrop.scene_summary();
    println!(
        "Backdrop started: {} nodes, {} meshes",
        summary.nodes, summary.meshes
    );

    let mut rendered = 0;
    for _ in 0..frames {
        clock.advance(HEADLESS_FRAME_MILLIS);
        if !driver.frame() {
            break;
        }
        rendered += 1;
    }
    println!("Rendered {rendered} frame(s) at {width}x{height}");

    if let Some(frame) = driver.last_frame() {
        let opacities = frame
            .opacities
            .iter()
            .take(6)
            .map(|opacity| format!("{opacity:.2}"))
            .collect::<Vec<_>>()
            .join(" ");
        println!("Face opacity: {opacities}");
        if let Some(rotation) = frame.rotations.first() {
            println!("Panorama rotation: {rotation:.4} rad");
        }
        println!("Camera aspect: {:.3}", frame.aspect);
    }

    backdrop.dispose();
    println!("Backdrop disposed");
    Ok(())
}

fn run_windowed(options: BackdropOptions, width: u32, height: u32) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;

    let mut app = BackdropApp {
        options,
        width,
        height,
        driver: None,
        backdrop: None,
        last_error: None,
    };
    event_loop
        .run_app(&mut app)
        .context("event loop terminated abnormally")?;

    app.shutdown();
    if let Some(err) = app.last_error {
        return Err(err);
    }
    Ok(())
}

struct BackdropApp {
    options: BackdropOptions,
    width: u32,
    height: u32,
    driver: Option<Rc<WindowDriver>>,
    backdrop: Option<SceneOrchestrator<WindowDriver>>,
    last_error: Option<anyhow::Error>,
}

impl BackdropApp {
    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Arc::new(
            event_loop
                .create_window(
                    Window::default_attributes()
                        .with_title("Menu Backdrop")
                        .with_inner_size(LogicalSize::new(self.width, self.height)),
                )
                .map_err(|err| WindowInitError::from_error("window", err))?,
        );
        let renderer = block_on(Renderer::new(Arc::clone(&window)))
            .map_err(|err| WindowInitError::from_error("renderer", format!("{err:#}")))?;
        let driver = Rc::new(WindowDriver::new(renderer));

        let textures: Rc<dyn TextureLoader> =
            Rc::new(FsTextureLoader::new(&self.options.asset_root));
        let backdrop = SceneOrchestrator::new(
            Rc::clone(&driver),
            self.options.clone(),
            BackdropMode::Classic,
            textures,
        )
        .with_entity_factory(entity_factory(&self.options));
        block_on(backdrop.start()).context("failed to start menu backdrop")?;
        info!("window backdrop running");

        driver.request_redraw();
        self.driver = Some(driver);
        self.backdrop = Some(backdrop);
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(backdrop) = self.backdrop.take() {
            backdrop.dispose();
            println!("Backdrop disposed");
        }
    }
}

impl ApplicationHandler for BackdropApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.driver.is_some() {
            return;
        }
        if let Err(err) = self.init(event_loop) {
            self.last_error = Some(err);
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(driver) = self.driver.as_ref() else {
            return;
        };
        if window_id != driver.window_id() {
            return;
        }
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => driver.resize(size),
            WindowEvent::RedrawRequested => {
                if let Err(err) = driver.frame() {
                    self.last_error = Some(err);
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(driver) = self.driver.as_ref() {
            driver.request_redraw();
        }
    }
}

/// Presents the backdrop in a winit window through the wgpu [`Renderer`].
struct WindowDriver {
    renderer: RefCell<Renderer>,
    hook: RenderHookSlot,
    resized: Cell<bool>,
    fatal: RefCell<Option<anyhow::Error>>,
}

impl WindowDriver {
    fn new(renderer: Renderer) -> Self {
        Self {
            renderer: RefCell::new(renderer),
            hook: RenderHookSlot::new(),
            resized: Cell::new(false),
            fatal: RefCell::new(None),
        }
    }

    fn window_id(&self) -> WindowId {
        self.renderer.borrow().window_id()
    }

    fn request_redraw(&self) {
        self.renderer.borrow().window().request_redraw();
    }

    fn resize(&self, size: PhysicalSize<u32>) {
        self.renderer.borrow_mut().resize(size);
        self.resized.set(true);
    }

    /// Runs one frame through the render hook.
    fn frame(&self) -> Result<()> {
        self.hook.invoke(self.resized.replace(false));
        match self.fatal.borrow_mut().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl DocumentDriver for WindowDriver {
    fn surface_size(&self) -> (u32, u32) {
        let size = self.renderer.borrow().size();
        (size.width, size.height)
    }

    fn set_render_hook(&self, hook: Option<RenderHook>) -> HookRegistration {
        self.hook.set(hook)
    }

    fn remove_render_hook(&self, registration: HookRegistration) -> bool {
        self.hook.remove(registration)
    }

    fn draw(&self, scene: &Scene, camera: &PerspectiveCamera) -> Result<()> {
        let mut renderer = self.renderer.borrow_mut();
        match renderer.render(scene, camera) {
            Ok(()) => Ok(()),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                renderer.reconfigure();
                Ok(())
            }
            Err(wgpu::SurfaceError::Timeout) => {
                info!("Surface timeout; retrying next frame");
                Ok(())
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                *self.fatal.borrow_mut() = Some(anyhow!("GPU is out of memory"));
                Err(anyhow!("GPU is out of memory"))
            }
            Err(err) => Err(anyhow!("failed to acquire surface texture: {err}")),
        }
    }
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}
