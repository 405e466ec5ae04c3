use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use glam::Vec2;
use log::{error, info};
use pollster::block_on;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::Window;

use crate::assets::CrystalAssets;
use crate::config::SketchConfig;
use crate::controller::{Host, SceneController};
use crate::error::RenderError;
use crate::render::{HeadlessRenderer, Renderer};

const TITLE: &str = "Crystal Ring";
/// Viewport used when no window is available.
pub const HEADLESS_SIZE: Vec2 = Vec2::new(1280.0, 720.0);
/// Simulated display refresh of the headless run.
pub const FRAME_STEP: Duration = Duration::from_micros(16_667);

/// Host backed by a winit window: frames are redraw requests.
pub struct WindowHost {
    origin: Instant,
    window: Arc<Window>,
}

impl WindowHost {
    pub fn new(window: Arc<Window>) -> Self {
        Self {
            origin: Instant::now(),
            window,
        }
    }

    /// Converts a controller deadline back to wall-clock time.
    pub fn instant_at(&self, offset: Duration) -> Instant {
        self.origin + offset
    }

    pub fn window(&self) -> &Window {
        &self.window
    }
}

impl Host for WindowHost {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn request_frame(&mut self) {
        self.window.request_redraw();
    }
}

/// Host with a manually advanced clock, used for summary runs.
#[derive(Debug, Default)]
pub struct SimulatedHost {
    now: Duration,
    frame_requested: bool,
}

impl SimulatedHost {
    pub fn advance(&mut self, step: Duration) {
        self.now += step;
    }

    /// Returns whether a frame was requested since the last call.
    pub fn take_frame_request(&mut self) -> bool {
        std::mem::take(&mut self.frame_requested)
    }
}

impl Host for SimulatedHost {
    fn now(&self) -> Duration {
        self.now
    }

    fn request_frame(&mut self) {
        self.frame_requested = true;
    }
}

/// Outcome of [`run_headless`].
pub struct HeadlessRun {
    pub controller: SceneController<HeadlessRenderer, SimulatedHost>,
    pub retargets: u32,
}

/// Drives the controller for `frames` simulated display refreshes without a
/// window.
pub fn run_headless(
    config: SketchConfig,
    assets: CrystalAssets,
    frames: u32,
) -> Result<HeadlessRun> {
    let mut controller =
        SceneController::new(HeadlessRenderer::new(), SimulatedHost::default(), config);
    controller.init_with(assets)?;
    controller.resize(HEADLESS_SIZE);
    controller.start()?;

    let mut retargets = 0;
    for _ in 0..frames {
        controller.host_mut().advance(FRAME_STEP);
        retargets += controller.poll_timers();
        if controller.host_mut().take_frame_request() {
            controller.on_frame()?;
        }
    }
    controller.stop();
    controller.dispose();
    Ok(HeadlessRun {
        controller,
        retargets,
    })
}

pub fn print_summary(run: &HeadlessRun) {
    let controller = &run.controller;
    println!(
        "Placed {} crystals on a ring of radius {:.1}",
        controller.crystal_count(),
        controller.config().radius
    );
    for (index, crystal) in controller.crystals().enumerate() {
        println!(
            " - crystal {index} {} pos=({:.2}, {:.2}, {:.2}) phase={:.3}",
            crystal.geometry().name,
            crystal.position.x,
            crystal.position.y,
            crystal.position.z,
            crystal.phase()
        );
    }
    let camera = controller.camera();
    let anchor = camera.look_anchor;
    let look = camera.look_target();
    println!(
        "Camera fov={:.2} aspect={:.2} anchor=({:.2}, {:.2}, {:.2}) look=({:.2}, {:.2}, {:.2})",
        camera.fov, camera.aspect, anchor.x, anchor.y, anchor.z, look.x, look.y, look.z
    );
    println!(
        "Rendered {} frames, retargeted {} time(s)",
        controller.renderer().frame_count(),
        run.retargets
    );
}

/// Opens a window and runs the sketch until it is closed.
///
/// Fails with [`WindowInitError`] when no window can be created, so callers
/// can fall back to [`run_headless`].
pub fn run_window(config: SketchConfig, assets: CrystalAssets) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;

    #[allow(deprecated)]
    let window = Arc::new(
        event_loop
            .create_window(
                Window::default_attributes()
                    .with_title(TITLE)
                    .with_inner_size(LogicalSize::new(HEADLESS_SIZE.x, HEADLESS_SIZE.y)),
            )
            .map_err(|err| WindowInitError::from_error("window", err))?,
    );

    let renderer =
        block_on(Renderer::for_window(Arc::clone(&window))).context("failed to create renderer")?;
    let mut controller = SceneController::new(renderer, WindowHost::new(Arc::clone(&window)), config);
    controller.init_with(assets)?;
    controller.resize(size_to_vec(window.inner_size()));
    controller.start()?;
    info!("press space to pause or resume");

    let mut app = WindowApp {
        controller,
        last_error: None,
    };
    #[allow(deprecated)]
    event_loop
        .run(|event, elwt| app.handle_event(event, elwt))
        .context("event loop failed")?;
    app.controller.dispose();

    match app.last_error {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

struct WindowApp {
    controller: SceneController<Renderer, WindowHost>,
    last_error: Option<RenderError>,
}

impl WindowApp {
    fn handle_event(&mut self, event: Event<()>, elwt: &ActiveEventLoop) {
        match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => {
                    self.controller.dispose();
                    elwt.exit();
                }
                WindowEvent::Resized(size) => self.resize(size),
                WindowEvent::ScaleFactorChanged { .. } => {
                    let size = self.controller.host().window().inner_size();
                    self.resize(size);
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    if let Err(err) = self.handle_keyboard(&event) {
                        self.fail(err, elwt);
                    }
                }
                WindowEvent::RedrawRequested => {
                    if let Err(err) = self.controller.on_frame() {
                        self.fail(err, elwt);
                    }
                }
                _ => {}
            },
            Event::AboutToWait => {
                self.controller.poll_timers();
                let flow = match self.controller.next_timer_deadline() {
                    Some(deadline) => {
                        ControlFlow::WaitUntil(self.controller.host().instant_at(deadline))
                    }
                    None => ControlFlow::Wait,
                };
                elwt.set_control_flow(flow);
            }
            _ => {}
        }
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.controller.resize(size_to_vec(size));
        if !self.controller.frame_pending() {
            self.controller.host().window().request_redraw();
        }
    }

    fn handle_keyboard(&mut self, event: &KeyEvent) -> Result<(), RenderError> {
        if event.state != ElementState::Pressed || event.repeat {
            return Ok(());
        }
        if event.logical_key != Key::Named(NamedKey::Space) {
            return Ok(());
        }
        if self.controller.is_running() {
            self.controller.pause();
            Ok(())
        } else {
            self.controller.play()
        }
    }

    fn fail(&mut self, err: RenderError, elwt: &ActiveEventLoop) {
        error!("render loop stopped: {err}");
        self.last_error = Some(err);
        elwt.exit();
    }
}

fn size_to_vec(size: PhysicalSize<u32>) -> Vec2 {
    Vec2::new(size.width as f32, size.height as f32)
}

/// The platform could not provide a window or event loop.
#[derive(Debug)]
pub struct WindowInitError {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::tests::{complete_source, paths};
    use crate::config::COUNT;

    fn assets() -> CrystalAssets {
        block_on(CrystalAssets::load(&complete_source(), &paths())).unwrap()
    }

    #[test]
    fn headless_run_renders_every_requested_frame() {
        let run = run_headless(SketchConfig::default(), assets(), 60).unwrap();
        let controller = &run.controller;
        assert_eq!(controller.crystal_count(), COUNT);
        assert_eq!(controller.renderer().frame_count(), 61);
        assert_eq!(run.retargets, 0);
        assert!(controller.is_disposed());
        assert_eq!(controller.renderer().size, (1280, 720));
    }

    #[test]
    fn headless_run_retargets_on_schedule() {
        let run = run_headless(SketchConfig::default(), assets(), 200).unwrap();
        assert_eq!(run.retargets, 1);
        assert_eq!(run.controller.retarget_index(), 1);
        let second = run.controller.crystals().nth(1).unwrap().position;
        assert_eq!(run.controller.camera().look_anchor, second);
    }

    #[test]
    fn headless_run_rejects_incomplete_mesh_group() {
        let mut incomplete = assets();
        incomplete.geometries.pop();
        let err = run_headless(SketchConfig::default(), incomplete, 10)
            .err()
            .expect("incomplete assets fail");
        assert!(err.to_string().contains("at least 3 are required"));
    }

    #[test]
    fn simulated_host_reports_each_request_once() {
        let mut host = SimulatedHost::default();
        assert!(!host.take_frame_request());
        host.request_frame();
        assert!(host.take_frame_request());
        assert!(!host.take_frame_request());
    }

    #[test]
    fn panic_message_handles_both_payloads() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(3_u8)), "unknown panic");
    }
}
