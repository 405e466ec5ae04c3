#![cfg(target_arch = "wasm32")]

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use glam::Vec2;
use gloo_events::EventListener;
use js_sys::Promise;
use log::{error, info, warn};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::future_to_promise;
use web_sys::{Document, HtmlCanvasElement, Performance, Window};

use crate::assets::{CrystalAssets, FetchSource};
use crate::config::SketchConfig;
use crate::controller::{Host, SceneController};
use crate::error::SketchError;
use crate::lifecycle::Lifecycle;
use crate::logging::{init_logging, LoggingConfig};
use crate::render::Renderer;

/// How often the retarget timer is polled while no frames are running.
const TIMER_POLL_MS: i32 = 100;
const PRELOADER_SELECTOR: &str = ".p-preloader";
const PRELOADER_HIDDEN_CLASS: &str = "is-hidden";

type FrameCallback = Rc<RefCell<Option<Closure<dyn FnMut()>>>>;

#[wasm_bindgen(start)]
pub fn bootstrap() {
    init_logging(LoggingConfig::default());
}

/// Host backed by `performance.now()` and `requestAnimationFrame`.
struct BrowserHost {
    window: Window,
    performance: Performance,
    frame_callback: FrameCallback,
    frame_handle: Option<i32>,
}

impl BrowserHost {
    fn new(window: Window, frame_callback: FrameCallback) -> Result<Self> {
        let performance = window
            .performance()
            .ok_or_else(|| anyhow!("performance timer not available"))?;
        Ok(Self {
            window,
            performance,
            frame_callback,
            frame_handle: None,
        })
    }

    fn cancel_frame(&mut self) {
        if let Some(handle) = self.frame_handle.take() {
            if let Err(err) = self.window.cancel_animation_frame(handle) {
                warn!("cancelAnimationFrame failed: {err:?}");
            }
        }
    }
}

impl Host for BrowserHost {
    fn now(&self) -> Duration {
        Duration::from_secs_f64(self.performance.now().max(0.0) / 1000.0)
    }

    fn request_frame(&mut self) {
        let requested = match self.frame_callback.borrow().as_ref() {
            Some(callback) => self
                .window
                .request_animation_frame(callback.as_ref().unchecked_ref()),
            None => return,
        };
        match requested {
            Ok(handle) => self.frame_handle = Some(handle),
            Err(err) => error!("requestAnimationFrame failed: {err:?}"),
        }
    }
}

type Controller = SceneController<Renderer, BrowserHost>;

struct SketchState {
    config: SketchConfig,
    lifecycle: Lifecycle,
    controller: Option<Controller>,
    frame_callback: FrameCallback,
    timer_callback: Option<Closure<dyn FnMut()>>,
    interval_handle: Option<i32>,
    resize_listener: Option<EventListener>,
}

impl SketchState {
    fn controller(&mut self) -> Result<&mut Controller, JsValue> {
        self.controller
            .as_mut()
            .ok_or_else(|| JsValue::from_str("sketch is not initialised; call init() first"))
    }
}

/// The crystal ring sketch bound to a canvas element.
#[wasm_bindgen]
pub struct CrystalSketch {
    state: Rc<RefCell<SketchState>>,
}

#[wasm_bindgen]
impl CrystalSketch {
    #[wasm_bindgen(constructor)]
    pub fn new(canvas_id: Option<String>) -> CrystalSketch {
        let mut config = SketchConfig::default();
        if let Some(canvas_id) = canvas_id {
            config.canvas_id = canvas_id;
        }
        Self {
            state: Rc::new(RefCell::new(SketchState {
                config,
                lifecycle: Lifecycle::default(),
                controller: None,
                frame_callback: Rc::new(RefCell::new(None)),
                timer_callback: None,
                interval_handle: None,
                resize_listener: None,
            })),
        }
    }

    /// Loads the assets relative to `base_url` and builds the scene.
    /// Resolves once the sketch is ready to start.
    ///
    /// Calls made while a previous init is loading, or after it succeeded,
    /// resolve without effect. A failed init may be retried.
    pub fn init(&self, base_url: String) -> Promise {
        let state = Rc::clone(&self.state);
        future_to_promise(async move {
            init_sketch(state, base_url)
                .await
                .map(|()| JsValue::UNDEFINED)
                .map_err(|err| JsValue::from_str(&format!("{err:#}")))
        })
    }

    pub fn start(&self) -> Result<(), JsValue> {
        self.play()
    }

    pub fn stop(&self) -> Result<(), JsValue> {
        self.pause()
    }

    pub fn play(&self) -> Result<(), JsValue> {
        let mut state = self.state.borrow_mut();
        state.controller()?.play().map_err(to_js)
    }

    pub fn pause(&self) -> Result<(), JsValue> {
        let mut state = self.state.borrow_mut();
        state.controller()?.pause();
        Ok(())
    }

    pub fn resize(&self, width: f64, height: f64) -> Result<(), JsValue> {
        let mut state = self.state.borrow_mut();
        resize_controller(state.controller()?, Vec2::new(width as f32, height as f32))
            .map_err(to_js)
    }

    /// Stops the loop, cancels the retarget timer and detaches every
    /// browser callback.
    pub fn dispose(&self) {
        let mut state = self.state.borrow_mut();
        state.lifecycle.dispose();
        if let Some(controller) = state.controller.as_mut() {
            controller.dispose();
            controller.host_mut().cancel_frame();
        }
        if let Some(handle) = state.interval_handle.take() {
            if let Some(window) = web_sys::window() {
                window.clear_interval_with_handle(handle);
            }
        }
        state.timer_callback = None;
        state.resize_listener = None;
        state.frame_callback.borrow_mut().take();
    }
}

fn to_js(err: impl Into<SketchError>) -> JsValue {
    JsValue::from_str(&err.into().to_string())
}

async fn init_sketch(state: Rc<RefCell<SketchState>>, base_url: String) -> Result<()> {
    let (config, frame_callback) = {
        let mut state = state.borrow_mut();
        if state.lifecycle.is_disposed() {
            return Err(anyhow!("sketch has been disposed"));
        }
        if !state.lifecycle.begin_init() {
            warn!("sketch is {:?}; ignoring init", state.lifecycle);
            return Ok(());
        }
        (state.config.clone(), Rc::clone(&state.frame_callback))
    };

    let result = build_sketch(&state, config, frame_callback, base_url).await;
    if result.is_err() {
        state.borrow_mut().lifecycle.abort_init();
    }
    result
}

async fn build_sketch(
    state: &Rc<RefCell<SketchState>>,
    config: SketchConfig,
    frame_callback: FrameCallback,
    base_url: String,
) -> Result<()> {
    let window = web_sys::window().ok_or_else(|| anyhow!("window not available"))?;
    let document = window
        .document()
        .ok_or_else(|| anyhow!("document not available"))?;
    let canvas = document
        .get_element_by_id(&config.canvas_id)
        .ok_or_else(|| anyhow!("canvas element #{} not found", config.canvas_id))?
        .dyn_into::<HtmlCanvasElement>()
        .map_err(|_| anyhow!("element #{} is not a canvas", config.canvas_id))?;

    let viewport = viewport_size(&window)?;
    canvas.set_width(viewport.x as u32);
    canvas.set_height(viewport.y as u32);
    let renderer = Renderer::for_canvas(canvas)
        .await
        .context("failed to create renderer")?;

    let source = FetchSource::new(base_url);
    let assets = CrystalAssets::load(&source, &config.asset_paths()).await?;

    let host = BrowserHost::new(window.clone(), Rc::clone(&frame_callback))?;
    let mut controller = SceneController::new(renderer, host, config);
    controller.init_with(assets)?;
    resize_controller(&mut controller, viewport)?;

    let weak = Rc::downgrade(state);
    let timer_callback = Closure::wrap(Box::new({
        let weak = Weak::clone(&weak);
        move || poll_timers(&weak)
    }) as Box<dyn FnMut()>);
    let interval_handle = window
        .set_interval_with_callback_and_timeout_and_arguments_0(
            timer_callback.as_ref().unchecked_ref(),
            TIMER_POLL_MS,
        )
        .map_err(|err| anyhow!("setInterval failed: {err:?}"))?;

    let mut state = state.borrow_mut();
    if !state.lifecycle.finish_init() {
        // dispose() ran while loading: tear down what was built here.
        window.clear_interval_with_handle(interval_handle);
        controller.dispose();
        info!("sketch disposed while loading; discarding it");
        return Ok(());
    }

    *frame_callback.borrow_mut() = Some(Closure::wrap(Box::new({
        let weak = Weak::clone(&weak);
        move || on_animation_frame(&weak)
    }) as Box<dyn FnMut()>));
    let resize_listener = EventListener::new(&window, "resize", move |_event| {
        on_window_resize(&weak);
    });
    hide_preloader(&document);

    state.controller = Some(controller);
    state.timer_callback = Some(timer_callback);
    state.interval_handle = Some(interval_handle);
    state.resize_listener = Some(resize_listener);
    info!("crystal sketch initialised");
    Ok(())
}

fn on_animation_frame(state: &Weak<RefCell<SketchState>>) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let mut state = state.borrow_mut();
    let Some(controller) = state.controller.as_mut() else {
        return;
    };
    controller.host_mut().frame_handle = None;
    controller.poll_timers();
    if let Err(err) = controller.on_frame() {
        error!("render loop stopped: {err}");
    }
}

fn poll_timers(state: &Weak<RefCell<SketchState>>) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let mut state = state.borrow_mut();
    if let Some(controller) = state.controller.as_mut() {
        controller.poll_timers();
    }
}

fn on_window_resize(state: &Weak<RefCell<SketchState>>) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let Some(window) = web_sys::window() else {
        return;
    };
    let mut state = state.borrow_mut();
    let Some(controller) = state.controller.as_mut() else {
        return;
    };
    let result = viewport_size(&window).and_then(|size| {
        resize_controller(controller, size).map_err(|err| anyhow!(err))
    });
    if let Err(err) = result {
        error!("resize failed: {err:#}");
    }
}

/// Resizes and, when the loop is idle, redraws so the cleared canvas is
/// filled again.
fn resize_controller(controller: &mut Controller, size: Vec2) -> Result<(), SketchError> {
    if size.x < 1.0 || size.y < 1.0 {
        return Ok(());
    }
    controller.resize(size);
    if !controller.frame_pending() {
        controller.on_frame()?;
    }
    Ok(())
}

fn viewport_size(window: &Window) -> Result<Vec2> {
    let width = window
        .inner_width()
        .ok()
        .and_then(|value| value.as_f64())
        .ok_or_else(|| anyhow!("window width not available"))?;
    let height = window
        .inner_height()
        .ok()
        .and_then(|value| value.as_f64())
        .ok_or_else(|| anyhow!("window height not available"))?;
    Ok(Vec2::new(width as f32, height as f32))
}

fn hide_preloader(document: &Document) {
    match document.query_selector(PRELOADER_SELECTOR) {
        Ok(Some(element)) => {
            if let Err(err) = element.class_list().add_1(PRELOADER_HIDDEN_CLASS) {
                warn!("failed to hide preloader: {err:?}");
            }
        }
        Ok(None) => {}
        Err(err) => warn!("preloader lookup failed: {err:?}"),
    }
}
