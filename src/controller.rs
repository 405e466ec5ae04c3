use std::time::Duration;

use glam::{Vec2, Vec3};
use log::{debug, info, warn};

use crate::assets::{AssetSource, CrystalAssets, GEOMETRY_VARIANTS};
use crate::camera::{ForcePerspectiveCamera, ViewOffset};
use crate::clock::Clock;
use crate::config::SketchConfig;
use crate::crystal::Crystal;
use crate::error::{AssetError, RenderError};
use crate::render::RenderBackend;
use crate::scene::Scene;
use crate::timer::IntervalTimer;

/// Platform services the controller relies on.
pub trait Host {
    /// Monotonic time since an arbitrary origin.
    fn now(&self) -> Duration;

    /// Asks for [`SceneController::on_frame`] to be called at the next
    /// display refresh. The controller never has more than one request
    /// outstanding.
    fn request_frame(&mut self);
}

/// Largest frame the crystal ring is composed for, in landscape.
const FRAME_MAX: Vec2 = Vec2::new(1200.0, 800.0);
const FRAME_RATIO: f32 = 0.66;
const PORTRAIT_SCALE: f32 = 0.6;

/// View offset that keeps the ring framed at a consistent size.
///
/// Landscape (and square) viewports are composed in a frame capped at
/// 1200x800; portrait ones in a frame scaled down by 0.6. The viewport is
/// centred on that frame.
///
/// Below a height of 1200 the portrait frame follows the viewport width, so
/// its width jumps when the height crosses 1200.
pub fn camera_view_offset(resolution: Vec2) -> ViewOffset {
    let frame = if resolution.x >= resolution.y {
        if resolution.x >= FRAME_MAX.x {
            FRAME_MAX
        } else {
            Vec2::new(resolution.x, resolution.x * FRAME_RATIO)
        }
    } else if resolution.y >= FRAME_MAX.x {
        Vec2::new(FRAME_MAX.y, FRAME_MAX.x) * PORTRAIT_SCALE
    } else {
        Vec2::new(resolution.x * FRAME_RATIO, resolution.y) * PORTRAIT_SCALE
    };
    let offset = (resolution - frame) / -2.0;
    ViewOffset {
        full_width: frame.x,
        full_height: frame.y,
        offset_x: offset.x,
        offset_y: offset.y,
        width: resolution.x,
        height: resolution.y,
    }
}

/// Owns the scene, camera, clock and crystals, and drives the frame loop.
///
/// The loop is cooperative: `update` renders one frame and, while the clock
/// runs, asks the host for the next one. `frame_pending` records that a
/// request is outstanding so resuming never starts a second chain.
pub struct SceneController<R, H> {
    config: SketchConfig,
    renderer: R,
    host: H,
    scene: Scene,
    camera: ForcePerspectiveCamera,
    clock: Clock,
    crystals: Vec<usize>,
    resolution: Vec2,
    frame_pending: bool,
    retarget_timer: IntervalTimer,
    retarget_index: usize,
    disposed: bool,
}

impl<R: RenderBackend, H: Host> SceneController<R, H> {
    pub fn new(renderer: R, host: H, config: SketchConfig) -> Self {
        let retarget_timer = IntervalTimer::new(config.retarget_interval());
        Self {
            config,
            renderer,
            host,
            scene: Scene::new(),
            camera: ForcePerspectiveCamera::new(),
            clock: Clock::new(),
            crystals: Vec::new(),
            resolution: Vec2::ZERO,
            frame_pending: false,
            retarget_timer,
            retarget_index: 0,
            disposed: false,
        }
    }

    /// Loads the assets from `source` and builds the ring.
    ///
    /// Nothing is added to the scene when any asset fails.
    pub async fn init(&mut self, source: &dyn AssetSource) -> Result<(), AssetError> {
        let assets = CrystalAssets::load(source, &self.config.asset_paths()).await?;
        self.init_with(assets)
    }

    /// Builds the ring from already loaded assets and starts the retarget
    /// timer. Only the first successful call has an effect.
    ///
    /// Fails without touching the scene when fewer than three geometries are
    /// supplied.
    pub fn init_with(&mut self, assets: CrystalAssets) -> Result<(), AssetError> {
        if !self.crystals.is_empty() {
            warn!("scene already initialised; ignoring second init");
            return Ok(());
        }
        if assets.geometries.len() < GEOMETRY_VARIANTS {
            return Err(AssetError::MissingGeometry {
                path: self.config.model_path.clone(),
                found: assets.geometries.len(),
                required: GEOMETRY_VARIANTS,
            });
        }

        self.renderer
            .set_clear_color(self.config.clear_color, self.config.clear_alpha);

        self.camera.aspect = self.config.camera_aspect;
        self.camera.far = self.config.camera_far;
        self.camera.set_focal_length(self.config.focal_length);

        let count = self.config.count;
        for i in 0..count {
            let fraction = i as f32 / count as f32;
            let angle = (fraction * 360.0).to_radians();
            let geometry = &assets.geometries[i % GEOMETRY_VARIANTS];
            let mut crystal = Crystal::new(geometry.clone());
            crystal.position = Vec3::new(
                angle.cos() * self.config.radius,
                0.0,
                angle.sin() * self.config.radius,
            );
            crystal.start(
                fraction,
                assets.normal_map.clone(),
                assets.surface_map.clone(),
            );
            self.crystals.push(self.scene.add(crystal));
        }
        info!("placed {count} crystals on a ring of radius {}", self.config.radius);

        self.retarget_index = 0;
        if let Some(position) = self.crystal_position(0) {
            self.camera.look_anchor = position;
        }
        self.retarget_timer.start(self.host.now());
        Ok(())
    }

    /// Alias of [`SceneController::play`].
    pub fn start(&mut self) -> Result<(), RenderError> {
        self.play()
    }

    /// Alias of [`SceneController::pause`].
    pub fn stop(&mut self) {
        self.pause();
    }

    /// Starts the clock and enters the frame loop unless a frame is already
    /// pending, in which case that frame continues the loop.
    pub fn play(&mut self) -> Result<(), RenderError> {
        if self.disposed {
            warn!("play() after dispose() ignored");
            return Ok(());
        }
        self.clock.start(self.host.now());
        if self.frame_pending {
            debug!("frame already pending; resuming existing loop");
            return Ok(());
        }
        self.update()
    }

    /// Stops the clock. The pending frame, if any, renders once more and
    /// then ends the loop.
    pub fn pause(&mut self) {
        self.clock.stop(self.host.now());
    }

    /// Advances, renders and reschedules one frame.
    ///
    /// A fatal render error stops the clock and ends the loop.
    pub fn update(&mut self) -> Result<(), RenderError> {
        let delta = self.clock.get_delta(self.host.now());

        for &slot in &self.crystals {
            if let Some(crystal) = self.scene.get_mut(slot) {
                crystal.update(delta);
            }
        }
        self.camera.update();

        if let Err(err) = self.render() {
            self.frame_pending = false;
            self.clock.stop(self.host.now());
            return Err(err);
        }

        if !self.clock.running() {
            self.frame_pending = false;
            return Ok(());
        }
        self.frame_pending = true;
        self.host.request_frame();
        Ok(())
    }

    /// Host callback for a frame requested through [`Host::request_frame`].
    ///
    /// Unrequested redraws (window exposure) re-render the current state
    /// without advancing time.
    pub fn on_frame(&mut self) -> Result<(), RenderError> {
        if self.frame_pending {
            self.frame_pending = false;
            self.update()
        } else {
            self.render()
        }
    }

    fn render(&mut self) -> Result<(), RenderError> {
        match self.renderer.render(&self.scene, &self.camera) {
            Ok(()) => Ok(()),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                warn!("skipping frame: {err}");
                Ok(())
            }
        }
    }

    /// Resizes the drawing surface and reframes the camera.
    pub fn resize(&mut self, resolution: Vec2) {
        self.resolution = resolution;
        let (width, height) = (resolution.x as u32, resolution.y as u32);
        self.renderer.set_surface_size(width, height);
        self.resize_camera(resolution);
        self.renderer.set_size(width, height);
    }

    pub fn resize_camera(&mut self, resolution: Vec2) {
        let view = camera_view_offset(resolution);
        self.camera.set_view_offset(
            view.full_width,
            view.full_height,
            view.offset_x,
            view.offset_y,
            view.width,
            view.height,
        );
        self.camera.update_projection_matrix();
    }

    /// Points the camera at the next crystal of the ring.
    pub fn retarget(&mut self) {
        if self.disposed || self.crystals.is_empty() {
            return;
        }
        self.retarget_index = (self.retarget_index + 1) % self.crystals.len();
        if let Some(position) = self.crystal_position(self.retarget_index) {
            debug!("camera retargeted to crystal {}", self.retarget_index);
            self.camera.look_anchor = position;
        }
    }

    /// Fires the retarget once per elapsed timer period. Returns the number
    /// of fires.
    pub fn poll_timers(&mut self) -> u32 {
        let fires = self.retarget_timer.poll(self.host.now());
        for _ in 0..fires {
            self.retarget();
        }
        fires
    }

    /// When the retarget timer fires next, on the host's time line.
    pub fn next_timer_deadline(&self) -> Option<Duration> {
        self.retarget_timer.next_deadline()
    }

    /// Cancels the retarget timer and stops the loop for good.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.retarget_timer.cancel();
        self.clock.stop(self.host.now());
        self.disposed = true;
        info!("scene controller disposed");
    }

    fn crystal_position(&self, index: usize) -> Option<Vec3> {
        let slot = *self.crystals.get(index)?;
        self.scene.get(slot).map(|crystal| crystal.position)
    }

    pub fn crystals(&self) -> impl Iterator<Item = &Crystal> + '_ {
        self.crystals
            .iter()
            .filter_map(|&slot| self.scene.get(slot))
    }

    pub fn crystal_count(&self) -> usize {
        self.crystals.len()
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn camera(&self) -> &ForcePerspectiveCamera {
        &self.camera
    }

    pub fn config(&self) -> &SketchConfig {
        &self.config
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn resolution(&self) -> Vec2 {
        self.resolution
    }

    pub fn is_running(&self) -> bool {
        self.clock.running()
    }

    pub fn frame_pending(&self) -> bool {
        self.frame_pending
    }

    pub fn retarget_index(&self) -> usize {
        self.retarget_index
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use pollster::block_on;

    use super::*;
    use crate::assets::tests::{complete_source, paths};
    use crate::assets::MemorySource;
    use crate::config::{COUNT, RETARGET_INTERVAL};
    use crate::render::HeadlessRenderer;

    #[derive(Debug, Default)]
    struct ManualHost {
        now: Duration,
        requests: usize,
    }

    impl Host for ManualHost {
        fn now(&self) -> Duration {
            self.now
        }

        fn request_frame(&mut self) {
            self.requests += 1;
        }
    }

    type TestController = SceneController<HeadlessRenderer, ManualHost>;

    fn controller() -> TestController {
        SceneController::new(
            HeadlessRenderer::new(),
            ManualHost::default(),
            SketchConfig::default(),
        )
    }

    fn initialised() -> TestController {
        let mut controller = controller();
        block_on(controller.init(&complete_source())).unwrap();
        controller
    }

    fn advance(controller: &mut TestController, millis: u64) {
        controller.host_mut().now += Duration::from_millis(millis);
    }

    #[test]
    fn init_places_crystals_on_ring() {
        let controller = initialised();
        assert_eq!(controller.crystal_count(), COUNT);
        assert_eq!(controller.scene().len(), COUNT);
        for (i, crystal) in controller.crystals().enumerate() {
            let angle = (i as f32 / COUNT as f32 * 360.0).to_radians();
            assert_relative_eq!(crystal.position.x, 30.0 * angle.cos(), epsilon = 1e-4);
            assert_relative_eq!(crystal.position.y, 0.0);
            assert_relative_eq!(crystal.position.z, 30.0 * angle.sin(), epsilon = 1e-4);
            assert_relative_eq!(crystal.phase(), i as f32 / COUNT as f32);
            let expected_geometry = ["ShardA", "ShardB", "ShardC"][i % 3];
            assert!(crystal.geometry().name.ends_with(expected_geometry));
            assert!(crystal.normal_map().is_some() && crystal.surface_map().is_some());
        }
    }

    #[test]
    fn init_configures_camera_and_clear_color() {
        let controller = initialised();
        let camera = controller.camera();
        assert_eq!(camera.aspect, 1.5);
        assert_eq!(camera.far, 1000.0);
        assert_relative_eq!(camera.focal_length(), 50.0, epsilon = 1e-3);
        assert_eq!(camera.look_anchor, Vec3::new(30.0, 0.0, 0.0));
        assert_relative_eq!(controller.renderer().clear_color.x, 14.0 / 255.0);
        assert_eq!(controller.renderer().clear_alpha, 1.0);
    }

    #[test]
    fn failed_asset_leaves_scene_empty() {
        let mut controller = controller();
        let source = MemorySource::new().with_file(paths().model, "v 0 0 0");
        assert!(block_on(controller.init(&source)).is_err());
        assert!(controller.scene().is_empty());
        assert_eq!(controller.next_timer_deadline(), None);
    }

    #[test]
    fn too_few_geometries_fail_init() {
        let mut assets = block_on(CrystalAssets::load(&complete_source(), &paths())).unwrap();
        assets.geometries.truncate(2);
        let mut controller = controller();
        let err = controller.init_with(assets).unwrap_err();
        assert!(matches!(
            err,
            AssetError::MissingGeometry {
                found: 2,
                required: 3,
                ..
            }
        ));
        assert!(controller.scene().is_empty());
        assert_eq!(controller.crystal_count(), 0);
        assert_eq!(controller.next_timer_deadline(), None);
    }

    #[test]
    fn second_init_is_ignored() {
        let mut controller = initialised();
        block_on(controller.init(&complete_source())).unwrap();
        assert_eq!(controller.scene().len(), COUNT);
    }

    #[test]
    fn play_renders_and_requests_one_frame() {
        let mut controller = initialised();
        controller.play().unwrap();
        assert!(controller.is_running());
        assert!(controller.frame_pending());
        assert_eq!(controller.renderer().frame_count(), 1);
        assert_eq!(controller.host().requests, 1);

        advance(&mut controller, 16);
        controller.on_frame().unwrap();
        assert_eq!(controller.renderer().frame_count(), 2);
        assert_eq!(controller.host().requests, 2);
        let frame = &controller.renderer().frames()[1];
        assert_eq!(frame.object_count, COUNT);
    }

    #[test]
    fn update_advances_crystals_by_clock_delta() {
        let mut controller = initialised();
        controller.play().unwrap();
        advance(&mut controller, 500);
        controller.on_frame().unwrap();
        for crystal in controller.crystals() {
            assert_relative_eq!(crystal.time(), 0.5);
        }
    }

    #[test]
    fn pause_ends_loop_after_pending_frame() {
        let mut controller = initialised();
        controller.start().unwrap();
        controller.stop();
        assert!(!controller.is_running());

        // The frame requested before the pause still fires and renders once.
        controller.on_frame().unwrap();
        assert_eq!(controller.renderer().frame_count(), 2);
        assert!(!controller.frame_pending());
        assert_eq!(controller.host().requests, 1);

        advance(&mut controller, 1000);
        controller.on_frame().unwrap();
        // Unrequested redraw: renders, does not reschedule or advance time.
        assert_eq!(controller.host().requests, 1);
        for crystal in controller.crystals() {
            assert_eq!(crystal.time(), 0.0);
        }
    }

    #[test]
    fn resume_before_pending_frame_keeps_single_chain() {
        let mut controller = initialised();
        controller.play().unwrap();
        controller.pause();
        controller.play().unwrap();
        assert_eq!(controller.host().requests, 1);
        assert_eq!(controller.renderer().frame_count(), 1);

        controller.on_frame().unwrap();
        assert_eq!(controller.host().requests, 2);
        assert!(controller.frame_pending());
    }

    #[test]
    fn resume_after_loop_ended_restarts_chain() {
        let mut controller = initialised();
        controller.play().unwrap();
        controller.pause();
        controller.on_frame().unwrap();
        assert!(!controller.frame_pending());

        advance(&mut controller, 2000);
        controller.play().unwrap();
        assert_eq!(controller.host().requests, 2);
        // Paused time is not fed to the crystals.
        for crystal in controller.crystals() {
            assert_eq!(crystal.time(), 0.0);
        }
    }

    #[test]
    fn fatal_render_error_stops_loop() {
        let mut controller = initialised();
        controller.play().unwrap();
        controller
            .renderer_mut()
            .fail_next(RenderError::OutOfMemory);
        assert!(matches!(controller.on_frame(), Err(RenderError::OutOfMemory)));
        assert!(!controller.is_running());
        assert!(!controller.frame_pending());
    }

    #[test]
    fn transient_render_error_keeps_loop_alive() {
        let mut controller = initialised();
        controller.play().unwrap();
        controller.renderer_mut().fail_next(RenderError::Timeout);
        controller.on_frame().unwrap();
        assert!(controller.frame_pending());
        assert_eq!(controller.host().requests, 2);
    }

    #[test]
    fn anchor_cycles_once_per_interval() {
        let mut controller = initialised();
        let period = RETARGET_INTERVAL.as_millis() as u64;
        let positions: Vec<Vec3> = controller.crystals().map(|c| c.position).collect();

        advance(&mut controller, period - 1);
        assert_eq!(controller.poll_timers(), 0);
        assert_eq!(controller.camera().look_anchor, positions[0]);

        for step in 1..=COUNT + 2 {
            advance(&mut controller, if step == 1 { 1 } else { period });
            assert_eq!(controller.poll_timers(), 1);
            assert_eq!(controller.camera().look_anchor, positions[step % COUNT]);
            assert_eq!(controller.poll_timers(), 0);
        }
    }

    #[test]
    fn timer_runs_while_paused() {
        let mut controller = initialised();
        assert!(!controller.is_running());
        advance(&mut controller, 3 * RETARGET_INTERVAL.as_millis() as u64);
        assert_eq!(controller.poll_timers(), 3);
        assert_eq!(controller.retarget_index(), 3);
    }

    #[test]
    fn dispose_cancels_timer_and_loop() {
        let mut controller = initialised();
        controller.play().unwrap();
        controller.dispose();
        assert!(!controller.is_running());
        assert_eq!(controller.next_timer_deadline(), None);

        advance(&mut controller, 60_000);
        assert_eq!(controller.poll_timers(), 0);
        controller.retarget();
        assert_eq!(controller.retarget_index(), 0);

        controller.on_frame().unwrap();
        controller.play().unwrap();
        assert_eq!(controller.host().requests, 1);
    }

    #[test]
    fn retarget_before_init_is_a_no_op() {
        let mut controller = controller();
        controller.retarget();
        assert_eq!(controller.retarget_index(), 0);
        assert_eq!(controller.poll_timers(), 0);
    }

    #[test]
    fn landscape_wide_viewport_is_capped() {
        let view = camera_view_offset(Vec2::new(1600.0, 800.0));
        assert_eq!((view.full_width, view.full_height), (1200.0, 800.0));
        assert_eq!((view.offset_x, view.offset_y), (-200.0, 0.0));
        assert_eq!((view.width, view.height), (1600.0, 800.0));
    }

    #[test]
    fn landscape_narrow_viewport_scales_with_width() {
        let view = camera_view_offset(Vec2::new(1000.0, 600.0));
        assert_relative_eq!(view.full_width, 1000.0);
        assert_relative_eq!(view.full_height, 660.0, epsilon = 1e-3);
        assert_relative_eq!(view.offset_y, 30.0, epsilon = 1e-3);
    }

    #[test]
    fn portrait_viewport_is_scaled_down() {
        let view = camera_view_offset(Vec2::new(800.0, 1000.0));
        assert_relative_eq!(view.full_width, 316.8, epsilon = 1e-3);
        assert_relative_eq!(view.full_height, 600.0, epsilon = 1e-3);
        assert_relative_eq!(view.offset_x, (800.0 - 316.8) / -2.0, epsilon = 1e-3);

        let tall = camera_view_offset(Vec2::new(900.0, 1600.0));
        assert_relative_eq!(tall.full_width, 480.0, epsilon = 1e-3);
        assert_relative_eq!(tall.full_height, 720.0, epsilon = 1e-3);
    }

    #[test]
    fn portrait_frame_width_jumps_at_height_1200() {
        let below = camera_view_offset(Vec2::new(700.0, 1199.0));
        assert_relative_eq!(below.full_width, 277.2, epsilon = 1e-3);
        assert_relative_eq!(below.full_height, 719.4, epsilon = 1e-3);

        let at = camera_view_offset(Vec2::new(700.0, 1200.0));
        assert_relative_eq!(at.full_width, 480.0, epsilon = 1e-3);
        assert_relative_eq!(at.full_height, 720.0, epsilon = 1e-3);
    }

    #[test]
    fn square_viewport_uses_landscape_policy() {
        let view = camera_view_offset(Vec2::new(700.0, 700.0));
        assert_relative_eq!(view.full_width, 700.0);
        assert_relative_eq!(view.full_height, 462.0, epsilon = 1e-3);
    }

    #[test]
    fn resize_is_idempotent() {
        let mut controller = initialised();
        controller.resize(Vec2::new(1280.0, 720.0));
        let first = controller.camera().projection_matrix();
        let offset = controller.camera().view_offset();
        controller.resize(Vec2::new(1280.0, 720.0));
        assert_eq!(controller.camera().projection_matrix(), first);
        assert_eq!(controller.camera().view_offset(), offset);
        assert_eq!(controller.renderer().size, (1280, 720));
        assert_eq!(controller.renderer().surface_size, (1280, 720));
        assert_eq!(controller.camera().aspect, 1.5);
    }
}
