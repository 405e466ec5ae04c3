use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Sub-window of a larger virtual frame rendered by the camera.
///
/// `full_*` describe the virtual frame, `offset_*`, `width` and `height`
/// the window into it. Offsets may be negative when the window is larger
/// than the frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewOffset {
    pub full_width: f32,
    pub full_height: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub width: f32,
    pub height: f32,
}

/// Perspective camera whose look target is pulled toward an anchor by a
/// damped spring, with support for asymmetric view offsets.
#[derive(Debug, Clone)]
pub struct ForcePerspectiveCamera {
    pub position: Vec3,
    /// World-space point the look target is pulled toward.
    pub look_anchor: Vec3,
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub zoom: f32,
    /// Film size in millimetres, used to derive `fov` from a focal length.
    pub film_gauge: f32,
    view: Option<ViewOffset>,
    look: Vec3,
    look_velocity: Vec3,
    projection: Mat4,
    view_matrix: Mat4,
}

const LOOK_STIFFNESS: f32 = 0.02;
const LOOK_DRAG: f32 = 0.2;

impl Default for ForcePerspectiveCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl ForcePerspectiveCamera {
    pub fn new() -> Self {
        let mut camera = Self {
            position: Vec3::ZERO,
            look_anchor: Vec3::NEG_Z,
            fov: 50.0,
            aspect: 1.0,
            near: 0.1,
            far: 2000.0,
            zoom: 1.0,
            film_gauge: 35.0,
            view: None,
            look: Vec3::NEG_Z,
            look_velocity: Vec3::ZERO,
            projection: Mat4::IDENTITY,
            view_matrix: Mat4::IDENTITY,
        };
        camera.update_projection_matrix();
        camera.update_view_matrix();
        camera
    }

    fn film_height(&self) -> f32 {
        self.film_gauge / self.aspect.max(1.0)
    }

    /// Derives the vertical field of view from a focal length in millimetres.
    pub fn set_focal_length(&mut self, focal_length: f32) {
        let slope = 0.5 * self.film_height() / focal_length;
        self.fov = (2.0 * slope.atan()).to_degrees();
        self.update_projection_matrix();
    }

    pub fn focal_length(&self) -> f32 {
        let slope = (self.fov.to_radians() * 0.5).tan();
        0.5 * self.film_height() / slope
    }

    pub fn set_view_offset(
        &mut self,
        full_width: f32,
        full_height: f32,
        offset_x: f32,
        offset_y: f32,
        width: f32,
        height: f32,
    ) {
        self.view = Some(ViewOffset {
            full_width,
            full_height,
            offset_x,
            offset_y,
            width,
            height,
        });
        self.update_projection_matrix();
    }

    pub fn clear_view_offset(&mut self) {
        self.view = None;
        self.update_projection_matrix();
    }

    pub fn view_offset(&self) -> Option<ViewOffset> {
        self.view
    }

    /// Rebuilds the projection from the current frustum parameters.
    ///
    /// Produces wgpu clip space (depth in `0..=1`).
    pub fn update_projection_matrix(&mut self) {
        let near = self.near;
        let mut top = near * (self.fov.to_radians() * 0.5).tan() / self.zoom;
        let mut height = 2.0 * top;
        let mut width = self.aspect * height;
        let mut left = -0.5 * width;

        if let Some(view) = self.view {
            left += view.offset_x * width / view.full_width;
            top -= view.offset_y * height / view.full_height;
            width *= view.width / view.full_width;
            height *= view.height / view.full_height;
        }

        self.projection = frustum(left, left + width, top, top - height, near, self.far);
    }

    /// Advances the look spring one step and refreshes the view matrix.
    pub fn update(&mut self) {
        let acceleration = (self.look_anchor - self.look) * LOOK_STIFFNESS;
        self.look_velocity += acceleration;
        self.look_velocity *= 1.0 - LOOK_DRAG;
        self.look += self.look_velocity;
        self.update_view_matrix();
    }

    fn update_view_matrix(&mut self) {
        let forward = self.look - self.position;
        if forward.length_squared() <= f32::EPSILON {
            return;
        }
        self.view_matrix = Mat4::look_at_rh(self.position, self.look, Vec3::Y);
    }

    /// Current look target, trailing `look_anchor`.
    pub fn look_target(&self) -> Vec3 {
        self.look
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.view_matrix
    }

    pub fn view_proj(&self) -> Mat4 {
        self.projection * self.view_matrix
    }
}

fn frustum(left: f32, right: f32, top: f32, bottom: f32, near: f32, far: f32) -> Mat4 {
    let x = 2.0 * near / (right - left);
    let y = 2.0 * near / (top - bottom);
    let a = (right + left) / (right - left);
    let b = (top + bottom) / (top - bottom);
    let c = -far / (far - near);
    let d = -far * near / (far - near);
    Mat4::from_cols(
        Vec4::new(x, 0.0, 0.0, 0.0),
        Vec4::new(0.0, y, 0.0, 0.0),
        Vec4::new(a, b, c, -1.0),
        Vec4::new(0.0, 0.0, d, 0.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn focal_length_round_trips_through_fov() {
        let mut camera = ForcePerspectiveCamera::new();
        camera.aspect = 1.5;
        camera.set_focal_length(50.0);
        assert_relative_eq!(camera.fov, 26.268, epsilon = 1e-3);
        assert_relative_eq!(camera.focal_length(), 50.0, epsilon = 1e-3);
    }

    #[test]
    fn symmetric_projection_matches_glam() {
        let mut camera = ForcePerspectiveCamera::new();
        camera.aspect = 1.5;
        camera.far = 1000.0;
        camera.update_projection_matrix();
        let expected = Mat4::perspective_rh(camera.fov.to_radians(), 1.5, 0.1, 1000.0);
        assert!(camera.projection_matrix().abs_diff_eq(expected, 1e-4));
    }

    #[test]
    fn full_window_offset_leaves_projection_unchanged() {
        let mut camera = ForcePerspectiveCamera::new();
        let before = camera.projection_matrix();
        camera.set_view_offset(800.0, 600.0, 0.0, 0.0, 800.0, 600.0);
        assert!(camera.projection_matrix().abs_diff_eq(before, 1e-6));
    }

    #[test]
    fn shifted_offset_skews_projection() {
        let mut camera = ForcePerspectiveCamera::new();
        camera.set_view_offset(1200.0, 800.0, -200.0, 0.0, 1600.0, 800.0);
        let projection = camera.projection_matrix();
        // Window is centred horizontally, so no horizontal skew remains.
        assert_relative_eq!(projection.z_axis.x, 0.0, epsilon = 1e-5);
        // Wider window than frame narrows the horizontal scale.
        let base = ForcePerspectiveCamera::new().projection_matrix();
        assert_relative_eq!(projection.x_axis.x, base.x_axis.x * 1200.0 / 1600.0, epsilon = 1e-5);

        camera.clear_view_offset();
        assert!(camera.view_offset().is_none());
    }

    #[test]
    fn look_target_converges_on_anchor() {
        let mut camera = ForcePerspectiveCamera::new();
        camera.look_anchor = Vec3::new(30.0, 0.0, 0.0);
        for _ in 0..600 {
            camera.update();
        }
        assert!(camera.look_target().abs_diff_eq(camera.look_anchor, 1e-3));
        let forward = -camera.view_matrix().row(2).truncate();
        assert!(forward.abs_diff_eq(Vec3::X, 1e-3));
    }

    #[test]
    fn degenerate_look_keeps_previous_view() {
        let mut camera = ForcePerspectiveCamera::new();
        camera.look_anchor = Vec3::ZERO;
        for _ in 0..2000 {
            camera.update();
        }
        assert!(camera.view_matrix().is_finite());
    }
}
