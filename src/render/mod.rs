mod gpu;
mod headless;
mod shared;

pub use gpu::Renderer;
pub use headless::{FrameRecord, HeadlessRenderer};

use glam::Vec3;

use crate::camera::ForcePerspectiveCamera;
use crate::error::RenderError;
use crate::scene::Scene;

/// What the scene controller needs from a renderer.
pub trait RenderBackend {
    fn set_clear_color(&mut self, color: Vec3, alpha: f32);

    /// Resizes the backing store of the drawing surface, in pixels.
    ///
    /// Windowed surfaces track their window and ignore this.
    fn set_surface_size(&mut self, _width: u32, _height: u32) {}

    /// Resizes the render output, in pixels.
    fn set_size(&mut self, width: u32, height: u32);

    fn render(&mut self, scene: &Scene, camera: &ForcePerspectiveCamera) -> Result<(), RenderError>;
}

impl<T: RenderBackend + ?Sized> RenderBackend for Box<T> {
    fn set_clear_color(&mut self, color: Vec3, alpha: f32) {
        (**self).set_clear_color(color, alpha)
    }

    fn set_surface_size(&mut self, width: u32, height: u32) {
        (**self).set_surface_size(width, height)
    }

    fn set_size(&mut self, width: u32, height: u32) {
        (**self).set_size(width, height)
    }

    fn render(&mut self, scene: &Scene, camera: &ForcePerspectiveCamera) -> Result<(), RenderError> {
        (**self).render(scene, camera)
    }
}
