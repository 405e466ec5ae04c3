use std::collections::VecDeque;

use glam::{Mat4, Vec3};

use super::RenderBackend;
use crate::camera::ForcePerspectiveCamera;
use crate::error::RenderError;
use crate::scene::Scene;

/// Snapshot of one frame drawn by [`HeadlessRenderer`].
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
    pub object_count: usize,
    pub view_proj: Mat4,
    pub look_target: Vec3,
}

/// Renderer that draws nothing and records what it was asked to draw.
///
/// Used by the summary mode of the CLI and by tests. Errors queued with
/// [`HeadlessRenderer::fail_next`] are returned by the following renders.
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    pub clear_color: Vec3,
    pub clear_alpha: f32,
    pub surface_size: (u32, u32),
    pub size: (u32, u32),
    frames: Vec<FrameRecord>,
    pending_errors: VecDeque<RenderError>,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> &[FrameRecord] {
        &self.frames
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn fail_next(&mut self, error: RenderError) {
        self.pending_errors.push_back(error);
    }
}

impl RenderBackend for HeadlessRenderer {
    fn set_clear_color(&mut self, color: Vec3, alpha: f32) {
        self.clear_color = color;
        self.clear_alpha = alpha;
    }

    fn set_surface_size(&mut self, width: u32, height: u32) {
        self.surface_size = (width, height);
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    fn render(&mut self, scene: &Scene, camera: &ForcePerspectiveCamera) -> Result<(), RenderError> {
        if let Some(error) = self.pending_errors.pop_front() {
            return Err(error);
        }
        self.frames.push(FrameRecord {
            object_count: scene.len(),
            view_proj: camera.view_proj(),
            look_target: camera.look_target(),
        });
        Ok(())
    }
}
