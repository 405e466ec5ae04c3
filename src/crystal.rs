use std::f32::consts::TAU;
use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};

use crate::assets::{Geometry, Texture};

/// Spin about the vertical axis, radians per second.
const SPIN_SPEED: f32 = 0.25;
/// How fast the tint cycles through the hue wheel, turns per second.
const HUE_SPEED: f32 = 0.02;

/// One crystal of the ring.
///
/// The mesh is shared with every other crystal built from the same
/// geometry; only the transform and animation state are per instance.
#[derive(Debug, Clone)]
pub struct Crystal {
    geometry: Arc<Geometry>,
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
    phase: f32,
    time: f32,
    normal_map: Option<Arc<Texture>>,
    surface_map: Option<Arc<Texture>>,
}

impl Crystal {
    pub fn new(geometry: Arc<Geometry>) -> Self {
        Self {
            geometry,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
            phase: 0.0,
            time: 0.0,
            normal_map: None,
            surface_map: None,
        }
    }

    /// Binds the textures and offsets the animation by `phase` (in turns).
    pub fn start(&mut self, phase: f32, normal_map: Arc<Texture>, surface_map: Arc<Texture>) {
        self.phase = phase;
        self.rotation.y = phase * TAU;
        self.normal_map = Some(normal_map);
        self.surface_map = Some(surface_map);
    }

    /// Advances the animation by `delta` seconds.
    pub fn update(&mut self, delta: f32) {
        self.time += delta;
        self.rotation.y = (self.rotation.y + delta * SPIN_SPEED) % TAU;
    }

    pub fn geometry(&self) -> &Arc<Geometry> {
        &self.geometry
    }

    pub fn normal_map(&self) -> Option<&Arc<Texture>> {
        self.normal_map.as_ref()
    }

    pub fn surface_map(&self) -> Option<&Arc<Texture>> {
        self.surface_map.as_ref()
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// Seconds of animation accumulated through `update`.
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Tint hue in `0..1`.
    pub fn hue(&self) -> f32 {
        (self.phase + self.time * HUE_SPEED).fract()
    }

    pub fn model_matrix(&self) -> Mat4 {
        let rotation = Quat::from_euler(
            glam::EulerRot::XYZ,
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
        );
        Mat4::from_scale_rotation_translation(self.scale, rotation, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obj::ObjMesh;
    use approx::assert_relative_eq;

    fn crystal() -> Crystal {
        Crystal::new(Arc::new(Geometry {
            name: "shard".to_string(),
            mesh: ObjMesh::default(),
        }))
    }

    #[test]
    fn start_binds_textures_and_phase() {
        let mut crystal = crystal();
        let normal = Arc::new(Texture::solid("normal", [128, 128, 255, 255]));
        let surface = Arc::new(Texture::solid("surface", [255; 4]));
        crystal.start(0.25, Arc::clone(&normal), surface);
        assert_eq!(crystal.phase(), 0.25);
        assert_relative_eq!(crystal.rotation.y, TAU * 0.25);
        assert!(Arc::ptr_eq(crystal.normal_map().unwrap(), &normal));
    }

    #[test]
    fn update_accumulates_time_and_spins() {
        let mut crystal = crystal();
        crystal.update(0.5);
        crystal.update(0.5);
        assert_relative_eq!(crystal.time(), 1.0);
        assert_relative_eq!(crystal.rotation.y, SPIN_SPEED);
        crystal.update(0.0);
        assert_relative_eq!(crystal.rotation.y, SPIN_SPEED);
    }

    #[test]
    fn hue_wraps() {
        let mut crystal = crystal();
        crystal.start(
            0.99,
            Arc::new(Texture::solid("n", [0; 4])),
            Arc::new(Texture::solid("s", [0; 4])),
        );
        crystal.update(1.0);
        assert!(crystal.hue() < 0.02);
    }

    #[test]
    fn model_matrix_places_crystal() {
        let mut crystal = crystal();
        crystal.position = Vec3::new(30.0, 0.0, 0.0);
        let origin = crystal.model_matrix().transform_point3(Vec3::ZERO);
        assert!(origin.abs_diff_eq(Vec3::new(30.0, 0.0, 0.0), 1e-5));
    }
}
