use crate::crystal::Crystal;

/// Runtime representation of the scene: every object the renderer draws.
///
/// Objects are only ever added; the returned slot stays valid for the
/// lifetime of the scene.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    objects: Vec<Crystal>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an object and returns its slot.
    pub fn add(&mut self, object: Crystal) -> usize {
        self.objects.push(object);
        self.objects.len() - 1
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn get(&self, slot: usize) -> Option<&Crystal> {
        self.objects.get(slot)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut Crystal> {
        self.objects.get_mut(slot)
    }

    pub fn objects(&self) -> &[Crystal] {
        &self.objects
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use glam::Vec3;

    use super::*;
    use crate::assets::Geometry;
    use crate::obj::ObjMesh;

    #[test]
    fn add_returns_stable_slots() {
        let geometry = Arc::new(Geometry {
            name: "shard".to_string(),
            mesh: ObjMesh::default(),
        });
        let mut scene = Scene::new();
        assert!(scene.is_empty());
        let first = scene.add(Crystal::new(Arc::clone(&geometry)));
        let second = scene.add(Crystal::new(geometry));
        assert_eq!((first, second), (0, 1));
        scene.get_mut(second).unwrap().position = Vec3::X;
        assert_eq!(scene.get(1).unwrap().position, Vec3::X);
        assert_eq!(scene.len(), 2);
        assert!(scene.get(2).is_none());
    }
}
