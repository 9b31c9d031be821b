use glam::Vec3;
use log::debug;

use crate::{
    node::{DecomposedTransform, NodeTransform},
    scene::Scene,
};

/// Transform applied to the scene root.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub translation: Vec3,
    pub scale: f32,
}

/// Rescales a loaded scene to a unit footprint standing on the origin.
pub struct SceneNormalizer;

impl SceneNormalizer {
    /// Place the root so the subtree bounds are horizontally centered, rest
    /// on `y = 0` and have a largest side of 1. Leaves scenes without
    /// bounded geometry alone.
    pub fn normalize(scene: &mut Scene) -> Option<Normalization> {
        let root = scene.root();
        scene.update_world();
        let bounds = scene.entity(root).transform.local_bounds;
        if bounds.is_empty() {
            debug!("Scene has no bounded geometry, skipping normalization");
            return None;
        }

        let size = bounds.size().max_element();
        let scale = if size > 0.0 { 1.0 / size } else { 1.0 };
        let center = bounds.center();
        let translation = -Vec3::new(center.x, bounds.min.y, center.z) * scale;

        scene.set_local(
            root,
            NodeTransform::Decomposed(DecomposedTransform {
                translation,
                scale: Vec3::splat(scale),
                ..Default::default()
            }),
        );
        scene.update_world();
        debug!("Normalized scene by {} around {}", scale, translation);
        Some(Normalization { translation, scale })
    }
}

#[cfg(test)]
mod test {
    use std::{collections::BTreeMap, sync::Arc};

    use glam::Vec3;
    use gltf::mesh::Mode;

    use super::SceneNormalizer;
    use crate::{
        bounds::Aabb,
        mesh::Geometry,
        node::NodeTransform,
        scene::Scene,
    };

    fn scene_with(bounds: Option<Aabb>) -> Scene {
        let mut scene = Scene::new("sceneRoot");
        let entity = scene.spawn("box".to_string(), Some(0), NodeTransform::default());
        scene.entity_mut(entity).geometry = Some(Arc::new(Geometry {
            attributes: BTreeMap::new(),
            indices: None,
            vertex_count: 0,
            bounds,
            mode: Mode::Triangles,
        }));
        scene.adopt_orphans();
        scene
    }

    #[test]
    fn unit_footprint() {
        let mut scene = scene_with(Some(Aabb::new(
            Vec3::new(-2.0, -1.0, -2.0),
            Vec3::new(2.0, 1.0, 2.0),
        )));
        let normalization = SceneNormalizer::normalize(&mut scene).unwrap();
        assert_eq!(normalization.scale, 0.25);
        assert_eq!(normalization.translation, Vec3::new(0.0, 0.25, 0.0));

        let world = scene.entity(scene.root()).transform.world_bounds;
        assert_eq!(world.min, Vec3::new(-0.5, 0.0, -0.5));
        assert_eq!(world.max, Vec3::new(0.5, 0.5, 0.5));
    }

    #[test]
    fn flat_point_keeps_scale() {
        let point = Vec3::new(3.0, 1.0, 3.0);
        let mut scene = scene_with(Some(Aabb::new(point, point)));
        let normalization = SceneNormalizer::normalize(&mut scene).unwrap();
        assert_eq!(normalization.scale, 1.0);
        assert_eq!(normalization.translation, Vec3::new(-3.0, -1.0, -3.0));
    }

    #[test]
    fn unbounded_scene_is_untouched() {
        let mut scene = scene_with(None);
        assert_eq!(SceneNormalizer::normalize(&mut scene), None);
        assert_eq!(
            scene.entity(scene.root()).transform.local,
            NodeTransform::default()
        );
    }
}
