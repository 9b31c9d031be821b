//! The entity arena a document is loaded into.

use std::sync::Arc;

use glam::Mat4;
use log::warn;

use crate::{
    animation::AnimationClip,
    bounds::Aabb,
    material::MaterialDescriptor,
    mesh::{Geometry, MorphDescriptor},
    node::NodeTransform,
    skin::SkinData,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(usize);

impl EntityId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SkinId(usize);

impl SkinId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct Transform {
    pub local: NodeTransform,
    pub parent: Option<EntityId>,
    pub children: Vec<EntityId>,
    /// Valid after [`Scene::update_world`].
    pub world_matrix: Mat4,
    /// Bounds of the subtree in this entity's own space.
    pub local_bounds: Aabb,
    pub world_bounds: Aabb,
}

impl Transform {
    fn new(local: NodeTransform) -> Self {
        Self {
            local,
            parent: None,
            children: Vec::new(),
            world_matrix: Mat4::IDENTITY,
            local_bounds: Aabb::EMPTY,
            world_bounds: Aabb::EMPTY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub name: String,
    /// Document node this entity was created for.
    pub node: Option<usize>,
    pub transform: Transform,
    pub geometry: Option<Arc<Geometry>>,
    pub material: Option<Arc<MaterialDescriptor>>,
    pub morph: Option<Arc<MorphDescriptor>>,
    pub skin: Option<SkinId>,
    /// Contributes geometry, directly or as an ancestor or joint.
    pub used: bool,
}

/// A skin bound to the entities of its joints. Every entity split from one
/// skinned node refers to the same instance.
#[derive(Debug, Clone)]
pub struct SkinInstance {
    pub skin: Arc<SkinData>,
    /// Entity of each joint slot, parallel to the inverse bind matrices.
    pub joints: Vec<Option<EntityId>>,
}

#[derive(Debug, Clone)]
pub struct Scene {
    root: EntityId,
    entities: Vec<Entity>,
    skins: Vec<SkinInstance>,
    pub animations: Vec<AnimationClip>,
}

impl Scene {
    pub fn new(root_name: &str) -> Self {
        let mut scene = Self {
            root: EntityId(0),
            entities: Vec::new(),
            skins: Vec::new(),
            animations: Vec::new(),
        };
        scene.root = scene.spawn(root_name.to_string(), None, NodeTransform::default());
        scene
    }

    pub fn root(&self) -> EntityId {
        self.root
    }

    pub fn spawn(&mut self, name: String, node: Option<usize>, local: NodeTransform) -> EntityId {
        let id = EntityId(self.entities.len());
        self.entities.push(Entity {
            name,
            node,
            transform: Transform::new(local),
            geometry: None,
            material: None,
            morph: None,
            skin: None,
            used: false,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// # Panics
    ///
    /// Panics if `id` was not spawned by this scene.
    pub fn entity(&self, id: EntityId) -> &Entity {
        &self.entities[id.0]
    }

    /// # Panics
    ///
    /// Panics if `id` was not spawned by this scene.
    pub fn entity_mut(&mut self, id: EntityId) -> &mut Entity {
        &mut self.entities[id.0]
    }

    /// The entity `id`, or `None` if it belongs to another scene.
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id.0)
    }

    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.entities
            .iter()
            .enumerate()
            .map(|(index, entity)| (EntityId(index), entity))
    }

    pub fn find_by_name(&self, name: &str) -> Option<EntityId> {
        self.entities()
            .find(|(_, entity)| entity.name == name)
            .map(|(id, _)| id)
    }

    pub fn parent(&self, id: EntityId) -> Option<EntityId> {
        self.entity(id).transform.parent
    }

    pub fn children(&self, id: EntityId) -> &[EntityId] {
        &self.entity(id).transform.children
    }

    fn is_ancestor(&self, ancestor: EntityId, mut id: EntityId) -> bool {
        while let Some(parent) = self.parent(id) {
            if parent == ancestor {
                return true;
            }
            id = parent;
        }
        false
    }

    /// Reparent `child` under `parent`. Setting the current parent again is
    /// a no-op; links that would close a cycle are refused.
    pub fn set_parent(&mut self, child: EntityId, parent: EntityId) -> bool {
        if self.parent(child) == Some(parent) {
            return true;
        }
        if child == parent || self.is_ancestor(child, parent) {
            warn!(
                "Refusing to parent {} under {}, it would create a cycle",
                self.entity(child).name,
                self.entity(parent).name
            );
            return false;
        }
        if let Some(old) = self.parent(child) {
            self.entity_mut(old)
                .transform
                .children
                .retain(|item| *item != child);
        }
        self.entity_mut(child).transform.parent = Some(parent);
        self.entity_mut(parent).transform.children.push(child);
        true
    }

    /// Attach every parentless entity to the root.
    pub fn adopt_orphans(&mut self) {
        let orphans: Vec<EntityId> = self
            .entities()
            .filter(|(id, entity)| *id != self.root && entity.transform.parent.is_none())
            .map(|(id, _)| id)
            .collect();
        for orphan in orphans {
            self.set_parent(orphan, self.root);
        }
    }

    pub fn add_skin(&mut self, skin: Arc<SkinData>) -> SkinId {
        let id = SkinId(self.skins.len());
        self.skins.push(SkinInstance {
            skin,
            joints: Vec::new(),
        });
        id
    }

    /// # Panics
    ///
    /// Panics if `id` was not added to this scene.
    pub fn skin(&self, id: SkinId) -> &SkinInstance {
        &self.skins[id.0]
    }

    /// # Panics
    ///
    /// Panics if `id` was not added to this scene.
    pub fn skin_mut(&mut self, id: SkinId) -> &mut SkinInstance {
        &mut self.skins[id.0]
    }

    pub fn get_skin(&self, id: SkinId) -> Option<&SkinInstance> {
        self.skins.get(id.0)
    }

    pub fn skins(&self) -> &[SkinInstance] {
        &self.skins
    }

    pub fn skin_of(&self, id: EntityId) -> Option<&SkinInstance> {
        self.entity(id).skin.map(|skin| self.skin(skin))
    }

    fn mark_with_ancestors(&mut self, mut id: EntityId) {
        loop {
            self.entity_mut(id).used = true;
            match self.parent(id) {
                Some(parent) => id = parent,
                None => break,
            }
        }
    }

    /// Mark entities with geometry, skin joints, and all their ancestors as
    /// used.
    pub fn mark_used(&mut self) {
        let geometry: Vec<EntityId> = self
            .entities()
            .filter(|(_, entity)| entity.geometry.is_some())
            .map(|(id, _)| id)
            .collect();
        let joints: Vec<EntityId> = self
            .skins
            .iter()
            .flat_map(|skin| skin.joints.iter().flatten().copied())
            .collect();
        for id in geometry.into_iter().chain(joints) {
            self.mark_with_ancestors(id);
        }
    }

    pub fn used(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities()
            .filter(|(_, entity)| entity.used)
            .map(|(id, _)| id)
    }

    /// Entities that could be pruned without losing any geometry.
    pub fn unused(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities()
            .filter(|(_, entity)| !entity.used)
            .map(|(id, _)| id)
    }

    pub fn set_local(&mut self, id: EntityId, local: NodeTransform) {
        self.entity_mut(id).transform.local = local;
    }

    /// Recompute world matrices top-down and bounds bottom-up. Geometry
    /// without declared bounds does not contribute.
    pub fn update_world(&mut self) {
        let mut stack: Vec<(EntityId, Mat4)> = self
            .entities()
            .filter(|(_, entity)| entity.transform.parent.is_none())
            .map(|(id, _)| (id, Mat4::IDENTITY))
            .collect();
        stack.reverse();
        let mut order = Vec::with_capacity(self.entities.len());
        while let Some((id, parent_matrix)) = stack.pop() {
            let transform = &mut self.entities[id.0].transform;
            let world_matrix = parent_matrix * transform.local.matrix();
            transform.world_matrix = world_matrix;
            stack.extend(
                transform
                    .children
                    .iter()
                    .rev()
                    .map(|&child| (child, world_matrix)),
            );
            order.push(id);
        }

        // Parents precede their children in `order`.
        for &id in order.iter().rev() {
            let entity = &self.entities[id.0];
            let own = entity
                .geometry
                .as_ref()
                .and_then(|geometry| geometry.bounds)
                .unwrap_or(Aabb::EMPTY);
            let mut local_bounds = own;
            let mut world_bounds = own.transform(&entity.transform.world_matrix);
            for &child in &entity.transform.children {
                let child = &self.entities[child.0].transform;
                local_bounds =
                    local_bounds.union(&child.local_bounds.transform(&child.local.matrix()));
                world_bounds = world_bounds.union(&child.world_bounds);
            }
            let transform = &mut self.entities[id.0].transform;
            transform.local_bounds = local_bounds;
            transform.world_bounds = world_bounds;
        }
    }
}

#[cfg(test)]
mod test {
    use std::{collections::BTreeMap, sync::Arc};

    use glam::{Mat4, Vec3};
    use gltf::mesh::Mode;

    use super::{EntityId, Scene};
    use crate::{
        bounds::Aabb,
        mesh::Geometry,
        node::{DecomposedTransform, NodeTransform},
    };

    fn geometry(bounds: Option<Aabb>) -> Arc<Geometry> {
        Arc::new(Geometry {
            attributes: BTreeMap::new(),
            indices: None,
            vertex_count: 0,
            bounds,
            mode: Mode::Triangles,
        })
    }

    #[test]
    fn set_parent_is_idempotent_and_acyclic() {
        let mut scene = Scene::new("root");
        let a = scene.spawn(String::from("a"), Some(0), NodeTransform::default());
        let b = scene.spawn(String::from("b"), Some(1), NodeTransform::default());
        assert!(scene.set_parent(b, a));
        assert!(scene.set_parent(b, a));
        assert_eq!(scene.children(a), &[b]);
        assert!(!scene.set_parent(a, b));
        assert!(!scene.set_parent(a, a));
        assert_eq!(scene.parent(a), None);

        scene.adopt_orphans();
        assert_eq!(scene.parent(a), Some(scene.root()));
        assert_eq!(scene.parent(b), Some(a));
        assert_eq!(scene.parent(scene.root()), None);
    }

    #[test]
    fn reparenting_moves_the_child() {
        let mut scene = Scene::new("root");
        let a = scene.spawn(String::from("a"), None, NodeTransform::default());
        let b = scene.spawn(String::from("b"), None, NodeTransform::default());
        let c = scene.spawn(String::from("c"), None, NodeTransform::default());
        scene.set_parent(c, a);
        scene.set_parent(c, b);
        assert!(scene.children(a).is_empty());
        assert_eq!(scene.children(b), &[c]);
    }

    #[test]
    fn world_bounds_and_used_marking() {
        let mut scene = Scene::new("root");
        let parent = scene.spawn(
            String::from("parent"),
            Some(0),
            NodeTransform::Decomposed(DecomposedTransform {
                translation: Vec3::new(10.0, 0.0, 0.0),
                ..Default::default()
            }),
        );
        let child = scene.spawn(
            String::from("child"),
            Some(1),
            NodeTransform::Matrix(Mat4::from_scale(Vec3::splat(2.0))),
        );
        let empty = scene.spawn(String::from("empty"), Some(2), NodeTransform::default());
        let unbounded =
            scene.spawn(String::from("unbounded"), Some(3), NodeTransform::default());
        scene.entity_mut(child).geometry =
            Some(geometry(Some(Aabb::new(-Vec3::ONE, Vec3::ONE))));
        scene.entity_mut(unbounded).geometry = Some(geometry(None));
        scene.set_parent(child, parent);
        scene.adopt_orphans();
        scene.update_world();

        let world = scene.entity(child).transform.world_bounds;
        assert_eq!(
            world,
            Aabb::new(Vec3::new(8.0, -2.0, -2.0), Vec3::new(12.0, 2.0, 2.0))
        );
        assert_eq!(
            scene.entity(parent).transform.local_bounds,
            Aabb::new(Vec3::splat(-2.0), Vec3::splat(2.0))
        );
        assert_eq!(scene.entity(scene.root()).transform.world_bounds, world);
        assert!(scene.entity(unbounded).transform.world_bounds.is_empty());

        scene.mark_used();
        let unused: Vec<_> = scene.unused().collect();
        assert_eq!(unused, vec![empty]);
        assert_eq!(scene.find_by_name("child"), Some(child));
    }

    #[test]
    fn deep_hierarchy_updates() {
        const DEPTH: usize = 100_000;
        let mut scene = Scene::new("root");
        let step = NodeTransform::Decomposed(DecomposedTransform {
            translation: Vec3::X,
            ..Default::default()
        });
        let chain: Vec<EntityId> = (0..DEPTH)
            .map(|index| scene.spawn(format!("link_{}", index), Some(index), step))
            .collect();
        // Linking from the bottom up keeps every cycle check short.
        for pair in chain.windows(2).rev() {
            assert!(scene.set_parent(pair[1], pair[0]));
        }
        let leaf = chain[DEPTH - 1];
        scene.entity_mut(leaf).geometry = Some(geometry(Some(Aabb::new(Vec3::ZERO, Vec3::ONE))));
        scene.adopt_orphans();
        scene.update_world();

        let offset = Vec3::new(DEPTH as f32, 0.0, 0.0);
        let expected = Aabb::new(offset, offset + Vec3::ONE);
        assert_eq!(scene.entity(leaf).transform.world_bounds, expected);
        assert_eq!(scene.entity(scene.root()).transform.world_bounds, expected);
    }

    #[test]
    fn lookups_outside_the_scene() {
        let mut scene = Scene::new("root");
        assert!(scene.get(scene.root()).is_some());
        let mut other = Scene::new("other");
        let foreign = other.spawn(String::from("a"), None, NodeTransform::default());
        assert!(scene.get(foreign).is_none());
        assert!(scene.get_skin(super::SkinId(0)).is_none());
        let skin = scene.add_skin(Default::default());
        assert!(scene.get_skin(skin).is_some());
    }
}
