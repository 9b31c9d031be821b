use std::{collections::HashMap, sync::Arc};

use gltf::json;
use log::{debug, warn};

use crate::{
    accessor::AccessorDecoder,
    document::Document,
    error::LoadResult,
    material::MaterialBuilder,
    mesh::{MeshAssembler, MorphDescriptor, PrimitiveDescriptor},
    node::NodeTransform,
    scene::{EntityId, Scene, SkinId},
    skin::SkinBinder,
};

/// Entities created for one document node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutput {
    Single(EntityId),
    /// A node whose mesh has several primitives, with one child per
    /// primitive.
    Multi {
        node: EntityId,
        primitives: Vec<EntityId>,
    },
}

impl NodeOutput {
    pub fn node(&self) -> EntityId {
        match self {
            NodeOutput::Single(node) | NodeOutput::Multi { node, .. } => *node,
        }
    }
}

pub struct SceneGraphBuilder<'a> {
    document: &'a Document,
    decoder: &'a AccessorDecoder,
    meshes: MeshAssembler,
    skins: SkinBinder,
    skin_instances: HashMap<usize, SkinId>,
}

impl<'a> SceneGraphBuilder<'a> {
    pub fn new(document: &'a Document, decoder: &'a AccessorDecoder) -> Self {
        Self {
            document,
            decoder,
            meshes: MeshAssembler::new(),
            skins: SkinBinder::new(),
            skin_instances: HashMap::new(),
        }
    }

    fn skin_instance(&mut self, scene: &mut Scene, index: usize) -> LoadResult<SkinId> {
        if let Some(id) = self.skin_instances.get(&index) {
            return Ok(*id);
        }
        let skin = self.skins.skin(self.document, self.decoder, index)?;
        let id = scene.add_skin(skin);
        self.skin_instances.insert(index, id);
        Ok(id)
    }

    fn attach(
        scene: &mut Scene,
        entity: EntityId,
        primitive: &PrimitiveDescriptor,
        weights: Option<&[f32]>,
        skin: Option<SkinId>,
    ) {
        let morph = match (&primitive.morph, weights) {
            (Some(morph), Some(weights)) => {
                let mut weights = weights.to_vec();
                weights.resize(morph.targets.len(), 0.0);
                Some(Arc::new(MorphDescriptor {
                    targets: morph.targets.clone(),
                    weights,
                }))
            }
            (morph, _) => morph.clone(),
        };
        let entity = scene.entity_mut(entity);
        entity.geometry = Some(primitive.geometry.clone());
        entity.material = Some(primitive.material.clone());
        entity.morph = morph;
        entity.skin = skin;
    }

    fn node(
        &mut self,
        scene: &mut Scene,
        materials: &mut MaterialBuilder,
        index: usize,
        node: &json::Node,
    ) -> LoadResult<NodeOutput> {
        let name = node
            .name
            .clone()
            .unwrap_or_else(|| format!("node_{}", index));
        let entity = scene.spawn(name, Some(index), NodeTransform::from_node(node));

        let Some(mesh) = node.mesh else {
            return Ok(NodeOutput::Single(entity));
        };
        let primitives = self
            .meshes
            .mesh(self.document, self.decoder, materials, mesh.value())?;
        let skin = node
            .skin
            .map(|skin| self.skin_instance(scene, skin.value()))
            .transpose()?;
        let weights = node.weights.as_deref();

        if let [primitive] = &primitives[..] {
            Self::attach(scene, entity, primitive, weights, skin);
            return Ok(NodeOutput::Single(entity));
        }

        let mut children = Vec::with_capacity(primitives.len());
        for (primitive_index, primitive) in primitives.iter().enumerate() {
            let child = scene.spawn(
                format!("node_{}_{}", index, primitive_index),
                Some(index),
                NodeTransform::default(),
            );
            Self::attach(scene, child, primitive, weights, skin);
            scene.set_parent(child, entity);
            children.push(child);
        }
        Ok(NodeOutput::Multi {
            node: entity,
            primitives: children,
        })
    }

    /// Instantiate every document node, then link the hierarchy and bind
    /// skins. Returns the entity of each node, by node index.
    pub fn build(
        &mut self,
        scene: &mut Scene,
        materials: &mut MaterialBuilder,
    ) -> LoadResult<Vec<EntityId>> {
        let document = self.document;
        let mut outputs = Vec::with_capacity(document.nodes.len());
        for (index, node) in document.nodes.iter().enumerate() {
            outputs.push(self.node(scene, materials, index, node)?);
        }
        let node_entities: Vec<EntityId> = outputs.iter().map(NodeOutput::node).collect();

        for (index, node) in document.nodes.iter().enumerate() {
            for child in node.children.iter().flatten().map(|child| child.value()) {
                match node_entities.get(child) {
                    Some(&child) => {
                        scene.set_parent(child, node_entities[index]);
                    }
                    None => warn!("Skipping dangling child {} of node #{}", child, index),
                }
            }
        }

        for (&index, &id) in &self.skin_instances {
            let skin = self.skins.skin(document, self.decoder, index)?;
            scene.skin_mut(id).joints = SkinBinder::joint_entities(&skin, &node_entities);
        }

        debug!(
            "Built {} entities for {} nodes, {} skins",
            scene.len(),
            node_entities.len(),
            self.skin_instances.len()
        );
        Ok(node_entities)
    }
}

#[cfg(test)]
mod test {
    use glam::Mat4;
    use serde_json::json;

    use super::SceneGraphBuilder;
    use crate::{
        accessor::AccessorDecoder,
        backend::HeadlessBackend,
        buffer::BufferStore,
        document::{parse, Document},
        error::{LoadError, SchemaError},
        material::MaterialBuilder,
        scene::{EntityId, Scene},
    };

    fn document(nodes: serde_json::Value) -> Document {
        parse(json!({
            "bufferViews": [{ "buffer": 0, "byteLength": 36 }],
            "accessors": [{
                "bufferView": 0,
                "componentType": 5126,
                "count": 3,
                "type": "VEC3",
                "min": [0, 0, 0],
                "max": [1, 1, 0]
            }],
            "meshes": [
                { "primitives": [{ "attributes": { "POSITION": 0 } }] },
                { "primitives": [
                    { "attributes": { "POSITION": 0 } },
                    { "attributes": { "POSITION": 0 } }
                ] }
            ],
            "skins": [{ "joints": [0, 3] }],
            "nodes": nodes
        }))
    }

    fn build(document: &Document) -> Result<(Scene, Vec<EntityId>), LoadError> {
        let positions: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let decoder = AccessorDecoder::new(
            document,
            BufferStore::from_buffers(vec![bytemuck::cast_slice(&positions).to_vec()]),
            &HeadlessBackend::new(),
        )?;
        let mut scene = Scene::new("root");
        let mut materials = MaterialBuilder::new();
        let entities =
            SceneGraphBuilder::new(document, &decoder).build(&mut scene, &mut materials)?;
        Ok((scene, entities))
    }

    #[test]
    fn names_and_hierarchy() {
        let document = document(json!([
            { "name": "body", "children": [1, 9], "mesh": 0 },
            { "children": [2] },
            {}
        ]));
        let (scene, entities) = build(&document).unwrap();
        assert_eq!(scene.entity(entities[0]).name, "body");
        assert_eq!(scene.entity(entities[1]).name, "node_1");
        assert_eq!(scene.children(entities[0]), &[entities[1]]);
        assert_eq!(scene.parent(entities[2]), Some(entities[1]));
        assert!(scene.entity(entities[0]).geometry.is_some());
        assert!(scene.entity(entities[1]).geometry.is_none());
    }

    #[test]
    fn primitives_share_skin() {
        let document = document(json!([
            { "mesh": 1, "skin": 0 },
            { "mesh": 1, "skin": 0 }
        ]));
        let (scene, entities) = build(&document).unwrap();
        let children = scene.children(entities[0]).to_vec();
        assert_eq!(children.len(), 2);
        assert_eq!(scene.entity(children[0]).name, "node_0_0");
        assert_eq!(scene.entity(children[1]).name, "node_0_1");

        let first = scene.skin_of(children[0]).unwrap();
        let second = scene.skin_of(children[1]).unwrap();
        // Joint 3 has no node and keeps an empty slot.
        assert_eq!(first.joints, vec![Some(entities[0]), None]);
        assert_eq!(first.joints.len(), first.skin.inverse_bind_matrices.len());
        assert_eq!(first.joints, second.joints);
        assert_eq!(scene.entity(children[0]).skin, scene.entity(children[1]).skin);
        assert_eq!(scene.skins().len(), 1);
        assert_eq!(first.skin.inverse_bind_matrices, vec![Mat4::IDENTITY; 2]);
    }

    #[test]
    fn out_of_range_mesh() {
        let document = document(json!([{ "mesh": 5 }]));
        assert!(matches!(
            build(&document),
            Err(LoadError::Schema(SchemaError::IndexOutOfRange { index: 5, .. }))
        ));
    }

    #[test]
    fn cycles_are_refused() {
        let document = document(json!([{ "children": [1] }, { "children": [0] }]));
        let (scene, entities) = build(&document).unwrap();
        assert_eq!(scene.parent(entities[1]), Some(entities[0]));
        assert_eq!(scene.parent(entities[0]), None);
    }
}
