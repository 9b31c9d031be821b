use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use gltf::{
    json::{self, validation::Checked},
    mesh::{Mode, Semantic},
};
use log::warn;

use crate::{
    accessor::{AccessorDecoder, BufferBinding, DecodedAccessor, TypedArray},
    bounds::Aabb,
    document::Document,
    error::{LoadError, LoadResult, SchemaError},
    material::{MaterialBuilder, MaterialDescriptor},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VertexAttribute {
    Positions,
    Normals,
    Tangents,
    TexCoords,
    TexCoords1,
    TexCoords2,
    Joints,
    Weights,
    VertexColors,
}

impl VertexAttribute {
    /// Attribute for a primitive semantic. Only the first set of colors,
    /// joints and weights and the first three texture coordinate sets are
    /// known.
    pub fn from_semantic(semantic: &Checked<Semantic>) -> Result<Self, SchemaError> {
        match semantic {
            Checked::Valid(Semantic::Positions) => Ok(VertexAttribute::Positions),
            Checked::Valid(Semantic::Normals) => Ok(VertexAttribute::Normals),
            Checked::Valid(Semantic::Tangents) => Ok(VertexAttribute::Tangents),
            Checked::Valid(Semantic::TexCoords(0)) => Ok(VertexAttribute::TexCoords),
            Checked::Valid(Semantic::TexCoords(1)) => Ok(VertexAttribute::TexCoords1),
            Checked::Valid(Semantic::TexCoords(2)) => Ok(VertexAttribute::TexCoords2),
            Checked::Valid(Semantic::Joints(0)) => Ok(VertexAttribute::Joints),
            Checked::Valid(Semantic::Weights(0)) => Ok(VertexAttribute::Weights),
            Checked::Valid(Semantic::Colors(0)) => Ok(VertexAttribute::VertexColors),
            semantic => Err(SchemaError::UnknownAttribute(semantic.to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            VertexAttribute::Positions => "positions",
            VertexAttribute::Normals => "normals",
            VertexAttribute::Tangents => "tangents",
            VertexAttribute::TexCoords => "texCoords",
            VertexAttribute::TexCoords1 => "texCoords1",
            VertexAttribute::TexCoords2 => "texCoords2",
            VertexAttribute::Joints => "joints",
            VertexAttribute::Weights => "weights",
            VertexAttribute::VertexColors => "vertexColors",
        }
    }
}

/// Vertex or index data, either in an uploaded buffer or decoded on the CPU.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeData {
    Buffer(BufferBinding),
    Array(TypedArray),
}

impl AttributeData {
    pub fn count(&self, width: usize) -> usize {
        match self {
            AttributeData::Buffer(binding) => binding.count,
            AttributeData::Array(array) => array.len() / width.max(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Geometry {
    pub attributes: BTreeMap<VertexAttribute, AttributeData>,
    pub indices: Option<AttributeData>,
    /// Number of vertices drawn when there are no indices.
    pub vertex_count: usize,
    /// Bounds declared by the position accessor. `None` means unbounded.
    pub bounds: Option<Aabb>,
    pub mode: Mode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MorphDescriptor {
    /// One position delta array per target.
    pub targets: Vec<Vec<f32>>,
    pub weights: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct PrimitiveDescriptor {
    pub geometry: Arc<Geometry>,
    pub material: Arc<MaterialDescriptor>,
    pub morph: Option<Arc<MorphDescriptor>>,
}

/// Numbers of an accessor's `min` or `max` array.
fn floats(value: Option<&serde_json::Value>) -> Option<Vec<f32>> {
    serde_json::from_value(value?.clone()).ok()
}

/// Assembles each document mesh once.
#[derive(Debug, Default)]
pub struct MeshAssembler {
    cache: HashMap<usize, Arc<[PrimitiveDescriptor]>>,
}

impl MeshAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    fn attribute(
        decoder: &AccessorDecoder,
        accessor: usize,
    ) -> LoadResult<Option<AttributeData>> {
        Ok(match decoder.decoded(accessor)? {
            DecodedAccessor::Bound(binding) => Some(AttributeData::Buffer(*binding)),
            DecodedAccessor::Array(array) => Some(AttributeData::Array(array.clone())),
            DecodedAccessor::Skipped(_) => None,
        })
    }

    fn morph_target(
        decoder: &AccessorDecoder,
        target: &json::mesh::MorphTarget,
        vertex_count: usize,
    ) -> LoadResult<Vec<f32>> {
        let Some(accessor) = target.positions else {
            return Ok(vec![0.0; vertex_count * 3]);
        };
        match decoder.floats(accessor.value()) {
            Ok(data) => Ok(data),
            Err(LoadError::UnsupportedFormat(error)) => {
                warn!("Morph target ignored: {}", error);
                Ok(vec![0.0; vertex_count * 3])
            }
            Err(error) => Err(error),
        }
    }

    fn primitive(
        document: &Document,
        decoder: &AccessorDecoder,
        materials: &mut MaterialBuilder,
        mesh_index: usize,
        primitive_index: usize,
        primitive: &json::mesh::Primitive,
        weights: Option<&[f32]>,
    ) -> LoadResult<PrimitiveDescriptor> {
        let mut attributes = BTreeMap::new();
        for (semantic, accessor) in &primitive.attributes {
            let attribute = VertexAttribute::from_semantic(semantic)?;
            match Self::attribute(decoder, accessor.value())? {
                Some(data) => {
                    attributes.insert(attribute, data);
                }
                None => warn!(
                    "Attribute {} of mesh #{} primitive #{} skipped",
                    attribute.name(),
                    mesh_index,
                    primitive_index
                ),
            }
        }

        let position = primitive
            .attributes
            .get(&Checked::Valid(Semantic::Positions))
            .ok_or(SchemaError::MissingPositions {
                mesh: mesh_index,
                primitive: primitive_index,
            })?
            .value();
        let position_accessor = decoder.accessor(position)?;
        let bounds = match (
            floats(position_accessor.min.as_ref()),
            floats(position_accessor.max.as_ref()),
        ) {
            (Some(min), Some(max)) => Aabb::from_min_max(&min, &max),
            _ => None,
        };
        let vertex_count = decoder.count(position)?;

        let indices = primitive
            .indices
            .map(|accessor| Self::attribute(decoder, accessor.value()))
            .transpose()?
            .flatten();

        let mode = match primitive.mode {
            Checked::Valid(mode) => mode,
            Checked::Invalid => {
                warn!(
                    "Unknown mode of mesh #{} primitive #{}, drawing triangles",
                    mesh_index, primitive_index
                );
                Mode::Triangles
            }
        };

        let morph_targets = primitive.targets.as_deref().unwrap_or_default();
        let morph = if morph_targets.is_empty() {
            None
        } else {
            let targets = morph_targets
                .iter()
                .map(|target| Self::morph_target(decoder, target, vertex_count))
                .collect::<LoadResult<Vec<_>>>()?;
            let mut weights = weights.map(<[f32]>::to_vec).unwrap_or_default();
            weights.resize(targets.len(), 0.0);
            Some(Arc::new(MorphDescriptor { targets, weights }))
        };

        Ok(PrimitiveDescriptor {
            geometry: Arc::new(Geometry {
                attributes,
                indices,
                vertex_count,
                bounds,
                mode,
            }),
            material: materials.material(document, primitive.material.map(|index| index.value()))?,
            morph,
        })
    }

    pub fn mesh(
        &mut self,
        document: &Document,
        decoder: &AccessorDecoder,
        materials: &mut MaterialBuilder,
        index: usize,
    ) -> LoadResult<Arc<[PrimitiveDescriptor]>> {
        if let Some(mesh) = self.cache.get(&index) {
            return Ok(mesh.clone());
        }
        let mesh = document.mesh(index)?;
        let primitives = mesh
            .primitives
            .iter()
            .enumerate()
            .map(|(primitive_index, primitive)| {
                Self::primitive(
                    document,
                    decoder,
                    materials,
                    index,
                    primitive_index,
                    primitive,
                    mesh.weights.as_deref(),
                )
            })
            .collect::<LoadResult<Arc<[_]>>>()?;
        self.cache.insert(index, primitives.clone());
        Ok(primitives)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use glam::Vec3;
    use gltf::mesh::Mode;
    use serde_json::json;

    use super::{AttributeData, MeshAssembler, VertexAttribute};
    use crate::{
        accessor::{AccessorDecoder, TypedArray},
        backend::HeadlessBackend,
        buffer::BufferStore,
        document::{parse, Document},
        error::{LoadError, SchemaError},
        material::MaterialBuilder,
    };

    fn setup(json: serde_json::Value, buffer: Vec<u8>) -> (Document, AccessorDecoder) {
        let document = parse(json);
        let decoder = AccessorDecoder::new(
            &document,
            BufferStore::from_buffers(vec![buffer]),
            &HeadlessBackend::new(),
        )
        .unwrap();
        (document, decoder)
    }

    fn triangle() -> Vec<u8> {
        let positions = [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let deltas = [0.0f32, 0.5, 0.0, 0.0, 0.5, 0.0, 0.0, 0.5, 0.0];
        let mut buffer = bytemuck::cast_slice::<f32, u8>(&positions).to_vec();
        buffer.extend_from_slice(bytemuck::cast_slice::<f32, u8>(&deltas));
        buffer.extend_from_slice(bytemuck::cast_slice::<u16, u8>(&[0u16, 1, 2, 0]));
        buffer
    }

    fn triangle_json(mesh: serde_json::Value) -> serde_json::Value {
        json!({
            "bufferViews": [
                { "buffer": 0, "byteLength": 36 },
                { "buffer": 0, "byteOffset": 36, "byteLength": 36 },
                { "buffer": 0, "byteOffset": 72, "byteLength": 6, "target": 34963 }
            ],
            "accessors": [
                { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                  "min": [0, 0, 0], "max": [1, 1, 0] },
                { "bufferView": 1, "componentType": 5126, "count": 3, "type": "VEC3" },
                { "bufferView": 2, "componentType": 5123, "count": 3, "type": "SCALAR" }
            ],
            "meshes": [mesh]
        })
    }

    #[test]
    fn assemble_indexed_triangle() {
        let (document, decoder) = setup(
            triangle_json(json!({
                "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 2 }]
            })),
            triangle(),
        );
        let mut materials = MaterialBuilder::new();
        let mut assembler = MeshAssembler::new();
        let mesh = assembler.mesh(&document, &decoder, &mut materials, 0).unwrap();
        assert_eq!(mesh.len(), 1);
        let geometry = &mesh[0].geometry;
        assert_eq!(geometry.mode, Mode::Triangles);
        assert_eq!(geometry.vertex_count, 3);
        let bounds = geometry.bounds.unwrap();
        assert_eq!(bounds.max, Vec3::new(1.0, 1.0, 0.0));
        match geometry.indices.as_ref().unwrap() {
            AttributeData::Buffer(binding) => assert_eq!(binding.count, 3),
            other => panic!("unexpected indices: {:?}", other),
        }
        assert_eq!(
            geometry.attributes.get(&VertexAttribute::Positions),
            Some(&AttributeData::Array(TypedArray::F32(vec![
                0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0
            ])))
        );
        assert!(mesh[0].morph.is_none());
        // Meshes are shared.
        let again = assembler.mesh(&document, &decoder, &mut materials, 0).unwrap();
        assert!(Arc::ptr_eq(&mesh, &again));
    }

    #[test]
    fn morph_targets_default_to_zero_weights() {
        let (document, decoder) = setup(
            triangle_json(json!({
                "primitives": [{
                    "attributes": { "POSITION": 0 },
                    "targets": [{ "POSITION": 1 }, { "NORMAL": 1 }]
                }]
            })),
            triangle(),
        );
        let mesh = MeshAssembler::new()
            .mesh(&document, &decoder, &mut MaterialBuilder::new(), 0)
            .unwrap();
        let morph = mesh[0].morph.as_ref().unwrap();
        assert_eq!(morph.weights, vec![0.0, 0.0]);
        assert_eq!(morph.targets[0][1], 0.5);
        assert_eq!(morph.targets[1], vec![0.0; 9]);
    }

    #[test]
    fn unknown_semantic_and_missing_positions() {
        let (document, decoder) = setup(
            triangle_json(json!({
                "primitives": [
                    { "attributes": { "POSITION": 0, "_CUSTOM": 1 } }
                ]
            })),
            triangle(),
        );
        let result =
            MeshAssembler::new().mesh(&document, &decoder, &mut MaterialBuilder::new(), 0);
        assert!(matches!(
            result,
            Err(LoadError::Schema(SchemaError::UnknownAttribute(_)))
        ));

        let (document, decoder) = setup(
            triangle_json(json!({
                "primitives": [{ "attributes": { "POSITION": 0, "TEXCOORD_5": 1 } }]
            })),
            triangle(),
        );
        let result =
            MeshAssembler::new().mesh(&document, &decoder, &mut MaterialBuilder::new(), 0);
        assert!(matches!(
            result,
            Err(LoadError::Schema(SchemaError::UnknownAttribute(name))) if name == "TEXCOORD_5"
        ));

        let (document, decoder) = setup(
            triangle_json(json!({ "primitives": [{ "attributes": { "NORMAL": 1 } }] })),
            triangle(),
        );
        let result =
            MeshAssembler::new().mesh(&document, &decoder, &mut MaterialBuilder::new(), 0);
        assert!(matches!(
            result,
            Err(LoadError::Schema(SchemaError::MissingPositions { mesh: 0, primitive: 0 }))
        ));
    }

    #[test]
    fn missing_bounds_are_unbounded() {
        let mut json = triangle_json(json!({
            "primitives": [{ "attributes": { "POSITION": 1 }, "mode": 1 }]
        }));
        json["accessors"][1]["min"] = json!([0, 0, 0]);
        let (document, decoder) = setup(json, triangle());
        let mesh = MeshAssembler::new()
            .mesh(&document, &decoder, &mut MaterialBuilder::new(), 0)
            .unwrap();
        assert_eq!(mesh[0].geometry.bounds, None);
        assert_eq!(mesh[0].geometry.mode, Mode::Lines);
        assert!(mesh[0].geometry.indices.is_none());
    }
}
