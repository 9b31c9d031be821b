//! Checked access to a parsed glTF document.
//!
//! The JSON is deserialized into [`gltf::json::Root`] without running the
//! validator. Indices are checked only when they are dereferenced, so a
//! document with a few bad cross references can still be loaded partially.

use std::ops::Deref;

use gltf::json::{self, validation::USize64, Root};

use crate::error::{LoadResult, SchemaError};

#[derive(Debug, Clone, Default)]
pub struct Document {
    root: Root,
}

/// Look up `index` in `items`, reporting which collection was overrun.
pub(crate) fn lookup<'a, T>(
    items: &'a [T],
    kind: &'static str,
    index: usize,
) -> LoadResult<&'a T> {
    items.get(index).ok_or_else(|| {
        SchemaError::IndexOutOfRange {
            kind,
            index,
            len: items.len(),
        }
        .into()
    })
}

/// A byte offset, length or count of object `index` of `kind`, as a `usize`.
pub(crate) fn to_usize(value: USize64, kind: &'static str, index: usize) -> LoadResult<usize> {
    usize::try_from(value.0).map_err(|_| SchemaError::RangeOverflow { kind, index }.into())
}

impl Document {
    pub fn from_slice(json: &[u8]) -> LoadResult<Self> {
        Ok(Self {
            root: Root::from_slice(json)?,
        })
    }

    pub fn root(&self) -> &Root {
        &self.root
    }

    pub fn buffer_view(&self, index: usize) -> LoadResult<&json::buffer::View> {
        lookup(&self.root.buffer_views, "bufferView", index)
    }

    pub fn accessor(&self, index: usize) -> LoadResult<&json::Accessor> {
        lookup(&self.root.accessors, "accessor", index)
    }

    pub fn texture(&self, index: usize) -> LoadResult<&json::Texture> {
        lookup(&self.root.textures, "texture", index)
    }

    pub fn image(&self, index: usize) -> LoadResult<&json::Image> {
        lookup(&self.root.images, "image", index)
    }

    pub fn sampler(&self, index: usize) -> LoadResult<&json::texture::Sampler> {
        lookup(&self.root.samplers, "sampler", index)
    }

    pub fn material(&self, index: usize) -> LoadResult<&json::Material> {
        lookup(&self.root.materials, "material", index)
    }

    pub fn mesh(&self, index: usize) -> LoadResult<&json::Mesh> {
        lookup(&self.root.meshes, "mesh", index)
    }

    pub fn skin(&self, index: usize) -> LoadResult<&json::Skin> {
        lookup(&self.root.skins, "skin", index)
    }
}

impl From<Root> for Document {
    fn from(root: Root) -> Self {
        Self { root }
    }
}

impl Deref for Document {
    type Target = Root;

    fn deref(&self) -> &Root {
        &self.root
    }
}

/// Parse a test document, filling in the mandatory `asset` block.
#[cfg(test)]
pub(crate) fn parse(mut json: serde_json::Value) -> Document {
    if json.get("asset").is_none() {
        json["asset"] = serde_json::json!({ "version": "2.0" });
    }
    Document::from_slice(json.to_string().as_bytes()).unwrap()
}

#[cfg(test)]
mod test {
    use gltf::{accessor::Dimensions, json::validation::Checked, texture::WrappingMode};
    use serde_json::json;

    use super::{parse, Document};
    use crate::error::{LoadError, SchemaError};

    #[test]
    fn parse_minimal_document() {
        let document = parse(json!({
            "nodes": [{ "name": "root", "children": [1] }, { "translation": [1, 2, 3] }],
            "accessors": [{ "componentType": 5126, "count": 3, "type": "VEC3" }]
        }));
        assert_eq!(document.nodes.len(), 2);
        let children = document.nodes[0].children.as_ref().unwrap();
        assert_eq!(children[0].value(), 1);
        assert_eq!(document.nodes[1].translation, Some([1.0, 2.0, 3.0]));
        assert!(matches!(document.accessors[0].type_, Checked::Valid(Dimensions::Vec3)));
        assert!(document.accessors[0].byte_offset.is_none());
        assert!(document.buffers.is_empty());
    }

    #[test]
    fn unknown_codes_still_parse() {
        let document = parse(json!({
            "accessors": [{ "componentType": 5124, "count": 1, "type": "SCALAR" }],
            "samplers": [{ "wrapS": 1, "wrapT": 33071 }],
            "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 }, "mode": 9 }] }]
        }));
        assert!(matches!(document.accessors[0].component_type, Checked::Invalid));
        assert!(matches!(document.samplers[0].wrap_s, Checked::Invalid));
        assert!(matches!(
            document.samplers[0].wrap_t,
            Checked::Valid(WrappingMode::ClampToEdge)
        ));
        assert!(matches!(document.meshes[0].primitives[0].mode, Checked::Invalid));
    }

    #[test]
    fn asset_is_required() {
        let result = Document::from_slice(b"{}");
        assert!(matches!(result, Err(LoadError::Json(_))));
    }

    #[test]
    fn out_of_range_lookup() {
        let document = Document::default();
        match document.mesh(3) {
            Err(LoadError::Schema(SchemaError::IndexOutOfRange { kind, index, len })) => {
                assert_eq!(kind, "mesh");
                assert_eq!(index, 3);
                assert_eq!(len, 0);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn specular_glossiness_extension() {
        let document = parse(json!({
            "materials": [{
                "extensions": {
                    "KHR_materials_pbrSpecularGlossiness": {
                        "diffuseFactor": [0.5, 0.5, 0.5, 1.0],
                        "glossinessFactor": 0.25
                    }
                }
            }]
        }));
        let sg = document.materials[0]
            .extensions
            .as_ref()
            .and_then(|extensions| extensions.pbr_specular_glossiness.as_ref())
            .unwrap();
        assert_eq!(sg.glossiness_factor.0, 0.25);
        assert_eq!(sg.diffuse_factor.0, [0.5, 0.5, 0.5, 1.0]);
    }
}
