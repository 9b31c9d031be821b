//! Load glTF 2.0 assets into a CPU-side scene graph.
//!
//! A load fetches every buffer and image of a document, decodes accessors,
//! builds materials, meshes and skins, links the node hierarchy into an
//! entity arena and compiles animations. GPU resources are handed to a
//! [`backend::RenderBackend`], which only has to return opaque handles.
//!
//! Resources are read through a [`loader::fetch::ResourceFetcher`], so a
//! model can come from the file system, from memory or from an archive
//! bundle.
//!
pub mod accessor;
pub mod animation;
pub mod archive;
pub mod backend;
pub mod bounds;
pub mod buffer;
pub mod document;
pub mod error;
pub mod graph;
/// Entry points for loading whole documents.
pub mod loader;
pub mod material;
pub mod mesh;
pub mod node;
pub mod normalize;
pub mod scene;
pub mod skin;
pub mod texture;

pub use error::{LoadError, LoadResult};
pub use loader::{LoadParams, LoadedScene, SceneLoader};
pub use scene::{Entity, EntityId, Scene};
