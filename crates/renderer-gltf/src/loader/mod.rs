use std::{path::Path, sync::Arc};

use gltf::binary::Glb;
use log::{debug, info};

use crate::{
    accessor::AccessorDecoder,
    animation::AnimationCompiler,
    backend::RenderBackend,
    buffer::{BufferStore, Container, ImageStore},
    document::Document,
    error::{LoadResult, ResourceError, UnsupportedFormatError},
    graph::SceneGraphBuilder,
    material::{MaterialBuilder, PendingMaps},
    normalize::{Normalization, SceneNormalizer},
    scene::Scene,
    texture::TextureResolver,
};

pub mod fetch;
pub mod scheme;

use fetch::ResourceFetcher;

const GLB_MAGIC: &[u8] = b"glTF";

#[derive(Debug, Clone)]
pub struct LoadParams {
    /// Fit the scene into a unit footprint standing on the origin.
    pub normalize: bool,
    pub root_name: String,
    pub model_name: String,
    pub model_extension: bool,
}

impl Default for LoadParams {
    fn default() -> Self {
        Self {
            normalize: true,
            root_name: String::from("sceneRoot"),
            model_name: String::from("model"),
            model_extension: true,
        }
    }
}

impl LoadParams {
    /// Name of the model file inside a bundle.
    pub fn model_file_name(&self, extension: &str) -> String {
        if self.model_extension {
            format!("{}.{}", self.model_name, extension)
        } else {
            self.model_name.clone()
        }
    }
}

/// Result of one load. The scene is complete except for material texture
/// handles, which are filled in by settling `maps`.
pub struct LoadedScene<B: ?Sized> {
    pub scene: Scene,
    pub maps: PendingMaps<B>,
    pub normalization: Option<Normalization>,
    /// Accessors that were skipped for their component type.
    pub unsupported: Vec<UnsupportedFormatError>,
}

/// Loads glTF documents through a fetcher and uploads their GPU resources
/// to a backend. Every load builds its own scene; nothing is shared between
/// loads apart from the backend.
pub struct SceneLoader<B: ?Sized, F> {
    backend: Arc<B>,
    fetcher: F,
    params: LoadParams,
}

impl<B: RenderBackend + ?Sized, F: ResourceFetcher> SceneLoader<B, F> {
    pub fn new(backend: Arc<B>, fetcher: F) -> Self {
        Self {
            backend,
            fetcher,
            params: LoadParams::default(),
        }
    }

    pub fn with_params(mut self, params: LoadParams) -> Self {
        self.params = params;
        self
    }

    pub fn params(&self) -> &LoadParams {
        &self.params
    }

    async fn fetch_document(&self, path: &Path) -> LoadResult<Option<Vec<u8>>> {
        self.fetcher
            .fetch(path)
            .await
            .map_err(|error| ResourceError::Io(path.display().to_string(), error).into())
    }

    /// Load the `.gltf` or `.glb` file at `path`. Relative URIs inside it
    /// resolve against its directory.
    pub async fn load<P: AsRef<Path>>(&self, path: P) -> LoadResult<LoadedScene<B>> {
        let path = path.as_ref();
        let data = self
            .fetch_document(path)
            .await?
            .ok_or_else(|| ResourceError::NotFound(path.display().to_string()))?;
        let base = path.parent().unwrap_or(Path::new(""));
        self.load_slice(&data, base).await
    }

    /// Load the model file of a bundle, preferring the binary container.
    pub async fn load_bundle(&self) -> LoadResult<LoadedScene<B>> {
        for extension in ["glb", "gltf"] {
            let name = self.params.model_file_name(extension);
            if let Some(data) = self.fetch_document(Path::new(&name)).await? {
                debug!("Loading bundle model {}", name);
                return self.load_slice(&data, Path::new("")).await;
            }
        }
        Err(ResourceError::NotFound(self.params.model_file_name("gltf")).into())
    }

    /// Load a document already in memory, either JSON or a GLB container.
    pub async fn load_slice(&self, data: &[u8], base: &Path) -> LoadResult<LoadedScene<B>> {
        let glb;
        let (json, container) = if data.starts_with(GLB_MAGIC) {
            glb = Glb::from_slice(data)?;
            (glb.json.as_ref(), Container::Glb(glb.bin.as_deref()))
        } else {
            (data, Container::Json)
        };
        let document = Arc::new(Document::from_slice(json)?);

        let (buffers, mut images) = futures::try_join!(
            BufferStore::fetch(&document, &self.fetcher, base, container),
            ImageStore::fetch(&document, &self.fetcher, base),
        )?;
        images.resolve_views(&document, &buffers)?;
        let decoder = AccessorDecoder::new(&document, buffers, &*self.backend)?;

        let mut scene = Scene::new(&self.params.root_name);
        let mut materials = MaterialBuilder::new();
        let node_entities =
            SceneGraphBuilder::new(&document, &decoder).build(&mut scene, &mut materials)?;
        scene.adopt_orphans();
        scene.mark_used();
        scene.animations = AnimationCompiler::new(&document, &decoder, &node_entities).compile()?;

        let normalization = if self.params.normalize {
            SceneNormalizer::normalize(&mut scene)
        } else {
            scene.update_world();
            None
        };

        info!(
            "Loaded {} entities ({} unused), {} materials, {} skins, {} animations",
            scene.len(),
            scene.unused().count(),
            materials.len(),
            scene.skins().len(),
            scene.animations.len()
        );
        let resolver =
            TextureResolver::new(document.clone(), Arc::new(images), self.backend.clone());
        Ok(LoadedScene {
            scene,
            maps: materials.into_pending(resolver),
            normalization,
            unsupported: decoder.unsupported().to_vec(),
        })
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use serde_json::json;

    use super::{LoadParams, SceneLoader};
    use crate::{
        backend::HeadlessBackend,
        error::{LoadError, ResourceError},
        loader::fetch::MemoryFetcher,
    };

    #[test]
    fn model_file_name() {
        let mut params = LoadParams::default();
        assert_eq!(params.model_file_name("glb"), "model.glb");
        params.model_extension = false;
        assert_eq!(params.model_file_name("glb"), "model");
    }

    #[test]
    fn missing_buffer_is_fatal() {
        let fetcher = MemoryFetcher::new().with(
            "scene.gltf",
            json!({
                "asset": { "version": "2.0" },
                "buffers": [{ "uri": "gone.bin", "byteLength": 4 }]
            })
            .to_string()
            .into_bytes(),
        );
        let loader = SceneLoader::new(Arc::new(HeadlessBackend::new()), fetcher);
        let result = pollster::block_on(loader.load("scene.gltf"));
        assert!(matches!(
            result,
            Err(LoadError::Resource(ResourceError::NotFound(uri))) if uri == "gone.bin"
        ));
    }

    #[test]
    fn bundle_prefers_glb_name() {
        let fetcher = MemoryFetcher::new().with(
            "model.gltf",
            br#"{ "asset": { "version": "2.0" } }"#.to_vec(),
        );
        let loader = SceneLoader::new(Arc::new(HeadlessBackend::new()), fetcher);
        let loaded = pollster::block_on(loader.load_bundle()).unwrap();
        assert_eq!(loaded.scene.len(), 1);
        assert_eq!(loaded.scene.entity(loaded.scene.root()).name, "sceneRoot");
        assert!(loaded.normalization.is_none());
        assert!(loaded.maps.is_empty());
    }
}
