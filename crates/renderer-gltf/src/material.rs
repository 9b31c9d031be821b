use std::{
    collections::HashMap,
    sync::{Arc, OnceLock},
};

use gltf::{
    json::{self, validation::Checked},
    material::AlphaMode,
};
use log::{debug, warn};

use crate::{
    backend::{RenderBackend, TextureHandle},
    document::Document,
    error::{LoadError, LoadResult, SchemaError},
    texture::{ColorEncoding, TextureResolver},
};

/// A texture slot of a material. The handle is filled in once the texture
/// has been uploaded, which may happen after the material is handed out.
#[derive(Debug, Clone)]
pub struct MaterialMap {
    pub texture: usize,
    pub tex_coord: u32,
    pub encoding: ColorEncoding,
    handle: Arc<OnceLock<TextureHandle>>,
}

impl MaterialMap {
    fn new(texture: usize, tex_coord: u32, encoding: ColorEncoding) -> Self {
        Self {
            texture,
            tex_coord,
            encoding,
            handle: Arc::new(OnceLock::new()),
        }
    }

    pub fn handle(&self) -> Option<TextureHandle> {
        self.handle.get().copied()
    }

    fn attach(&self, handle: TextureHandle) -> bool {
        self.handle.set(handle).is_ok()
    }
}

#[derive(Debug, Clone)]
pub struct MetallicRoughness {
    pub base_color: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    pub base_color_map: Option<MaterialMap>,
    pub metallic_roughness_map: Option<MaterialMap>,
}

impl Default for MetallicRoughness {
    fn default() -> Self {
        Self {
            base_color: [1.0; 4],
            metallic: 1.0,
            roughness: 1.0,
            base_color_map: None,
            metallic_roughness_map: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpecularGlossiness {
    pub diffuse: [f32; 4],
    pub specular: [f32; 3],
    pub glossiness: f32,
    pub diffuse_map: Option<MaterialMap>,
    pub specular_glossiness_map: Option<MaterialMap>,
}

impl Default for SpecularGlossiness {
    fn default() -> Self {
        Self {
            diffuse: [1.0; 4],
            specular: [1.0; 3],
            glossiness: 1.0,
            diffuse_map: None,
            specular_glossiness_map: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum MaterialWorkflow {
    MetallicRoughness(MetallicRoughness),
    /// Specular-glossiness values are the active ones. The material's
    /// metallic-roughness values are kept alongside.
    SpecularGlossiness {
        specular_glossiness: SpecularGlossiness,
        metallic_roughness: MetallicRoughness,
    },
}

impl Default for MaterialWorkflow {
    fn default() -> Self {
        Self::MetallicRoughness(MetallicRoughness::default())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum MaterialAlphaMode {
    #[default]
    Opaque,
    // Alpha cutoff
    Mask(f32),
    Blend,
}

#[derive(Debug, Clone)]
pub struct MaterialDescriptor {
    pub name: Option<String>,
    pub workflow: MaterialWorkflow,
    pub normal_map: Option<MaterialMap>,
    pub normal_scale: f32,
    pub occlusion_map: Option<MaterialMap>,
    pub occlusion_strength: f32,
    pub emissive_color: [f32; 3],
    pub emissive_map: Option<MaterialMap>,
    pub alpha_mode: MaterialAlphaMode,
    pub cull_face_enabled: bool,
}

impl Default for MaterialDescriptor {
    fn default() -> Self {
        Self {
            name: None,
            workflow: MaterialWorkflow::default(),
            normal_map: None,
            normal_scale: 1.0,
            occlusion_map: None,
            occlusion_strength: 1.0,
            emissive_color: [0.0; 3],
            emissive_map: None,
            alpha_mode: MaterialAlphaMode::Opaque,
            cull_face_enabled: true,
        }
    }
}

impl MaterialDescriptor {
    /// Every texture slot of the material, in declaration order.
    pub fn maps(&self) -> Vec<&MaterialMap> {
        let (metallic_roughness, specular_glossiness) = match &self.workflow {
            MaterialWorkflow::MetallicRoughness(metallic_roughness) => (metallic_roughness, None),
            MaterialWorkflow::SpecularGlossiness {
                specular_glossiness,
                metallic_roughness,
            } => (metallic_roughness, Some(specular_glossiness)),
        };
        let mut maps = Vec::new();
        maps.extend(&metallic_roughness.base_color_map);
        maps.extend(&metallic_roughness.metallic_roughness_map);
        if let Some(block) = specular_glossiness {
            maps.extend(&block.diffuse_map);
            maps.extend(&block.specular_glossiness_map);
        }
        maps.extend(&self.normal_map);
        maps.extend(&self.occlusion_map);
        maps.extend(&self.emissive_map);
        maps
    }
}

fn map(info: &json::texture::Info, encoding: ColorEncoding) -> MaterialMap {
    MaterialMap::new(info.index.value(), info.tex_coord, encoding)
}

fn metallic_roughness(block: &json::material::PbrMetallicRoughness) -> MetallicRoughness {
    MetallicRoughness {
        base_color: block.base_color_factor.0,
        metallic: block.metallic_factor.0,
        roughness: block.roughness_factor.0,
        base_color_map: block
            .base_color_texture
            .as_ref()
            .map(|info| map(info, ColorEncoding::Srgb)),
        metallic_roughness_map: block
            .metallic_roughness_texture
            .as_ref()
            .map(|info| map(info, ColorEncoding::Linear)),
    }
}

fn specular_glossiness(
    block: &json::extensions::material::PbrSpecularGlossiness,
) -> SpecularGlossiness {
    SpecularGlossiness {
        diffuse: block.diffuse_factor.0,
        specular: block.specular_factor.0,
        glossiness: block.glossiness_factor.0,
        diffuse_map: block
            .diffuse_texture
            .as_ref()
            .map(|info| map(info, ColorEncoding::Srgb)),
        specular_glossiness_map: block
            .specular_glossiness_texture
            .as_ref()
            .map(|info| map(info, ColorEncoding::Linear)),
    }
}

fn alpha_mode(index: usize, material: &json::Material) -> Result<MaterialAlphaMode, SchemaError> {
    match material.alpha_mode {
        Checked::Valid(AlphaMode::Opaque) => Ok(MaterialAlphaMode::Opaque),
        Checked::Valid(AlphaMode::Mask) => Ok(MaterialAlphaMode::Mask(
            material.alpha_cutoff.map_or(0.5, |cutoff| cutoff.0),
        )),
        Checked::Valid(AlphaMode::Blend) => Ok(MaterialAlphaMode::Blend),
        Checked::Invalid => Err(SchemaError::UnknownAlphaMode { material: index }),
    }
}

/// Descriptor of material `index` of the document.
pub fn build_material(index: usize, material: &json::Material) -> LoadResult<MaterialDescriptor> {
    let metallic_roughness_block = metallic_roughness(&material.pbr_metallic_roughness);
    let specular_glossiness_block = material
        .extensions
        .as_ref()
        .and_then(|extensions| extensions.pbr_specular_glossiness.as_ref());
    let workflow = match specular_glossiness_block {
        Some(block) => MaterialWorkflow::SpecularGlossiness {
            specular_glossiness: specular_glossiness(block),
            metallic_roughness: metallic_roughness_block,
        },
        None => MaterialWorkflow::MetallicRoughness(metallic_roughness_block),
    };
    Ok(MaterialDescriptor {
        name: material.name.clone(),
        workflow,
        normal_map: material.normal_texture.as_ref().map(|info| {
            MaterialMap::new(info.index.value(), info.tex_coord, ColorEncoding::Linear)
        }),
        normal_scale: material
            .normal_texture
            .as_ref()
            .map_or(1.0, |info| info.scale),
        occlusion_map: material.occlusion_texture.as_ref().map(|info| {
            MaterialMap::new(info.index.value(), info.tex_coord, ColorEncoding::Linear)
        }),
        occlusion_strength: material
            .occlusion_texture
            .as_ref()
            .map_or(1.0, |info| info.strength.0),
        emissive_color: material.emissive_factor.0,
        emissive_map: material
            .emissive_texture
            .as_ref()
            .map(|info| map(info, ColorEncoding::Srgb)),
        alpha_mode: alpha_mode(index, material)?,
        cull_face_enabled: !material.double_sided,
    })
}

/// Builds each document material once and collects the texture maps that
/// still have to be resolved.
#[derive(Debug, Default)]
pub struct MaterialBuilder {
    cache: HashMap<usize, Arc<MaterialDescriptor>>,
    default: Option<Arc<MaterialDescriptor>>,
    maps: Vec<MaterialMap>,
}

impl MaterialBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Material `index`, or the default material for primitives without
    /// one.
    pub fn material(
        &mut self,
        document: &Document,
        index: Option<usize>,
    ) -> LoadResult<Arc<MaterialDescriptor>> {
        let Some(index) = index else {
            return Ok(self
                .default
                .get_or_insert_with(|| Arc::new(MaterialDescriptor::default()))
                .clone());
        };
        if let Some(material) = self.cache.get(&index) {
            return Ok(material.clone());
        }
        let material = Arc::new(build_material(index, document.material(index)?)?);
        self.maps.extend(material.maps().into_iter().cloned());
        self.cache.insert(index, material.clone());
        Ok(material)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn into_pending<B: RenderBackend + ?Sized>(
        self,
        resolver: TextureResolver<B>,
    ) -> PendingMaps<B> {
        PendingMaps {
            maps: self.maps,
            resolver,
        }
    }
}

#[derive(Debug, Default)]
pub struct SettleReport {
    pub attached: usize,
    /// Texture index and failure of every map that could not be resolved.
    pub errors: Vec<(usize, LoadError)>,
}

/// Material maps waiting for their textures. Materials handed out by a load
/// are usable before this is settled; their map handles are just unset.
pub struct PendingMaps<B: ?Sized> {
    maps: Vec<MaterialMap>,
    resolver: TextureResolver<B>,
}

impl<B: RenderBackend + ?Sized> PendingMaps<B> {
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Upload every pending texture and attach it to its map.
    pub fn settle(self) -> SettleReport {
        let mut report = SettleReport::default();
        for map in self.maps {
            match self.resolver.resolve(map.texture, map.encoding) {
                Ok(handle) => {
                    if map.attach(handle) {
                        report.attached += 1;
                    }
                }
                Err(error) => {
                    warn!("Failed to resolve texture #{}: {}", map.texture, error);
                    report.errors.push((map.texture, error));
                }
            }
        }
        debug!(
            "Attached {} material maps, {} failed",
            report.attached,
            report.errors.len()
        );
        report
    }
}
