use std::{collections::HashMap, sync::Arc};

use glam::Mat4;
use log::warn;

use crate::{
    accessor::AccessorDecoder,
    document::Document,
    error::{LoadError, LoadResult},
    scene::EntityId,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkinData {
    pub name: Option<String>,
    /// One matrix per joint.
    pub inverse_bind_matrices: Vec<Mat4>,
    /// Joint node indices, in document order.
    pub joints: Vec<usize>,
    pub skeleton: Option<usize>,
}

fn chunk_mat4(data: &[f32]) -> Vec<Mat4> {
    data.chunks_exact(16).map(Mat4::from_cols_slice).collect()
}

/// Decodes each document skin once.
#[derive(Debug, Default)]
pub struct SkinBinder {
    cache: HashMap<usize, Arc<SkinData>>,
}

impl SkinBinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skin(
        &mut self,
        document: &Document,
        decoder: &AccessorDecoder,
        index: usize,
    ) -> LoadResult<Arc<SkinData>> {
        if let Some(skin) = self.cache.get(&index) {
            return Ok(skin.clone());
        }
        let skin = document.skin(index)?;
        let mut inverse_bind_matrices = match skin.inverse_bind_matrices {
            Some(accessor) => match decoder.floats(accessor.value()) {
                Ok(data) => chunk_mat4(&data),
                Err(LoadError::UnsupportedFormat(error)) => {
                    warn!("Inverse bind matrices of skin #{} ignored: {}", index, error);
                    Vec::new()
                }
                Err(error) => return Err(error),
            },
            None => Vec::new(),
        };
        if inverse_bind_matrices.len() != skin.joints.len() {
            if skin.inverse_bind_matrices.is_some() {
                warn!(
                    "Skin #{} has {} joints but {} inverse bind matrices",
                    index,
                    skin.joints.len(),
                    inverse_bind_matrices.len()
                );
            }
            inverse_bind_matrices.resize(skin.joints.len(), Mat4::IDENTITY);
        }
        let skin = Arc::new(SkinData {
            name: skin.name.clone(),
            inverse_bind_matrices,
            joints: skin.joints.iter().map(|joint| joint.value()).collect(),
            skeleton: skin.skeleton.map(|skeleton| skeleton.value()),
        });
        self.cache.insert(index, skin.clone());
        Ok(skin)
    }

    /// Entity of each joint slot, parallel to the inverse bind matrices.
    /// A joint without an entity keeps its slot as `None`.
    pub fn joint_entities(skin: &SkinData, node_entities: &[EntityId]) -> Vec<Option<EntityId>> {
        skin.joints
            .iter()
            .map(|&joint| {
                let entity = node_entities.get(joint).copied();
                if entity.is_none() {
                    warn!("Joint with dangling node index {} left unbound", joint);
                }
                entity
            })
            .collect()
    }
}
