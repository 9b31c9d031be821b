use std::iter;

use gltf::{
    animation::{Interpolation, Property},
    json::{self, validation::Checked},
};
use log::{debug, warn};

use crate::{
    accessor::AccessorDecoder,
    document::{lookup, Document},
    error::{LoadError, LoadResult, SchemaError},
    scene::EntityId,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keyframe<T> {
    pub time: f32,
    pub value: T,
}

/// Keyframes of one channel, tagged with the value width. Cubic-spline
/// channels hold an (in-tangent, value, out-tangent) triple per time, all
/// three tagged with that time.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelKeyframes {
    Scalar(Vec<Keyframe<[f32; 1]>>),
    Vec2(Vec<Keyframe<[f32; 2]>>),
    Vec3(Vec<Keyframe<[f32; 3]>>),
    Vec4(Vec<Keyframe<[f32; 4]>>),
}

impl ChannelKeyframes {
    pub fn width(&self) -> usize {
        match self {
            ChannelKeyframes::Scalar(_) => 1,
            ChannelKeyframes::Vec2(_) => 2,
            ChannelKeyframes::Vec3(_) => 3,
            ChannelKeyframes::Vec4(_) => 4,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ChannelKeyframes::Scalar(keyframes) => keyframes.len(),
            ChannelKeyframes::Vec2(keyframes) => keyframes.len(),
            ChannelKeyframes::Vec3(keyframes) => keyframes.len(),
            ChannelKeyframes::Vec4(keyframes) => keyframes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationChannel {
    pub target: EntityId,
    pub path: Property,
    pub interpolation: Interpolation,
    pub keyframes: ChannelKeyframes,
    pub duration: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    pub name: Option<String>,
    pub channels: Vec<AnimationChannel>,
    pub duration: f32,
}

fn keyframes<const N: usize>(
    times: &[f32],
    values: &[f32],
    repeat_time: bool,
) -> Vec<Keyframe<[f32; N]>> {
    let repeat = if repeat_time { 3 } else { 1 };
    times
        .iter()
        .flat_map(|time| iter::repeat(*time).take(repeat))
        .zip(values.chunks_exact(N))
        .map(|(time, chunk)| {
            let mut value = [0.0; N];
            value.copy_from_slice(chunk);
            Keyframe { time, value }
        })
        .collect()
}

/// Number of morph weights a node's animation drives.
fn morph_weight_count(document: &Document, node: &json::Node) -> usize {
    if let Some(weights) = &node.weights {
        return weights.len();
    }
    node.mesh
        .and_then(|mesh| document.meshes.get(mesh.value()))
        .map(|mesh| {
            mesh.weights.as_ref().map(Vec::len).unwrap_or_else(|| {
                mesh.primitives
                    .iter()
                    .map(|primitive| primitive.targets.as_ref().map_or(0, Vec::len))
                    .max()
                    .unwrap_or(0)
            })
        })
        .unwrap_or(0)
}

pub struct AnimationCompiler<'a> {
    document: &'a Document,
    decoder: &'a AccessorDecoder,
    node_entities: &'a [EntityId],
}

impl<'a> AnimationCompiler<'a> {
    pub fn new(
        document: &'a Document,
        decoder: &'a AccessorDecoder,
        node_entities: &'a [EntityId],
    ) -> Self {
        Self {
            document,
            decoder,
            node_entities,
        }
    }

    fn channel(
        &self,
        animation_index: usize,
        animation: &json::Animation,
        index: usize,
    ) -> LoadResult<Option<AnimationChannel>> {
        let channel = &animation.channels[index];
        let sampler_index = channel.sampler.value();
        let sampler = lookup(&animation.samplers, "animation sampler", sampler_index)?;
        let Checked::Valid(path) = channel.target.path else {
            return Err(SchemaError::UnknownTargetPath {
                animation: animation_index,
                channel: index,
            }
            .into());
        };
        let Checked::Valid(interpolation) = sampler.interpolation else {
            return Err(SchemaError::UnknownInterpolation {
                animation: animation_index,
                sampler: sampler_index,
            }
            .into());
        };

        let node_index = channel.target.node.value();
        let (Some(&target), Some(node)) = (
            self.node_entities.get(node_index),
            self.document.nodes.get(node_index),
        ) else {
            warn!(
                "Skipping animation channel #{} with dangling target node {}",
                index, node_index
            );
            return Ok(None);
        };

        let width = match path {
            Property::Translation | Property::Scale => 3,
            Property::Rotation => 4,
            Property::MorphTargetWeights => morph_weight_count(self.document, node),
        };
        if !(1..=4).contains(&width) {
            return Err(SchemaError::BadAnimationWidth {
                channel: index,
                width,
            }
            .into());
        }

        let (times, values) = match (
            self.decoder.floats(sampler.input.value()),
            self.decoder.floats(sampler.output.value()),
        ) {
            (Ok(times), Ok(values)) => (times, values),
            (Err(LoadError::UnsupportedFormat(error)), _)
            | (_, Err(LoadError::UnsupportedFormat(error))) => {
                warn!("Skipping animation channel #{}: {}", index, error);
                return Ok(None);
            }
            (Err(error), _) | (_, Err(error)) => return Err(error),
        };

        let cubic = interpolation == Interpolation::CubicSpline;
        let expected = times.len() * width * if cubic { 3 } else { 1 };
        if values.len() != expected {
            return Err(SchemaError::KeyframeCountMismatch {
                channel: index,
                expected,
                actual: values.len(),
            }
            .into());
        }

        let keyframes = match width {
            1 => ChannelKeyframes::Scalar(keyframes(&times, &values, cubic)),
            2 => ChannelKeyframes::Vec2(keyframes(&times, &values, cubic)),
            3 => ChannelKeyframes::Vec3(keyframes(&times, &values, cubic)),
            _ => ChannelKeyframes::Vec4(keyframes(&times, &values, cubic)),
        };
        let duration = times.iter().copied().fold(0.0, f32::max);
        Ok(Some(AnimationChannel {
            target,
            path,
            interpolation,
            keyframes,
            duration,
        }))
    }

    /// Compile animation `index`. Channels whose target or data is
    /// unavailable are left out.
    pub fn animation(
        &self,
        index: usize,
        animation: &json::Animation,
    ) -> LoadResult<AnimationClip> {
        let mut channels = Vec::with_capacity(animation.channels.len());
        for channel_index in 0..animation.channels.len() {
            if let Some(channel) = self.channel(index, animation, channel_index)? {
                channels.push(channel);
            }
        }
        let duration = channels
            .iter()
            .map(|channel| channel.duration)
            .fold(0.0, f32::max);
        Ok(AnimationClip {
            name: animation.name.clone(),
            channels,
            duration,
        })
    }

    pub fn compile(&self) -> LoadResult<Vec<AnimationClip>> {
        let clips = self
            .document
            .animations
            .iter()
            .enumerate()
            .map(|(index, animation)| self.animation(index, animation))
            .collect::<LoadResult<Vec<_>>>()?;
        debug!("Compiled {} animations", clips.len());
        Ok(clips)
    }
}
