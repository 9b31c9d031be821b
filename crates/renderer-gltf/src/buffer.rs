//! Raw bytes behind the document: buffers and encoded images.

use std::{ops::Range, path::Path};

use futures::future::try_join_all;
use log::debug;

use crate::{
    document::{to_usize, Document},
    error::{LoadResult, ResourceError, SchemaError},
    loader::{fetch::ResourceFetcher, scheme::Scheme},
};

async fn fetch_uri<F: ResourceFetcher>(
    fetcher: &F,
    base: &Path,
    uri: &str,
) -> Result<(Vec<u8>, Option<String>), ResourceError> {
    let scheme = Scheme::try_from(uri)
        .map_err(|error| ResourceError::InvalidScheme(uri.to_string(), error))?;
    let mime = scheme.mime().map(str::to_string);
    match scheme.load(fetcher, base).await {
        Ok(Some(data)) => Ok((data, mime)),
        Ok(None) => Err(ResourceError::NotFound(uri.to_string())),
        Err(error) => Err(ResourceError::Io(uri.to_string(), error)),
    }
}

/// Byte range of buffer view `index`, checked against its owning buffer.
pub(crate) fn view_range(
    document: &Document,
    buffers: &BufferStore,
    index: usize,
) -> LoadResult<(usize, Range<usize>)> {
    let view = document.buffer_view(index)?;
    let buffer_index = view.buffer.value();
    let buffer = buffers.get(buffer_index)?;
    let start = to_usize(view.byte_offset.unwrap_or_default(), "bufferView", index)?;
    let length = to_usize(view.byte_length, "bufferView", index)?;
    let end = start
        .checked_add(length)
        .ok_or(SchemaError::RangeOverflow {
            kind: "bufferView",
            index,
        })?;
    if end > buffer.len() {
        return Err(SchemaError::ViewOutOfBounds {
            view: index,
            end,
            buffer_length: buffer.len(),
        }
        .into());
    }
    Ok((buffer_index, start..end))
}

/// How the document was packaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container<'a> {
    Json,
    /// GLB container, with its binary chunk if there is one.
    Glb(Option<&'a [u8]>),
}

/// Every buffer of one document, keyed by buffer index. Immutable once
/// fetched.
#[derive(Debug, Clone, Default)]
pub struct BufferStore {
    buffers: Vec<Vec<u8>>,
}

impl BufferStore {
    pub fn from_buffers(buffers: Vec<Vec<u8>>) -> Self {
        Self { buffers }
    }

    /// Fetch all buffers of `document` at once. The binary chunk of a GLB
    /// container stands in for buffer 0 when it has no URI.
    pub async fn fetch<F: ResourceFetcher>(
        document: &Document,
        fetcher: &F,
        base: &Path,
        container: Container<'_>,
    ) -> LoadResult<Self> {
        let buffers = try_join_all(document.buffers.iter().enumerate().map(
            |(index, buffer)| async move {
                match (&buffer.uri, container) {
                    (Some(uri), _) => fetch_uri(fetcher, base, uri)
                        .await
                        .map(|(data, _mime)| data),
                    (None, Container::Glb(Some(bin))) if index == 0 => Ok(bin.to_vec()),
                    (None, Container::Glb(None)) if index == 0 => {
                        Err(ResourceError::MissingBinChunk)
                    }
                    (None, _) => Err(ResourceError::MissingUri {
                        kind: "Buffer",
                        index,
                    }),
                }
            },
        ))
        .await?;
        debug!("Fetched {} buffers", buffers.len());
        Ok(Self { buffers })
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn get(&self, index: usize) -> LoadResult<&[u8]> {
        self.buffers
            .get(index)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                SchemaError::IndexOutOfRange {
                    kind: "buffer",
                    index,
                    len: self.buffers.len(),
                }
                .into()
            })
    }
}

/// Encoded image bytes with the MIME type declared for them, if any.
#[derive(Debug, Clone)]
pub struct ImageSource {
    pub data: Vec<u8>,
    pub mime: Option<String>,
}

/// Encoded images of one document. Images without any source stay `None`
/// and only fail when a texture actually uses them.
#[derive(Debug, Clone, Default)]
pub struct ImageStore {
    images: Vec<Option<ImageSource>>,
}

impl ImageStore {
    pub fn from_images(images: Vec<Option<ImageSource>>) -> Self {
        Self { images }
    }

    /// Fetch every image that has a URI. Images stored in buffer views are
    /// filled in later by [`ImageStore::resolve_views`].
    pub async fn fetch<F: ResourceFetcher>(
        document: &Document,
        fetcher: &F,
        base: &Path,
    ) -> LoadResult<Self> {
        let images = try_join_all(document.images.iter().map(|image| async move {
            let Some(uri) = &image.uri else {
                return Ok(None);
            };
            let (data, mime) = fetch_uri(fetcher, base, uri).await?;
            Ok::<_, ResourceError>(Some(ImageSource {
                data,
                mime: image
                    .mime_type
                    .as_ref()
                    .map(|mime_type| mime_type.0.clone())
                    .or(mime),
            }))
        }))
        .await?;
        debug!(
            "Fetched {} of {} images by URI",
            images.iter().flatten().count(),
            images.len()
        );
        Ok(Self { images })
    }

    pub fn resolve_views(&mut self, document: &Document, buffers: &BufferStore) -> LoadResult<()> {
        for (index, image) in document.images.iter().enumerate() {
            if image.uri.is_some() {
                continue;
            }
            let Some(view) = image.buffer_view else {
                continue;
            };
            let (buffer, range) = view_range(document, buffers, view.value())?;
            let data = buffers.get(buffer)?[range].to_vec();
            if let Some(slot) = self.images.get_mut(index) {
                *slot = Some(ImageSource {
                    data,
                    mime: image.mime_type.as_ref().map(|mime_type| mime_type.0.clone()),
                });
            }
        }
        Ok(())
    }

    pub fn get(&self, index: usize) -> Result<&ImageSource, ResourceError> {
        self.images
            .get(index)
            .and_then(Option::as_ref)
            .ok_or(ResourceError::MissingUri {
                kind: "Image",
                index,
            })
    }
}
