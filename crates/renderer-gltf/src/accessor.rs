//! Turns buffer views and accessors into typed arrays or references to
//! uploaded buffers.

use std::{borrow::Cow, ops::Range};

use gltf::{
    accessor::DataType,
    buffer::Target,
    json::{self, accessor::GenericComponentType, validation::Checked},
};
use log::{debug, warn};

use crate::{
    backend::{BufferHandle, BufferUsage, RenderBackend},
    buffer::{view_range, BufferStore},
    document::{lookup, to_usize, Document},
    error::{LoadResult, SchemaError, UnsupportedFormatError},
};

/// Most components zero-filled for one accessor without a buffer view.
pub const MAX_ZEROED_COMPONENTS: usize = 1 << 24;

#[derive(Debug, Clone)]
pub struct BufferViewData {
    pub buffer: usize,
    pub range: Range<usize>,
    pub stride: Option<usize>,
    pub target: Option<Target>,
    /// Set for views uploaded to the backend.
    pub handle: Option<BufferHandle>,
}

/// An accessor that lives in an uploaded buffer and is read from there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBinding {
    pub buffer: BufferHandle,
    /// Offset of the first element, relative to the uploaded view.
    pub byte_offset: usize,
    pub stride: Option<usize>,
    pub component_type: DataType,
    pub normalized: bool,
    pub count: usize,
    pub width: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypedArray {
    U16(Vec<u16>),
    U32(Vec<u32>),
    F32(Vec<f32>),
}

impl TypedArray {
    pub fn len(&self) -> usize {
        match self {
            TypedArray::U16(data) => data.len(),
            TypedArray::U32(data) => data.len(),
            TypedArray::F32(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_f32(&self, normalized: bool) -> Vec<f32> {
        match (self, normalized) {
            (TypedArray::U16(data), true) => data
                .iter()
                .map(|item| *item as f32 / u16::MAX as f32)
                .collect(),
            (TypedArray::U16(data), false) => data.iter().map(|item| *item as f32).collect(),
            (TypedArray::U32(data), true) => data
                .iter()
                .map(|item| (*item as f64 / u32::MAX as f64) as f32)
                .collect(),
            (TypedArray::U32(data), false) => data.iter().map(|item| *item as f32).collect(),
            (TypedArray::F32(data), _) => data.clone(),
        }
    }

    pub fn to_u32(&self) -> Vec<u32> {
        match self {
            TypedArray::U16(data) => data.iter().map(|item| *item as u32).collect(),
            TypedArray::U32(data) => data.clone(),
            TypedArray::F32(data) => data.iter().map(|item| *item as u32).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodedAccessor {
    Bound(BufferBinding),
    Array(TypedArray),
    Skipped(UnsupportedFormatError),
}

fn decode<T, const N: usize>(bytes: &[u8], from_bytes: fn([u8; N]) -> T) -> Vec<T> {
    bytes
        .chunks_exact(N)
        .map(|chunk| {
            let mut array = [0; N];
            array.copy_from_slice(chunk);
            from_bytes(array)
        })
        .collect()
}

/// Copy `count` elements of `element_size` bytes, `stride` bytes apart.
fn gather(bytes: &[u8], stride: usize, element_size: usize, count: usize) -> Vec<u8> {
    if stride == element_size {
        return bytes[..element_size * count].to_vec();
    }
    let mut result = Vec::with_capacity(element_size * count);
    for index in 0..count {
        let start = index * stride;
        result.extend_from_slice(&bytes[start..start + element_size]);
    }
    result
}

fn materialize(component_type: DataType, bytes: &[u8]) -> Option<TypedArray> {
    match component_type {
        DataType::U16 => Some(TypedArray::U16(decode::<_, 2>(bytes, u16::from_le_bytes))),
        DataType::U32 => Some(TypedArray::U32(decode::<_, 4>(bytes, u32::from_le_bytes))),
        DataType::F32 => Some(TypedArray::F32(decode::<_, 4>(bytes, f32::from_le_bytes))),
        _ => None,
    }
}

fn zeros(component_type: DataType, length: usize) -> Option<TypedArray> {
    match component_type {
        DataType::U16 => Some(TypedArray::U16(vec![0; length])),
        DataType::U32 => Some(TypedArray::U32(vec![0; length])),
        DataType::F32 => Some(TypedArray::F32(vec![0.0; length])),
        _ => None,
    }
}

/// Where the elements of one accessor live, checked against its view.
#[derive(Debug, Clone)]
struct Layout {
    view: Option<usize>,
    component_type: Option<DataType>,
    width: usize,
    count: usize,
    stride: usize,
    element_size: usize,
    /// Covered bytes, relative to the view.
    range: Range<usize>,
}

/// Decoded views and accessors of one document.
#[derive(Debug)]
pub struct AccessorDecoder {
    buffers: BufferStore,
    accessors: Vec<json::Accessor>,
    views: Vec<BufferViewData>,
    layouts: Vec<Layout>,
    decoded: Vec<DecodedAccessor>,
    unsupported: Vec<UnsupportedFormatError>,
}

impl AccessorDecoder {
    /// Validate every buffer view, upload the target-bound ones and decode
    /// every accessor.
    pub fn new<B: RenderBackend + ?Sized>(
        document: &Document,
        buffers: BufferStore,
        backend: &B,
    ) -> LoadResult<Self> {
        let views = (0..document.buffer_views.len())
            .map(|index| -> LoadResult<BufferViewData> {
                let view = &document.buffer_views[index];
                let (buffer, range) = view_range(document, &buffers, index)?;
                let target = match view.target {
                    Some(Checked::Valid(target)) => Some(target),
                    Some(Checked::Invalid) => {
                        warn!("Buffer view #{} has an unknown target, not uploading it", index);
                        None
                    }
                    None => None,
                };
                let handle = match target {
                    Some(target) => {
                        let usage = match target {
                            Target::ArrayBuffer => BufferUsage::Vertex,
                            Target::ElementArrayBuffer => BufferUsage::Index,
                        };
                        let bytes = &buffers.get(buffer)?[range.clone()];
                        Some(backend.create_buffer(usage, bytes))
                    }
                    None => None,
                };
                Ok(BufferViewData {
                    buffer,
                    range,
                    stride: view.byte_stride.map(|stride| stride.0),
                    target,
                    handle,
                })
            })
            .collect::<LoadResult<Vec<_>>>()?;

        let count = document.accessors.len();
        let mut decoder = Self {
            buffers,
            accessors: document.accessors.clone(),
            views,
            layouts: Vec::with_capacity(count),
            decoded: Vec::with_capacity(count),
            unsupported: Vec::new(),
        };
        for index in 0..count {
            let layout = decoder.layout(index)?;
            let decoded = decoder.decode_accessor(index, &layout)?;
            if let DecodedAccessor::Skipped(error) = &decoded {
                warn!("Skipping accessor: {}", error);
                decoder.unsupported.push(error.clone());
            }
            decoder.layouts.push(layout);
            decoder.decoded.push(decoded);
        }
        debug!(
            "Decoded {} buffer views and {} accessors",
            decoder.views.len(),
            decoder.decoded.len()
        );
        Ok(decoder)
    }

    fn view(&self, index: usize) -> LoadResult<&BufferViewData> {
        lookup(&self.views, "bufferView", index)
    }

    /// Check the range accessor `index` covers. Elements of an unknown
    /// component type are sized one byte per component.
    fn layout(&self, index: usize) -> LoadResult<Layout> {
        let accessor = &self.accessors[index];
        let Checked::Valid(dimensions) = accessor.type_ else {
            return Err(SchemaError::UnknownAccessorType { accessor: index }.into());
        };
        let width = dimensions.multiplicity();
        let count = to_usize(accessor.count, "accessor", index)?;
        let component_type = match accessor.component_type {
            Checked::Valid(GenericComponentType(component_type)) => Some(component_type),
            Checked::Invalid => None,
        };
        let element_size = component_type.map_or(1, |component_type| component_type.size());
        let element_size = element_size * width;

        let Some(view_index) = accessor.buffer_view.map(|view| view.value()) else {
            let components = count.saturating_mul(width);
            if components > MAX_ZEROED_COMPONENTS {
                return Err(SchemaError::AccessorTooLarge {
                    accessor: index,
                    components,
                }
                .into());
            }
            return Ok(Layout {
                view: None,
                component_type,
                width,
                count,
                stride: element_size,
                element_size,
                range: 0..0,
            });
        };

        let view = self.view(view_index)?;
        let byte_offset = match accessor.byte_offset {
            Some(offset) => to_usize(offset, "accessor", index)?,
            None => 0,
        };
        let stride = view
            .stride
            .filter(|stride| *stride > element_size)
            .unwrap_or(element_size);
        let overflow = || SchemaError::RangeOverflow {
            kind: "accessor",
            index,
        };
        let length = match count {
            0 => 0,
            count => (count - 1)
                .checked_mul(stride)
                .and_then(|length| length.checked_add(element_size))
                .ok_or_else(overflow)?,
        };
        let end = byte_offset.checked_add(length).ok_or_else(overflow)?;
        let view_length = view.range.len();
        if end > view_length {
            return Err(SchemaError::AccessorOutOfBounds {
                accessor: index,
                end,
                view_length,
            }
            .into());
        }
        Ok(Layout {
            view: Some(view_index),
            component_type,
            width,
            count,
            stride,
            element_size,
            range: byte_offset..end,
        })
    }

    fn read_array(&self, layout: &Layout) -> LoadResult<Option<TypedArray>> {
        let Some(component_type) = layout.component_type else {
            return Ok(None);
        };
        let Some(view) = layout.view else {
            return Ok(zeros(component_type, layout.count * layout.width));
        };
        let view = self.view(view)?;
        let bytes = &self.buffers.get(view.buffer)?[view.range.clone()][layout.range.clone()];
        let bytes = gather(bytes, layout.stride, layout.element_size, layout.count);
        Ok(materialize(component_type, &bytes))
    }

    fn decode_accessor(&self, index: usize, layout: &Layout) -> LoadResult<DecodedAccessor> {
        let accessor = &self.accessors[index];
        if accessor.sparse.is_some() {
            warn!("Sparse data of accessor #{} is not supported, ignoring", index);
        }
        let Some(component_type) = layout.component_type else {
            return Ok(DecodedAccessor::Skipped(UnsupportedFormatError {
                accessor: index,
                component_type: None,
            }));
        };
        if let Some(view_index) = layout.view {
            let view = self.view(view_index)?;
            if let Some(buffer) = view.handle {
                return Ok(DecodedAccessor::Bound(BufferBinding {
                    buffer,
                    byte_offset: layout.range.start,
                    stride: view.stride,
                    component_type,
                    normalized: accessor.normalized,
                    count: layout.count,
                    width: layout.width,
                }));
            }
        }
        Ok(match self.read_array(layout)? {
            Some(array) => DecodedAccessor::Array(array),
            None => DecodedAccessor::Skipped(UnsupportedFormatError {
                accessor: index,
                component_type: Some(component_type),
            }),
        })
    }

    pub fn accessor(&self, index: usize) -> LoadResult<&json::Accessor> {
        lookup(&self.accessors, "accessor", index)
    }

    pub fn decoded(&self, index: usize) -> LoadResult<&DecodedAccessor> {
        lookup(&self.decoded, "accessor", index)
    }

    /// Element count of an accessor, already checked against its storage.
    pub fn count(&self, index: usize) -> LoadResult<usize> {
        Ok(lookup(&self.layouts, "accessor", index)?.count)
    }

    pub fn views(&self) -> &[BufferViewData] {
        &self.views
    }

    /// Accessors that were skipped because of their component type.
    pub fn unsupported(&self) -> &[UnsupportedFormatError] {
        &self.unsupported
    }

    /// CPU-side data of an accessor. Bound accessors are decoded from the
    /// retained view bytes on demand.
    pub fn array(&self, index: usize) -> LoadResult<Cow<'_, TypedArray>> {
        match self.decoded(index)? {
            DecodedAccessor::Array(array) => Ok(Cow::Borrowed(array)),
            DecodedAccessor::Skipped(error) => Err(error.clone().into()),
            DecodedAccessor::Bound(binding) => match self.read_array(&self.layouts[index])? {
                Some(array) => Ok(Cow::Owned(array)),
                None => Err(UnsupportedFormatError {
                    accessor: index,
                    component_type: Some(binding.component_type),
                }
                .into()),
            },
        }
    }

    /// Accessor data as floats, normalized if the accessor says so.
    pub fn floats(&self, index: usize) -> LoadResult<Vec<f32>> {
        let normalized = self.accessor(index)?.normalized;
        Ok(self.array(index)?.to_f32(normalized))
    }
}
