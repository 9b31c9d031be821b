use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    io,
};

use gltf::accessor::DataType;
use image::ImageError;

use crate::loader::scheme::SchemeError;

/// Failure to obtain the bytes of a buffer, image or the document itself.
#[derive(Debug)]
pub enum ResourceError {
    MissingUri { kind: &'static str, index: usize },
    NotFound(String),
    Io(String, io::Error),
    InvalidScheme(String, SchemeError),
    BadImage(String, ImageError),
    BadImageMime(String, String),
    MissingBinChunk,
}

impl Display for ResourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::MissingUri { kind, index } => {
                write!(f, "{} #{} has no retrievable source", kind, index)
            }
            ResourceError::NotFound(uri) => write!(f, "Resource {} not found", uri),
            ResourceError::Io(uri, error) => write!(f, "Failed to read {}: {}", uri, error),
            ResourceError::InvalidScheme(uri, error) => write!(f, "{}: {}", uri, error),
            ResourceError::BadImage(source, error) => {
                write!(f, "Bad image {}: {}", source, error)
            }
            ResourceError::BadImageMime(source, mime) => {
                write!(f, "Bad MIME {} for image {}", mime, source)
            }
            ResourceError::MissingBinChunk => {
                write!(f, "Buffer refers to a GLB binary chunk, but there is none")
            }
        }
    }
}

impl Error for ResourceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ResourceError::Io(_, error) => Some(error),
            ResourceError::InvalidScheme(_, error) => Some(error),
            ResourceError::BadImage(_, error) => Some(error),
            _ => None,
        }
    }
}

/// The document is structurally wrong.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaError {
    IndexOutOfRange {
        kind: &'static str,
        index: usize,
        len: usize,
    },
    UnknownAttribute(String),
    UnknownAccessorType {
        accessor: usize,
    },
    UnknownTargetPath {
        animation: usize,
        channel: usize,
    },
    UnknownInterpolation {
        animation: usize,
        sampler: usize,
    },
    UnknownAlphaMode {
        material: usize,
    },
    /// A byte range or count of a `kind` object does not fit in memory.
    RangeOverflow {
        kind: &'static str,
        index: usize,
    },
    /// An accessor without a buffer view asks for more zeros than allowed.
    AccessorTooLarge {
        accessor: usize,
        components: usize,
    },
    ViewOutOfBounds {
        view: usize,
        end: usize,
        buffer_length: usize,
    },
    AccessorOutOfBounds {
        accessor: usize,
        end: usize,
        view_length: usize,
    },
    BadAnimationWidth {
        channel: usize,
        width: usize,
    },
    KeyframeCountMismatch {
        channel: usize,
        expected: usize,
        actual: usize,
    },
    MissingPositions {
        mesh: usize,
        primitive: usize,
    },
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::IndexOutOfRange { kind, index, len } => {
                write!(f, "{} index {} out of range (length {})", kind, index, len)
            }
            SchemaError::UnknownAttribute(name) => write!(f, "Unknown attribute '{}'", name),
            SchemaError::UnknownAccessorType { accessor } => {
                write!(f, "Accessor #{} has an unknown element type", accessor)
            }
            SchemaError::UnknownTargetPath { animation, channel } => write!(
                f,
                "Channel #{} of animation #{} has an unknown target path",
                channel, animation
            ),
            SchemaError::UnknownInterpolation { animation, sampler } => write!(
                f,
                "Sampler #{} of animation #{} has an unknown interpolation",
                sampler, animation
            ),
            SchemaError::UnknownAlphaMode { material } => {
                write!(f, "Material #{} has an unknown alpha mode", material)
            }
            SchemaError::RangeOverflow { kind, index } => {
                write!(f, "Byte range of {} #{} overflows", kind, index)
            }
            SchemaError::AccessorTooLarge {
                accessor,
                components,
            } => write!(
                f,
                "Accessor #{} has no buffer view and asks for {} zeroed components",
                accessor, components
            ),
            SchemaError::ViewOutOfBounds {
                view,
                end,
                buffer_length,
            } => write!(
                f,
                "Buffer view #{} ends at byte {}, but its buffer has {} bytes",
                view, end, buffer_length
            ),
            SchemaError::AccessorOutOfBounds {
                accessor,
                end,
                view_length,
            } => write!(
                f,
                "Accessor #{} ends at byte {}, but its buffer view has {} bytes",
                accessor, end, view_length
            ),
            SchemaError::BadAnimationWidth { channel, width } => write!(
                f,
                "Animation channel #{} has keyframe width {}, only 1 to 4 are supported",
                channel, width
            ),
            SchemaError::KeyframeCountMismatch {
                channel,
                expected,
                actual,
            } => write!(
                f,
                "Animation channel #{} expects {} keyframe values, but got {}",
                channel, expected, actual
            ),
            SchemaError::MissingPositions { mesh, primitive } => write!(
                f,
                "Primitive #{} of mesh #{} has no POSITION attribute",
                primitive, mesh
            ),
        }
    }
}

impl Error for SchemaError {}

/// Accessor data the decoder cannot materialize into a typed array.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsupportedFormatError {
    pub accessor: usize,
    /// `None` when the code is not a glTF component type at all.
    pub component_type: Option<DataType>,
}

impl Display for UnsupportedFormatError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.component_type {
            Some(component_type) => write!(
                f,
                "Accessor #{} uses unsupported component type {:?}",
                self.accessor, component_type
            ),
            None => write!(f, "Accessor #{} uses an unknown component type", self.accessor),
        }
    }
}

impl Error for UnsupportedFormatError {}

#[derive(Debug)]
pub enum LoadError {
    Resource(ResourceError),
    Schema(SchemaError),
    UnsupportedFormat(UnsupportedFormatError),
    Json(serde_json::Error),
    Container(gltf::Error),
}

impl Display for LoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Resource(error) => Display::fmt(error, f),
            LoadError::Schema(error) => Display::fmt(error, f),
            LoadError::UnsupportedFormat(error) => Display::fmt(error, f),
            LoadError::Json(error) => write!(f, "Bad document: {}", error),
            LoadError::Container(error) => write!(f, "Bad GLB container: {}", error),
        }
    }
}

impl Error for LoadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LoadError::Resource(error) => Some(error),
            LoadError::Schema(error) => Some(error),
            LoadError::UnsupportedFormat(error) => Some(error),
            LoadError::Json(error) => Some(error),
            LoadError::Container(error) => Some(error),
        }
    }
}

impl From<ResourceError> for LoadError {
    fn from(value: ResourceError) -> Self {
        Self::Resource(value)
    }
}

impl From<SchemaError> for LoadError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}

impl From<UnsupportedFormatError> for LoadError {
    fn from(value: UnsupportedFormatError) -> Self {
        Self::UnsupportedFormat(value)
    }
}

impl From<serde_json::Error> for LoadError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<gltf::Error> for LoadError {
    fn from(value: gltf::Error) -> Self {
        Self::Container(value)
    }
}

pub type LoadResult<T> = Result<T, LoadError>;
