use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    io,
    path::Path,
};

use base64::{engine::general_purpose::STANDARD, Engine};

use super::fetch::ResourceFetcher;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemeError {
    Unsupported,
    BadDataUri,
}

impl Display for SchemeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SchemeError::Unsupported => write!(f, "Unsupported scheme"),
            SchemeError::BadDataUri => write!(f, "Bad data URI"),
        }
    }
}

impl Error for SchemeError {}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Scheme<'a> {
    // Data uri with optional mime type
    Data(Option<&'a str>, Vec<u8>),
    // Relative to the document
    Relative(&'a str),
    // Absolute path
    Absolute(&'a str),
}

fn strip_prefix_ignore_case<'a>(uri: &'a str, prefix: &str) -> Option<&'a str> {
    let head = uri.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&uri[prefix.len()..])
    } else {
        None
    }
}

impl<'a> TryFrom<&'a str> for Scheme<'a> {
    type Error = SchemeError;

    fn try_from(uri: &'a str) -> Result<Self, Self::Error> {
        if let Some(content) = strip_prefix_ignore_case(uri, "data:") {
            // Data URI: rfc2397
            let Some((param, value)) = content.split_once(',') else {
                return Err(SchemeError::BadDataUri);
            };
            if let Some((mime, encoding)) = param.split_once(';') {
                if !encoding.eq_ignore_ascii_case("base64") {
                    return Err(SchemeError::BadDataUri);
                }
                let data = STANDARD
                    .decode(value)
                    .map_err(|_| SchemeError::BadDataUri)?;
                let mime = Some(mime).filter(|mime| !mime.is_empty());
                Ok(Scheme::Data(mime, data))
            } else {
                // The standard default is text/plain;charset=US-ASCII, which
                // never describes a buffer or image, so let the content decide.
                Ok(Scheme::Data(None, Vec::from(value.as_bytes())))
            }
        } else if let Some(path) = strip_prefix_ignore_case(uri, "file://") {
            Ok(Scheme::Absolute(path))
        } else if let Some(path) = strip_prefix_ignore_case(uri, "file:") {
            Ok(Scheme::Absolute(path))
        } else if uri.contains(':') {
            Err(SchemeError::Unsupported)
        } else {
            Ok(Scheme::Relative(uri))
        }
    }
}

impl Scheme<'_> {
    pub(crate) fn mime(&self) -> Option<&str> {
        match self {
            Scheme::Data(mime, _) => *mime,
            _ => None,
        }
    }

    pub(crate) async fn load<F: ResourceFetcher>(
        self,
        fetcher: &F,
        base: &Path,
    ) -> io::Result<Option<Vec<u8>>> {
        match self {
            Scheme::Data(_, data) => Ok(Some(data)),
            Scheme::Relative(path) => fetcher.fetch(&base.join(path)).await,
            Scheme::Absolute(path) => fetcher.fetch(Path::new(path)).await,
        }
    }
}
