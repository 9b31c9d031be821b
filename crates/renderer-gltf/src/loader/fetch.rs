use std::{
    collections::HashMap,
    future::Future,
    io,
    marker::PhantomData,
    path::{Component, Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use crate::archive::{Archive, Entry};

/// Source of the bytes behind buffer and image URIs.
///
/// `Ok(None)` means the resource does not exist; `Err` means it may exist
/// but could not be read.
pub trait ResourceFetcher: Send + Sync {
    fn fetch(&self, path: &Path) -> impl Future<Output = io::Result<Option<Vec<u8>>>> + Send;
}

fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}

/// Reads resources from the local file system, relative to a root directory.
#[cfg(feature = "fs")]
#[derive(Debug, Clone)]
pub struct FileFetcher {
    root: PathBuf,
}

#[cfg(feature = "fs")]
impl FileFetcher {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(feature = "fs")]
impl ResourceFetcher for FileFetcher {
    async fn fetch(&self, path: &Path) -> io::Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.root.join(path)).await {
            Ok(data) => Ok(Some(data)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error),
        }
    }
}

/// Resources kept in memory, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    entries: HashMap<PathBuf, Vec<u8>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<P: AsRef<Path>>(&mut self, path: P, data: Vec<u8>) {
        self.entries.insert(normalize(path.as_ref()), data);
    }

    pub fn with<P: AsRef<Path>>(mut self, path: P, data: Vec<u8>) -> Self {
        self.insert(path, data);
        self
    }
}

impl ResourceFetcher for MemoryFetcher {
    async fn fetch(&self, path: &Path) -> io::Result<Option<Vec<u8>>> {
        Ok(self.entries.get(&normalize(path)).cloned())
    }
}

/// Resources packed into one archive file, such as a zip bundle.
pub struct ArchiveFetcher<T, A> {
    archive: Mutex<A>,
    _stream: PhantomData<fn() -> T>,
}

impl<T, A: Archive<T>> ArchiveFetcher<T, A> {
    pub fn new(archive: A) -> Self {
        Self {
            archive: Mutex::new(archive),
            _stream: PhantomData,
        }
    }
}

impl<T, A> ResourceFetcher for ArchiveFetcher<T, A>
where
    A: Archive<T> + Send,
    A::Error: Send + Sync + 'static,
{
    async fn fetch(&self, path: &Path) -> io::Result<Option<Vec<u8>>> {
        let mut archive = self.archive.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(mut entry) = archive.by_path(normalize(path)).map_err(io::Error::other)? else {
            return Ok(None);
        };
        let data = entry.unpack().map_err(io::Error::other)?;
        Ok(Some(data))
    }
}

#[cfg(test)]
mod test {
    use std::path::Path;

    use super::{MemoryFetcher, ResourceFetcher};

    #[test]
    fn memory_fetcher_normalizes_paths() {
        let fetcher = MemoryFetcher::new().with("./models/buffer.bin", vec![1, 2, 3]);
        let data = pollster::block_on(fetcher.fetch(Path::new("models/./buffer.bin"))).unwrap();
        assert_eq!(data, Some(vec![1, 2, 3]));
        let missing = pollster::block_on(fetcher.fetch(Path::new("other.bin"))).unwrap();
        assert_eq!(missing, None);
    }
}
