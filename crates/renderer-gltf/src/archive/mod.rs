//! Bundles that carry a model document together with its buffers and
//! images, so a whole asset can be fetched from one file.

use std::{
    error::Error,
    io::{Read, Seek},
    path::Path,
};

#[cfg(feature = "zip")]
pub mod zip;

pub trait Entry<'a> {
    type Error: Error;

    fn unpack(&mut self) -> Result<Vec<u8>, Self::Error>;
}

pub trait Archive<T>: Sized {
    type Error: Error;
    type Entry<'a>: Entry<'a, Error = Self::Error>
    where
        Self: 'a;

    fn open(stream: T) -> Result<Self, Self::Error>
    where
        T: Read + Seek;

    /// Find an entry by its path inside the bundle. Missing entries are
    /// `Ok(None)`.
    fn by_path<P: AsRef<Path>>(&mut self, path: P) -> Result<Option<Self::Entry<'_>>, Self::Error>;
}
