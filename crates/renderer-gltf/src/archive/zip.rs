use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    io::{self, Read, Seek},
    path::{Path, PathBuf},
};

use zip::{read::ZipFile, ZipArchive};

use super::{Archive, Entry};

#[derive(Debug)]
pub enum ZipError {
    Zip(zip::result::ZipError),
    BadFileName(PathBuf),
    FileTooLarge(u64),
}

impl Display for ZipError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ZipError::Zip(error) => Display::fmt(error, f),
            ZipError::BadFileName(file_name) => {
                write!(f, "Entry name {} is not valid Unicode", file_name.display())
            }
            ZipError::FileTooLarge(size) => write!(f, "Entry size {} is too large", size),
        }
    }
}

impl Error for ZipError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ZipError::Zip(error) => Some(error),
            _ => None,
        }
    }
}

impl From<zip::result::ZipError> for ZipError {
    fn from(value: zip::result::ZipError) -> Self {
        Self::Zip(value)
    }
}

impl From<io::Error> for ZipError {
    fn from(value: io::Error) -> Self {
        Self::Zip(zip::result::ZipError::Io(value))
    }
}

impl<'a> Entry<'a> for ZipFile<'a> {
    type Error = ZipError;

    fn unpack(&mut self) -> Result<Vec<u8>, Self::Error> {
        let size = self.size();
        let capacity: usize = size.try_into().map_err(|_| ZipError::FileTooLarge(size))?;
        let mut buffer = Vec::with_capacity(capacity);
        self.read_to_end(&mut buffer)?;
        Ok(buffer)
    }
}

impl<T: Read + Seek> Archive<T> for ZipArchive<T> {
    type Error = ZipError;

    type Entry<'a> = ZipFile<'a>
    where
        Self: 'a;

    fn open(stream: T) -> Result<Self, Self::Error> {
        Ok(ZipArchive::new(stream)?)
    }

    fn by_path<P: AsRef<Path>>(&mut self, path: P) -> Result<Option<Self::Entry<'_>>, Self::Error> {
        let path = path.as_ref();
        // Zip entry names always use forward slashes.
        let name = path
            .to_str()
            .ok_or_else(|| ZipError::BadFileName(path.to_path_buf()))?
            .replace('\\', "/");
        match self.by_name(&name) {
            Ok(entry) => Ok(Some(entry)),
            Err(zip::result::ZipError::FileNotFound) => Ok(None),
            Err(error) => Err(error.into()),
        }
    }
}
