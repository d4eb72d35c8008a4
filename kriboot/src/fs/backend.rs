use std::{fmt, str::FromStr, sync::Arc};

use super::{FileSystem, NativeFileSystem, ZipFileSystem};
use crate::{Error, Result};

/// Backend selected by a volume's type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Zip,
    Native,
}
impl BackendKind {
    pub fn tag(self) -> &'static str {
        match self {
            BackendKind::Zip => "zip",
            BackendKind::Native => "fs",
        }
    }

    /// Constructs the backend from the raw data of a volume.
    pub fn create(self, data: Vec<u8>) -> Result<Arc<dyn FileSystem>> {
        Ok(match self {
            BackendKind::Zip => Arc::new(ZipFileSystem::new(data)?),
            BackendKind::Native => Arc::new(NativeFileSystem::from_volume_data(&data)?),
        })
    }
}
impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(tag: &str) -> Result<Self> {
        match tag {
            "zip" => Ok(BackendKind::Zip),
            "fs" => Ok(BackendKind::Native),
            other => Err(Error::UnsupportedBackend(other.to_owned())),
        }
    }
}
impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.tag()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_type_tags() {
        assert_eq!("zip".parse::<BackendKind>().unwrap(), BackendKind::Zip);
        assert_eq!("fs".parse::<BackendKind>().unwrap(), BackendKind::Native);
        assert!(matches!(
            "tar".parse::<BackendKind>(),
            Err(Error::UnsupportedBackend(tag)) if tag == "tar"
        ));
        assert_eq!(BackendKind::Native.to_string(), "fs");
    }

    #[test]
    fn creates_native_backends_from_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        let mut data = dir.path().to_string_lossy().into_owned().into_bytes();
        data.resize(data.len().max(128), 0);
        let fs = BackendKind::Native.create(data).unwrap();
        assert_eq!(fs.name(), "native");
        assert_eq!(fs.read_to_string("/a.txt").unwrap(), "a");
    }

    #[test]
    fn fails_on_broken_archives() {
        assert!(matches!(
            BackendKind::Zip.create(vec![1u8; 128]),
            Err(Error::Fs(_))
        ));
    }
}
