//! Filesystem backends and the mount layer that composes them.

use std::time::SystemTime;

mod backend;
mod error;
mod mountable;
mod native;
pub mod path;
mod zipfs;

pub use backend::BackendKind;
pub use error::{ErrorCode, FsError, FsResult};
pub use mountable::{mount_volumes, MountableFileSystem, Mounted, MountedVolume};
pub use native::NativeFileSystem;
pub use zipfs::ZipFileSystem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
    Symlink,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    pub kind:     FileKind,
    pub size:     u64,
    pub mode:     u32,
    pub modified: Option<SystemTime>,
}
impl Stats {
    pub fn directory() -> Self {
        Stats {
            kind:     FileKind::Directory,
            size:     0,
            mode:     0o040755,
            modified: None,
        }
    }

    pub fn file(size: u64, permissions: u32) -> Self {
        Stats {
            kind: FileKind::File,
            size,
            mode: 0o100000 | (permissions & 0o7777),
            modified: None,
        }
    }

    pub fn is_file(&self) -> bool { self.kind == FileKind::File }

    pub fn is_dir(&self) -> bool { self.kind == FileKind::Directory }

    pub fn is_symlink(&self) -> bool { self.kind == FileKind::Symlink }
}

/// The filesystem surface shared by every backend and by the composed filesystem.
///
/// Paths are absolute `/`-separated strings relative to the backend root.
pub trait FileSystem: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_read_only(&self) -> bool;

    fn stat(&self, path: &str) -> FsResult<Stats>;

    fn lstat(&self, path: &str) -> FsResult<Stats> { self.stat(path) }

    fn exists(&self, path: &str) -> bool { self.stat(path).is_ok() }

    fn read_file(&self, path: &str) -> FsResult<Vec<u8>>;

    fn read_to_string(&self, path: &str) -> FsResult<String> {
        String::from_utf8(self.read_file(path)?)
            .map_err(|_| FsError::with_message(ErrorCode::EINVAL, path, "file is not valid utf-8"))
    }

    fn write_file(&self, path: &str, data: &[u8]) -> FsResult<()>;

    fn append_file(&self, path: &str, data: &[u8]) -> FsResult<()>;

    /// Names of the entries of a directory, sorted.
    fn read_dir(&self, path: &str) -> FsResult<Vec<String>>;

    fn mkdir(&self, path: &str) -> FsResult<()>;

    fn rmdir(&self, path: &str) -> FsResult<()>;

    fn unlink(&self, path: &str) -> FsResult<()>;

    fn rename(&self, from: &str, to: &str) -> FsResult<()>;

    fn copy_file(&self, from: &str, to: &str) -> FsResult<()> {
        let data = self.read_file(from)?;
        self.write_file(to, &data)
    }

    fn symlink(&self, target: &str, path: &str) -> FsResult<()>;

    fn read_link(&self, path: &str) -> FsResult<String>;

    fn realpath(&self, path: &str) -> FsResult<String>;
}
