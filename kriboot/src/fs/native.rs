use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use super::{path::normalize, ErrorCode, FileKind, FileSystem, FsError, FsResult, Stats};

/// Passthrough to the host filesystem below `root`.
pub struct NativeFileSystem {
    root: PathBuf,
}
impl NativeFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self { NativeFileSystem { root: root.into() } }

    /// Backend for an "fs" volume, whose data is a NUL-padded host directory path.
    pub fn from_volume_data(data: &[u8]) -> FsResult<Self> {
        let root = std::str::from_utf8(data)
            .map_err(|_| {
                FsError::with_message(ErrorCode::EINVAL, "/", "volume path is not valid utf-8")
            })?
            .trim_end_matches('\0')
            .trim();
        if root.is_empty() {
            return Err(FsError::with_message(ErrorCode::EINVAL, "/", "empty volume path"));
        }
        if !Path::new(root).is_dir() {
            return Err(FsError::new(ErrorCode::ENOTDIR, root));
        }
        Ok(NativeFileSystem::new(root))
    }

    pub fn root(&self) -> &Path { &self.root }

    fn host(&self, path: &str) -> PathBuf {
        let path = normalize(path);
        let mut host = self.root.clone();
        host.extend(path.split('/').filter(|segment| !segment.is_empty()));
        host
    }
}

fn stats(meta: &fs::Metadata) -> Stats {
    let kind = if meta.file_type().is_symlink() {
        FileKind::Symlink
    } else if meta.is_dir() {
        FileKind::Directory
    } else {
        FileKind::File
    };
    #[cfg(unix)]
    let mode = {
        use std::os::unix::fs::MetadataExt;
        meta.mode()
    };
    #[cfg(not(unix))]
    let mode = match kind {
        FileKind::Directory => 0o040755,
        FileKind::Symlink => 0o120777,
        FileKind::File if meta.permissions().readonly() => 0o100444,
        FileKind::File => 0o100644,
    };
    Stats {
        kind,
        size: if kind == FileKind::Directory { 0 } else { meta.len() },
        mode,
        modified: meta.modified().ok(),
    }
}

impl FileSystem for NativeFileSystem {
    fn name(&self) -> &'static str { "native" }

    fn is_read_only(&self) -> bool { false }

    fn stat(&self, path: &str) -> FsResult<Stats> {
        fs::metadata(self.host(path))
            .map(|meta| stats(&meta))
            .map_err(|e| FsError::from_io(e, path))
    }

    fn lstat(&self, path: &str) -> FsResult<Stats> {
        fs::symlink_metadata(self.host(path))
            .map(|meta| stats(&meta))
            .map_err(|e| FsError::from_io(e, path))
    }

    fn read_file(&self, path: &str) -> FsResult<Vec<u8>> {
        fs::read(self.host(path)).map_err(|e| FsError::from_io(e, path))
    }

    fn write_file(&self, path: &str, data: &[u8]) -> FsResult<()> {
        fs::write(self.host(path), data).map_err(|e| FsError::from_io(e, path))
    }

    fn append_file(&self, path: &str, data: &[u8]) -> FsResult<()> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.host(path))
            .and_then(|mut file| file.write_all(data))
            .map_err(|e| FsError::from_io(e, path))
    }

    fn read_dir(&self, path: &str) -> FsResult<Vec<String>> {
        let mut names = fs::read_dir(self.host(path))
            .map_err(|e| FsError::from_io(e, path))?
            .map(|entry| {
                entry
                    .map(|entry| entry.file_name().to_string_lossy().into_owned())
                    .map_err(|e| FsError::from_io(e, path))
            })
            .collect::<FsResult<Vec<_>>>()?;
        names.sort();
        Ok(names)
    }

    fn mkdir(&self, path: &str) -> FsResult<()> {
        fs::create_dir(self.host(path)).map_err(|e| FsError::from_io(e, path))
    }

    fn rmdir(&self, path: &str) -> FsResult<()> {
        fs::remove_dir(self.host(path)).map_err(|e| FsError::from_io(e, path))
    }

    fn unlink(&self, path: &str) -> FsResult<()> {
        let host = self.host(path);
        if host.is_dir() && !host.is_symlink() {
            return Err(FsError::new(ErrorCode::EISDIR, path));
        }
        fs::remove_file(host).map_err(|e| FsError::from_io(e, path))
    }

    fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        fs::rename(self.host(from), self.host(to)).map_err(|e| FsError::from_io(e, from))
    }

    fn copy_file(&self, from: &str, to: &str) -> FsResult<()> {
        fs::copy(self.host(from), self.host(to))
            .map(|_| ())
            .map_err(|e| FsError::from_io(e, from))
    }

    fn symlink(&self, target: &str, path: &str) -> FsResult<()> {
        let link = self.host(path);
        #[cfg(unix)]
        let result = std::os::unix::fs::symlink(target, link);
        #[cfg(windows)]
        let result = std::os::windows::fs::symlink_file(target, link);
        #[cfg(not(any(unix, windows)))]
        let result: std::io::Result<()> = {
            let _ = (target, link);
            Err(std::io::ErrorKind::Unsupported.into())
        };
        result.map_err(|e| FsError::from_io(e, path))
    }

    fn read_link(&self, path: &str) -> FsResult<String> {
        fs::read_link(self.host(path))
            .map(|target| target.to_string_lossy().into_owned())
            .map_err(|e| FsError::from_io(e, path))
    }

    fn realpath(&self, path: &str) -> FsResult<String> {
        let root = fs::canonicalize(&self.root).map_err(|e| FsError::from_io(e, "/"))?;
        let real = fs::canonicalize(self.host(path)).map_err(|e| FsError::from_io(e, path))?;
        let relative = real
            .strip_prefix(&root)
            .map_err(|_| FsError::with_message(ErrorCode::EACCES, path, "resolves outside of the volume"))?;
        Ok(normalize(&relative.to_string_lossy()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> (tempfile::TempDir, NativeFileSystem) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("lib/a.js"), "exports.a = 1;\n").unwrap();
        let native = NativeFileSystem::new(dir.path());
        (dir, native)
    }

    #[test]
    fn rebases_paths_below_root() {
        let (_dir, fs) = scratch();
        assert_eq!(fs.read_to_string("/lib/a.js").unwrap(), "exports.a = 1;\n");
        assert_eq!(fs.read_to_string("/../../lib/a.js").unwrap(), "exports.a = 1;\n");
        assert!(fs.stat("/lib").unwrap().is_dir());
        assert_eq!(fs.stat("/lib/a.js").unwrap().size, 15);
        assert_eq!(fs.read_dir("/").unwrap(), ["lib"]);
    }

    #[test]
    fn writes_and_removes() {
        let (dir, fs) = scratch();
        fs.mkdir("/out").unwrap();
        fs.write_file("/out/x.txt", b"one").unwrap();
        fs.append_file("/out/x.txt", b" two").unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("out/x.txt")).unwrap(), "one two");
        fs.rename("/out/x.txt", "/out/y.txt").unwrap();
        fs.copy_file("/out/y.txt", "/out/z.txt").unwrap();
        assert_eq!(fs.read_dir("/out").unwrap(), ["y.txt", "z.txt"]);
        assert_eq!(fs.rmdir("/out").unwrap_err().code, ErrorCode::ENOTEMPTY);
        assert_eq!(fs.unlink("/out").unwrap_err().code, ErrorCode::EISDIR);
        fs.unlink("/out/y.txt").unwrap();
        fs.unlink("/out/z.txt").unwrap();
        fs.rmdir("/out").unwrap();
        assert_eq!(fs.stat("/out").unwrap_err().code, ErrorCode::ENOENT);
    }

    #[cfg(unix)]
    #[test]
    fn follows_links_inside_root() {
        let (_dir, fs) = scratch();
        fs.symlink("lib/a.js", "/link.js").unwrap();
        assert!(fs.lstat("/link.js").unwrap().is_symlink());
        assert!(fs.stat("/link.js").unwrap().is_file());
        assert_eq!(fs.read_link("/link.js").unwrap(), "lib/a.js");
        assert_eq!(fs.realpath("/link.js").unwrap(), "/lib/a.js");
    }

    #[test]
    fn reads_volume_data() {
        let (dir, _) = scratch();
        let mut data = dir.path().to_string_lossy().into_owned().into_bytes();
        data.extend_from_slice(&[0; 64]);
        let fs = NativeFileSystem::from_volume_data(&data).unwrap();
        assert_eq!(fs.root(), dir.path());
        let missing = dir.path().join("missing").to_string_lossy().into_owned();
        assert_eq!(
            NativeFileSystem::from_volume_data(missing.as_bytes()).err().unwrap().code,
            ErrorCode::ENOTDIR
        );
        assert_eq!(
            NativeFileSystem::from_volume_data(&[0; 128]).err().unwrap().code,
            ErrorCode::EINVAL
        );
    }
}
