use std::{
    collections::BTreeMap,
    io::{Cursor, Read},
    sync::Mutex,
};

use zip::ZipArchive;

use super::{
    path::{normalize, parent},
    ErrorCode, FileSystem, FsError, FsResult, Stats,
};

enum Entry {
    Directory,
    File { index: usize, size: u64, mode: u32 },
}

/// Read-only filesystem over the bytes of a zip archive.
///
/// Entries are indexed once on construction, directories that only exist
/// implicitly as prefixes of file names are indexed as well.
pub struct ZipFileSystem {
    archive: Mutex<ZipArchive<Cursor<Vec<u8>>>>,
    entries: BTreeMap<String, Entry>,
}
impl ZipFileSystem {
    pub fn new(data: Vec<u8>) -> FsResult<Self> {
        let mut archive = ZipArchive::new(Cursor::new(data)).map_err(|e| {
            FsError::with_message(ErrorCode::EINVAL, "/", format!("invalid zip archive: {}", e))
        })?;
        let mut entries = BTreeMap::new();
        entries.insert("/".to_owned(), Entry::Directory);
        for index in 0..archive.len() {
            let (name, is_dir, size, mode) = {
                let file = archive.by_index(index).map_err(|e| {
                    FsError::with_message(
                        ErrorCode::EIO,
                        "/",
                        format!("couldn't read zip entry {}: {}", index, e),
                    )
                })?;
                (
                    normalize(file.name()),
                    file.is_dir(),
                    file.size(),
                    file.unix_mode().unwrap_or(0o644),
                )
            };
            let mut directory = parent(&name).to_owned();
            while !entries.contains_key(&directory) {
                entries.insert(directory.clone(), Entry::Directory);
                directory = parent(&directory).to_owned();
            }
            let entry = if is_dir {
                Entry::Directory
            } else {
                Entry::File { index, size, mode }
            };
            entries.insert(name, entry);
        }
        Ok(ZipFileSystem {
            archive: Mutex::new(archive),
            entries,
        })
    }

    fn entry(&self, path: &str) -> FsResult<(String, &Entry)> {
        let path = normalize(path);
        match self.entries.get(&path) {
            Some(entry) => Ok((path, entry)),
            None => Err(FsError::new(ErrorCode::ENOENT, &path)),
        }
    }

    fn read_only(&self, path: &str) -> FsResult<()> { Err(FsError::new(ErrorCode::EROFS, path)) }
}
impl FileSystem for ZipFileSystem {
    fn name(&self) -> &'static str { "zip" }

    fn is_read_only(&self) -> bool { true }

    fn stat(&self, path: &str) -> FsResult<Stats> {
        Ok(match self.entry(path)?.1 {
            Entry::Directory => Stats::directory(),
            Entry::File { size, mode, .. } => Stats::file(*size, *mode),
        })
    }

    fn read_file(&self, path: &str) -> FsResult<Vec<u8>> {
        let (path, entry) = self.entry(path)?;
        let (index, size) = match entry {
            Entry::Directory => return Err(FsError::new(ErrorCode::EISDIR, &path)),
            Entry::File { index, size, .. } => (*index, *size),
        };
        let mut archive = self
            .archive
            .lock()
            .map_err(|_| FsError::with_message(ErrorCode::EIO, &path, "zip archive lock poisoned"))?;
        let mut file = archive
            .by_index(index)
            .map_err(|e| FsError::with_message(ErrorCode::EIO, &path, e.to_string()))?;
        let mut data = Vec::with_capacity(size as usize);
        file.read_to_end(&mut data)
            .map_err(|e| FsError::from_io(e, &path))?;
        Ok(data)
    }

    fn write_file(&self, path: &str, _: &[u8]) -> FsResult<()> { self.read_only(path) }

    fn append_file(&self, path: &str, _: &[u8]) -> FsResult<()> { self.read_only(path) }

    fn read_dir(&self, path: &str) -> FsResult<Vec<String>> {
        let (path, entry) = self.entry(path)?;
        if let Entry::File { .. } = entry {
            return Err(FsError::new(ErrorCode::ENOTDIR, &path));
        }
        let prefix = if path == "/" { path } else { format!("{}/", path) };
        Ok(self
            .entries
            .range(prefix.clone()..)
            .map(|(name, _)| name)
            .take_while(|name| name.starts_with(&prefix))
            .filter_map(|name| {
                let rest = &name[prefix.len()..];
                (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_owned())
            })
            .collect())
    }

    fn mkdir(&self, path: &str) -> FsResult<()> { self.read_only(path) }

    fn rmdir(&self, path: &str) -> FsResult<()> { self.read_only(path) }

    fn unlink(&self, path: &str) -> FsResult<()> { self.read_only(path) }

    fn rename(&self, from: &str, _: &str) -> FsResult<()> { self.read_only(from) }

    fn copy_file(&self, _: &str, to: &str) -> FsResult<()> { self.read_only(to) }

    fn symlink(&self, _: &str, path: &str) -> FsResult<()> { self.read_only(path) }

    fn read_link(&self, path: &str) -> FsResult<String> {
        let (path, _) = self.entry(path)?;
        Err(FsError::new(ErrorCode::EINVAL, &path))
    }

    fn realpath(&self, path: &str) -> FsResult<String> { Ok(self.entry(path)?.0) }
}
