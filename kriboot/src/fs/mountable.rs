use std::{collections::BTreeMap, sync::Arc};

use super::{
    path::{join, normalize, parent, strip_mount},
    BackendKind, ErrorCode, FileSystem, FsError, FsResult, Stats,
};
use crate::{eof::Volume, Result};

type Backend = Arc<dyn FileSystem>;

/// A path resolved to the backend owning it.
struct Located<'a> {
    path:     String,
    mount:    &'a str,
    backend:  &'a Backend,
    relative: String,
}

/// Backends composed into one namespace by mount point.
///
/// The longest mount point containing a path owns it, matched per segment.
/// Paths outside every mount point go to the optional root backend.
#[derive(Default)]
pub struct MountableFileSystem {
    root:   Option<Backend>,
    mounts: Vec<(String, Backend)>,
}
impl MountableFileSystem {
    pub fn new(root: Option<Backend>) -> Self {
        MountableFileSystem {
            root,
            mounts: Vec::new(),
        }
    }

    pub fn mount(&mut self, point: &str, fs: Backend) -> FsResult<()> {
        let point = normalize(point);
        if self.mounts.iter().any(|(mounted, _)| *mounted == point) {
            return Err(FsError::with_message(ErrorCode::EINVAL, &point, "mount point already in use"));
        }
        self.mounts.push((point, fs));
        self.mounts.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        Ok(())
    }

    pub fn umount(&mut self, point: &str) -> FsResult<Backend> {
        let point = normalize(point);
        match self.mounts.iter().position(|(mounted, _)| *mounted == point) {
            Some(index) => Ok(self.mounts.remove(index).1),
            None => Err(FsError::with_message(ErrorCode::EINVAL, &point, "not mounted")),
        }
    }

    /// Mount points, longest first.
    pub fn mount_points(&self) -> impl Iterator<Item = &str> { self.mounts.iter().map(|(point, _)| point.as_str()) }

    /// The same mounts over a different root backend.
    pub fn over(&self, root: Backend) -> Self {
        MountableFileSystem {
            root:   Some(root),
            mounts: self.mounts.clone(),
        }
    }

    /// Whether `path` is owned by a mounted backend rather than the root.
    pub fn is_mounted(&self, path: &str) -> bool {
        let path = normalize(path);
        self.mounts.iter().any(|(point, _)| strip_mount(&path, point).is_some())
    }

    fn locate(&self, path: &str) -> Option<Located<'_>> {
        let path = normalize(path);
        for (point, backend) in &self.mounts {
            if let Some(relative) = strip_mount(&path, point) {
                let relative = relative.to_owned();
                return Some(Located {
                    path,
                    mount: point,
                    backend,
                    relative,
                });
            }
        }
        self.root.as_ref().map(|backend| Located {
            relative: path.clone(),
            path,
            mount: "/",
            backend,
        })
    }

    fn owner(&self, path: &str) -> FsResult<Located<'_>> {
        self.locate(path)
            .ok_or_else(|| FsError::new(ErrorCode::ENOENT, &normalize(path)))
    }

    /// Names of mount points directly below `path` that the backends may not know about.
    fn mounted_children(&self, path: &str) -> Vec<String> {
        self.mounts
            .iter()
            .filter_map(|(point, _)| {
                let rest = strip_mount(point, path)?;
                let child = rest.trim_start_matches('/').split('/').next()?;
                (!child.is_empty()).then(|| child.to_owned())
            })
            .collect()
    }

    fn rebase<T>(result: FsResult<T>, path: &str) -> FsResult<T> { result.map_err(|e| e.with_path(path)) }

    fn stat_with(&self, path: &str, stat: impl Fn(&Backend, &str) -> FsResult<Stats>) -> FsResult<Stats> {
        let path = normalize(path);
        let result = match self.locate(&path) {
            Some(located) => Self::rebase(stat(located.backend, &located.relative), &path),
            None => Err(FsError::new(ErrorCode::ENOENT, &path)),
        };
        match result {
            Err(e) if e.code == ErrorCode::ENOENT && !self.mounted_children(&path).is_empty() => {
                Ok(Stats::directory())
            }
            result => result,
        }
    }

    /// Moves or copies across backends by reading then writing.
    fn transfer(&self, from: &str, to: &str, remove: bool) -> FsResult<()> {
        let source = self.owner(from)?;
        let target = self.owner(to)?;
        if Arc::ptr_eq(source.backend, target.backend) {
            let result = if remove {
                source.backend.rename(&source.relative, &target.relative)
            } else {
                source.backend.copy_file(&source.relative, &target.relative)
            };
            return result.map_err(|e| {
                let path = if e.path == target.relative { &target.path } else { &source.path };
                e.with_path(path)
            });
        }
        if source.backend.stat(&source.relative).map_err(|e| e.with_path(&source.path))?.is_dir() {
            return Err(FsError::with_message(
                ErrorCode::ENOTSUP,
                &source.path,
                "cannot move a directory across mount points",
            ));
        }
        let data = Self::rebase(source.backend.read_file(&source.relative), &source.path)?;
        Self::rebase(target.backend.write_file(&target.relative, &data), &target.path)?;
        if remove {
            Self::rebase(source.backend.unlink(&source.relative), &source.path)?;
        }
        Ok(())
    }
}

/// Relative link text from the directory `from` to `to`, both backend paths.
fn relative_link(from: &str, to: &str) -> String {
    let from: Vec<_> = from.split('/').filter(|s| !s.is_empty()).collect();
    let to: Vec<_> = to.split('/').filter(|s| !s.is_empty()).collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();
    let mut segments = vec![".."; from.len() - common];
    segments.extend(&to[common..]);
    if segments.is_empty() {
        ".".to_owned()
    } else {
        segments.join("/")
    }
}

impl FileSystem for MountableFileSystem {
    fn name(&self) -> &'static str { "mountable" }

    fn is_read_only(&self) -> bool {
        self.mounts.iter().all(|(_, fs)| fs.is_read_only())
            && self.root.as_ref().map_or(true, |fs| fs.is_read_only())
    }

    fn stat(&self, path: &str) -> FsResult<Stats> { self.stat_with(path, |fs, path| fs.stat(path)) }

    fn lstat(&self, path: &str) -> FsResult<Stats> { self.stat_with(path, |fs, path| fs.lstat(path)) }

    fn read_file(&self, path: &str) -> FsResult<Vec<u8>> {
        let located = self.owner(path)?;
        Self::rebase(located.backend.read_file(&located.relative), &located.path)
    }

    fn write_file(&self, path: &str, data: &[u8]) -> FsResult<()> {
        let located = self.owner(path)?;
        Self::rebase(located.backend.write_file(&located.relative, data), &located.path)
    }

    fn append_file(&self, path: &str, data: &[u8]) -> FsResult<()> {
        let located = self.owner(path)?;
        Self::rebase(located.backend.append_file(&located.relative, data), &located.path)
    }

    fn read_dir(&self, path: &str) -> FsResult<Vec<String>> {
        let path = normalize(path);
        let children = self.mounted_children(&path);
        let listed = match self.locate(&path) {
            Some(located) => Self::rebase(located.backend.read_dir(&located.relative), &path),
            None => Err(FsError::new(ErrorCode::ENOENT, &path)),
        };
        let mut names = match listed {
            Ok(names) => names,
            Err(e) if e.code == ErrorCode::ENOENT && !children.is_empty() => Vec::new(),
            Err(e) => return Err(e),
        };
        names.extend(children);
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn mkdir(&self, path: &str) -> FsResult<()> {
        let located = self.owner(path)?;
        Self::rebase(located.backend.mkdir(&located.relative), &located.path)
    }

    fn rmdir(&self, path: &str) -> FsResult<()> {
        let located = self.owner(path)?;
        if located.relative == "/" && located.mount != "/" {
            return Err(FsError::with_message(ErrorCode::EPERM, &located.path, "cannot remove a mount point"));
        }
        Self::rebase(located.backend.rmdir(&located.relative), &located.path)
    }

    fn unlink(&self, path: &str) -> FsResult<()> {
        let located = self.owner(path)?;
        Self::rebase(located.backend.unlink(&located.relative), &located.path)
    }

    fn rename(&self, from: &str, to: &str) -> FsResult<()> { self.transfer(from, to, true) }

    fn copy_file(&self, from: &str, to: &str) -> FsResult<()> { self.transfer(from, to, false) }

    fn symlink(&self, target: &str, path: &str) -> FsResult<()> {
        let link = self.owner(path)?;
        if !target.starts_with('/') {
            return Self::rebase(link.backend.symlink(target, &link.relative), &link.path);
        }
        let target = self.owner(target)?;
        if !Arc::ptr_eq(target.backend, link.backend) {
            return Err(FsError::with_message(
                ErrorCode::ENOTSUP,
                &link.path,
                format!("cannot link to '{}' across mount points", target.path),
            ));
        }
        let text = relative_link(parent(&link.relative), &target.relative);
        Self::rebase(link.backend.symlink(&text, &link.relative), &link.path)
    }

    fn read_link(&self, path: &str) -> FsResult<String> {
        let located = self.owner(path)?;
        Self::rebase(located.backend.read_link(&located.relative), &located.path)
    }

    fn realpath(&self, path: &str) -> FsResult<String> {
        let path = normalize(path);
        match self.locate(&path) {
            Some(located) => {
                let real = Self::rebase(located.backend.realpath(&located.relative), &path)?;
                Ok(join(located.mount, &real))
            }
            None if !self.mounted_children(&path).is_empty() => Ok(path),
            None => Err(FsError::new(ErrorCode::ENOENT, &path)),
        }
    }
}

/// A volume as it appears once mounted, without its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountedVolume {
    pub kind:    BackendKind,
    pub name:    String,
    pub mapping: String,
    pub index:   String,
    pub size:    usize,
    pub startup: bool,
}
impl MountedVolume {
    pub fn entry_path(&self) -> String { join(&self.name, &self.index) }
}

/// The composed filesystem together with the module mapping index.
pub struct Mounted {
    pub fs:       MountableFileSystem,
    /// Mapping alias to mount point
    pub mappings: BTreeMap<String, String>,
    pub volumes:  Vec<MountedVolume>,
}

/// Mounts every volume on a fresh filesystem over `root`.
///
/// Backends are constructed eagerly, an unknown type fails here rather
/// than on first access.
pub fn mount_volumes(volumes: Vec<Volume>, root: Option<Backend>) -> Result<Mounted> {
    let mut fs = MountableFileSystem::new(root);
    let mut mappings = BTreeMap::new();
    let mut mounted = Vec::with_capacity(volumes.len());
    for volume in volumes {
        let kind: BackendKind = volume.kind.parse()?;
        let size = volume.data.len();
        let backend = kind.create(volume.data)?;
        fs.mount(&volume.name, backend)?;
        if !volume.mapping.is_empty() {
            mappings.insert(volume.mapping.clone(), normalize(&volume.name));
        }
        #[cfg(debug_assertions)]
        eprintln!("mounted {} volume {} ({} bytes)", kind, volume.name, size);
        mounted.push(MountedVolume {
            kind,
            name: normalize(&volume.name),
            mapping: volume.mapping,
            index: volume.index,
            size,
            startup: volume.startup,
        });
    }
    Ok(Mounted {
        fs,
        mappings,
        volumes: mounted,
    })
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use zip::{write::SimpleFileOptions, ZipWriter};

    use super::*;
    use crate::{fs::NativeFileSystem, fs::ZipFileSystem, Error};

    fn archive(files: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in files {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn zip(files: &[(&str, &str)]) -> Backend { Arc::new(ZipFileSystem::new(archive(files)).unwrap()) }

    fn nested() -> MountableFileSystem {
        let mut fs = MountableFileSystem::new(None);
        fs.mount("/app", zip(&[("index.js", "app"), ("vendor/shadowed.js", "app")]))
            .unwrap();
        fs.mount("app/vendor/", zip(&[("lib.js", "vendor")])).unwrap();
        fs
    }

    #[test]
    fn longest_mount_point_wins() {
        let fs = nested();
        assert_eq!(fs.read_to_string("/app/index.js").unwrap(), "app");
        assert_eq!(fs.read_to_string("/app/vendor/lib.js").unwrap(), "vendor");
        assert_eq!(
            fs.read_file("/app/vendor/shadowed.js").unwrap_err().code,
            ErrorCode::ENOENT
        );
        assert_eq!(fs.mount_points().collect::<Vec<_>>(), ["/app/vendor", "/app"]);
    }

    #[test]
    fn matches_whole_segments() {
        let fs = nested();
        let err = fs.read_file("/application/index.js").unwrap_err();
        assert_eq!(err.code, ErrorCode::ENOENT);
        assert!(fs.is_mounted("/app"));
        assert!(!fs.is_mounted("/application"));
    }

    #[test]
    fn reports_virtual_paths_in_errors() {
        let fs = nested();
        let err = fs.read_file("/app/vendor/missing.js").unwrap_err();
        assert_eq!(err.path, "/app/vendor/missing.js");
        assert_eq!(fs.stat("/app/index.js/x").unwrap_err().path, "/app/index.js/x");
    }

    #[test]
    fn synthesizes_parent_directories() {
        let mut fs = MountableFileSystem::new(None);
        fs.mount("/srv/app", zip(&[("index.js", "x")])).unwrap();
        assert!(fs.stat("/").unwrap().is_dir());
        assert!(fs.stat("/srv").unwrap().is_dir());
        assert_eq!(fs.read_dir("/").unwrap(), ["srv"]);
        assert_eq!(fs.read_dir("/srv").unwrap(), ["app"]);
        assert_eq!(fs.read_dir("/srv/app").unwrap(), ["index.js"]);
        assert_eq!(fs.realpath("/srv/app/index.js").unwrap(), "/srv/app/index.js");
        assert_eq!(fs.stat("/var").unwrap_err().code, ErrorCode::ENOENT);
    }

    #[test]
    fn lists_mount_points_with_backend_entries() {
        let fs = nested();
        assert_eq!(fs.read_dir("/app").unwrap(), ["index.js", "vendor"]);
    }

    #[test]
    fn falls_back_to_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("host.txt"), "host").unwrap();
        let mut fs = MountableFileSystem::new(Some(Arc::new(NativeFileSystem::new(dir.path()))));
        fs.mount("/app", zip(&[("index.js", "app")])).unwrap();
        assert_eq!(fs.read_to_string("/host.txt").unwrap(), "host");
        assert_eq!(fs.read_dir("/").unwrap(), ["app", "host.txt"]);
        assert!(!fs.is_read_only());

        fs.copy_file("/app/index.js", "/copied.js").unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("copied.js")).unwrap(), "app");
        assert_eq!(
            fs.rename("/copied.js", "/app/moved.js").unwrap_err().code,
            ErrorCode::EROFS
        );
        fs.rename("/copied.js", "/moved.js").unwrap();
        assert!(fs.exists("/moved.js"));
        assert!(!fs.exists("/copied.js"));
    }

    #[test]
    fn mounts_and_unmounts() {
        let mut fs = nested();
        let err = fs.mount("/app", zip(&[])).unwrap_err();
        assert_eq!(err.code, ErrorCode::EINVAL);
        fs.umount("/app/vendor").unwrap();
        assert_eq!(fs.read_to_string("/app/vendor/shadowed.js").unwrap(), "app");
        assert_eq!(fs.umount("/app/vendor").err().unwrap().code, ErrorCode::EINVAL);
        assert_eq!(fs.rmdir("/app").unwrap_err().code, ErrorCode::EPERM);
    }

    #[test]
    fn computes_relative_links() {
        assert_eq!(relative_link("/", "/lib/a.js"), "lib/a.js");
        assert_eq!(relative_link("/bin", "/lib/a.js"), "../lib/a.js");
        assert_eq!(relative_link("/lib", "/lib"), ".");
    }

    #[test]
    fn mounts_volumes_with_mappings() {
        let volume = |name: &str, mapping: &str| Volume {
            kind:    "zip".into(),
            name:    name.into(),
            mapping: mapping.into(),
            index:   "index.js".into(),
            data:    archive(&[("index.js", name)]),
            startup: name == "/app",
        };
        let mounted = mount_volumes(vec![volume("/app", ""), volume("/lodash", "lodash")], None).unwrap();
        assert_eq!(mounted.mappings.get("lodash").map(String::as_str), Some("/lodash"));
        assert_eq!(mounted.mappings.len(), 1);
        assert_eq!(mounted.volumes[0].entry_path(), "/app/index.js");
        assert!(mounted.volumes[0].startup);
        assert_eq!(mounted.fs.read_to_string("/lodash/index.js").unwrap(), "/lodash");

        let mut unknown = volume("/x", "");
        unknown.kind = "squashfs".into();
        assert!(matches!(
            mount_volumes(vec![unknown], None),
            Err(Error::UnsupportedBackend(kind)) if kind == "squashfs"
        ));
    }
}
