//! The runtime context owning the mounted volumes and the patch state.

use std::{
    collections::BTreeMap,
    env::current_exe,
    fs::read_link,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    eof::{self, Eof},
    fs::{mount_volumes, ErrorCode, FileSystem, FsError, MountableFileSystem, MountedVolume, NativeFileSystem},
    Error, Result,
};

mod event_loop;
mod host;
mod patch;

pub use event_loop::{AsyncFs, EventLoop};
pub use host::{HostRuntime, ModuleStat, ReadModuleJson, ResolveFilename};
use patch::Originals;

#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Host directory serving paths outside every volume, `None` to serve nothing
    pub native_root: Option<PathBuf>,
    /// Extra host directories mounted at the given points
    pub redirects:   Vec<(String, PathBuf)>,
}
impl Default for RuntimeOptions {
    fn default() -> Self {
        RuntimeOptions {
            native_root: Some(PathBuf::from("/")),
            redirects:   Vec::new(),
        }
    }
}

/// A mounted container and the hooks it installs into a [`HostRuntime`].
pub struct Runtime {
    version:   u16,
    main:      String,
    init:      Vec<u8>,
    volumes:   Vec<MountedVolume>,
    fs:        Arc<MountableFileSystem>,
    mappings:  Arc<BTreeMap<String, String>>,
    originals: Option<Originals>,
}
impl Runtime {
    /// Mounts every volume of `eof`, failing on the first backend that cannot be constructed.
    pub fn mount(eof: Eof, options: RuntimeOptions) -> Result<Self> {
        let main = eof.main_path().ok_or(Error::VolumeCountOutOfRange(0))?;
        let root = options
            .native_root
            .map(|root| Arc::new(NativeFileSystem::new(root)) as Arc<dyn FileSystem>);
        let mut mounted = mount_volumes(eof.volumes, root)?;
        for (point, directory) in options.redirects {
            if !directory.is_dir() {
                return Err(FsError::new(ErrorCode::ENOTDIR, &directory.to_string_lossy()).into());
            }
            mounted.fs.mount(&point, Arc::new(NativeFileSystem::new(directory)))?;
        }
        Ok(Runtime {
            version:   eof.version,
            main,
            init:      eof.init,
            volumes:   mounted.volumes,
            fs:        Arc::new(mounted.fs),
            mappings:  Arc::new(mounted.mappings),
            originals: None,
        })
    }

    /// Routes the module hooks and the filesystem binding of `host` through the volumes.
    pub fn patch(&mut self, host: &mut HostRuntime) -> Result<()> {
        if self.originals.is_some() {
            return Err(Error::IllegalState("already patched".into()));
        }
        let originals = Originals::capture(host);
        let (read_module_json, module_stat, resolve_filename) = originals.hooks(&self.fs, &self.mappings);
        host.read_module_json = read_module_json;
        host.module_stat = module_stat;
        host.resolve_filename = resolve_filename;
        host.fs = originals.filesystem(&self.fs);
        self.originals = Some(originals);
        Ok(())
    }

    /// Puts back the slots captured by [`Runtime::patch`], does nothing when not patched.
    pub fn unpatch(&mut self, host: &mut HostRuntime) {
        if let Some(originals) = self.originals.take() {
            originals.restore(host);
        }
    }

    pub fn is_patched(&self) -> bool { self.originals.is_some() }

    /// Whether `path` lies below one of the mount points.
    pub fn is_virtual(&self, path: &str) -> bool { self.fs.is_mounted(path) }

    pub fn main_path(&self) -> &str { &self.main }

    pub fn version(&self) -> u16 { self.version }

    /// The `__kri__` object handed to the init script.
    pub fn globals(&self) -> serde_json::Value {
        serde_json::json!({
            "LOADER_VERSION": eof::LOADER_VERSION,
            "version": self.version,
            "main": self.main,
            "volumes": self.volumes.iter().map(|volume| volume.name.as_str()).collect::<Vec<_>>(),
            "mappings": self.mappings.as_ref(),
        })
    }

    pub fn init(&self) -> &[u8] { &self.init }

    pub fn volumes(&self) -> &[MountedVolume] { &self.volumes }

    pub fn mappings(&self) -> &BTreeMap<String, String> { &self.mappings }

    pub fn fs(&self) -> &Arc<MountableFileSystem> { &self.fs }
}

/// Loads the container appended to `exe` and mounts it.
pub fn boot<P: AsRef<Path>>(exe: P, options: RuntimeOptions) -> Result<Runtime> {
    Runtime::mount(eof::load(exe)?, options)
}

/// [`boot`] on the running executable, following symlinks to the real file.
pub fn boot_current_exe(options: RuntimeOptions) -> Result<Runtime> {
    let mut exe = current_exe()?;
    while let Ok(link) = read_link(&exe) {
        exe = match exe.parent() {
            Some(parent) if link.is_relative() => parent.join(link),
            _ => link,
        };
    }
    boot(exe, options)
}
