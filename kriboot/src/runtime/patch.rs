use std::{collections::BTreeMap, sync::Arc};

use super::host::{HostRuntime, ModuleStat, ReadModuleJson, ResolveFilename};
use crate::fs::{path::join, FileSystem, MountableFileSystem};

/// Host slots as they were before patching.
pub(crate) struct Originals {
    read_module_json: ReadModuleJson,
    module_stat:      ModuleStat,
    resolve_filename: ResolveFilename,
    fs:               Arc<dyn FileSystem>,
}
impl Originals {
    pub(crate) fn capture(host: &HostRuntime) -> Self {
        Originals {
            read_module_json: host.read_module_json.clone(),
            module_stat:      host.module_stat.clone(),
            resolve_filename: host.resolve_filename.clone(),
            fs:               host.fs.clone(),
        }
    }

    pub(crate) fn restore(self, host: &mut HostRuntime) {
        host.read_module_json = self.read_module_json;
        host.module_stat = self.module_stat;
        host.resolve_filename = self.resolve_filename;
        host.fs = self.fs;
    }

    /// Filesystem binding serving the mounts of `fs` and everything else from the original binding.
    pub(crate) fn filesystem(&self, fs: &MountableFileSystem) -> Arc<dyn FileSystem> {
        Arc::new(fs.over(self.fs.clone()))
    }

    /// Replacement slots routing virtual paths to `fs`.
    pub(crate) fn hooks(
        &self, fs: &Arc<MountableFileSystem>, mappings: &Arc<BTreeMap<String, String>>,
    ) -> (ReadModuleJson, ModuleStat, ResolveFilename) {
        (
            read_module_json(fs.clone(), self.read_module_json.clone()),
            module_stat(fs.clone(), self.module_stat.clone()),
            resolve_filename(mappings.clone(), self.resolve_filename.clone()),
        )
    }
}

fn read_module_json(fs: Arc<MountableFileSystem>, original: ReadModuleJson) -> ReadModuleJson {
    Arc::new(move |path: &str| {
        if fs.is_mounted(path) {
            if let Ok(source) = fs.read_to_string(path) {
                return Some(source);
            }
        }
        original(path)
    })
}

fn module_stat(fs: Arc<MountableFileSystem>, original: ModuleStat) -> ModuleStat {
    Arc::new(move |path: &str| {
        if !fs.is_mounted(path) {
            return original(path);
        }
        match fs.stat(path) {
            Ok(stats) if stats.is_dir() => 1,
            Ok(_) => 0,
            Err(e) => -e.errno(),
        }
    })
}

/// Rewrites `mapping/rest` requests to `<mount point>/rest`.
pub(crate) fn rewrite_request(mappings: &BTreeMap<String, String>, request: &str) -> Option<String> {
    let (first, rest) = match request.split_once('/') {
        Some((first, rest)) => (first, rest),
        None => (request, ""),
    };
    mappings.get(first).map(|mount| join(mount, rest))
}

fn resolve_filename(mappings: Arc<BTreeMap<String, String>>, original: ResolveFilename) -> ResolveFilename {
    Arc::new(move |host: &HostRuntime, request: &str, parent: Option<&str>| {
        match rewrite_request(&mappings, request) {
            Some(rewritten) => original(host, &rewritten, parent),
            None => original(host, request, parent),
        }
    })
}
