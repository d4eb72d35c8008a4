use std::{fmt, sync::Arc};

use crate::{
    fs::{
        path::{join, normalize, parent},
        FileSystem, NativeFileSystem,
    },
    Error, Result,
};

/// Reads a module source file as text, `None` when it cannot be read.
pub type ReadModuleJson = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;
/// Probes a path: `1` for a directory, `0` for a file, a negated errno on failure.
pub type ModuleStat = Arc<dyn Fn(&str) -> i32 + Send + Sync>;
/// Resolves a module request made from `parent` to a file path.
pub type ResolveFilename =
    Arc<dyn Fn(&HostRuntime, &str, Option<&str>) -> Result<String> + Send + Sync>;

const EXTENSIONS: [&str; 3] = [".js", ".json", ".node"];

/// The patchable entry points of the host runtime.
///
/// Module loading goes through `read_module_json` and `module_stat` only,
/// application filesystem access goes through `fs`.
#[derive(Clone)]
pub struct HostRuntime {
    pub read_module_json: ReadModuleJson,
    pub module_stat:      ModuleStat,
    pub resolve_filename: ResolveFilename,
    pub fs:               Arc<dyn FileSystem>,
}
impl HostRuntime {
    /// Hooks backed by the operating system.
    pub fn native() -> Self {
        HostRuntime {
            read_module_json: Arc::new(|path: &str| std::fs::read_to_string(path).ok()),
            module_stat:      Arc::new(|path: &str| match std::fs::metadata(path) {
                Ok(meta) if meta.is_dir() => 1,
                Ok(_) => 0,
                Err(e) => -e.raw_os_error().unwrap_or(1),
            }),
            resolve_filename: Arc::new(resolve_module),
            fs:               Arc::new(NativeFileSystem::new("/")),
        }
    }

    pub fn resolve(&self, request: &str, parent: Option<&str>) -> Result<String> {
        (self.resolve_filename)(self, request, parent)
    }

    pub fn stat(&self, path: &str) -> i32 { (self.module_stat)(path) }

    pub fn read_module(&self, path: &str) -> Option<String> { (self.read_module_json)(path) }
}
impl fmt::Debug for HostRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostRuntime").field("fs", &self.fs.name()).finish()
    }
}

fn is_relative(request: &str) -> bool {
    request == "." || request == ".." || request.starts_with("./") || request.starts_with("../")
}

fn load_as_file(host: &HostRuntime, path: &str) -> Option<String> {
    if host.stat(path) == 0 {
        return Some(path.to_owned());
    }
    EXTENSIONS
        .iter()
        .map(|extension| format!("{}{}", path, extension))
        .find(|candidate| host.stat(candidate) == 0)
}

fn load_index(host: &HostRuntime, path: &str) -> Option<String> { load_as_file(host, &join(path, "index")) }

fn load_as_directory(host: &HostRuntime, path: &str) -> Option<String> {
    if host.stat(path) != 1 {
        return None;
    }
    let main = host
        .read_module(&join(path, "package.json"))
        .and_then(|manifest| serde_json::from_str::<serde_json::Value>(&manifest).ok())
        .and_then(|manifest| manifest.get("main")?.as_str().map(str::to_owned));
    if let Some(main) = main {
        let main = join(path, &main);
        if let Some(found) = load_as_file(host, &main).or_else(|| load_index(host, &main)) {
            return Some(found);
        }
    }
    load_index(host, path)
}

fn load_path(host: &HostRuntime, path: &str) -> Option<String> {
    load_as_file(host, path).or_else(|| load_as_directory(host, path))
}

/// Node style resolution that only touches the filesystem through the hooks.
pub(crate) fn resolve_module(host: &HostRuntime, request: &str, from: Option<&str>) -> Result<String> {
    let base = match from {
        Some(from) => parent(&normalize(from)).to_owned(),
        None => normalize(&std::env::current_dir()?.to_string_lossy()),
    };
    let found = if request.starts_with('/') {
        load_path(host, &normalize(request))
    } else if is_relative(request) {
        load_path(host, &join(&base, request))
    } else {
        let mut directory = base.as_str();
        loop {
            if !directory.ends_with("/node_modules") {
                let candidate = join(&join(directory, "node_modules"), request);
                if let Some(found) = load_path(host, &candidate) {
                    break Some(found);
                }
            }
            if directory == "/" {
                break None;
            }
            directory = parent(directory);
        }
    };
    found.ok_or_else(|| Error::ModuleNotFound(request.to_owned()))
}
