use std::path::{Path, PathBuf};

use console::style;
use kriboot::fs::BackendKind;

use crate::manifest::Manifest;

/// A volume requested on the command line or in the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeArg {
    pub name:    String,
    pub input:   PathBuf,
    pub kind:    BackendKind,
    pub mapping: String,
    pub index:   Option<String>,
    pub startup: bool,
}

pub fn fail(message: &str, detail: impl std::fmt::Display) -> ! {
    println!("{}: {}", style(message).red(), detail);
    std::process::exit(-1);
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|e| fail("couldn't get the current directory", e))
}

/// Parses `name=path[,type[,mapping]]`.
pub fn parse_volume(volume: &str) -> Result<VolumeArg, String> {
    let (name, rest) = volume
        .split_once('=')
        .ok_or_else(|| format!("expected name=path[,type[,mapping]], got '{}'", volume))?;
    let mut parts = rest.split(',');
    let input = parts.next().unwrap_or_default();
    if name.is_empty() || input.is_empty() {
        return Err(format!("volume name and path must not be empty: '{}'", volume));
    }
    let kind = match parts.next() {
        Some(kind) if !kind.is_empty() => kind.parse::<BackendKind>().map_err(|e| e.to_string())?,
        _ => BackendKind::Zip,
    };
    let mapping = parts.next().unwrap_or_default().to_owned();
    if parts.next().is_some() {
        return Err(format!("too many fields in volume '{}'", volume));
    }
    Ok(VolumeArg {
        name: name.to_owned(),
        input: PathBuf::from(input),
        kind,
        mapping,
        index: None,
        startup: false,
    })
}

pub fn get_volumes(volumes: &[String], base: &Path) -> Vec<VolumeArg> {
    volumes
        .iter()
        .map(|volume| {
            let mut volume = parse_volume(volume).unwrap_or_else(|e| fail("not a valid volume", e));
            volume.input = get_source(&base.join(&volume.input));
            volume
        })
        .collect()
}

pub fn get_manifest(path: &Path) -> Manifest {
    let path = current_dir().join(path);
    Manifest::load(&path).unwrap_or_else(|e| fail("couldn't read manifest", format!("{}: {}", path.display(), e)))
}

pub fn get_runtime(runtime: &Path) -> PathBuf {
    let runtime = current_dir().join(runtime);
    let runtime = std::fs::canonicalize(&runtime)
        .unwrap_or_else(|_| fail("runtime path does not exist", runtime.display()));
    if !runtime.is_file() {
        fail("runtime path is not a file", runtime.display());
    }
    runtime
}

pub fn get_source(source: &Path) -> PathBuf {
    let source = current_dir().join(source);
    let source = std::fs::canonicalize(&source)
        .unwrap_or_else(|_| fail("input path does not exist", source.display()));
    if !source.is_dir() && !source.is_file() {
        fail("input path is not a file or directory", source.display());
    }
    source
}

pub fn get_init(init: Option<&Path>) -> Vec<u8> {
    match init {
        Some(init) => {
            let init = current_dir().join(init);
            std::fs::read(&init).unwrap_or_else(|e| fail("couldn't read init script", format!("{}: {}", init.display(), e)))
        }
        None => crate::DEFAULT_INIT.as_bytes().to_vec(),
    }
}

pub fn get_compression(compression: u32) -> u32 {
    if compression > 9 {
        fail("compression level out of range (0-9)", compression);
    }
    compression
}

/// Output path, `<current dir>/<input stem>` when not given.
pub fn get_output(output: Option<&Path>, source: &Path) -> PathBuf {
    let output = match output {
        Some(output) => output.to_owned(),
        None => PathBuf::from(
            source
                .file_stem()
                .unwrap_or_else(|| fail("couldn't infer output path from the input path", source.display())),
        ),
    };
    let output = current_dir().join(output);
    let parent = output
        .parent()
        .unwrap_or_else(|| fail("output path has no parent directory", output.display()));
    if !parent.is_dir() {
        fail("output path has no parent directory", parent.display());
    }
    if output.is_dir() {
        fail("output path is a directory", output.display());
    }
    let file_name = output
        .file_name()
        .unwrap_or_else(|| fail("output path is invalid", output.display()));
    std::fs::canonicalize(parent)
        .unwrap_or_else(|_| fail("output path is invalid", output.display()))
        .join(file_name)
}

pub fn get_build_dir(build_dir: Option<&Path>) -> Option<PathBuf> {
    let build_dir = current_dir().join(build_dir?);
    std::fs::create_dir_all(&build_dir)
        .unwrap_or_else(|e| fail("couldn't create build directory", format!("{}: {}", build_dir.display(), e)));
    Some(build_dir)
}
