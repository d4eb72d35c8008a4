use std::{
    fs::{read, read_link, File},
    io::{Cursor, Error, Result, Write},
    path::{Path, PathBuf},
};

use jwalk::WalkDir;
use path_slash::PathExt;
use rayon::prelude::*;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

/// Fields of a `package.json` relevant for choosing the mount name and entry file.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PackageInfo {
    pub name: Option<String>,
    pub main: Option<String>,
    pub bin:  Option<String>,
}
impl PackageInfo {
    /// Reads `package.json` from `directory`, missing or malformed manifests yield the defaults.
    pub fn read(directory: &Path) -> Self {
        let manifest = match File::open(directory.join("package.json")) {
            Ok(file) => file,
            Err(_) => return PackageInfo::default(),
        };
        let value: serde_json::Value = match serde_json::from_reader(manifest) {
            Ok(value) => value,
            Err(_) => return PackageInfo::default(),
        };
        let string = |key: &str| value.get(key).and_then(|v| v.as_str()).map(str::to_owned);
        // "bin" is either a path or a map of command names to paths
        let bin = match value.get("bin") {
            Some(serde_json::Value::String(bin)) => Some(bin.clone()),
            Some(serde_json::Value::Object(bins)) => bins.values().find_map(|v| v.as_str()).map(str::to_owned),
            _ => None,
        };
        PackageInfo {
            name: string("name"),
            main: string("main"),
            bin,
        }
    }

    /// Entry file of the package, the executable entry for startup volumes.
    pub fn entry(&self, startup: bool) -> Option<&str> {
        let entry = if startup { self.bin.as_deref().or(self.main.as_deref()) } else { self.main.as_deref() };
        entry.map(|entry| entry.trim_start_matches("./"))
    }
}

fn options(compression: u32) -> SimpleFileOptions {
    if compression == 0 {
        SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
    } else {
        SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(compression.min(9) as i64))
    }
}

#[cfg(any(unix, target_os = "redox"))]
fn permissions(path: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).ok().map(|meta| meta.permissions().mode() & 0o777)
}

#[cfg(not(any(unix, target_os = "redox")))]
fn permissions(_: &Path) -> Option<u32> { None }

/// Resolves a symlink inside `source` to the file it points to.
fn link_target(source: &Path, entry: &Path) -> std::result::Result<PathBuf, String> {
    let link = read_link(entry).map_err(|e| format!("couldn't read link {}: {}", entry.display(), e))?;
    let link = link.strip_prefix(".").unwrap_or(&link);
    let link = entry.parent().map(|parent| parent.join(link)).unwrap_or_else(|| link.to_owned());
    let link = link.canonicalize().map_err(|e| {
        format!("link could not be canonicalized, skipping {}: {}", entry.display(), e)
    })?;
    if !link.starts_with(source) {
        return Err(format!("link points to outside the directory, skipping {}", entry.display()));
    }
    if !link.is_file() {
        return Err(format!("skipping link to a directory: {}", entry.display()));
    }
    Ok(link)
}

/// Zip the contents of the directory `source`.
///
/// Directory entries are written first, file contents are read in parallel
/// and appended in walk order. Symlinks are stored as copies of their target
/// when it lies inside `source`. Returns the archive and the number of entries.
pub fn zip_dir<
    T: AsRef<Path>,
    P: Fn() + Sync + Send,
    E: Fn(&str) + Sync + Send,
    I: Fn(&str) + Sync + Send,
>(
    source: T, compression: u32, progress_callback: P, error_callback: E, info_callback: I,
) -> Result<(Vec<u8>, usize)> {
    let source = source.as_ref().canonicalize()?;
    let options = options(compression);

    let entries = WalkDir::new(&source)
        .skip_hidden(false)
        .sort(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) if entry.depth > 0 => Some(entry),
            Ok(_) => None,
            Err(e) => {
                error_callback(&format!("couldn't read entry: {}", e));
                None
            }
        })
        .collect::<Vec<_>>();

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let mut count = 0;

    // directories first, names end with a slash
    for entry in entries.iter().filter(|entry| entry.file_type().is_dir()) {
        let path = entry.path();
        let name = match path.strip_prefix(&source).ok().and_then(|path| path.to_slash()) {
            Some(name) => format!("{}/", name),
            None => {
                error_callback(&format!("skipping directory with invalid name: {}", path.display()));
                continue;
            }
        };
        info_callback(&name);
        writer.add_directory(name, options).map_err(Error::other)?;
        count += 1;
        progress_callback();
    }

    // read files in parallel
    let files = entries
        .par_iter()
        .filter(|entry| !entry.file_type().is_dir())
        .filter_map(|entry| {
            let path = entry.path();
            let name = path.strip_prefix(&source).ok()?.to_slash()?.into_owned();
            let target = if entry.file_type().is_symlink() {
                match link_target(&source, &path) {
                    Ok(target) => target,
                    Err(message) => {
                        error_callback(&message);
                        return None;
                    }
                }
            } else {
                path.clone()
            };
            info_callback(&name);
            match read(&target) {
                Ok(data) => Some((name, data, permissions(&target))),
                Err(e) => {
                    error_callback(&format!("couldn't read {}: {}", path.display(), e));
                    None
                }
            }
        })
        .collect::<Vec<_>>();

    for (name, data, mode) in files {
        let options = match mode {
            Some(mode) => options.unix_permissions(mode),
            None => options,
        };
        writer.start_file(name, options).map_err(Error::other)?;
        writer.write_all(&data)?;
        count += 1;
        progress_callback();
    }

    let archive = writer.finish().map_err(Error::other)?.into_inner();
    Ok((archive, count))
}

/// Zip a single script as the `index.js` of a volume.
pub fn zip_script<T: AsRef<Path>>(script: T, compression: u32) -> Result<Vec<u8>> {
    let data = read(script.as_ref())?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file(kriboot::eof::DEFAULT_INDEX, options(compression))
        .map_err(Error::other)?;
    writer.write_all(&data)?;
    Ok(writer.finish().map_err(Error::other)?.into_inner())
}

/// Data of an "fs" volume: the host directory path, NUL padded to the minimum volume size.
pub fn native_volume<T: AsRef<Path>>(directory: T) -> Result<Vec<u8>> {
    let directory = directory.as_ref().canonicalize()?;
    let mut data = directory
        .to_str()
        .ok_or_else(|| Error::other(format!("path is not valid utf8: {}", directory.display())))?
        .as_bytes()
        .to_vec();
    data.resize(data.len().max(kriboot::eof::MIN_VOLUME_SIZE), 0);
    Ok(data)
}
