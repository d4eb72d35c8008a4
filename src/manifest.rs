use std::{fs::File, io::BufReader, path::Path};

use indexmap::IndexMap;
use kriboot::fs::BackendKind;
use serde::Deserialize;

use crate::args::VolumeArg;

fn default_type() -> String { BackendKind::Zip.tag().to_owned() }

/// One entry of the `volumes` table of `kri.json`, keyed by mount name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VolumeEntry {
    #[serde(rename = "type", default = "default_type")]
    pub kind:    String,
    pub input:   String,
    #[serde(default)]
    pub mapping: String,
    #[serde(default)]
    pub index:   Option<String>,
    #[serde(default)]
    pub startup: bool,
}

/// Host directories mounted into the virtual filesystem, keyed by mount point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FsSection {
    #[serde(default)]
    pub redirects: IndexMap<String, String>,
}

/// Packaging manifest, `kri.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub volumes: IndexMap<String, VolumeEntry>,
    #[serde(default)]
    pub fs:      FsSection,
}
impl Manifest {
    pub const FILE_NAME: &'static str = "kri.json";

    pub fn load(path: &Path) -> std::io::Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn parse(text: &str) -> serde_json::Result<Self> { serde_json::from_str(text) }

    /// Volumes in declaration order, inputs and redirects resolved against `base`.
    ///
    /// Redirects become "fs" volumes.
    pub fn volumes(&self, base: &Path) -> Result<Vec<VolumeArg>, String> {
        let mut volumes = Vec::with_capacity(self.volumes.len() + self.fs.redirects.len());
        for (name, entry) in &self.volumes {
            volumes.push(VolumeArg {
                name:    name.clone(),
                input:   base.join(&entry.input),
                kind:    entry.kind.parse().map_err(|e: kriboot::Error| format!("{}: {}", name, e))?,
                mapping: entry.mapping.clone(),
                index:   entry.index.clone(),
                startup: entry.startup,
            });
        }
        for (name, directory) in &self.fs.redirects {
            volumes.push(VolumeArg {
                name:    name.clone(),
                input:   base.join(directory),
                kind:    BackendKind::Native,
                mapping: String::new(),
                index:   None,
                startup: false,
            });
        }
        Ok(volumes)
    }
}
