use std::path::PathBuf;

/// One packaged filesystem unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    /// Backend discriminator, `zip` or `fs`
    pub kind:    String,
    /// Mount point, always starts with `/`
    pub name:    String,
    /// Module name that resolves to this volume, may be empty
    pub mapping: String,
    /// Entry file relative to the volume root, may be empty
    pub index:   String,
    pub data:    Vec<u8>,
    pub startup: bool,
}
impl Volume {
    /// Path of the entry file inside the virtual filesystem.
    pub fn entry_path(&self) -> String {
        crate::fs::path::join(&self.name, &self.index)
    }
}

#[derive(Debug, Clone)]
pub enum VolumeSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}
impl From<Vec<u8>> for VolumeSource {
    fn from(bytes: Vec<u8>) -> Self { VolumeSource::Bytes(bytes) }
}
impl From<PathBuf> for VolumeSource {
    fn from(path: PathBuf) -> Self { VolumeSource::Path(path) }
}

/// Arguments of [`EofBuilder::add_volume`](super::EofBuilder::add_volume).
#[derive(Debug, Clone)]
pub struct VolumeSpec {
    pub kind:    String,
    pub name:    String,
    pub mapping: String,
    pub index:   String,
    pub source:  VolumeSource,
    pub startup: bool,
}
impl VolumeSpec {
    pub fn new(kind: &str, name: &str, source: impl Into<VolumeSource>) -> Self {
        VolumeSpec {
            kind:    kind.to_owned(),
            name:    name.to_owned(),
            mapping: String::new(),
            index:   String::new(),
            source:  source.into(),
            startup: false,
        }
    }

    pub fn mapping(mut self, mapping: &str) -> Self {
        self.mapping = mapping.to_owned();
        self
    }

    pub fn index(mut self, index: &str) -> Self {
        self.index = index.to_owned();
        self
    }

    pub fn startup(mut self, startup: bool) -> Self {
        self.startup = startup;
        self
    }
}
