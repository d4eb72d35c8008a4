use thiserror::Error;

use crate::fs::FsError;

/// Errors raised while building, loading or mounting an EOF container.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad input shape handed to the builder
    #[error("not valid: {0}")]
    NotValid(String),

    /// Ordering or uniqueness violation
    #[error("not allowed: {0}")]
    NotAllowed(String),

    /// Lifecycle violation (build twice, patch twice, stream before build)
    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("invalid signature of EOF")]
    InvalidSignature,

    #[error("unsupported version of EOF: {found} (loader supports up to {supported})")]
    UnsupportedVersion { found: u16, supported: u16 },

    #[error("number of volumes out of range: {0}")]
    VolumeCountOutOfRange(u16),

    #[error("volume count mismatch: root header declares {declared}, found {found}")]
    VolumeCountMismatch { declared: u16, found: usize },

    #[error("empty 'init' section")]
    EmptyInitSection,

    #[error("invalid volume header size: header declares {declared}, chain declares {expected}")]
    InvalidHeaderSize { declared: u32, expected: u32 },

    #[error("invalid section data size: header declares {declared}, section holds {expected}")]
    InvalidDataSize { declared: u32, expected: u32 },

    #[error("invalid volume mount name: {0}")]
    InvalidMountName(String),

    #[error("duplicate volume mount name: {0}")]
    DuplicateMountName(String),

    #[error("no filesystem type for: {0}")]
    MissingType(String),

    #[error("truncated container: {0}")]
    Truncated(String),

    #[error("{0} is not valid utf-8")]
    InvalidString(&'static str),

    #[error("unsupported filesystem type: {0}")]
    UnsupportedBackend(String),

    #[error("cannot find module '{0}'")]
    ModuleNotFound(String),

    #[error(transparent)]
    Fs(#[from] FsError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
