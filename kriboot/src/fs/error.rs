use std::{fmt, io};

use thiserror::Error;

/// POSIX error numbers surfaced by the virtual filesystem.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    EPERM     = 1,
    ENOENT    = 2,
    EIO       = 5,
    EBADF     = 9,
    EACCES    = 13,
    EEXIST    = 17,
    EXDEV     = 18,
    ENOTDIR   = 20,
    EISDIR    = 21,
    EINVAL    = 22,
    ENOSPC    = 28,
    EROFS     = 30,
    ENOTEMPTY = 39,
    ENOTSUP   = 95,
}
impl ErrorCode {
    pub fn errno(self) -> i32 { self as i32 }

    pub fn from_errno(errno: i32) -> Option<Self> {
        Some(match errno {
            1 => ErrorCode::EPERM,
            2 => ErrorCode::ENOENT,
            5 => ErrorCode::EIO,
            9 => ErrorCode::EBADF,
            13 => ErrorCode::EACCES,
            17 => ErrorCode::EEXIST,
            18 => ErrorCode::EXDEV,
            20 => ErrorCode::ENOTDIR,
            21 => ErrorCode::EISDIR,
            22 => ErrorCode::EINVAL,
            28 => ErrorCode::ENOSPC,
            30 => ErrorCode::EROFS,
            39 => ErrorCode::ENOTEMPTY,
            95 => ErrorCode::ENOTSUP,
            _ => return None,
        })
    }

    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::EPERM => "operation not permitted",
            ErrorCode::ENOENT => "no such file or directory",
            ErrorCode::EIO => "input/output error",
            ErrorCode::EBADF => "bad file descriptor",
            ErrorCode::EACCES => "permission denied",
            ErrorCode::EEXIST => "file already exists",
            ErrorCode::EXDEV => "cross-device link not permitted",
            ErrorCode::ENOTDIR => "not a directory",
            ErrorCode::EISDIR => "illegal operation on a directory",
            ErrorCode::EINVAL => "invalid argument",
            ErrorCode::ENOSPC => "no space left on device",
            ErrorCode::EROFS => "read-only file system",
            ErrorCode::ENOTEMPTY => "directory not empty",
            ErrorCode::ENOTSUP => "operation not supported",
        }
    }

    fn from_kind(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::NotFound => ErrorCode::ENOENT,
            io::ErrorKind::PermissionDenied => ErrorCode::EACCES,
            io::ErrorKind::AlreadyExists => ErrorCode::EEXIST,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => ErrorCode::EINVAL,
            io::ErrorKind::Unsupported => ErrorCode::ENOTSUP,
            _ => ErrorCode::EIO,
        }
    }
}
impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { fmt::Debug::fmt(self, f) }
}

/// A filesystem failure, displayed like `ENOENT: no such file or directory, '/app/x.js'`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}, '{path}'")]
pub struct FsError {
    pub code:    ErrorCode,
    pub path:    String,
    pub message: String,
}
impl FsError {
    pub fn new(code: ErrorCode, path: &str) -> Self {
        FsError {
            code,
            path: path.to_owned(),
            message: code.description().to_owned(),
        }
    }

    pub fn with_message(code: ErrorCode, path: &str, message: impl Into<String>) -> Self {
        FsError {
            code,
            path: path.to_owned(),
            message: message.into(),
        }
    }

    /// Converts an OS error, preferring its raw error number over its kind.
    pub fn from_io(error: io::Error, path: &str) -> Self {
        // error numbers are POSIX ones, other platforms go by kind
        let raw = if cfg!(unix) { error.raw_os_error() } else { None };
        let code = raw
            .and_then(ErrorCode::from_errno)
            .unwrap_or_else(|| ErrorCode::from_kind(error.kind()));
        FsError::with_message(code, path, error.to_string())
    }

    pub fn errno(&self) -> i32 { self.code.errno() }

    /// Replaces the reported path, used to report virtual paths instead of backend-relative ones.
    pub fn with_path(mut self, path: &str) -> Self {
        self.path = path.to_owned();
        self
    }
}

pub type FsResult<T> = Result<T, FsError>;
