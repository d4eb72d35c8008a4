//! Runtime side of kri packaged executables.
//!
//! A packaged executable is a host binary followed by an EOF container:
//! the volumes (zip archives or native directory redirects), the init
//! payload and a fixed 64-byte root header at the very end of the file.
//! [`eof::EofBuilder`] produces the container, [`eof::load`] reads it back,
//! [`fs::mount_volumes`] composes the volumes into one filesystem and
//! [`runtime::Runtime`] routes the host's module hooks through it.

pub mod eof;
pub mod error;
pub mod fs;
pub mod runtime;

pub use error::{Error, Result};
pub use runtime::{boot, boot_current_exe, HostRuntime, Runtime, RuntimeOptions};
