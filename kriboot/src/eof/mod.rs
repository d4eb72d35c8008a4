//! The EOF container appended to a host executable.
//!
//! Physical layout, from the start of the container to the end of the file:
//!
//! ```text
//! [volume N header][volume N data] ... [volume 0 header][volume 0 data][init][root header]
//! ```
//!
//! The root header points at the section of volume 0 (the startup volume),
//! and every volume header points at the section stored right before it, so
//! the loader can walk the chain backwards from the end of the file.

mod builder;
pub mod codec;
mod loader;
pub mod types;
mod volume;

pub use builder::EofBuilder;
pub use loader::{load, load_from, Eof};
pub use types::*;
pub use volume::{Volume, VolumeSource, VolumeSpec};
