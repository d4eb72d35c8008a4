use std::path::Path;

/// Gives `output` the permissions of `runtime`, plus executable bits for owner and group.
#[cfg(any(unix, target_os = "redox"))]
pub fn copy_executable_permissions(runtime: &Path, output: &Path) -> std::io::Result<()> {
    use ::std::{
        fs::{metadata, set_permissions},
        os::unix::prelude::*,
    };
    let mut perm = metadata(runtime)?.permissions();
    perm.set_mode((perm.mode() & 0o7777) | 0o110);
    set_permissions(output, perm)
}

#[cfg(not(any(unix, target_os = "redox")))]
pub fn copy_executable_permissions(runtime: &Path, output: &Path) -> std::io::Result<()> {
    let readonly = std::fs::metadata(runtime)?.permissions().readonly();
    let mut perm = std::fs::metadata(output)?.permissions();
    perm.set_readonly(readonly);
    std::fs::set_permissions(output, perm)
}
