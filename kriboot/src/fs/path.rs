//! Helpers for the `/`-separated paths of the virtual filesystem.

/// Makes `path` absolute and resolves `.`, `..` and repeated separators.
///
/// `..` never climbs above the root.
pub fn normalize(path: &str) -> String {
    let mut segments = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }
    let mut normalized = String::with_capacity(path.len() + 1);
    for segment in segments {
        normalized.push('/');
        normalized.push_str(segment);
    }
    if normalized.is_empty() {
        normalized.push('/');
    }
    normalized
}

pub fn join(base: &str, path: &str) -> String { normalize(&format!("{}/{}", base, path)) }

/// Parent directory of a normalized path, `/` for the root itself.
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(index) => &path[..index],
    }
}

/// Path relative to `mount` if `path` lies at or below it, matched per segment.
///
/// A plain string prefix would let `/app` claim `/application`.
///
/// Both paths must be normalized. The result is absolute from the mount root.
pub fn strip_mount<'a>(path: &'a str, mount: &str) -> Option<&'a str> {
    if mount == "/" {
        return Some(path);
    }
    let rest = path.strip_prefix(mount)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_paths() {
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("app"), "/app");
        assert_eq!(normalize("/app//lib/./x.js"), "/app/lib/x.js");
        assert_eq!(normalize("/app/lib/../index.js"), "/app/index.js");
        assert_eq!(normalize("/../../etc"), "/etc");
        assert_eq!(normalize("dir/"), "/dir");
        assert_eq!(normalize("a\\b"), "/a/b");
    }

    #[test]
    fn joins_paths() {
        assert_eq!(join("/app", "index.js"), "/app/index.js");
        assert_eq!(join("/app", ""), "/app");
        assert_eq!(join("/", "/lib/x"), "/lib/x");
    }

    #[test]
    fn splits_paths() {
        assert_eq!(parent("/app/lib/x.js"), "/app/lib");
        assert_eq!(parent("/app"), "/");
        assert_eq!(parent("/"), "/");
    }

    #[test]
    fn strips_mount_points_per_segment() {
        assert_eq!(strip_mount("/app/index.js", "/app"), Some("/index.js"));
        assert_eq!(strip_mount("/app", "/app"), Some("/"));
        assert_eq!(strip_mount("/application", "/app"), None);
        assert_eq!(strip_mount("/lib", "/app"), None);
        assert_eq!(strip_mount("/lib", "/"), Some("/lib"));
        assert_eq!(strip_mount("/app/vendor/x", "/app/vendor"), Some("/x"));
    }
}
