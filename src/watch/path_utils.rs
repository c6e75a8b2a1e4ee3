// src/watch/path_utils.rs

//! Utility functions for path handling in the watcher.

use std::path::Path;

/// `path` relative to `root` with forward slashes, falling back to the
/// canonical forms when the plain prefix does not match.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    let slashed = |rel: &Path| rel.to_string_lossy().replace('\\', "/");
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(slashed(rel));
    }

    // macOS reports /private/var/... for roots registered as /var/...
    let root = root.canonicalize().ok()?;
    let path = path.canonicalize().ok()?;
    path.strip_prefix(&root).ok().map(slashed)
}

/// True if `path` ends in `.{extension}`.
pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

/// Derive the dotted unit name from a root-relative path.
///
/// `com/acme/Foo.class` with extension `class` becomes `com.acme.Foo`.
/// Returns `None` if the path does not carry the extension or has an empty
/// stem.
pub fn unit_name_from_relative(rel_path: &str, extension: &str) -> Option<String> {
    let suffix = format!(".{extension}");
    let stem = rel_path.strip_suffix(&suffix)?;
    let stem = stem.trim_start_matches('/');
    if stem.is_empty() || stem.ends_with('/') {
        return None;
    }
    Some(stem.replace('/', "."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_names_are_dotted_relative_paths() {
        assert_eq!(
            unit_name_from_relative("com/acme/Foo.class", "class").as_deref(),
            Some("com.acme.Foo")
        );
        assert_eq!(unit_name_from_relative("Foo.java", "class"), None);
        assert_eq!(unit_name_from_relative("pkg/.class", "class"), None);
    }

    #[test]
    fn extension_check_ignores_case() {
        assert!(has_extension(Path::new("/w/A.CLASS"), "class"));
        assert!(!has_extension(Path::new("/w/A"), "class"));
    }

    #[test]
    fn relative_paths_use_forward_slashes() {
        assert_eq!(
            relative_str(Path::new("/w"), Path::new("/w/a/B.class")).as_deref(),
            Some("a/B.class")
        );
        assert_eq!(relative_str(Path::new("/nope-root"), Path::new("/other/x")), None);
    }
}
