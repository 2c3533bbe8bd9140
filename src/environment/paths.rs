//! Path resolution used by the sandbox checks

use std::env;
use std::path::{Component, Path, PathBuf};

/// Makes a path absolute without requiring it to exist. The longest existing
/// ancestor is canonicalized (resolving symlinks), the rest is normalized
/// lexically.
pub fn absolute(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let joined = normalize(&joined);

    let mut existing = joined.as_path();
    let mut rest = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return joined,
        }
    }

    let mut resolved = existing
        .canonicalize()
        .unwrap_or_else(|_| existing.to_path_buf());
    for name in rest.into_iter().rev() {
        resolved.push(name);
    }
    resolved
}

/// Lexically removes `.` and resolves `..` against earlier components
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// A relative path that stays below its base once normalized
pub fn is_contained_relative(path: &Path) -> bool {
    if path.is_absolute() || path.has_root() {
        return false;
    }
    let mut depth: i64 = 0;
    for component in path.components() {
        match component {
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

pub fn is_within(path: &Path, root: &Path) -> bool {
    absolute(path).starts_with(absolute(root))
}

/// `/`-separated form of a relative path
pub fn unix_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// `\`-separated form of a relative path
pub fn windows_path(path: &str) -> String {
    path.replace('/', "\\")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use yare::parameterized;

    #[parameterized(
        plain = { "a/b", true },
        dotted = { "./a/../b", true },
        escape = { "../x", false },
        nested_escape = { "a/../../x", false },
        absolute = { "/etc/passwd", false },
        empty = { "", true },
    )]
    fn test_is_contained_relative(path: &str, expected: bool) {
        assert_eq!(is_contained_relative(Path::new(path)), expected);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
    }

    #[test]
    fn test_absolute_resolves_symlinked_root() {
        let dir = TempDir::new().unwrap();
        let real = dir.path().canonicalize().unwrap();
        let p = absolute(&dir.path().join("missing/child"));
        assert_eq!(p, real.join("missing/child"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_detected() {
        let root = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), root.path().join("link")).unwrap();
        assert!(!is_within(&root.path().join("link/file"), root.path()));
        assert!(is_within(&root.path().join("plain/file"), root.path()));
    }

    #[test]
    fn test_path_styles() {
        assert_eq!(unix_path("source\\web"), "source/web");
        assert_eq!(windows_path("source/web"), "source\\web");
    }
}
