//! Path safety validation for archive extraction.
//!
//! Entry names come from untrusted input. Before anything is created they
//! are first resolved against the destination without touching the
//! filesystem, so names that escape it are rejected even when the
//! directories involved do not exist yet. [`ensure_contained`] then follows
//! the links that are already on disk, which catches chains of individually
//! harmless symlinks.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

use super::PathSafety;

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Length of a `X:` drive prefix, if present.
fn drive_prefix_len(name: &str) -> usize {
    let bytes = name.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        2
    } else {
        0
    }
}

fn is_absolute_name(name: &str) -> bool {
    name.starts_with(is_separator) || drive_prefix_len(name) > 0
}

/// Resolves `entry_path` below `dest` according to `policy`.
///
/// Both `/` and `\` separate components.
pub(crate) fn validate_path(entry_path: &str, dest: &Path, policy: PathSafety) -> Result<PathBuf> {
    let traversal = || Error::PathTraversal {
        path: entry_path.to_string(),
    };

    let relative = match policy {
        PathSafety::Strict if is_absolute_name(entry_path) => return Err(traversal()),
        PathSafety::Strict => entry_path,
        PathSafety::Relaxed => {
            entry_path[drive_prefix_len(entry_path)..].trim_start_matches(is_separator)
        }
    };

    let mut parts: Vec<&str> = Vec::new();
    for component in relative.split(is_separator) {
        match component {
            "" | "." => {}
            ".." if policy == PathSafety::Strict => return Err(traversal()),
            ".." => {
                if parts.pop().is_none() {
                    return Err(traversal());
                }
            }
            name => parts.push(name),
        }
    }
    if parts.is_empty() {
        return Err(traversal());
    }

    let mut full = dest.to_path_buf();
    full.extend(parts);
    Ok(full)
}

/// Checks that a symlink target stays inside the extraction directory.
///
/// The depth of the link itself is taken from `entry_path`, the name inside
/// the archive, so the check does not depend on where extraction happens.
pub(crate) fn validate_symlink_target(entry_path: &str, target: &str) -> Result<()> {
    let escape = || Error::SymlinkTargetEscape {
        path: entry_path.to_string(),
        target: target.to_string(),
    };

    // Junction targets are stored as `\??\C:\...`.
    if is_absolute_name(target) || target.starts_with("\\??\\") {
        return Err(escape());
    }

    let mut depth = entry_path
        .split(is_separator)
        .filter(|c| !c.is_empty() && *c != ".")
        .count()
        .saturating_sub(1);
    for component in target.split(is_separator) {
        match component {
            "" | "." => {}
            ".." => {
                if depth == 0 {
                    return Err(escape());
                }
                depth -= 1;
            }
            _ => depth += 1,
        }
    }
    Ok(())
}

/// Checks that `target` stays below `root` once the links already on disk
/// are followed.
///
/// Name checks alone cannot see links created by earlier entries, so the
/// deepest existing ancestor of the parent of `target` is canonicalized and
/// compared with the canonical `root`. The final component is left alone:
/// callers create or replace it. `root` is created if it does not exist.
pub(crate) fn ensure_contained(entry_path: &str, root: &Path, target: &Path) -> Result<()> {
    let canonical_root = canonical_root(root)?;
    let parent = target.parent().unwrap_or(Path::new(""));
    let resolved = resolve_existing(entry_path, parent)?;
    if !resolved.starts_with(&canonical_root) {
        log::warn!(
            "'{}' resolves to {:?}, outside {:?}",
            entry_path,
            resolved,
            canonical_root
        );
        return Err(Error::PathTraversal {
            path: entry_path.to_string(),
        });
    }
    Ok(())
}

/// Checks that an existing `source`, links included, resolves below `root`.
pub(crate) fn ensure_existing_contained(entry_path: &str, root: &Path, source: &Path) -> Result<()> {
    let canonical_root = canonical_root(root)?;
    let resolved = resolve_existing(entry_path, source)?;
    if resolved.starts_with(&canonical_root) {
        Ok(())
    } else {
        Err(Error::PathTraversal {
            path: entry_path.to_string(),
        })
    }
}

fn canonical_root(root: &Path) -> Result<PathBuf> {
    let root = if root.as_os_str().is_empty() {
        Path::new(".")
    } else {
        root
    };
    fs::create_dir_all(root).map_err(|source| Error::Create {
        path: root.to_path_buf(),
        source,
    })?;
    root.canonicalize().map_err(|source| Error::Create {
        path: root.to_path_buf(),
        source,
    })
}

/// Canonicalizes the deepest existing ancestor of `path` and appends the
/// missing components below it.
fn resolve_existing(entry_path: &str, path: &Path) -> Result<PathBuf> {
    let mut ancestor = path;
    let mut missing = Vec::new();
    loop {
        if ancestor.as_os_str().is_empty() {
            ancestor = Path::new(".");
        }
        if fs::symlink_metadata(ancestor).is_ok() {
            break;
        }
        match (ancestor.file_name(), ancestor.parent()) {
            (Some(name), Some(parent)) => {
                missing.push(name);
                ancestor = parent;
            }
            _ => {
                return Err(Error::PathTraversal {
                    path: entry_path.to_string(),
                });
            }
        }
    }

    let mut resolved = match ancestor.canonicalize() {
        Ok(resolved) => resolved,
        // A dangling link on the way; its target cannot be confined.
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(Error::PathTraversal {
                path: entry_path.to_string(),
            });
        }
        Err(source) => {
            return Err(Error::Create {
                path: ancestor.to_path_buf(),
                source,
            });
        }
    };
    resolved.extend(missing.into_iter().rev());
    Ok(resolved)
}

/// Creates a symbolic link at `link_path` pointing to `target`.
#[cfg(unix)]
pub(crate) fn create_symlink(link_path: &Path, target: &str, _target_is_dir: bool) -> Result<()> {
    std::os::unix::fs::symlink(target.replace('\\', "/"), link_path).map_err(|source| {
        Error::Create {
            path: link_path.to_path_buf(),
            source,
        }
    })
}

/// Creates a symbolic link at `link_path` pointing to `target`.
#[cfg(windows)]
pub(crate) fn create_symlink(link_path: &Path, target: &str, target_is_dir: bool) -> Result<()> {
    let target = target.replace('/', "\\");
    let result = if target_is_dir {
        std::os::windows::fs::symlink_dir(&target, link_path)
    } else {
        std::os::windows::fs::symlink_file(&target, link_path)
    };
    result.map_err(|source| Error::Create {
        path: link_path.to_path_buf(),
        source,
    })
}

/// Creates a symbolic link at `link_path` pointing to `target`.
#[cfg(not(any(unix, windows)))]
pub(crate) fn create_symlink(link_path: &Path, _target: &str, _target_is_dir: bool) -> Result<()> {
    Err(Error::Create {
        path: link_path.to_path_buf(),
        source: std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "symbolic links are not supported on this platform",
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strict(name: &str) -> Result<PathBuf> {
        validate_path(name, Path::new("/out"), PathSafety::Strict)
    }

    fn relaxed(name: &str) -> Result<PathBuf> {
        validate_path(name, Path::new("/out"), PathSafety::Relaxed)
    }

    #[test]
    fn test_plain_names() {
        assert_eq!(strict("a/b.txt").unwrap(), PathBuf::from("/out/a/b.txt"));
        assert_eq!(strict("a\\b.txt").unwrap(), PathBuf::from("/out/a/b.txt"));
        assert_eq!(strict("./a//b").unwrap(), PathBuf::from("/out/a/b"));
    }

    #[test]
    fn test_strict_rejects() {
        for name in ["/etc/passwd", "\\x", "C:\\Windows", "a/../b", "..", "", "."] {
            assert!(
                matches!(strict(name), Err(Error::PathTraversal { .. })),
                "{:?} accepted",
                name
            );
        }
    }

    #[test]
    fn test_relaxed() {
        assert_eq!(relaxed("/etc/passwd").unwrap(), PathBuf::from("/out/etc/passwd"));
        assert_eq!(relaxed("C:\\x\\y").unwrap(), PathBuf::from("/out/x/y"));
        assert_eq!(relaxed("a/../b").unwrap(), PathBuf::from("/out/b"));
        assert!(matches!(relaxed("a/../../b"), Err(Error::PathTraversal { .. })));
        assert!(matches!(relaxed("../b"), Err(Error::PathTraversal { .. })));
    }

    #[test]
    fn test_symlink_targets() {
        assert!(validate_symlink_target("link", "file.txt").is_ok());
        assert!(validate_symlink_target("dir/link", "../file.txt").is_ok());
        assert!(validate_symlink_target("a/b/link", "../../x").is_ok());
        for (entry, target) in [
            ("link", "../x"),
            ("dir/link", "../../x"),
            ("link", "/etc/passwd"),
            ("link", "C:\\Windows"),
            ("link", "\\??\\C:\\target"),
            ("dir/link", "a/../../../x"),
        ] {
            assert!(
                matches!(
                    validate_symlink_target(entry, target),
                    Err(Error::SymlinkTargetEscape { .. })
                ),
                "{} -> {} accepted",
                entry,
                target
            );
        }
    }

    #[test]
    fn test_contained_paths() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("out");
        ensure_contained("a/b/c.txt", &root, &root.join("a/b/c.txt")).unwrap();
        assert!(root.is_dir());
        ensure_contained("top.txt", &root, &root.join("top.txt")).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_links_on_disk_are_followed() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("out");
        fs::create_dir_all(&root).unwrap();
        std::os::unix::fs::symlink(".", root.join("b")).unwrap();
        std::os::unix::fs::symlink("b/..", root.join("a")).unwrap();
        std::os::unix::fs::symlink("missing", root.join("dangling")).unwrap();

        ensure_contained("b/x", &root, &root.join("b/x")).unwrap();
        assert!(matches!(
            ensure_contained("a/x", &root, &root.join("a/x")),
            Err(Error::PathTraversal { .. })
        ));
        assert!(matches!(
            ensure_contained("dangling/x", &root, &root.join("dangling/x")),
            Err(Error::PathTraversal { .. })
        ));

        fs::write(dir.path().join("secret.txt"), b"s").unwrap();
        assert!(matches!(
            ensure_existing_contained("c", &root, &root.join("a/secret.txt")),
            Err(Error::PathTraversal { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_create_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("link");
        create_symlink(&link, "target.txt", false).unwrap();
        assert_eq!(
            std::fs::read_link(&link).unwrap(),
            PathBuf::from("target.txt")
        );
        assert!(matches!(
            create_symlink(&link, "other", false),
            Err(Error::Create { .. })
        ));
    }
}
