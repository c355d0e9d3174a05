//! Non-colliding destination names: `file.txt`, `file (1).txt`, `file (2).txt`, ...
//!
//! Each candidate name gets a plain existence check. A concurrent writer can claim the
//! returned name before the caller uses it; nothing here guards that gap.

use std::path::{Path, PathBuf};

use crate::errors::FileError;

/// Return the first free path under `dir` for `name`.
///
/// `name` itself is returned unchanged when free. Otherwise the counter
/// is inserted before the extension (split on the last `.`). The search
/// is unbounded; see [`resolve_bounded`] for a capped variant.
pub fn resolve(dir: &Path, name: &str) -> PathBuf {
    let (base, ext) = split_name(name);
    let mut candidate = dir.join(name);
    let mut n: u64 = 1;
    while path_taken(&candidate) {
        candidate = dir.join(format!("{base} ({n}){ext}"));
        n += 1;
    }
    candidate
}

/// Like [`resolve`], but gives up with `Conflict` after `limit` counters.
pub fn resolve_bounded(dir: &Path, name: &str, limit: u32) -> Result<PathBuf, FileError> {
    let candidate = dir.join(name);
    if !path_taken(&candidate) {
        return Ok(candidate);
    }
    let (base, ext) = split_name(name);
    for n in 1..=limit {
        let candidate = dir.join(format!("{base} ({n}){ext}"));
        if !path_taken(&candidate) {
            return Ok(candidate);
        }
    }
    Err(FileError::Conflict(format!(
        "no free name for {name} in {} after {limit} attempts",
        dir.display()
    )))
}

/// Split on the last dot, keeping it with the extension.
///
/// A leading dot belongs to the base, so `.bashrc` has no extension.
fn split_name(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && !name[..idx].chars().all(|c| c == '.') => {
            (&name[..idx], &name[idx..])
        }
        _ => (name, ""),
    }
}

/// Existence check that also counts dangling symlinks as taken.
fn path_taken(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn free_name_is_unchanged() {
        let dir = TempDir::new().unwrap();
        assert_eq!(resolve(dir.path(), "file.txt"), dir.path().join("file.txt"));
    }

    #[test]
    fn counter_is_monotonic_and_gap_free() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("file.txt"), "").unwrap();
        assert_eq!(
            resolve(dir.path(), "file.txt"),
            dir.path().join("file (1).txt")
        );

        std::fs::write(dir.path().join("file (1).txt"), "").unwrap();
        assert_eq!(
            resolve(dir.path(), "file.txt"),
            dir.path().join("file (2).txt")
        );
    }

    #[test]
    fn names_without_extension() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("photos")).unwrap();
        assert_eq!(resolve(dir.path(), "photos"), dir.path().join("photos (1)"));

        std::fs::write(dir.path().join(".env"), "").unwrap();
        assert_eq!(resolve(dir.path(), ".env"), dir.path().join(".env (1)"));
    }

    #[test]
    fn extension_splits_on_last_dot() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("backup.tar.gz"), "").unwrap();
        assert_eq!(
            resolve(dir.path(), "backup.tar.gz"),
            dir.path().join("backup.tar (1).gz")
        );
    }

    #[test]
    fn bounded_resolution_gives_up() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        std::fs::write(dir.path().join("a (1).txt"), "").unwrap();

        let result = resolve_bounded(dir.path(), "a.txt", 1);
        assert!(matches!(result, Err(FileError::Conflict(_))));

        let result = resolve_bounded(dir.path(), "a.txt", 2).unwrap();
        assert_eq!(result, dir.path().join("a (2).txt"));
    }
}
