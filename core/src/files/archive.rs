//! Gzip-compressed tar bundles for multi-path downloads.
//!
//! Every input is stored under its basename only, so two inputs with the
//! same basename produce two entries with the same name. The whole archive
//! is assembled in memory; a failure part-way through yields no bytes.

use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;

use crate::errors::{map_io_error, FileError};

/// Build a `.tar.gz` archive containing `paths`.
///
/// Directories are added with their full subtree. Symlinks are stored as
/// links, not followed.
pub fn build<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<u8>, FileError> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut tar = tar::Builder::new(encoder);
    tar.follow_symlinks(false);

    for path in paths {
        let path = path.as_ref();
        let display = path.to_string_lossy().to_string();
        let metadata = std::fs::symlink_metadata(path).map_err(|e| map_io_error(e, &display))?;
        let name = path
            .file_name()
            .ok_or_else(|| FileError::BadRequest(format!("{display}: no basename to archive")))?;

        if metadata.is_dir() {
            tar.append_dir_all(name, path)
                .map_err(|e| map_io_error(e, &display))?;
        } else {
            tar.append_path_with_name(path, name)
                .map_err(|e| map_io_error(e, &display))?;
        }
    }

    let encoder = tar
        .into_inner()
        .map_err(|e| FileError::BadRequest(format!("finalising archive: {e}")))?;
    let bytes = encoder
        .finish()
        .map_err(|e| FileError::BadRequest(format!("compressing archive: {e}")))?;

    debug!("Built archive of {} path(s), {} bytes", paths.len(), bytes.len());
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use tempfile::TempDir;

    fn entry_names(bytes: &[u8]) -> Vec<String> {
        let mut archive = tar::Archive::new(GzDecoder::new(bytes));
        archive
            .entries()
            .unwrap()
            .map(|e| {
                e.unwrap()
                    .path()
                    .unwrap()
                    .to_string_lossy()
                    .trim_end_matches('/')
                    .to_string()
            })
            .collect()
    }

    #[test]
    fn entries_are_named_by_basename() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, "hello").unwrap();
        let sub = dir.path().join("nested").join("photos");
        std::fs::create_dir_all(&sub).unwrap();
        std::fs::write(sub.join("cat.jpg"), "meow").unwrap();

        let bytes = build(&[&file, &sub]).unwrap();
        let names = entry_names(&bytes);

        assert!(names.contains(&"notes.txt".to_string()));
        assert!(names.contains(&"photos".to_string()));
        assert!(names.contains(&"photos/cat.jpg".to_string()));
        assert!(!names.iter().any(|n| n.contains("nested")));
    }

    #[test]
    fn archive_is_gzip() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "a").unwrap();

        let bytes = build(&[&file]).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn missing_input_fails_whole_archive() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "a").unwrap();
        let missing = dir.path().join("gone.txt");

        let result = build(&[&file, &missing]);
        assert!(matches!(result, Err(FileError::NotFound(_))));
    }
}
