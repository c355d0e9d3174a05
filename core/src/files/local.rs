//! Base filesystem operations against the local host.
//!
//! Every call runs with whatever identity the current process has; the
//! impersonation layer decides which identity that is before any of these
//! functions touch the filesystem.
//!
//! Multi-step operations (resolve a free name, then move into it) check and
//! act without locking. A concurrent writer can invalidate the check.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{archive, duplicate, stats, PathEntry};
use crate::errors::{map_io_error, FileError};

/// Filesystem operations returning raw paths and OS-level results.
#[derive(Debug, Clone, Default)]
pub struct Filesystem {
    max_duplicates: Option<u32>,
}

impl Filesystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the duplicate-name counter used by move and copy.
    pub fn with_max_duplicates(mut self, limit: Option<u32>) -> Self {
        self.max_duplicates = limit;
        self
    }

    /// Entries of `dir` in OS order, hiding dot-files unless `show_hidden`.
    pub fn list(&self, dir: &Path, show_hidden: bool) -> Result<Vec<PathBuf>, FileError> {
        let display = display(dir);
        let entries = std::fs::read_dir(dir).map_err(|e| map_io_error(e, &display))?;

        let mut result = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| map_io_error(e, &display))?;
            if !show_hidden && entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            result.push(entry.path());
        }
        Ok(result)
    }

    pub fn stat(&self, path: &Path) -> Result<PathEntry, FileError> {
        stats::stat(path)
    }

    /// Whether anything, including a dangling symlink, exists at `path`.
    pub fn exists(&self, path: &Path) -> bool {
        std::fs::symlink_metadata(path).is_ok()
    }

    pub fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    /// Create the directory `parent/name`.
    pub fn create_dir(&self, parent: &Path, name: &str) -> Result<PathEntry, FileError> {
        let path = parent.join(name);
        std::fs::create_dir(&path).map_err(|e| map_io_error(e, &display(&path)))?;
        stats::stat(&path)
    }

    /// Create a new file holding `content`; an existing file is an error.
    pub fn create_file(&self, path: &Path, content: &[u8]) -> Result<(), FileError> {
        use std::io::Write;

        let display = display(path);
        let mut file = File::options()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| map_io_error(e, &display))?;
        file.write_all(content).map_err(|e| map_io_error(e, &display))
    }

    /// Remove a file or an empty directory. Never recursive.
    pub fn delete(&self, path: &Path) -> Result<(), FileError> {
        let display = display(path);
        let metadata = std::fs::symlink_metadata(path).map_err(|e| map_io_error(e, &display))?;
        if metadata.is_dir() {
            std::fs::remove_dir(path).map_err(|e| map_io_error(e, &display))
        } else {
            std::fs::remove_file(path).map_err(|e| map_io_error(e, &display))
        }
    }

    /// Unconditional rename; the OS error surfaces as-is.
    pub fn rename(&self, src: &Path, dst: &Path) -> Result<(), FileError> {
        std::fs::rename(src, dst).map_err(|e| map_io_error(e, &display(src)))
    }

    /// Move `src` into `dst_dir` under a free name and return the final path.
    pub fn move_into(&self, src: &Path, dst_dir: &Path) -> Result<PathBuf, FileError> {
        let name = self.check_transfer(src, dst_dir)?;
        let dst = self.free_name(dst_dir, &name)?;

        match std::fs::rename(src, &dst) {
            Ok(()) => {}
            Err(e) if is_cross_device(&e) => {
                debug!("Cross-device move of {}, copying instead", src.display());
                copy_tree(src, &dst)?;
                remove_tree(src)?;
            }
            Err(e) => return Err(map_io_error(e, &display(src))),
        }
        Ok(dst)
    }

    /// Copy `src` into `dst_dir` under a free name and return the final path.
    ///
    /// Directories are copied recursively.
    pub fn copy_into(&self, src: &Path, dst_dir: &Path) -> Result<PathBuf, FileError> {
        let name = self.check_transfer(src, dst_dir)?;
        let dst = self.free_name(dst_dir, &name)?;
        copy_tree(src, &dst)?;
        Ok(dst)
    }

    /// Write an uploaded stream to `dir/filename`, replacing any existing file.
    pub fn save_upload<R: Read>(
        &self,
        dir: &Path,
        filename: &str,
        mut content: R,
    ) -> Result<PathBuf, FileError> {
        let path = dir.join(filename);
        let shown = display(&path);
        let mut file = File::create(&path).map_err(|e| map_io_error(e, &shown))?;
        let written = std::io::copy(&mut content, &mut file).map_err(|e| map_io_error(e, &shown))?;
        debug!("Saved upload {} ({} bytes)", shown, written);
        Ok(path)
    }

    pub fn read(&self, path: &Path) -> Result<Vec<u8>, FileError> {
        std::fs::read(path).map_err(|e| map_io_error(e, &display(path)))
    }

    pub fn archive(&self, paths: &[PathBuf]) -> Result<Vec<u8>, FileError> {
        archive::build(paths)
    }

    fn free_name(&self, dir: &Path, name: &str) -> Result<PathBuf, FileError> {
        match self.max_duplicates {
            Some(limit) => duplicate::resolve_bounded(dir, name, limit),
            None => Ok(duplicate::resolve(dir, name)),
        }
    }

    /// Validate a move/copy pair and return the source basename.
    fn check_transfer(&self, src: &Path, dst_dir: &Path) -> Result<String, FileError> {
        let source =
            std::fs::symlink_metadata(src).map_err(|e| map_io_error(e, &display(src)))?;
        let target = std::fs::metadata(dst_dir).map_err(|e| map_io_error(e, &display(dst_dir)))?;
        if !target.is_dir() {
            return Err(FileError::NotFound(display(dst_dir)));
        }

        // A symlink transfers as the link itself, so only real directories nest.
        if source.is_dir() {
            if let (Ok(src_real), Ok(dst_real)) = (src.canonicalize(), dst_dir.canonicalize()) {
                if dst_real.starts_with(&src_real) {
                    return Err(FileError::BadRequest(format!(
                        "cannot transfer {} into itself",
                        src.display()
                    )));
                }
            }
        }

        src.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| FileError::BadRequest(format!("{}: no file name", src.display())))
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

#[cfg(unix)]
fn is_cross_device(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(libc::EXDEV)
}

#[cfg(not(unix))]
fn is_cross_device(_e: &std::io::Error) -> bool {
    false
}

fn map_walk_error(e: walkdir::Error, root: &Path) -> FileError {
    let path = e
        .path()
        .map(display)
        .unwrap_or_else(|| display(root));
    match e.into_io_error() {
        Some(io) => map_io_error(io, &path),
        None => FileError::BadRequest(format!("{path}: filesystem loop")),
    }
}

/// Copy a file, symlink or directory tree from `src` to the new path `dst`.
///
/// Directory permissions are applied once their contents are written.
fn copy_tree(src: &Path, dst: &Path) -> Result<(), FileError> {
    let mut dir_perms = Vec::new();
    for entry in walkdir::WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| map_walk_error(e, src))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| FileError::BadRequest(e.to_string()))?;
        let target = if rel.as_os_str().is_empty() {
            dst.to_path_buf()
        } else {
            dst.join(rel)
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            std::fs::create_dir(&target).map_err(|e| map_io_error(e, &display(&target)))?;
            let perms = entry
                .metadata()
                .map_err(|e| map_walk_error(e, src))?
                .permissions();
            dir_perms.push((target, perms));
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            copy_file(entry.path(), &target)?;
        }
    }

    for (dir, perms) in dir_perms.into_iter().rev() {
        std::fs::set_permissions(&dir, perms).map_err(|e| map_io_error(e, &display(&dir)))?;
    }
    Ok(())
}

/// Copy contents and permission bits, then carry over the modification time.
fn copy_file(src: &Path, dst: &Path) -> Result<(), FileError> {
    std::fs::copy(src, dst).map_err(|e| map_io_error(e, &display(src)))?;
    let modified = std::fs::metadata(src).and_then(|m| m.modified());
    if let Ok(modified) = modified {
        let synced = File::options()
            .write(true)
            .open(dst)
            .and_then(|f| f.set_modified(modified));
        if let Err(e) = synced {
            debug!("Could not preserve mtime on {}: {}", dst.display(), e);
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<(), FileError> {
    let link = std::fs::read_link(src).map_err(|e| map_io_error(e, &display(src)))?;
    std::os::unix::fs::symlink(&link, dst).map_err(|e| map_io_error(e, &display(dst)))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> Result<(), FileError> {
    copy_file(src, dst)
}

fn remove_tree(path: &Path) -> Result<(), FileError> {
    let display = display(path);
    let metadata = std::fs::symlink_metadata(path).map_err(|e| map_io_error(e, &display))?;
    if metadata.is_dir() {
        std::fs::remove_dir_all(path).map_err(|e| map_io_error(e, &display))
    } else {
        std::fs::remove_file(path).map_err(|e| map_io_error(e, &display))
    }
}
