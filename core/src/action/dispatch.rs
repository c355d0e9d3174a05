//! Single entry point of the engine.
//!
//! Each request is validated before anything touches the filesystem, then
//! routed to [`FileManager`] calls that all run inside one `run_as` scope
//! for the caller. Fan-out actions run sequentially in request order.

use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{ActionError, ActionOutcome, ActionReply, ActionRequest, Download, TransferAction};
use crate::config::EngineConfig;
use crate::errors::{ErrorKind, FileError};
use crate::files::local::Filesystem;
use crate::files::manager::{FileManager, SearchFilter, TransferMode, TransferReport};
use crate::files::utils::{image_mime_for, mime_for, sanitize_filename};
use crate::identity::{Identity, Impersonator};

/// What a routed action produced inside the impersonation scope.
#[derive(Debug, Serialize, Deserialize)]
enum Routed {
    Reply(ActionReply),
    /// A move that skipped at least one conflicting name.
    Partial(TransferReport),
}

pub struct ActionDispatcher {
    manager: FileManager,
    impersonator: Impersonator,
}

impl ActionDispatcher {
    pub fn new(config: EngineConfig) -> Self {
        let fs = Filesystem::new().with_max_duplicates(config.max_duplicates);
        Self {
            manager: FileManager::new(fs),
            impersonator: Impersonator::new(&config),
        }
    }

    /// Parse a JSON action body and dispatch it.
    pub fn dispatch_value(&self, payload: Value, caller: &Identity) -> ActionOutcome {
        match serde_json::from_value::<ActionRequest>(payload) {
            Ok(request) => self.dispatch(request, caller),
            Err(e) => {
                warn!("Rejected action request: {e}");
                ActionOutcome::Error(ActionError::new(
                    ErrorKind::BadRequest,
                    format!("Invalid action request: {e}"),
                ))
            }
        }
    }

    pub fn dispatch(&self, request: ActionRequest, caller: &Identity) -> ActionOutcome {
        debug!(
            "Dispatching {} as {}",
            request.name(),
            caller.username.as_deref().unwrap_or("<service>")
        );

        if let Err(e) = validate(&request) {
            return ActionOutcome::Error(e.into());
        }

        match self.impersonator.run_as(caller, || self.route(&request)) {
            Ok(Routed::Reply(reply)) => ActionOutcome::Success(reply),
            Ok(Routed::Partial(report)) => {
                info!("Move finished with {} conflict(s)", report.conflicts.len());
                ActionOutcome::Error(ActionError::conflict(report.conflicts, report.files))
            }
            Err(e) => {
                debug!("{} failed: {}", request.name(), e);
                ActionOutcome::Error(e.into())
            }
        }
    }

    /// Raw file for a single regular file; a `.tar.gz` otherwise.
    pub fn build_download(
        &self,
        paths: &[PathBuf],
        caller: &Identity,
    ) -> Result<Download, ActionError> {
        check_targets(paths)?;
        self.impersonator
            .run_as(caller, || self.download(paths))
            .map_err(ActionError::from)
    }

    /// Write `content` to `dir/filename` after sanitising the filename.
    pub fn save_upload<R: Read>(
        &self,
        dir: &Path,
        filename: &str,
        content: R,
        caller: &Identity,
    ) -> Result<PathBuf, ActionError> {
        check_absolute(dir)?;
        let name = upload_name(filename)?;
        let fs = self.manager.filesystem();
        self.impersonator
            .run_as(caller, move || fs.save_upload(dir, &name, content))
            .map_err(ActionError::from)
    }

    /// Remove a partially uploaded file; a missing file is not an error.
    pub fn cancel_upload(
        &self,
        dir: &Path,
        filename: &str,
        caller: &Identity,
    ) -> Result<(), ActionError> {
        check_absolute(dir)?;
        let path = dir.join(upload_name(filename)?);
        let fs = self.manager.filesystem();
        self.impersonator
            .run_as(caller, || {
                if fs.exists(&path) {
                    fs.delete(&path)?;
                }
                Ok(())
            })
            .map_err(ActionError::from)
    }

    /// Bytes and image MIME type of an existing file.
    pub fn read_image(&self, path: &Path, caller: &Identity) -> Result<Download, ActionError> {
        check_absolute(path)?;
        let fs = self.manager.filesystem();
        self.impersonator
            .run_as(caller, || {
                let display = path.to_string_lossy().to_string();
                if !fs.exists(path) {
                    return Err(FileError::NotFound(display));
                }
                if !fs.is_file(path) {
                    return Err(FileError::BadRequest(format!("{display}: not a file")));
                }
                Ok(Download {
                    filename: basename(path),
                    mime_type: image_mime_for(path).to_string(),
                    bytes: fs.read(path)?,
                })
            })
            .map_err(ActionError::from)
    }

    fn route(&self, request: &ActionRequest) -> Result<Routed, FileError> {
        let mgr = &self.manager;
        let reply = match request {
            ActionRequest::Read(r) => {
                let dir = Path::new(&r.path);
                ActionReply::Listing {
                    cwd: mgr.stat(dir)?,
                    files: mgr.list(dir, r.show_hidden_items, None)?,
                }
            }
            ActionRequest::Search(s) => {
                let dir = Path::new(&s.path);
                let filter = SearchFilter::new(&s.search_string, s.case_sensitive)?;
                ActionReply::Listing {
                    cwd: mgr.stat(dir)?,
                    files: mgr.list(dir, s.show_hidden_items, Some(&filter))?,
                }
            }
            ActionRequest::Create(c) => ActionReply::Entries {
                files: vec![mgr.create_dir(Path::new(&c.path), &c.name)?],
            },
            ActionRequest::Delete(d) => ActionReply::Removed {
                paths: mgr.delete_all(Path::new(&d.path), &d.names)?,
            },
            ActionRequest::Rename(r) => ActionReply::Entries {
                files: vec![mgr.rename_in(Path::new(&r.path), &r.name, &r.new_name)?],
            },
            ActionRequest::Details(t) => ActionReply::Details(mgr.details(&t.paths())?),
            ActionRequest::Copy(t) => ActionReply::Entries {
                files: self.transfer(TransferMode::Copy, t)?.files,
            },
            ActionRequest::Move(t) => {
                let report = self.transfer(TransferMode::Move, t)?;
                if !report.conflicts.is_empty() {
                    return Ok(Routed::Partial(report));
                }
                ActionReply::Entries {
                    files: report.files,
                }
            }
            ActionRequest::Download(t) => ActionReply::Download(self.download(&t.paths())?),
            ActionRequest::Upload(u) => {
                let name = upload_name(&u.name)?;
                let saved = mgr
                    .filesystem()
                    .save_upload(Path::new(&u.path), &name, u.content.as_slice())?;
                ActionReply::Saved {
                    path: saved.to_string_lossy().to_string(),
                }
            }
        };
        Ok(Routed::Reply(reply))
    }

    fn transfer(
        &self,
        mode: TransferMode,
        t: &TransferAction,
    ) -> Result<TransferReport, FileError> {
        self.manager.transfer(
            mode,
            Path::new(&t.path),
            &t.names,
            Path::new(&t.target_path),
            &t.rename_files,
        )
    }

    fn download(&self, paths: &[PathBuf]) -> Result<Download, FileError> {
        let fs = self.manager.filesystem();
        if let [single] = paths {
            if fs.is_file(single) {
                return Ok(Download {
                    filename: basename(single),
                    mime_type: mime_for(single).to_string(),
                    bytes: fs.read(single)?,
                });
            }
        }

        let bytes = fs.archive(paths)?;
        let filename = match paths {
            [single] if !basename(single).is_empty() => format!("{}.tar.gz", basename(single)),
            _ => "files.tar.gz".to_string(),
        };
        Ok(Download {
            filename,
            mime_type: "application/gzip".to_string(),
            bytes,
        })
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn upload_name(raw: &str) -> Result<String, FileError> {
    sanitize_filename(raw)
        .ok_or_else(|| FileError::BadRequest(format!("invalid upload filename: {raw:?}")))
}

// ── Validation ──────────────────────────────────────────────────────

fn validate(request: &ActionRequest) -> Result<(), FileError> {
    match request {
        ActionRequest::Read(r) => check_absolute(Path::new(&r.path)),
        ActionRequest::Search(s) => check_absolute(Path::new(&s.path)),
        ActionRequest::Create(c) => {
            check_absolute(Path::new(&c.path))?;
            check_name(&c.name)
        }
        ActionRequest::Delete(d) => {
            check_absolute(Path::new(&d.path))?;
            check_names(&d.names)
        }
        ActionRequest::Rename(r) => {
            check_absolute(Path::new(&r.path))?;
            check_name(&r.name)?;
            check_name(&r.new_name)
        }
        ActionRequest::Copy(t) | ActionRequest::Move(t) => {
            check_absolute(Path::new(&t.path))?;
            check_absolute(Path::new(&t.target_path))?;
            check_names(&t.names)
        }
        ActionRequest::Details(t) | ActionRequest::Download(t) => check_targets(&t.paths()),
        ActionRequest::Upload(u) => {
            check_absolute(Path::new(&u.path))?;
            upload_name(&u.name).map(|_| ())
        }
    }
}

fn check_absolute(path: &Path) -> Result<(), FileError> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(FileError::BadRequest(format!(
            "path must be absolute: {}",
            path.display()
        )))
    }
}

/// A name must be exactly one path component.
fn check_name(name: &str) -> Result<(), FileError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\0');
    if valid {
        Ok(())
    } else {
        Err(FileError::BadRequest(format!("invalid name: {name:?}")))
    }
}

fn check_names(names: &[String]) -> Result<(), FileError> {
    if names.is_empty() {
        return Err(FileError::BadRequest("Missing names".to_string()));
    }
    names.iter().try_for_each(|n| check_name(n))
}

fn check_targets(paths: &[PathBuf]) -> Result<(), FileError> {
    if paths.is_empty() {
        return Err(FileError::BadRequest("Missing data".to_string()));
    }
    paths.iter().try_for_each(|p| check_absolute(p))
}
