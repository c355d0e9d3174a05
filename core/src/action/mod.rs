//! Structured action requests and their outcomes.

pub mod dispatch;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorKind, FileError};
use crate::files::manager::Details;
use crate::files::PathEntry;

// ── Requests ────────────────────────────────────────────────────────

/// One filesystem intent, tagged by its `action` field.
///
/// Unknown fields are ignored; missing required fields fail to parse.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ActionRequest {
    Read(ReadAction),
    Create(CreateAction),
    Delete(DeleteAction),
    Rename(RenameAction),
    Search(SearchAction),
    Details(TargetsAction),
    Copy(TransferAction),
    Move(TransferAction),
    Download(TargetsAction),
    Upload(UploadAction),
}

impl ActionRequest {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Read(_) => "read",
            Self::Create(_) => "create",
            Self::Delete(_) => "delete",
            Self::Rename(_) => "rename",
            Self::Search(_) => "search",
            Self::Details(_) => "details",
            Self::Copy(_) => "copy",
            Self::Move(_) => "move",
            Self::Download(_) => "download",
            Self::Upload(_) => "upload",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadAction {
    pub path: String,
    #[serde(default)]
    pub show_hidden_items: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAction {
    pub path: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAction {
    pub path: String,
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameAction {
    pub path: String,
    pub name: String,
    pub new_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchAction {
    pub path: String,
    pub search_string: String,
    #[serde(default)]
    pub show_hidden_items: bool,
    #[serde(default)]
    pub case_sensitive: bool,
}

/// A path reference inside `data` arrays; other fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct PathRef {
    pub path: String,
}

/// Targets given either as `data[].path` or as `names` under `path`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetsAction {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub data: Vec<PathRef>,
}

impl TargetsAction {
    /// Resolve to absolute paths; `data` wins over `names`.
    pub fn paths(&self) -> Vec<PathBuf> {
        if !self.data.is_empty() {
            return self.data.iter().map(|d| PathBuf::from(&d.path)).collect();
        }
        match &self.path {
            Some(dir) => self.names.iter().map(|n| Path::new(dir).join(n)).collect(),
            None => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferAction {
    pub path: String,
    pub target_path: String,
    pub names: Vec<String>,
    /// Names the caller allows to be renamed on collision.
    #[serde(default)]
    pub rename_files: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAction {
    pub path: String,
    pub name: String,
    /// Base64 file content.
    #[serde(default, with = "base64_bytes")]
    pub content: Vec<u8>,
}

// ── Results ─────────────────────────────────────────────────────────

/// A file payload for download or preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Download {
    pub filename: String,
    pub mime_type: String,
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
}

/// Byte buffers as base64 strings in JSON.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        STANDARD
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Success payloads. Also the shape that crosses the impersonation pipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionReply {
    /// Read and search: the directory itself plus its (filtered) entries.
    Listing { cwd: PathEntry, files: Vec<PathEntry> },
    /// Create, rename, copy and conflict-free move.
    Entries { files: Vec<PathEntry> },
    /// Delete: the paths that were removed.
    Removed { paths: Vec<String> },
    Details(Details),
    Download(Download),
    /// Upload: where the content was written.
    Saved { path: String },
}

/// Caller-facing error body: `{code, message}` plus conflict details.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionError {
    #[serde(skip)]
    pub kind: ErrorKind,
    pub code: u16,
    pub message: String,
    /// Names a move skipped because they already existed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub file_exists: Vec<String>,
    /// Entries a partially conflicting move did transfer.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<PathEntry>,
}

impl ActionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: kind.code(),
            message: message.into(),
            file_exists: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Partial-success carrier for a move with conflicts.
    pub fn conflict(file_exists: Vec<String>, files: Vec<PathEntry>) -> Self {
        Self {
            file_exists,
            files,
            ..Self::new(ErrorKind::Conflict, ErrorKind::Conflict.as_str())
        }
    }
}

impl From<FileError> for ActionError {
    fn from(e: FileError) -> Self {
        let kind = e.kind();
        let message = match kind {
            ErrorKind::AlreadyExists | ErrorKind::BadRequest => e.detail().to_string(),
            _ => kind.as_str().to_string(),
        };
        Self::new(kind, message)
    }
}

/// Either a success payload or a typed error, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Success(ActionReply),
    Error(ActionError),
}

impl From<Result<ActionReply, FileError>> for ActionOutcome {
    fn from(result: Result<ActionReply, FileError>) -> Self {
        match result {
            Ok(reply) => Self::Success(reply),
            Err(e) => Self::Error(e.into()),
        }
    }
}
