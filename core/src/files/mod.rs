pub mod archive;
pub mod duplicate;
pub mod local;
pub mod manager;
pub mod stats;
pub mod utils;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Attributes of one file or directory, recomputed on every request.
///
/// `is_file` is the negation of "is a directory", and `has_child` is
/// always `false` for files. Field names are serialized as camelCase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathEntry {
    pub name: String,
    pub path: String,
    /// Parent directory with a trailing separator.
    pub filter_path: String,
    /// Raw inode size; not recursive for directories.
    pub size: u64,
    pub is_file: bool,
    pub has_child: bool,
    pub date_created: DateTime<Utc>,
    pub date_modified: DateTime<Utc>,
    /// Extension with its leading dot, `""` when absent.
    #[serde(rename = "type")]
    pub file_type: String,
    /// Platform mode bits, `0` where not available.
    pub mode: u32,
}
