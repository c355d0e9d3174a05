use serde::{Deserialize, Serialize};

// ── initialize ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct InitializeParams {
    pub protocol_version: String,
    pub client: String,
    pub client_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
    pub methods: Vec<String>,
    pub actions: Vec<String>,
    /// Whether `user` in request params switches the OS identity.
    pub impersonation: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitializeResult {
    pub protocol_version: String,
    pub agent_version: String,
    pub capabilities: Capabilities,
}

// ── fm.action ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ActionParams {
    #[serde(default)]
    pub user: Option<String>,
    /// The action body, tagged by its own `action` field.
    pub action: serde_json::Value,
}

// ── fm.download ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadParams {
    #[serde(default)]
    pub user: Option<String>,
    pub paths: Vec<String>,
}

/// File payload; `data` is base64.
#[derive(Debug, Clone, Serialize)]
pub struct FilePayload {
    pub filename: String,
    pub mime_type: String,
    pub data: String,
}

// ── fm.upload / fm.upload.cancel ────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct UploadParams {
    #[serde(default)]
    pub user: Option<String>,
    pub path: String,
    pub filename: String,
    /// Base64 file content.
    pub data: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadCancelParams {
    #[serde(default)]
    pub user: Option<String>,
    pub path: String,
    pub filename: String,
}

// ── fm.image ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ImageParams {
    #[serde(default)]
    pub user: Option<String>,
    pub path: String,
}

// ── health.check ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub status: String,
    pub uptime_secs: u64,
}
