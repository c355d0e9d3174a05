use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use fileward_core::files::manager::Details;
use fileward_core::files::PathEntry;
use fileward_core::{
    ActionDispatcher, ActionError, ActionOutcome, ActionReply, Download, EngineConfig, Identity,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::task::JoinError;
use tracing::{debug, error, warn};

use crate::protocol::errors;
use crate::protocol::messages::{JsonRpcErrorResponse, JsonRpcRequest, JsonRpcResponse};
use crate::protocol::methods::{
    ActionParams, Capabilities, DownloadParams, FilePayload, HealthCheckResult, ImageParams,
    InitializeParams, InitializeResult, UploadCancelParams, UploadParams, UploadResult,
};

/// The agent's protocol version.
const AGENT_PROTOCOL_VERSION: &str = "0.1.0";

const METHODS: [&str; 7] = [
    "initialize",
    "health.check",
    "fm.action",
    "fm.download",
    "fm.upload",
    "fm.upload.cancel",
    "fm.image",
];

const ACTIONS: [&str; 10] = [
    "read", "create", "delete", "rename", "search", "details", "copy", "move", "download",
    "upload",
];

/// Dispatcher handles incoming JSON-RPC requests and routes them
/// to the file engine.
pub struct Dispatcher {
    engine: Arc<ActionDispatcher>,
    impersonate: bool,
    initialized: bool,
    start_time: Instant,
}

/// The result of dispatching a request: either a success or error response.
pub enum DispatchResult {
    Success(JsonRpcResponse),
    Error(JsonRpcErrorResponse),
}

impl DispatchResult {
    /// Serialize the result to a JSON `Value`.
    pub fn to_json(&self) -> Value {
        let value = match self {
            Self::Success(resp) => serde_json::to_value(resp),
            Self::Error(resp) => serde_json::to_value(resp),
        };
        value.unwrap_or_else(|e| {
            json!({
                "jsonrpc": "2.0",
                "error": {"code": errors::INTERNAL_ERROR, "message": e.to_string()},
                "id": null
            })
        })
    }
}

/// `fm.action` success payloads as the client sees them.
#[derive(Serialize)]
#[serde(untagged)]
enum ActionResult {
    Listing { cwd: PathEntry, files: Vec<PathEntry> },
    Entries { files: Vec<PathEntry> },
    Removed { paths: Vec<String> },
    Details { details: Details },
    File(FilePayload),
    Saved { path: String },
}

impl From<ActionReply> for ActionResult {
    fn from(reply: ActionReply) -> Self {
        match reply {
            ActionReply::Listing { cwd, files } => Self::Listing { cwd, files },
            ActionReply::Entries { files } => Self::Entries { files },
            ActionReply::Removed { paths } => Self::Removed { paths },
            ActionReply::Details(details) => Self::Details { details },
            ActionReply::Download(download) => Self::File(file_payload(download)),
            ActionReply::Saved { path } => Self::Saved { path },
        }
    }
}

impl Dispatcher {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            impersonate: config.impersonate,
            engine: Arc::new(ActionDispatcher::new(config)),
            initialized: false,
            start_time: Instant::now(),
        }
    }

    /// Dispatch a parsed JSON-RPC request to the appropriate handler.
    pub async fn dispatch(&mut self, request: JsonRpcRequest) -> DispatchResult {
        let id = request.id.clone();
        let method = request.method.as_str();

        debug!("Dispatching method: {}", method);

        // The `initialize` method is always allowed
        if method == "initialize" {
            return self.handle_initialize(request);
        }

        if !self.initialized {
            return DispatchResult::Error(JsonRpcErrorResponse::new(
                id,
                errors::NOT_INITIALIZED,
                "Agent not initialized, call 'initialize' first",
            ));
        }

        match method {
            "health.check" => self.handle_health_check(request),
            "fm.action" => self.handle_action(request).await,
            "fm.download" => self.handle_download(request).await,
            "fm.upload" => self.handle_upload(request).await,
            "fm.upload.cancel" => self.handle_upload_cancel(request).await,
            "fm.image" => self.handle_image(request).await,
            _ => {
                warn!("Unknown method: {}", method);
                DispatchResult::Error(JsonRpcErrorResponse::new(
                    id,
                    errors::METHOD_NOT_FOUND,
                    format!("Method not found: {method}"),
                ))
            }
        }
    }

    fn handle_initialize(&mut self, request: JsonRpcRequest) -> DispatchResult {
        let id = request.id.clone();
        let params: InitializeParams = match parse_params(&request) {
            Ok(p) => p,
            Err(e) => return e,
        };

        // Version negotiation: we only support major version 0
        let major = params
            .protocol_version
            .split('.')
            .next()
            .and_then(|s| s.parse::<u32>().ok());

        if major != Some(0) {
            return DispatchResult::Error(JsonRpcErrorResponse::new(
                id,
                errors::VERSION_NOT_SUPPORTED,
                format!(
                    "Unsupported protocol version: {} (agent supports 0.x)",
                    params.protocol_version
                ),
            ));
        }

        debug!("Initialized by {} {}", params.client, params.client_version);
        self.initialized = true;

        success(
            id,
            InitializeResult {
                protocol_version: AGENT_PROTOCOL_VERSION.to_string(),
                agent_version: env!("CARGO_PKG_VERSION").to_string(),
                capabilities: Capabilities {
                    methods: METHODS.iter().map(|m| m.to_string()).collect(),
                    actions: ACTIONS.iter().map(|a| a.to_string()).collect(),
                    impersonation: self.impersonate,
                },
            },
        )
    }

    fn handle_health_check(&self, request: JsonRpcRequest) -> DispatchResult {
        success(
            request.id,
            HealthCheckResult {
                status: "ok".to_string(),
                uptime_secs: self.start_time.elapsed().as_secs(),
            },
        )
    }

    async fn handle_action(&self, request: JsonRpcRequest) -> DispatchResult {
        let id = request.id.clone();
        let params: ActionParams = match parse_params(&request) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let caller = identity(params.user);

        let outcome = self
            .run_blocking(move |engine| engine.dispatch_value(params.action, &caller))
            .await;
        match outcome {
            Ok(ActionOutcome::Success(reply)) => success(id, ActionResult::from(reply)),
            Ok(ActionOutcome::Error(err)) => action_error(id, err),
            Err(e) => join_failed(id, e),
        }
    }

    async fn handle_download(&self, request: JsonRpcRequest) -> DispatchResult {
        let id = request.id.clone();
        let params: DownloadParams = match parse_params(&request) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let caller = identity(params.user);
        let paths: Vec<PathBuf> = params.paths.iter().map(PathBuf::from).collect();

        let result = self
            .run_blocking(move |engine| engine.build_download(&paths, &caller))
            .await;
        respond(id, result, file_payload)
    }

    async fn handle_upload(&self, request: JsonRpcRequest) -> DispatchResult {
        let id = request.id.clone();
        let params: UploadParams = match parse_params(&request) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let content = match BASE64.decode(params.data.as_bytes()) {
            Ok(bytes) => bytes,
            Err(e) => {
                return DispatchResult::Error(JsonRpcErrorResponse::new(
                    id,
                    errors::INVALID_PARAMS,
                    format!("Invalid base64 upload data: {e}"),
                ));
            }
        };
        let caller = identity(params.user);

        let result = self
            .run_blocking(move |engine| {
                engine.save_upload(
                    Path::new(&params.path),
                    &params.filename,
                    content.as_slice(),
                    &caller,
                )
            })
            .await;
        respond(id, result, |path| UploadResult {
            path: path.to_string_lossy().to_string(),
        })
    }

    async fn handle_upload_cancel(&self, request: JsonRpcRequest) -> DispatchResult {
        let id = request.id.clone();
        let params: UploadCancelParams = match parse_params(&request) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let caller = identity(params.user);

        let result = self
            .run_blocking(move |engine| {
                engine.cancel_upload(Path::new(&params.path), &params.filename, &caller)
            })
            .await;
        respond(id, result, |()| json!({}))
    }

    async fn handle_image(&self, request: JsonRpcRequest) -> DispatchResult {
        let id = request.id.clone();
        let params: ImageParams = match parse_params(&request) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let caller = identity(params.user);

        let result = self
            .run_blocking(move |engine| engine.read_image(Path::new(&params.path), &caller))
            .await;
        respond(id, result, file_payload)
    }

    /// Run a blocking engine call off the async runtime.
    async fn run_blocking<T, F>(&self, f: F) -> Result<T, JoinError>
    where
        T: Send + 'static,
        F: FnOnce(&ActionDispatcher) -> T + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || f(&engine)).await
    }
}

fn identity(user: Option<String>) -> Identity {
    match user {
        Some(name) => Identity::user(name),
        None => Identity::service(),
    }
}

fn file_payload(download: Download) -> FilePayload {
    FilePayload {
        filename: download.filename,
        mime_type: download.mime_type,
        data: BASE64.encode(&download.bytes),
    }
}

fn parse_params<T: DeserializeOwned>(request: &JsonRpcRequest) -> Result<T, DispatchResult> {
    serde_json::from_value(request.params.clone()).map_err(|e| {
        DispatchResult::Error(JsonRpcErrorResponse::new(
            request.id.clone(),
            errors::INVALID_PARAMS,
            format!("Invalid {} params: {e}", request.method),
        ))
    })
}

fn success<T: Serialize>(id: Value, result: T) -> DispatchResult {
    match serde_json::to_value(result) {
        Ok(value) => DispatchResult::Success(JsonRpcResponse::new(id, value)),
        Err(e) => DispatchResult::Error(JsonRpcErrorResponse::new(
            id,
            errors::INTERNAL_ERROR,
            format!("Failed to serialize result: {e}"),
        )),
    }
}

fn respond<T, R, F>(id: Value, result: Result<Result<T, ActionError>, JoinError>, map: F) -> DispatchResult
where
    R: Serialize,
    F: FnOnce(T) -> R,
{
    match result {
        Ok(Ok(value)) => success(id, map(value)),
        Ok(Err(err)) => action_error(id, err),
        Err(e) => join_failed(id, e),
    }
}

/// Engine error as a JSON-RPC error; `data` carries the `{code, message}` body.
fn action_error(id: Value, err: ActionError) -> DispatchResult {
    let data = serde_json::to_value(&err).unwrap_or(Value::Null);
    DispatchResult::Error(
        JsonRpcErrorResponse::new(id, errors::for_kind(err.kind), err.message).with_data(data),
    )
}

fn join_failed(id: Value, e: JoinError) -> DispatchResult {
    error!("Engine task failed: {e}");
    DispatchResult::Error(JsonRpcErrorResponse::new(
        id,
        errors::INTERNAL_ERROR,
        "Internal error while running file operation",
    ))
}
