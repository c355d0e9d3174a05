pub mod action;
pub mod config;
pub mod errors;
pub mod files;
pub mod identity;

pub use action::dispatch::ActionDispatcher;
pub use action::{ActionError, ActionOutcome, ActionReply, ActionRequest, Download};
pub use config::EngineConfig;
pub use errors::{ErrorKind, FileError};
pub use identity::Identity;
