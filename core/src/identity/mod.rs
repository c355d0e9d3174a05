//! Caller identities and their resolution to numeric credentials.

mod impersonate;

pub use impersonate::Impersonator;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// The OS user a request acts on behalf of.
///
/// `username: None` means the service's own process identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub username: Option<String>,
}

impl Identity {
    /// The service process's own identity; no impersonation.
    pub fn service() -> Self {
        Self { username: None }
    }

    pub fn user(name: impl Into<String>) -> Self {
        Self {
            username: Some(name.into()),
        }
    }

    /// Look up the numeric uid/gid for this identity.
    ///
    /// Returns `None` for the service identity and for accounts that cannot
    /// be resolved; a failed lookup is logged and never fatal.
    pub fn resolve(&self) -> Option<Credentials> {
        let name = self.username.as_deref()?.trim();
        if name.is_empty() {
            return None;
        }
        match lookup_user(name) {
            Ok(Some(creds)) => Some(creds),
            Ok(None) => {
                warn!("Unknown user '{}', falling back to service identity", name);
                None
            }
            Err(e) => {
                warn!("User lookup for '{}' failed: {}", name, e);
                None
            }
        }
    }
}

/// Numeric user and primary group ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    pub uid: u32,
    pub gid: u32,
}

impl Credentials {
    /// Effective credentials of the current process.
    #[cfg(unix)]
    pub fn current() -> Self {
        Self {
            uid: nix::unistd::geteuid().as_raw(),
            gid: nix::unistd::getegid().as_raw(),
        }
    }
}

#[cfg(unix)]
fn lookup_user(name: &str) -> Result<Option<Credentials>, nix::Error> {
    Ok(nix::unistd::User::from_name(name)?.map(|user| Credentials {
        uid: user.uid.as_raw(),
        gid: user.gid.as_raw(),
    }))
}

#[cfg(not(unix))]
fn lookup_user(_name: &str) -> Result<Option<Credentials>, std::io::Error> {
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_identity_does_not_resolve() {
        assert_eq!(Identity::service().resolve(), None);
        assert_eq!(Identity::user("  ").resolve(), None);
    }

    #[test]
    fn unknown_user_does_not_resolve() {
        assert_eq!(Identity::user("no-such-user-fileward-4711").resolve(), None);
    }

    #[cfg(unix)]
    #[test]
    fn root_resolves_to_zero() {
        let creds = Identity::user("root").resolve().unwrap();
        assert_eq!(creds.uid, 0);
    }
}
