//! Run filesystem work under another OS identity.
//!
//! The work runs in a forked child. The child drops supplementary groups
//! and switches gid, then uid, before calling the operation; the parent
//! never changes its own credentials. The child's result travels back as a
//! JSON [`ChildReport`] over a single-use pipe, and the parent reaps the
//! child before returning.
//!
//! A failed switch is not fatal: the operation still runs, as the service
//! identity, and whatever the OS then refuses surfaces as the usual error.

#[cfg(unix)]
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Credentials, Identity};
use crate::config::EngineConfig;
use crate::errors::{ErrorKind, FileError};

/// Poll slice while waiting on the child, in milliseconds.
#[cfg(unix)]
const POLL_SLICE_MS: u16 = 100;

/// Pipe read chunk size.
#[cfg(unix)]
const READ_CHUNK: usize = 8192;

#[derive(Debug, Serialize, Deserialize)]
struct WireError {
    kind: ErrorKind,
    message: String,
}

impl From<&FileError> for WireError {
    fn from(e: &FileError) -> Self {
        Self {
            kind: e.kind(),
            message: e.detail().to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
enum Outcome<T> {
    Ok(T),
    Err(WireError),
}

#[derive(Debug, Serialize, Deserialize)]
struct ChildReport<T> {
    /// Whether the child actually took on the requested credentials.
    switched: bool,
    outcome: Outcome<T>,
}

/// Executes closures under a caller's identity.
#[derive(Debug, Clone)]
pub struct Impersonator {
    enabled: bool,
    #[cfg_attr(not(unix), allow(dead_code))]
    timeout: std::time::Duration,
}

impl Impersonator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            enabled: config.impersonate,
            timeout: config.run_as_timeout,
        }
    }

    /// Run `op` as `identity` and return its result.
    ///
    /// The service identity, an unresolvable user and the process's own
    /// credentials all run `op` inline. Any other identity runs it in a
    /// forked child; failures of that machinery are `Internal`, while
    /// errors returned by `op` keep their kind.
    pub fn run_as<T, F>(&self, identity: &Identity, op: F) -> Result<T, FileError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, FileError>,
    {
        if !self.enabled {
            return op();
        }
        let Some(creds) = identity.resolve() else {
            return op();
        };
        let user = identity.username.as_deref().unwrap_or_default();
        self.run_isolated(user, creds, op)
    }

    #[cfg(unix)]
    fn run_isolated<T, F>(&self, user: &str, creds: Credentials, op: F) -> Result<T, FileError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, FileError>,
    {
        use nix::sys::wait::{waitpid, WaitStatus};
        use nix::unistd::{fork, pipe, ForkResult};
        use tracing::{error, warn};

        if creds == Credentials::current() {
            debug!("Already running as {} (uid={}), no isolation", user, creds.uid);
            return op();
        }

        let (reader, writer) = pipe().map_err(|e| FileError::Internal(format!("pipe: {e}")))?;
        debug!(
            "Running as {} (uid={}, gid={}) in isolated child",
            user, creds.uid, creds.gid
        );

        // SAFETY: the child never returns from `child_main`; it exits with
        // `_exit` after writing its report.
        match unsafe { fork() } {
            Err(e) => Err(FileError::Internal(format!("fork: {e}"))),
            Ok(ForkResult::Child) => {
                drop(reader);
                child_main(user, creds, writer, op)
            }
            Ok(ForkResult::Parent { child }) => {
                drop(writer);
                let read = read_report(reader, child, self.timeout);
                let status = waitpid(child, None);

                let bytes = read?;
                if bytes.is_empty() {
                    error!("Impersonation child {} sent no result: {:?}", child, status);
                    return Err(FileError::Internal(format!(
                        "impersonated operation terminated abnormally: {status:?}"
                    )));
                }
                if !matches!(status, Ok(WaitStatus::Exited(_, 0))) {
                    warn!("Impersonation child {} exited with {:?}", child, status);
                }

                let report: ChildReport<T> = serde_json::from_slice(&bytes).map_err(|e| {
                    FileError::Internal(format!("malformed result from impersonated operation: {e}"))
                })?;
                if !report.switched {
                    warn!(
                        "Could not switch to {} (uid={}); operation ran as service identity",
                        user, creds.uid
                    );
                }
                match report.outcome {
                    Outcome::Ok(value) => Ok(value),
                    Outcome::Err(e) => Err(FileError::new(e.kind, e.message)),
                }
            }
        }
    }

    #[cfg(not(unix))]
    fn run_isolated<T, F>(&self, _user: &str, _creds: Credentials, op: F) -> Result<T, FileError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, FileError>,
    {
        op()
    }
}

/// Body of the forked child. Never returns.
#[cfg(unix)]
fn child_main<T, F>(user: &str, creds: Credentials, writer: std::os::fd::OwnedFd, op: F) -> !
where
    T: Serialize,
    F: FnOnce() -> Result<T, FileError>,
{
    use std::panic::{catch_unwind, AssertUnwindSafe};

    let switched = switch_identity(user, creds);
    let outcome = match catch_unwind(AssertUnwindSafe(op)) {
        Ok(Ok(value)) => Outcome::Ok(value),
        Ok(Err(e)) => Outcome::Err(WireError::from(&e)),
        Err(_) => Outcome::Err(WireError {
            kind: ErrorKind::Internal,
            message: "impersonated operation panicked".to_string(),
        }),
    };

    let mut file = std::fs::File::from(writer);
    let code = match serde_json::to_writer(&mut file, &ChildReport { switched, outcome }) {
        Ok(()) => 0,
        Err(_) => 1,
    };
    drop(file);

    // SAFETY: `_exit` skips atexit handlers and destructors inherited from
    // the parent, which must not run twice.
    unsafe { libc::_exit(code) }
}

/// Take on the user's group list, then set gid and uid, in that order.
///
/// Returns `false` if any step failed. Nothing further is switched once a
/// step has failed, so a failed group setup leaves the service identity
/// fully intact.
#[cfg(unix)]
fn switch_identity(user: &str, creds: Credentials) -> bool {
    use nix::unistd::{setgid, setuid, Gid, Uid};

    let gid = Gid::from_raw(creds.gid);
    let uid = Uid::from_raw(creds.uid);

    init_groups(user, gid) && setgid(gid).is_ok() && setuid(uid).is_ok()
}

/// Set the supplementary groups to everything `user` is a member of.
#[cfg(target_os = "linux")]
fn init_groups(user: &str, gid: nix::unistd::Gid) -> bool {
    match std::ffi::CString::new(user) {
        Ok(name) => nix::unistd::initgroups(&name, gid).is_ok(),
        Err(_) => false,
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
fn init_groups(_user: &str, _gid: nix::unistd::Gid) -> bool {
    true
}

/// Read the child's report until EOF, killing the child past `timeout`.
#[cfg(unix)]
fn read_report(
    reader: std::os::fd::OwnedFd,
    child: nix::unistd::Pid,
    timeout: Duration,
) -> Result<Vec<u8>, FileError> {
    use std::io::Read;
    use std::os::fd::AsFd;

    use nix::errno::Errno;
    use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
    use nix::sys::signal::{kill, Signal};
    use tracing::error;

    let deadline = Instant::now() + timeout;
    let mut file = std::fs::File::from(reader);
    let mut bytes = Vec::new();
    let mut buf = [0u8; READ_CHUNK];

    let abort = |reason: String| {
        error!("Killing impersonation child {}: {}", child, reason);
        let _ = kill(child, Signal::SIGKILL);
        FileError::Internal(reason)
    };

    loop {
        let now = Instant::now();
        if now >= deadline {
            return Err(abort(format!(
                "impersonated operation timed out after {}s",
                timeout.as_secs()
            )));
        }
        let slice = (deadline - now).as_millis().min(POLL_SLICE_MS as u128) as u16;

        let ready = {
            let mut fds = [PollFd::new(file.as_fd(), PollFlags::POLLIN)];
            poll(&mut fds, PollTimeout::from(slice))
        };
        match ready {
            Ok(0) | Err(Errno::EINTR) => continue,
            Ok(_) => {}
            Err(e) => return Err(abort(format!("poll on result pipe: {e}"))),
        }

        match file.read(&mut buf) {
            Ok(0) => return Ok(bytes),
            Ok(n) => bytes.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(abort(format!("read from result pipe: {e}"))),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn impersonator() -> Impersonator {
        Impersonator::new(&EngineConfig::default())
    }

    /// A resolvable account other than the one running the tests.
    fn other_user() -> Option<(Identity, Credentials)> {
        ["nobody", "daemon", "bin"].iter().find_map(|name| {
            let identity = Identity::user(*name);
            let creds = identity.resolve()?;
            (creds != Credentials::current()).then_some((identity, creds))
        })
    }

    #[test]
    fn service_identity_runs_inline() {
        let pid: u32 = impersonator()
            .run_as(&Identity::service(), || Ok(std::process::id()))
            .unwrap();
        assert_eq!(pid, std::process::id());
    }

    #[test]
    fn disabled_impersonation_runs_inline() {
        let config = EngineConfig {
            impersonate: false,
            ..Default::default()
        };
        let Some((identity, _)) = other_user() else {
            return;
        };
        let pid: u32 = Impersonator::new(&config)
            .run_as(&identity, || Ok(std::process::id()))
            .unwrap();
        assert_eq!(pid, std::process::id());
    }

    #[test]
    fn unknown_user_still_runs_operation() {
        let identity = Identity::user("no-such-user-fileward-4711");
        let value: String = impersonator()
            .run_as(&identity, || Ok("ran".to_string()))
            .unwrap();
        assert_eq!(value, "ran");
    }

    #[test]
    fn unknown_user_surfaces_permission_denied() {
        use std::os::unix::fs::PermissionsExt;

        if nix::unistd::Uid::effective().is_root() {
            return;
        }
        let dir = tempfile::TempDir::new().unwrap();
        let locked = dir.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

        let identity = Identity::user("no-such-user-fileward-4711");
        let result: Result<Vec<String>, FileError> = impersonator().run_as(&identity, || {
            std::fs::read_dir(&locked)
                .map_err(|e| crate::errors::map_io_error(e, "locked"))
                .map(|_| Vec::new())
        });
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert!(matches!(result, Err(FileError::PermissionDenied(_))));
    }

    #[test]
    fn isolated_run_happens_in_child() {
        let Some((identity, creds)) = other_user() else {
            return;
        };
        let before = Credentials::current();

        let (pid, euid): (u32, u32) = impersonator()
            .run_as(&identity, || {
                Ok((std::process::id(), nix::unistd::geteuid().as_raw()))
            })
            .unwrap();

        assert_ne!(pid, std::process::id());
        if before.uid == 0 {
            assert_eq!(euid, creds.uid);
        } else {
            assert_eq!(euid, before.uid);
        }
        assert_eq!(Credentials::current(), before);
    }

    fn is_root() -> bool {
        nix::unistd::Uid::effective().is_root()
    }

    /// A temp dir the other user can traverse.
    fn shared_tempdir() -> tempfile::TempDir {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o755)).unwrap();
        dir
    }

    #[cfg(target_os = "linux")]
    fn sorted_gids(gids: Vec<nix::unistd::Gid>) -> Vec<u32> {
        let mut raw: Vec<u32> = gids.into_iter().map(|g| g.as_raw()).collect();
        raw.sort_unstable();
        raw.dedup();
        raw
    }

    /// A user with a supplementary group other than its primary one.
    #[cfg(target_os = "linux")]
    fn member_of_extra_group() -> Option<(Identity, u32)> {
        let passwd = std::fs::read_to_string("/etc/passwd").ok()?;
        passwd.lines().find_map(|line| {
            let name = line.split(':').next()?;
            let identity = Identity::user(name);
            let creds = identity.resolve()?;
            if creds.uid == 0 {
                return None;
            }
            let cname = std::ffi::CString::new(name).ok()?;
            let groups =
                nix::unistd::getgrouplist(&cname, nix::unistd::Gid::from_raw(creds.gid)).ok()?;
            let extra = groups
                .into_iter()
                .map(|g| g.as_raw())
                .find(|g| *g != creds.gid && *g != 0)?;
            Some((identity, extra))
        })
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn child_takes_the_users_group_list() {
        if !is_root() {
            return;
        }
        let Some((identity, creds)) = other_user() else {
            return;
        };
        let name = std::ffi::CString::new(identity.username.clone().unwrap()).unwrap();
        let expected = sorted_gids(
            nix::unistd::getgrouplist(&name, nix::unistd::Gid::from_raw(creds.gid)).unwrap(),
        );

        let groups: Vec<u32> = impersonator()
            .run_as(&identity, || {
                nix::unistd::getgroups()
                    .map(sorted_gids)
                    .map_err(|e| FileError::Internal(e.to_string()))
            })
            .unwrap();
        assert_eq!(groups, expected);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn supplementary_group_grants_access() {
        use std::os::unix::fs::PermissionsExt;

        if !is_root() {
            return;
        }
        let Some((identity, extra_gid)) = member_of_extra_group() else {
            return;
        };
        let dir = shared_tempdir();
        let group_only = dir.path().join("group_only");
        std::fs::create_dir(&group_only).unwrap();
        std::fs::write(group_only.join("inside.txt"), "x").unwrap();
        std::os::unix::fs::chown(&group_only, Some(0), Some(extra_gid)).unwrap();
        std::fs::set_permissions(&group_only, std::fs::Permissions::from_mode(0o770)).unwrap();

        let fs = crate::files::local::Filesystem::new();
        let listed: usize = impersonator()
            .run_as(&identity, || fs.list(&group_only, false).map(|p| p.len()))
            .unwrap();
        assert_eq!(listed, 1);
    }

    #[test]
    fn isolated_run_is_refused_what_the_user_cannot_read() {
        use std::os::unix::fs::PermissionsExt;

        if !is_root() {
            return;
        }
        let Some((identity, _)) = other_user() else {
            return;
        };
        let dir = shared_tempdir();
        let private = dir.path().join("private");
        std::fs::create_dir(&private).unwrap();
        std::fs::write(private.join("secret.txt"), "x").unwrap();
        std::fs::set_permissions(&private, std::fs::Permissions::from_mode(0o700)).unwrap();

        let fs = crate::files::local::Filesystem::new();
        let result = impersonator().run_as(&identity, || fs.list(&private, false));
        assert!(matches!(result, Err(FileError::PermissionDenied(_))));
    }

    #[test]
    fn isolated_errors_keep_their_kind() {
        let Some((identity, _)) = other_user() else {
            return;
        };
        let result: Result<(), FileError> = impersonator().run_as(&identity, || {
            Err(FileError::DirectoryNotEmpty("/tmp/full".into()))
        });
        assert_eq!(result, Err(FileError::DirectoryNotEmpty("/tmp/full".into())));
    }

    #[test]
    fn isolated_timeout_is_internal() {
        let Some((identity, _)) = other_user() else {
            return;
        };
        let config = EngineConfig {
            run_as_timeout: Duration::from_secs(1),
            ..Default::default()
        };
        let result: Result<(), FileError> = Impersonator::new(&config).run_as(&identity, || {
            std::thread::sleep(Duration::from_secs(10));
            Ok(())
        });
        assert!(matches!(result, Err(FileError::Internal(_))));
    }

    #[test]
    fn isolated_panic_is_internal() {
        let Some((identity, _)) = other_user() else {
            return;
        };
        let result: Result<(), FileError> =
            impersonator().run_as(&identity, || panic!("boom"));
        assert!(matches!(result, Err(FileError::Internal(_))));
    }
}
