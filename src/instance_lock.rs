//! Per-sensor instance lock using a Unix socket.
//!
//! The coordinator keeps reads of one sensor from overlapping inside a
//! process; this lock keeps two bridge processes from driving the same data
//! line. The socket is released by the OS when the process dies, so a crash
//! never leaves a stale lock behind.

use crate::input::SensorIdentity;
use std::io;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error types for instance lock operations.
#[derive(Debug, Error)]
pub enum InstanceLockError {
    /// Another process already reads this sensor.
    #[error("another bridge instance is already reading {0}")]
    AlreadyRunning(SensorIdentity),

    /// I/O error during lock acquisition.
    #[error("failed to acquire instance lock: {0}")]
    Io(#[from] io::Error),
}

/// Lock on one sensor identity, held for as long as this value lives.
pub struct InstanceLock {
    _listener: UnixListener,
    path: PathBuf,
}

impl InstanceLock {
    /// Acquire the lock for `identity` in the user's runtime directory.
    pub fn acquire(identity: SensorIdentity) -> Result<Self, InstanceLockError> {
        let runtime_dir = std::env::var("XDG_RUNTIME_DIR").ok();
        Self::acquire_at(Self::socket_path(runtime_dir.as_deref(), identity), identity)
    }

    fn acquire_at(path: PathBuf, identity: SensorIdentity) -> Result<Self, InstanceLockError> {
        // A socket file nobody answers on was left by a SIGKILL'd process
        if path.exists() {
            if UnixStream::connect(&path).is_ok() {
                return Err(InstanceLockError::AlreadyRunning(identity));
            }
            let _ = std::fs::remove_file(&path);
        }

        match UnixListener::bind(&path) {
            Ok(listener) => Ok(Self {
                _listener: listener,
                path,
            }),
            // Another instance bound between our check and bind
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                Err(InstanceLockError::AlreadyRunning(identity))
            }
            Err(e) => Err(InstanceLockError::Io(e)),
        }
    }

    /// Socket path for `identity`, under `runtime_dir` or `/tmp`.
    pub fn socket_path(runtime_dir: Option<&str>, identity: SensorIdentity) -> PathBuf {
        runtime_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(format!(
                "dht-sensor-bridge-{}-{}.sock",
                identity.kind, identity.pin
            ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
