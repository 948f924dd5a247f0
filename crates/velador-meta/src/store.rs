//! The per-identity metadata store.
//!
//! Layout on disk: one directory per daemon identity under a base dir,
//! holding a `pid` record, a `fingerprint` record, zero or more
//! `socket_<name>` records, and the advisory `lock` file.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::error::{MetadataError, Result};
use crate::fingerprint::Fingerprint;
use crate::lock::ProcessLockGuard;

const PID_RECORD: &str = "pid";
const FINGERPRINT_RECORD: &str = "fingerprint";
const SOCKET_PREFIX: &str = "socket_";
const LOCK_FILE: &str = "lock";

/// How often `await_pid` re-reads the pid record.
const AWAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How often `terminate` re-checks liveness during the grace period.
const TERMINATE_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Process-identity capability for one named daemon.
///
/// Persists and retrieves the pid, fingerprint, and socket records that
/// make a daemon instance discoverable, and hands out the advisory lock
/// that serializes launch decisions for the identity.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    name: String,
    base_dir: PathBuf,
}

impl MetadataStore {
    /// Creates a store for the identity `name` under `base_dir`.
    #[must_use]
    pub fn new(name: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            base_dir: base_dir.into(),
        }
    }

    /// Returns the identity name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the identity's metadata directory.
    #[must_use]
    pub fn dir(&self) -> PathBuf {
        self.base_dir.join(&self.name)
    }

    async fn write_record(&self, record: &str, value: &str) -> Result<()> {
        let dir = self.dir();
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(record), value).await?;
        tracing::debug!(identity = %self.name, record = record, value = value, "wrote metadata record");
        Ok(())
    }

    async fn read_record(&self, record: &str) -> Result<Option<String>> {
        match tokio::fs::read_to_string(self.dir().join(record)).await {
            Ok(raw) => Ok(Some(raw.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Publishes this identity's pid.
    ///
    /// # Errors
    /// Returns an error if the record cannot be written.
    pub async fn write_pid(&self, pid: u32) -> Result<()> {
        self.write_record(PID_RECORD, &pid.to_string()).await
    }

    /// Reads the published pid, if any.
    ///
    /// # Errors
    /// Returns an error on I/O failure or a malformed record. Valid unix
    /// pids are `1..=i32::MAX`; 0 and values that would wrap a signed pid
    /// alias kill(2) group targets and are rejected as malformed.
    pub async fn read_pid(&self) -> Result<Option<u32>> {
        match self.read_record(PID_RECORD).await? {
            Some(raw) => {
                let pid = raw
                    .parse::<u32>()
                    .map_err(|e| MetadataError::parse(PID_RECORD, e.to_string()))?;
                if pid == 0 || pid > i32::MAX as u32 {
                    return Err(MetadataError::parse(
                        PID_RECORD,
                        format!("pid {pid} out of range"),
                    ));
                }
                Ok(Some(pid))
            }
            None => Ok(None),
        }
    }

    /// Waits up to `bound` for a pid to be published.
    ///
    /// # Errors
    /// Returns a timeout error if no pid appears within the bound.
    pub async fn await_pid(&self, bound: Duration) -> Result<u32> {
        let start = Instant::now();
        loop {
            if let Some(pid) = self.read_pid().await? {
                return Ok(pid);
            }
            if start.elapsed() >= bound {
                return Err(MetadataError::Timeout {
                    record: PID_RECORD.to_string(),
                    waited: bound,
                });
            }
            tokio::time::sleep(AWAIT_POLL_INTERVAL).await;
        }
    }

    /// Publishes the fingerprint the current instance was launched with.
    ///
    /// # Errors
    /// Returns an error if the record cannot be written.
    pub async fn write_fingerprint(&self, fingerprint: &Fingerprint) -> Result<()> {
        self.write_record(FINGERPRINT_RECORD, fingerprint.as_str())
            .await
    }

    /// Reads the published fingerprint, if any.
    ///
    /// # Errors
    /// Returns an error on I/O failure or a malformed record.
    pub async fn read_fingerprint(&self) -> Result<Option<Fingerprint>> {
        match self.read_record(FINGERPRINT_RECORD).await? {
            Some(raw) => Fingerprint::parse(&raw).map(Some),
            None => Ok(None),
        }
    }

    /// Publishes a named socket/connection record.
    ///
    /// # Errors
    /// Returns an error if the record cannot be written.
    pub async fn write_named_socket(&self, socket_name: &str, value: &str) -> Result<()> {
        self.write_record(&format!("{SOCKET_PREFIX}{socket_name}"), value)
            .await
    }

    /// Reads a named socket record, parsed as `T`.
    ///
    /// # Errors
    /// Returns an error on I/O failure or if the record does not parse.
    pub async fn read_named_socket<T>(&self, socket_name: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let record = format!("{SOCKET_PREFIX}{socket_name}");
        match self.read_record(&record).await? {
            Some(raw) => raw
                .parse::<T>()
                .map(Some)
                .map_err(|e| MetadataError::parse(record, e.to_string())),
            None => Ok(None),
        }
    }

    /// Returns true if a pid is published and that process is alive.
    pub async fn is_alive(&self) -> bool {
        match self.read_pid().await {
            Ok(Some(pid)) => process_alive(pid),
            _ => false,
        }
    }

    /// Terminates the published instance, if one is running.
    ///
    /// Sends SIGTERM, waits up to `grace` for the process to exit, then
    /// escalates to SIGKILL. Published metadata is cleared afterwards so a
    /// stale pid can never be handed to a later caller.
    ///
    /// # Errors
    /// Returns an error if signalling fails or metadata cannot be cleared.
    pub async fn terminate(&self, grace: Duration) -> Result<()> {
        let recorded = match self.read_pid().await {
            Ok(recorded) => recorded,
            Err(MetadataError::Parse { record, reason }) => {
                tracing::warn!(identity = %self.name, record = %record, reason = %reason, "clearing malformed record");
                None
            }
            Err(e) => return Err(e),
        };
        if let Some(pid) = recorded {
            if process_alive(pid) {
                tracing::info!(identity = %self.name, pid = pid, "terminating daemon instance");
                send_signal(pid, TerminationSignal::Term)?;

                let start = Instant::now();
                while process_alive(pid) && start.elapsed() < grace {
                    tokio::time::sleep(TERMINATE_POLL_INTERVAL).await;
                }
                if process_alive(pid) {
                    tracing::warn!(identity = %self.name, pid = pid, "instance ignored SIGTERM, killing");
                    send_signal(pid, TerminationSignal::Kill)?;
                }
            }
        }
        self.clear().await
    }

    /// Removes every published record for this identity (lock file excluded).
    ///
    /// # Errors
    /// Returns an error if a record cannot be removed.
    pub async fn clear(&self) -> Result<()> {
        let dir = self.dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if name == PID_RECORD || name == FINGERPRINT_RECORD || name.starts_with(SOCKET_PREFIX) {
                tokio::fs::remove_file(entry.path()).await?;
            }
        }
        Ok(())
    }

    /// Acquires the identity's cross-process advisory lock.
    ///
    /// # Errors
    /// Returns an error if the lock file cannot be opened or locked.
    pub async fn lock_process(&self) -> Result<ProcessLockGuard> {
        ProcessLockGuard::acquire(&self.dir().join(LOCK_FILE)).await
    }

    /// Returns the path of the lock file (for diagnostics).
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.dir().join(LOCK_FILE)
    }
}

enum TerminationSignal {
    Term,
    Kill,
}

/// Returns true if `pid` names a live process.
///
/// EPERM counts as alive: the process exists, we just may not signal it.
#[must_use]
pub fn process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        match kill(Pid::from_raw(pid as i32), None) {
            Ok(()) => true,
            Err(errno) => errno == Errno::EPERM,
        }
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

fn send_signal(pid: u32, signal: TerminationSignal) -> Result<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let sig = match signal {
            TerminationSignal::Term => Signal::SIGTERM,
            TerminationSignal::Kill => Signal::SIGKILL,
        };
        kill(Pid::from_raw(pid as i32), sig)
            .map_err(|e| MetadataError::process(format!("kill({pid}, {sig}) failed: {e}")))
    }

    #[cfg(not(unix))]
    {
        let _ = (pid, signal);
        Err(MetadataError::process("signals unsupported on this platform"))
    }
}
