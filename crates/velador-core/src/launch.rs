//! Client-side daemon launch protocol.
//!
//! [`DaemonLauncher::maybe_launch`] is the single entry point callers use
//! to obtain a usable daemon: it decides under a cross-process lock whether
//! the running instance (if any) can be reused, replaces it when its
//! fingerprint is stale, and hands back the connection endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use velador_meta::{Fingerprint, MetadataStore};

use crate::config::DaemonConfig;
use crate::error::{Result, SupervisorError};
use crate::watcher::WatcherLauncher;

/// Upper bound on how long a freshly spawned daemon may take to publish
/// its pid record.
pub const DEFAULT_PID_WAIT: Duration = Duration::from_secs(10);

/// Name of the socket record carrying the command endpoint port.
pub const COMMAND_SOCKET: &str = "command";

/// Spawns a detached daemon process for the current configuration.
///
/// The seam exists so tests can stand in a spawner that performs the
/// child's publication protocol in-process instead of forking.
#[async_trait]
pub trait DaemonSpawner: Send + Sync {
    /// Spawns the daemon process. Returns once the process exists; the
    /// caller separately awaits metadata publication.
    ///
    /// # Errors
    /// Returns an error if the process cannot be created.
    async fn spawn(&self) -> Result<()>;
}

/// Where a running daemon can be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaemonEndpoint {
    /// Pid of the daemon process.
    pub pid: u32,
    /// Port of the command endpoint.
    pub port: u16,
}

/// Decides whether to reuse, replace, or freshly launch the daemon.
pub struct DaemonLauncher {
    config: DaemonConfig,
    store: MetadataStore,
    spawner: Arc<dyn DaemonSpawner>,
    watcher: Arc<dyn WatcherLauncher>,
    pid_wait: Duration,
}

impl DaemonLauncher {
    /// Creates a launcher for the given identity.
    #[must_use]
    pub fn new(
        config: DaemonConfig,
        store: MetadataStore,
        spawner: Arc<dyn DaemonSpawner>,
        watcher: Arc<dyn WatcherLauncher>,
    ) -> Self {
        Self {
            config,
            store,
            spawner,
            watcher,
            pid_wait: DEFAULT_PID_WAIT,
        }
    }

    /// Overrides the bound on waiting for a spawned daemon's pid record.
    #[must_use]
    pub fn with_pid_wait(mut self, wait: Duration) -> Self {
        self.pid_wait = wait;
        self
    }

    /// Ensures a daemon matching the current configuration is running and
    /// returns its endpoint.
    ///
    /// The watcher is brought up first, since a daemon launched without
    /// its watcher would start blind. The reuse-or-replace decision and
    /// any replacement happen while holding the identity's process lock,
    /// so concurrent callers converge on a single instance.
    ///
    /// # Errors
    /// Returns a startup failure if a spawned daemon never publishes its
    /// pid or endpoint within the bound, or propagates watcher, lock, and
    /// metadata errors.
    pub async fn maybe_launch(&self) -> Result<DaemonEndpoint> {
        self.watcher.maybe_launch().await?;

        tracing::debug!(lock = %self.store.lock_path().display(), "acquiring process lock");
        let _lock = self.store.lock_process().await?;

        let fingerprint = self.config.fingerprint();
        if self.needs_restart(&fingerprint).await {
            // The watcher outlives daemon replacement; only the daemon
            // instance is torn down.
            self.store.terminate(self.config.terminate_grace).await?;
            tracing::info!(fingerprint = %fingerprint, "launching daemon");
            self.spawner.spawn().await?;
            self.store.await_pid(self.pid_wait).await.map_err(|e| {
                SupervisorError::startup(format!("daemon never published a pid: {e}"))
            })?;
        } else {
            tracing::debug!("reusing running daemon");
        }

        let pid = self
            .store
            .read_pid()
            .await?
            .ok_or_else(|| SupervisorError::startup("daemon pid record disappeared"))?;
        let port: u16 = self
            .store
            .read_named_socket(COMMAND_SOCKET)
            .await?
            .ok_or_else(|| SupervisorError::startup("daemon command socket record missing"))?;
        tracing::debug!(pid, port, "daemon is running");
        Ok(DaemonEndpoint { pid, port })
    }

    /// Terminates the running daemon instance, and optionally the watcher.
    ///
    /// # Errors
    /// Returns an error if termination fails.
    pub async fn terminate(&self, include_watcher: bool) -> Result<()> {
        let _lock = self.store.lock_process().await?;
        self.store.terminate(self.config.terminate_grace).await?;
        if include_watcher {
            self.watcher.terminate().await?;
        }
        Ok(())
    }

    /// Whether the running instance (if any) must be replaced.
    ///
    /// A dead instance, a missing or unreadable fingerprint record, or a
    /// fingerprint mismatch all force a fresh launch.
    async fn needs_restart(&self, current: &Fingerprint) -> bool {
        if !self.store.is_alive().await {
            return true;
        }
        match self.store.read_fingerprint().await {
            Ok(Some(persisted)) => {
                let stale = persisted != *current;
                if stale {
                    tracing::info!(
                        running = %persisted,
                        required = %current,
                        "fingerprint mismatch, daemon restart required"
                    );
                }
                stale
            }
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(error = %e, "unreadable fingerprint record, forcing restart");
                true
            }
        }
    }
}
