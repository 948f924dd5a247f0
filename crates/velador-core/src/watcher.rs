//! Auxiliary file-watcher lifecycle.
//!
//! The daemon can keep an external file-watching helper alive alongside
//! itself. The launcher seam is a trait so deployments without a watcher
//! (or tests) plug in the null implementation.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use velador_meta::MetadataStore;

use crate::error::{Result, SupervisorError};

/// Ensures the auxiliary watcher process is running (or deliberately
/// absent) before the daemon itself is launched.
#[async_trait]
pub trait WatcherLauncher: Send + Sync {
    /// Launches the watcher if it is not already alive. Idempotent.
    ///
    /// # Errors
    /// Returns an error if the watcher cannot be started.
    async fn maybe_launch(&self) -> Result<()>;

    /// Terminates the watcher if it is running.
    ///
    /// # Errors
    /// Returns an error if termination fails.
    async fn terminate(&self) -> Result<()>;
}

/// Watcher launcher for deployments that run no watcher at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullWatcherLauncher;

#[async_trait]
impl WatcherLauncher for NullWatcherLauncher {
    async fn maybe_launch(&self) -> Result<()> {
        tracing::debug!("no watcher configured");
        Ok(())
    }

    async fn terminate(&self) -> Result<()> {
        Ok(())
    }
}

/// Launches an external watcher command and tracks it through its own
/// metadata store namespace.
pub struct ProcessWatcherLauncher {
    command: PathBuf,
    args: Vec<String>,
    store: MetadataStore,
    terminate_grace: Duration,
}

impl ProcessWatcherLauncher {
    /// Creates a launcher for the given command.
    #[must_use]
    pub fn new(command: PathBuf, args: Vec<String>, store: MetadataStore) -> Self {
        Self {
            command,
            args,
            store,
            terminate_grace: Duration::from_secs(5),
        }
    }

    /// Overrides the SIGTERM-to-SIGKILL grace period used on terminate.
    #[must_use]
    pub fn with_terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }
}

#[async_trait]
impl WatcherLauncher for ProcessWatcherLauncher {
    async fn maybe_launch(&self) -> Result<()> {
        if self.store.is_alive().await {
            tracing::debug!(command = %self.command.display(), "watcher already running");
            return Ok(());
        }

        tracing::info!(command = %self.command.display(), "launching watcher");
        let mut child = std::process::Command::new(&self.command)
            .args(&self.args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| {
                SupervisorError::watcher(format!(
                    "failed to spawn {}: {e}",
                    self.command.display()
                ))
            })?;
        self.store.write_pid(child.id()).await?;

        // Reap the watcher off the async runtime so it never zombies.
        tokio::task::spawn_blocking(move || {
            let _ = child.wait();
        });
        Ok(())
    }

    async fn terminate(&self) -> Result<()> {
        self.store.terminate(self.terminate_grace).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_launcher_is_a_noop() {
        let launcher = NullWatcherLauncher;
        assert!(launcher.maybe_launch().await.is_ok());
        assert!(launcher.terminate().await.is_ok());
    }

    #[tokio::test]
    async fn test_process_launcher_records_pid_and_terminates() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new("watcher", dir.path());
        let launcher = ProcessWatcherLauncher::new(
            PathBuf::from("/bin/sleep"),
            vec!["30".to_string()],
            store.clone(),
        )
        .with_terminate_grace(Duration::from_secs(2));

        launcher.maybe_launch().await.unwrap();
        let pid = store.read_pid().await.unwrap().unwrap();
        assert!(store.is_alive().await);

        // A second launch must reuse the running watcher.
        launcher.maybe_launch().await.unwrap();
        assert_eq!(store.read_pid().await.unwrap(), Some(pid));

        launcher.terminate().await.unwrap();
        assert!(!store.is_alive().await);
    }

    #[tokio::test]
    async fn test_process_launcher_rejects_missing_command() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new("watcher", dir.path());
        let launcher = ProcessWatcherLauncher::new(
            PathBuf::from("/nonexistent/watcher-bin"),
            vec![],
            store,
        );

        let err = launcher.maybe_launch().await.unwrap_err();
        assert!(matches!(err, SupervisorError::Watcher(_)));
    }
}
