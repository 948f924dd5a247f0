//! The service abstraction supervised by the daemon.
//!
//! A service is a long-lived unit of work with a three-phase lifecycle:
//! synchronous `setup` before anything runs, an async `run` that is expected
//! to block for the life of the daemon, and an idempotent `terminate` signal.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};

use crate::error::Result;

/// Shared pausing lock handed to every service during setup.
///
/// Services that mutate daemon-wide state take the lock for the duration of
/// the mutation; the shutdown coordinator takes it while tearing services
/// down, so teardown never interleaves with a critical section.
#[derive(Debug, Clone, Default)]
pub struct ServiceLock {
    inner: Arc<Mutex<()>>,
}

impl ServiceLock {
    /// Creates a new, unheld lock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock, waiting until it is free.
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.inner.lock().await
    }

    /// Attempts to take the lock without waiting.
    #[must_use]
    pub fn try_lock(&self) -> Option<MutexGuard<'_, ()>> {
        self.inner.try_lock().ok()
    }
}

/// A long-lived unit of work run under the supervisor.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Stable name used in logs and failure messages.
    fn name(&self) -> &str;

    /// One-shot initialization, called before any service runs.
    ///
    /// Receives the shared [`ServiceLock`] so the service can serialize its
    /// critical sections against daemon teardown.
    ///
    /// # Errors
    /// Returns an error if the service cannot initialize; the daemon aborts
    /// startup without publishing liveness metadata.
    fn setup(&self, lock: ServiceLock) -> Result<()>;

    /// Runs the service until termination is requested.
    ///
    /// Returning, with `Ok` or `Err`, while the daemon is alive is treated
    /// as a fatal service failure.
    ///
    /// # Errors
    /// Returns an error if the service fails while running.
    async fn run(&self) -> Result<()>;

    /// Requests termination. Must be idempotent; `run` is expected to
    /// return shortly after the first call.
    fn terminate(&self);
}
