//! Mock implementations for lifecycle and launch tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use velador_meta::MetadataStore;

use crate::config::DaemonConfig;
use crate::error::{Result, SupervisorError};
use crate::launch::{COMMAND_SOCKET, DaemonSpawner};
use crate::service::{Service, ServiceLock};
use crate::watcher::WatcherLauncher;

/// Mock service with configurable failure behavior.
///
/// - `fail_setup`: setup returns an error
/// - `fail_run`: run returns an error immediately
/// - `die_after`: run returns an error after a delay (simulates a crash
///   of an already-running service)
pub struct MockService {
    name: String,
    state: Arc<MockServiceState>,
}

struct MockServiceState {
    setup_should_fail: AtomicBool,
    run_should_fail: AtomicBool,
    die_after: parking_lot::Mutex<Option<Duration>>,

    terminated: AtomicBool,
    setup_count: AtomicU32,
    terminate_count: AtomicU32,
}

impl MockService {
    /// Poll interval for the mock run loop.
    const TICK: Duration = Duration::from_millis(5);

    /// Creates a well-behaved mock service.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            state: Arc::new(MockServiceState {
                setup_should_fail: AtomicBool::new(false),
                run_should_fail: AtomicBool::new(false),
                die_after: parking_lot::Mutex::new(None),
                terminated: AtomicBool::new(false),
                setup_count: AtomicU32::new(0),
                terminate_count: AtomicU32::new(0),
            }),
        })
    }

    /// Makes setup fail.
    pub fn fail_setup(self: &Arc<Self>) -> Arc<Self> {
        self.state.setup_should_fail.store(true, Ordering::SeqCst);
        Arc::clone(self)
    }

    /// Makes run fail immediately.
    pub fn fail_run(self: &Arc<Self>) -> Arc<Self> {
        self.state.run_should_fail.store(true, Ordering::SeqCst);
        Arc::clone(self)
    }

    /// Makes run fail after the given delay.
    pub fn die_after(self: &Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.state.die_after.lock() = Some(delay);
        Arc::clone(self)
    }

    /// Number of setup calls.
    pub fn setup_count(&self) -> u32 {
        self.state.setup_count.load(Ordering::SeqCst)
    }

    /// Number of terminate calls.
    pub fn terminate_count(&self) -> u32 {
        self.state.terminate_count.load(Ordering::SeqCst)
    }

    /// Whether terminate has been called.
    pub fn is_terminated(&self) -> bool {
        self.state.terminated.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Service for MockService {
    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&self, _lock: ServiceLock) -> Result<()> {
        self.state.setup_count.fetch_add(1, Ordering::SeqCst);
        if self.state.setup_should_fail.load(Ordering::SeqCst) {
            return Err(SupervisorError::startup("mock setup failure"));
        }
        Ok(())
    }

    async fn run(&self) -> Result<()> {
        if self.state.run_should_fail.load(Ordering::SeqCst) {
            return Err(SupervisorError::runtime("mock run failure"));
        }
        let die_after = *self.state.die_after.lock();
        if let Some(delay) = die_after {
            tokio::time::sleep(delay).await;
            return Err(SupervisorError::runtime("mock service died"));
        }
        loop {
            if self.state.terminated.load(Ordering::SeqCst) {
                return Ok(());
            }
            tokio::time::sleep(Self::TICK).await;
        }
    }

    fn terminate(&self) {
        self.state.terminate_count.fetch_add(1, Ordering::SeqCst);
        self.state.terminated.store(true, Ordering::SeqCst);
    }
}

/// Mock spawner that performs the daemon-side publication protocol
/// in-process instead of forking.
///
/// On spawn it writes, in the daemon's order, the socket map, the pid
/// (this test process, so liveness checks succeed), and the fingerprint.
pub struct MockSpawner {
    store: MetadataStore,
    config: DaemonConfig,
    port: u16,
    publish_pid: AtomicBool,
    spawn_count: AtomicU32,
}

impl MockSpawner {
    /// Creates a spawner that publishes the given command port.
    pub fn new(store: MetadataStore, config: DaemonConfig, port: u16) -> Arc<Self> {
        Arc::new(Self {
            store,
            config,
            port,
            publish_pid: AtomicBool::new(true),
            spawn_count: AtomicU32::new(0),
        })
    }

    /// Makes the spawned "daemon" never publish its pid.
    pub fn without_pid(self: &Arc<Self>) -> Arc<Self> {
        self.publish_pid.store(false, Ordering::SeqCst);
        Arc::clone(self)
    }

    /// Number of spawn calls.
    pub fn spawn_count(&self) -> u32 {
        self.spawn_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DaemonSpawner for MockSpawner {
    async fn spawn(&self) -> Result<()> {
        self.spawn_count.fetch_add(1, Ordering::SeqCst);
        let mut sockets = BTreeMap::new();
        sockets.insert(COMMAND_SOCKET.to_string(), self.port.to_string());
        for (name, value) in &sockets {
            self.store.write_named_socket(name, value).await?;
        }
        if self.publish_pid.load(Ordering::SeqCst) {
            self.store.write_pid(std::process::id()).await?;
            self.store
                .write_fingerprint(&self.config.fingerprint())
                .await?;
        }
        Ok(())
    }
}

/// Mock watcher launcher counting calls.
#[derive(Default)]
pub struct MockWatcher {
    launch_count: AtomicU32,
    terminate_count: AtomicU32,
}

impl MockWatcher {
    /// Creates a mock watcher.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of `maybe_launch` calls.
    pub fn launch_count(&self) -> u32 {
        self.launch_count.load(Ordering::SeqCst)
    }

    /// Number of `terminate` calls.
    pub fn terminate_count(&self) -> u32 {
        self.terminate_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WatcherLauncher for MockWatcher {
    async fn maybe_launch(&self) -> Result<()> {
        self.launch_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn terminate(&self) -> Result<()> {
        self.terminate_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
