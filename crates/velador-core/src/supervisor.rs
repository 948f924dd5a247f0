//! Service supervision and daemon lifetime.
//!
//! The supervisor owns the set of services, runs each as an async task, and
//! binds the daemon's lifetime to theirs: liveness metadata is published
//! only once every service has started cleanly, and the death of any single
//! service takes the whole daemon down through one shutdown path.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use velador_meta::MetadataStore;

use crate::config::DaemonConfig;
use crate::error::{Result, SupervisorError};
use crate::service::{Service, ServiceLock};

/// Default pause between liveness sweeps of the running services.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(1);

/// Default window after spawning in which an immediately-failing service is
/// treated as a startup failure rather than a runtime one.
pub const DEFAULT_STARTUP_CONFIRMATION: Duration = Duration::from_millis(100);

/// Set-once termination flag shared across the daemon.
///
/// The switch only ever transitions unset -> set. Everything torn down
/// before the switch is set stays torn down, so observers that see it set
/// can rely on services having been terminated and joined first.
#[derive(Debug, Clone, Default)]
pub struct KillSwitch {
    flag: Arc<AtomicBool>,
}

impl KillSwitch {
    /// Creates an unset kill switch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the switch. Idempotent.
    ///
    /// Setting the switch directly only stops the monitor loop: running
    /// service tasks are abandoned with a warning, not terminated and
    /// joined. Teardown with joins happens only through
    /// [`Supervisor::shutdown`].
    pub fn set(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Returns whether the switch has been set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// A spawned service task, paired with the service it runs so the shutdown
/// path can signal and then join it.
struct ServiceTask {
    service: Arc<dyn Service>,
    handle: JoinHandle<Result<()>>,
}

/// Bookkeeping for the group of running service tasks.
#[derive(Default)]
pub struct ServiceTaskGroup {
    tasks: Vec<ServiceTask>,
}

impl ServiceTaskGroup {
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `service.run()` as a task and tracks it.
    pub fn spawn(&mut self, service: Arc<dyn Service>) {
        let runner = Arc::clone(&service);
        let handle = tokio::spawn(async move { runner.run().await });
        self.tasks.push(ServiceTask { service, handle });
    }

    /// Number of tracked tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the group tracks no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Name of the first task that has already finished, if any.
    ///
    /// A finished task means its service returned from `run`, which is only
    /// legitimate after termination was requested.
    #[must_use]
    pub fn first_finished(&self) -> Option<String> {
        self.tasks
            .iter()
            .find(|t| t.handle.is_finished())
            .map(|t| t.service.name().to_string())
    }

    fn into_tasks(self) -> Vec<ServiceTask> {
        self.tasks
    }

    /// Drops the group without joining, logging each still-running task.
    pub fn abandon(self) {
        for task in &self.tasks {
            if !task.handle.is_finished() {
                tracing::warn!(service = task.service.name(), "abandoning running service task");
            }
        }
    }
}

/// Runs a daemon's services and binds the process lifetime to them.
pub struct Supervisor {
    config: DaemonConfig,
    services: Vec<Arc<dyn Service>>,
    socket_map: BTreeMap<String, String>,
    store: MetadataStore,
    lock: ServiceLock,
    kill_switch: KillSwitch,
    monitor_interval: Duration,
    startup_confirmation: Duration,
}

impl Supervisor {
    /// Creates a supervisor over the given services.
    ///
    /// `socket_map` carries the endpoint records (name to serialized value,
    /// e.g. a bound port) the services expose; the records are written to
    /// the metadata store before any service starts.
    #[must_use]
    pub fn new(
        config: DaemonConfig,
        services: Vec<Arc<dyn Service>>,
        socket_map: BTreeMap<String, String>,
        store: MetadataStore,
    ) -> Self {
        Self {
            config,
            services,
            socket_map,
            store,
            lock: ServiceLock::new(),
            kill_switch: KillSwitch::new(),
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
            startup_confirmation: DEFAULT_STARTUP_CONFIRMATION,
        }
    }

    /// Overrides the liveness sweep interval.
    #[must_use]
    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    /// Overrides the startup confirmation window.
    #[must_use]
    pub fn with_startup_confirmation(mut self, window: Duration) -> Self {
        self.startup_confirmation = window;
        self
    }

    /// Returns a handle to the daemon-wide kill switch.
    #[must_use]
    pub fn kill_switch(&self) -> KillSwitch {
        self.kill_switch.clone()
    }

    /// Returns the shared service pausing lock.
    #[must_use]
    pub fn service_lock(&self) -> ServiceLock {
        self.lock.clone()
    }

    /// Whether the kill switch has been set.
    #[must_use]
    pub fn is_killed(&self) -> bool {
        self.kill_switch.is_set()
    }

    /// Returns the configuration this supervisor runs under.
    #[must_use]
    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Writes every socket record to the metadata store.
    ///
    /// Called before services start so that, once the pid record appears,
    /// clients can read a complete endpoint map.
    ///
    /// # Errors
    /// Returns an error if a record cannot be written.
    pub async fn publish_socket_map(&self) -> Result<()> {
        for (name, value) in &self.socket_map {
            tracing::debug!(socket = %name, value = %value, "publishing socket record");
            self.store.write_named_socket(name, value).await?;
        }
        Ok(())
    }

    /// Runs each service's synchronous setup, in order.
    ///
    /// # Errors
    /// Returns a startup failure if any setup fails; no liveness metadata
    /// has been published at that point.
    pub fn setup_services(&self) -> Result<()> {
        for service in &self.services {
            tracing::info!(service = service.name(), "setting up service");
            service.setup(self.lock.clone()).map_err(|e| {
                SupervisorError::startup(format!(
                    "service {} failed to set up: {e}",
                    service.name()
                ))
            })?;
        }
        Ok(())
    }

    /// Starts all services, publishes liveness metadata, and monitors the
    /// services until the kill switch is set or one of them dies.
    ///
    /// The pid and fingerprint records are written only after every service
    /// has survived the startup confirmation window, so external observers
    /// never see a live pid for a partially-started daemon. A service death
    /// after that point tears down the remaining services and returns a
    /// runtime failure.
    ///
    /// With no services configured this logs and returns immediately; a
    /// serviceless daemon has nothing to supervise and never publishes
    /// liveness metadata.
    ///
    /// # Errors
    /// Returns a startup failure if a service dies inside the confirmation
    /// window, a runtime failure if one dies later, or a metadata error if
    /// publication fails.
    pub async fn run_services(&self) -> Result<()> {
        if self.services.is_empty() {
            tracing::error!("no services to run, bailing");
            return Ok(());
        }

        let mut group = ServiceTaskGroup::new();
        for service in &self.services {
            tracing::info!(service = service.name(), "starting service");
            group.spawn(Arc::clone(service));
        }

        tokio::time::sleep(self.startup_confirmation).await;
        if let Some(name) = group.first_finished() {
            self.shutdown(group).await;
            return Err(SupervisorError::startup(format!(
                "service {name} failed to start, shutting down"
            )));
        }

        // All services are up: make this instance discoverable.
        self.store.write_pid(std::process::id()).await?;
        self.store
            .write_fingerprint(&self.config.fingerprint())
            .await?;
        tracing::info!(
            pid = std::process::id(),
            services = group.len(),
            "all services running, liveness published"
        );

        loop {
            if self.kill_switch.is_set() {
                tracing::info!("kill switch set, exiting monitor loop");
                group.abandon();
                return Ok(());
            }
            if let Some(name) = group.first_finished() {
                self.shutdown(group).await;
                return Err(SupervisorError::runtime(format!(
                    "service failure for {name}, shutting down"
                )));
            }
            tokio::time::sleep(self.monitor_interval).await;
        }
    }

    /// Terminates and joins every service task, then sets the kill switch.
    ///
    /// Joins are unbounded: a service must honor `terminate` for shutdown
    /// to complete. The kill switch is set strictly after the last join, so
    /// anyone observing it set knows all services are gone.
    pub async fn shutdown(&self, group: ServiceTaskGroup) {
        let _paused = self.lock.lock().await;
        for ServiceTask { service, handle } in group.into_tasks() {
            tracing::info!(service = service.name(), "terminating service");
            service.terminate();
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(service = service.name(), error = %e, "service exited with error");
                }
                Err(e) => {
                    tracing::warn!(service = service.name(), error = %e, "service task panicked");
                }
            }
        }
        tracing::info!("terminating daemon");
        self.kill_switch.set();
    }
}
