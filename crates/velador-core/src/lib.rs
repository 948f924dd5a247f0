// Iron Lotus: Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # velador-core
//!
//! Daemon lifecycle and service supervision for the Velador daemon engine.
//!
//! This crate provides the machinery for keeping exactly one valid daemon
//! instance per workspace identity:
//!
//! - [`Service`] trait for the long-lived units of work a daemon runs
//! - [`Supervisor`] for running services and binding the daemon's lifetime to them
//! - [`DaemonLauncher`] for the client-side reuse-or-replace launch protocol
//! - [`DaemonConfig`] for configuration and identity fingerprinting
//! - [`daemonize`] for process detachment and the daemon-side entrypoint
//!
//! ## Example
//!
//! ```rust,ignore
//! use velador_core::{DaemonConfig, DaemonLauncher, daemonize};
//! use velador_meta::MetadataStore;
//!
//! // In main(): the same binary is both the client and the daemon.
//! if daemonize::is_daemon_process() {
//!     // build the supervisor and hand the process over
//!     // daemonize::run_daemon(&supervisor).await?;
//! } else {
//!     // let endpoint = launcher.maybe_launch().await?;
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Allow significant_drop_tightening - overly aggressive for async code with locks
#![allow(clippy::significant_drop_tightening)]

pub mod config;
#[cfg(unix)]
#[allow(unsafe_code)]
pub mod daemonize;
pub mod error;
pub mod launch;
#[cfg(unix)]
pub mod logstream;
pub mod service;
pub mod supervisor;
#[cfg(test)]
pub mod tests;
pub mod watcher;

pub use config::DaemonConfig;
pub use error::{Result, SupervisorError};
pub use launch::{COMMAND_SOCKET, DaemonEndpoint, DaemonLauncher, DaemonSpawner};
#[cfg(unix)]
pub use logstream::{LoggerStream, StreamKind};
pub use service::{Service, ServiceLock};
pub use supervisor::{KillSwitch, ServiceTaskGroup, Supervisor};
pub use watcher::{NullWatcherLauncher, ProcessWatcherLauncher, WatcherLauncher};
