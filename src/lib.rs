//! Velador: Daemon Lifecycle and Service Supervision Engine
//!
//! Part of the PAIML Sovereign AI Stack.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use velador::prelude::*;
//!
//! // Re-exports from sub-crates for convenience
//! ```

pub use velador_core as core;
pub use velador_meta as meta;

/// Prelude module for common imports.
pub mod prelude {
    pub use velador_core::{
        DaemonConfig, DaemonEndpoint, DaemonLauncher, DaemonSpawner, KillSwitch, Service,
        ServiceLock, Supervisor, SupervisorError, WatcherLauncher,
    };
    pub use velador_meta::{Fingerprint, MetadataStore};
}
