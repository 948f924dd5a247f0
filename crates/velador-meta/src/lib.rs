// Iron Lotus: Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # velador-meta
//!
//! Process metadata persistence for the velador daemon supervisor.
//!
//! A daemon identity is a `name` under a `base_dir`. For each identity this
//! crate persists, in one directory:
//!
//! - the process id of the published daemon instance,
//! - the configuration fingerprint that instance was launched with,
//! - zero or more named socket/connection records, and
//! - an advisory cross-process lock file.
//!
//! The supervisor consumes all of this through [`MetadataStore`], a narrow
//! process-identity capability that is injected rather than inherited.
//!
//! Exactly one instance's pid/fingerprint/socket metadata may be published
//! as current for a given identity at any time; callers serialize their
//! decisions through [`MetadataStore::lock_process`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod fingerprint;
pub mod lock;
pub mod store;

pub use error::{MetadataError, Result};
pub use fingerprint::Fingerprint;
pub use lock::ProcessLockGuard;
pub use store::{MetadataStore, process_alive};
