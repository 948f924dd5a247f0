//! Test infrastructure for the supervision engine.
//!
//! Integration-style tests live here rather than in per-module test mods
//! because they exercise the full launch and lifecycle protocols across
//! the supervisor, the launcher, and the metadata store together.

pub mod mocks;

pub use mocks::{MockService, MockSpawner, MockWatcher};
