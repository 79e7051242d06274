//! # sync-core
//!
//! Pure logic for syncview (no I/O, instant tests).
//!
//! This crate implements the state machines and algorithms behind the
//! client core without any threads, channels or I/O, enabling fast unit
//! tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The runtime pieces (event bus, background recompute, commits) live in
//! `sync-client`, which interprets the results produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod filter;
pub mod permissions;
pub mod window;

pub use filter::{
    build_snapshot, FilterCriteria, FilteredSnapshot, Grouping, OrderKey, Predicate,
    SnapshotGroup, TextField, ViewOptions,
};
pub use permissions::{
    apply_defaults, changed_flags, effective_permissions, has_pending_edit, select_bulk_targets,
    FlagChange, PeerPermissionState,
};
pub use window::{ModeBehavior, OpenPhase, Visibility, WindowAction, WindowPolicy, WindowState};
