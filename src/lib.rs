//! Depot core for Polytope.
//!
//! A content-addressed-by-ID artifact graph, a three-way merge engine keyed
//! by per-type agents, and the workspace state machine that drives edits
//! through changes, save points, and history steps. This crate has no
//! transport, CLI, or storage-engine opinions of its own: everything
//! persists through the [`kv`] abstraction, and callers (an HTTP server, a
//! CLI, an embedding application) sit on top of [`depot::Depot`].

pub mod config;
pub mod depot;
pub mod errors;
pub mod id;
pub mod internal;
pub mod kv;
pub mod permission;
pub mod pvs;

pub use depot::Depot;
pub use errors::{DepotError, ErrorKind, Result};
