//! Core type definitions for Vesture.
//!
//! This crate defines the fundamental, engine-agnostic types used throughout
//! the appearance sync core:
//! - Peer and application-attempt identifiers (UUID v4/v7)
//! - Entity handles and entity kinds
//! - Content hashes and per-subsystem snapshot hashes
//!
//! Anything that knows about providers, downloads, or sessions belongs in
//! `vesture-engine`, not here.

mod handle;
mod hash;
mod ids;

pub use handle::{EntityHandle, EntityKind};
pub use hash::{ContentHash, SubHashes};
pub use ids::{AttemptId, PeerId, ScopeId};
