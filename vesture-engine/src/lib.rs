//! Per-peer appearance synchronization and application engine.
//!
//! Vesture applies a peer's received appearance state onto the locally
//! rendered representation of that peer. The engine decides whether new
//! data differs from what is already applied, resolves missing
//! content-addressed files, and replays the change through capability
//! providers, tolerating cancellation, visibility changes, restricted
//! activity windows, and a secondary entity that must be rebound
//! independently.
//!
//! # Components
//!
//! - **DownloadCoordinator**: bounded-retry content resolution with a
//!   resource-budget gate
//! - **ApplicationPipeline**: sequences provider calls for one attempt
//!   under one cancellation scope
//! - **SecondaryEntityRebinder**: reconciles the mount/companion entity on
//!   its own cooldown-limited cadence
//! - **VisibilityGate**: suppresses visibility reporting during zone
//!   transitions and cutscenes
//! - **PeerSession / SessionRegistry**: one session per peer, the public
//!   entry point [`PeerSession::apply_snapshot`]
//!
//! The engine renders nothing and defines no wire format: the world view,
//! content cache, resource budget, capability providers, and peer directory
//! are collaborators behind traits (each with a `mock` submodule for
//! tests).

mod config;
mod download;
mod error;
mod pipeline;
mod rebind;
mod registry;
mod session;
mod visibility;

pub mod content;
pub mod directory;
pub mod providers;
pub mod world;

pub use config::EngineConfig;
pub use content::{ContentResolver, ResolveOutcome, ResolvedFile, ResourceBudget};
pub use directory::{AttemptOutcome, CompletionEvent, FailureReason, PeerDirectory};
pub use download::{DownloadCoordinator, DownloadFailure};
pub use error::{EngineError, EngineResult};
pub use pipeline::{ApplicationPipeline, AttemptRun, PipelineOutcome, ScopeBinding};
pub use providers::{CapabilityProvider, ModProvider, Providers};
pub use rebind::{structure_hash, SecondaryEntityRebinder};
pub use registry::SessionRegistry;
pub use session::{ApplyDisposition, DeferReason, PeerSession, SessionState, SkipReason};
pub use visibility::{GateState, VisibilityGate};
pub use world::{Activity, RenderContext, WorldView};
