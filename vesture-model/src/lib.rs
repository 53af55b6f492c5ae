//! Appearance snapshot and change-set model.
//!
//! Pure data, no orchestration: a received appearance description
//! ([`AppearanceSnapshot`]), the diff against the previously applied one
//! ([`ChangeSet`]), and the atomically swapped record of what is currently
//! applied ([`AppliedState`]).

mod applied;
mod changeset;
mod snapshot;

pub use applied::AppliedState;
pub use changeset::{ChangeCategory, ChangeSet};
pub use snapshot::{AppearanceSnapshot, FileReference};
