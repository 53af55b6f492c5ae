//! The atomically swapped record of what is currently applied.

use serde::{Deserialize, Serialize};
use vesture_types::{EntityHandle, SubHashes};

/// What a session has successfully applied: the snapshot hashes and the
/// entity handle they were applied to.
///
/// Replaced wholesale on pipeline success, never field-by-field, so
/// concurrent readers can never observe a half-updated session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedState {
    /// Hashes of the applied snapshot. Empty when nothing is applied.
    pub hashes: SubHashes,
    /// Handle the snapshot was applied to, if it was still resolvable at
    /// completion time.
    pub entity: Option<EntityHandle>,
}

impl AppliedState {
    /// State for a successful application.
    #[must_use]
    pub fn applied(hashes: SubHashes, entity: Option<EntityHandle>) -> Self {
        Self { hashes, entity }
    }

    /// True when nothing has been applied yet (or state was reset to force a
    /// full reapplication).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}
