//! Entity handles and entity kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A resolved rendered-entity handle.
///
/// This is a *hint*, never an identity: the rendered entity behind it can
/// disappear, move, or be replaced at any time, so callers must revalidate
/// the handle through the world view before every use. Two handles comparing
/// equal means "same address and slot right now", nothing more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityHandle {
    /// Opaque render-object address.
    pub address: u64,
    /// Slot index used by the mod provider for scope assignment.
    pub object_index: u16,
}

impl EntityHandle {
    /// Creates a handle from an address and object index.
    #[must_use]
    pub const fn new(address: u64, object_index: u16) -> Self {
        Self {
            address,
            object_index,
        }
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}/{}", self.address, self.object_index)
    }
}

/// The kinds of rendered entities a snapshot can describe.
///
/// `Secondary` (mount/companion-like object) is reconciled independently of
/// the primary entity, on its own cadence.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum EntityKind {
    Primary,
    Companion,
    Pet,
    Secondary,
}

impl EntityKind {
    /// All kinds, in deterministic application order.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Primary,
        EntityKind::Companion,
        EntityKind::Pet,
        EntityKind::Secondary,
    ];
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityKind::Primary => "primary",
            EntityKind::Companion => "companion",
            EntityKind::Pet => "pet",
            EntityKind::Secondary => "secondary",
        };
        f.write_str(s)
    }
}
