//! Received appearance snapshots.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use vesture_types::{ContentHash, EntityKind, SubHashes};

/// One content-addressed file reference inside a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReference {
    /// Game paths this content replaces. A single hash can back several
    /// paths.
    pub game_paths: Vec<String>,
    /// Hash of the replacement content.
    pub hash: ContentHash,
    /// Path-to-path swap with no downloaded content behind it.
    pub swap_path: Option<String>,
}

impl FileReference {
    /// Creates a reference backed by downloadable content.
    #[must_use]
    pub fn new(game_paths: Vec<String>, hash: impl Into<ContentHash>) -> Self {
        Self {
            game_paths,
            hash: hash.into(),
            swap_path: None,
        }
    }

    /// True when this reference needs resolved content on disk (swaps don't).
    #[must_use]
    pub fn needs_content(&self) -> bool {
        self.swap_path.is_none()
    }
}

/// A peer's full appearance state at one point in time.
///
/// Immutable once received; clone before mutating. The engine never edits a
/// snapshot in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppearanceSnapshot {
    /// Per-entity-kind file replacements.
    pub files: BTreeMap<EntityKind, Vec<FileReference>>,
    /// Opaque mod-manipulation blob, applied alongside the file overrides.
    pub manipulation: String,
    /// Per-entity-kind customization payloads.
    pub customization: BTreeMap<EntityKind, String>,
    /// Per-entity-kind accessory payloads.
    pub accessory: BTreeMap<EntityKind, String>,
    /// Title payload (primary entity only).
    pub title: String,
    /// Status-overlay payload (primary entity only).
    pub status: String,
    /// Pet-name payload.
    pub pet_names: String,
    /// Per-subsystem hashes plus the aggregate hash.
    pub hashes: SubHashes,
}

impl AppearanceSnapshot {
    /// File references for one entity kind (empty slice when absent).
    #[must_use]
    pub fn references_for(&self, kind: EntityKind) -> &[FileReference] {
        self.files.get(&kind).map_or(&[], Vec::as_slice)
    }

    /// References that need content on disk, across the given kinds.
    #[must_use]
    pub fn downloadable_references(&self, kinds: &[EntityKind]) -> Vec<FileReference> {
        kinds
            .iter()
            .flat_map(|k| self.references_for(*k))
            .filter(|r| r.needs_content())
            .cloned()
            .collect()
    }

    /// Customization payload for one kind, if present and non-empty.
    #[must_use]
    pub fn customization_for(&self, kind: EntityKind) -> Option<&str> {
        self.customization
            .get(&kind)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Accessory payload for one kind, if present and non-empty.
    #[must_use]
    pub fn accessory_for(&self, kind: EntityKind) -> Option<&str> {
        self.accessory
            .get(&kind)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }
}
