//! Change-set computation between snapshots.

use crate::snapshot::AppearanceSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use vesture_types::EntityKind;

/// One category of appearance change.
///
/// `Ord` defines the fixed application order the pipeline uses: mod data
/// first, then the visual categories, redraw last.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ChangeCategory {
    ModFiles,
    ModManipulation,
    Customization,
    Accessory,
    Title,
    Status,
    PetNames,
    ForcedRedraw,
}

/// Per-entity-kind set of change categories between two snapshots.
///
/// An empty change set means the application is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    changes: BTreeMap<EntityKind, BTreeSet<ChangeCategory>>,
}

impl ChangeSet {
    /// Creates an empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes the diff between the previously applied snapshot and a new
    /// one. `None` previous means nothing was applied yet, so everything the
    /// new snapshot carries is a change.
    #[must_use]
    pub fn diff(previous: Option<&AppearanceSnapshot>, next: &AppearanceSnapshot) -> Self {
        let mut set = Self::new();

        for kind in EntityKind::ALL {
            let next_files = next.references_for(kind);
            let prev_files = previous.map_or(&[][..], |p| p.references_for(kind));
            if next_files != prev_files {
                set.insert(kind, ChangeCategory::ModFiles);
            }

            let next_custom = next.customization_for(kind);
            let prev_custom = previous.and_then(|p| p.customization_for(kind));
            if next_custom != prev_custom {
                set.insert(kind, ChangeCategory::Customization);
            }

            let next_acc = next.accessory_for(kind);
            let prev_acc = previous.and_then(|p| p.accessory_for(kind));
            if next_acc != prev_acc {
                set.insert(kind, ChangeCategory::Accessory);
            }
        }

        if next.manipulation != previous.map_or("", |p| p.manipulation.as_str()) {
            set.insert(EntityKind::Primary, ChangeCategory::ModManipulation);
        }
        if next.title != previous.map_or("", |p| p.title.as_str()) {
            set.insert(EntityKind::Primary, ChangeCategory::Title);
        }
        if next.status != previous.map_or("", |p| p.status.as_str()) {
            set.insert(EntityKind::Primary, ChangeCategory::Status);
        }
        if next.pet_names != previous.map_or("", |p| p.pet_names.as_str()) {
            set.insert(EntityKind::Pet, ChangeCategory::PetNames);
        }

        set
    }

    /// Records a change.
    pub fn insert(&mut self, kind: EntityKind, category: ChangeCategory) {
        self.changes.entry(kind).or_default().insert(category);
    }

    /// True when the change is recorded for the kind.
    #[must_use]
    pub fn contains(&self, kind: EntityKind, category: ChangeCategory) -> bool {
        self.changes
            .get(&kind)
            .is_some_and(|set| set.contains(&category))
    }

    /// True when the category is recorded for *any* kind.
    #[must_use]
    pub fn contains_any(&self, category: ChangeCategory) -> bool {
        self.changes.values().any(|set| set.contains(&category))
    }

    /// Categories recorded for one kind, in application order.
    #[must_use]
    pub fn categories_for(&self, kind: EntityKind) -> Vec<ChangeCategory> {
        self.changes
            .get(&kind)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Entity kinds with at least one recorded change.
    #[must_use]
    pub fn kinds(&self) -> Vec<EntityKind> {
        self.changes.keys().copied().collect()
    }

    /// Merges another change set into this one.
    pub fn merge(&mut self, other: &ChangeSet) {
        for (kind, categories) in &other.changes {
            let entry = self.changes.entry(*kind).or_default();
            entry.extend(categories.iter().copied());
        }
    }

    /// True when no change is recorded at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.values().all(BTreeSet::is_empty)
    }
}
