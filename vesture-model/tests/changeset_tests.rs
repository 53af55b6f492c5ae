use pretty_assertions::assert_eq;
use vesture_model::{AppearanceSnapshot, ChangeCategory, ChangeSet, FileReference};
use vesture_types::{EntityKind, SubHashes};

fn snapshot_with_files(paths: &[&str], hash: &str) -> AppearanceSnapshot {
    let mut snap = AppearanceSnapshot::default();
    snap.files.insert(
        EntityKind::Primary,
        vec![FileReference::new(
            paths.iter().map(|p| (*p).to_string()).collect(),
            hash,
        )],
    );
    snap
}

fn hashes(mods: &str, aggregate: &str) -> SubHashes {
    SubHashes {
        mods: mods.into(),
        customization: "c".into(),
        accessory: "a".into(),
        status: "s".into(),
        aggregate: aggregate.into(),
    }
}

// ── Diff against nothing ─────────────────────────────────────────

#[test]
fn diff_from_scratch_flags_everything_present() {
    let mut snap = snapshot_with_files(&["chara/body.tex"], "abc123");
    snap.manipulation = "blob".into();
    snap.customization
        .insert(EntityKind::Primary, "custom".into());
    snap.title = "title".into();
    snap.pet_names = "pets".into();

    let set = ChangeSet::diff(None, &snap);
    assert!(set.contains(EntityKind::Primary, ChangeCategory::ModFiles));
    assert!(set.contains(EntityKind::Primary, ChangeCategory::ModManipulation));
    assert!(set.contains(EntityKind::Primary, ChangeCategory::Customization));
    assert!(set.contains(EntityKind::Primary, ChangeCategory::Title));
    assert!(set.contains(EntityKind::Pet, ChangeCategory::PetNames));
    assert!(!set.contains(EntityKind::Primary, ChangeCategory::Accessory));
}

#[test]
fn diff_from_scratch_of_empty_snapshot_is_empty() {
    let set = ChangeSet::diff(None, &AppearanceSnapshot::default());
    assert!(set.is_empty());
}

// ── Diff between snapshots ───────────────────────────────────────

#[test]
fn identical_snapshots_produce_empty_changeset() {
    let snap = snapshot_with_files(&["chara/body.tex"], "abc123");
    let set = ChangeSet::diff(Some(&snap), &snap.clone());
    assert!(set.is_empty());
}

#[test]
fn changed_file_hash_flags_mod_files_only() {
    let old = snapshot_with_files(&["chara/body.tex"], "abc123");
    let new = snapshot_with_files(&["chara/body.tex"], "def456");

    let set = ChangeSet::diff(Some(&old), &new);
    assert!(set.contains(EntityKind::Primary, ChangeCategory::ModFiles));
    assert!(!set.contains(EntityKind::Primary, ChangeCategory::Customization));
}

#[test]
fn secondary_kind_changes_do_not_touch_primary() {
    let old = AppearanceSnapshot::default();
    let mut new = AppearanceSnapshot::default();
    new.files.insert(
        EntityKind::Secondary,
        vec![FileReference::new(vec!["mount/saddle.tex".into()], "aa11")],
    );

    let set = ChangeSet::diff(Some(&old), &new);
    assert!(set.contains(EntityKind::Secondary, ChangeCategory::ModFiles));
    assert_eq!(set.kinds(), vec![EntityKind::Secondary]);
}

#[test]
fn categories_come_out_in_application_order() {
    let mut set = ChangeSet::new();
    set.insert(EntityKind::Primary, ChangeCategory::ForcedRedraw);
    set.insert(EntityKind::Primary, ChangeCategory::Title);
    set.insert(EntityKind::Primary, ChangeCategory::ModFiles);
    set.insert(EntityKind::Primary, ChangeCategory::Customization);

    assert_eq!(
        set.categories_for(EntityKind::Primary),
        vec![
            ChangeCategory::ModFiles,
            ChangeCategory::Customization,
            ChangeCategory::Title,
            ChangeCategory::ForcedRedraw,
        ]
    );
}

#[test]
fn merge_unions_categories() {
    let mut a = ChangeSet::new();
    a.insert(EntityKind::Primary, ChangeCategory::ModFiles);
    let mut b = ChangeSet::new();
    b.insert(EntityKind::Primary, ChangeCategory::ForcedRedraw);
    b.insert(EntityKind::Pet, ChangeCategory::PetNames);

    a.merge(&b);
    assert!(a.contains(EntityKind::Primary, ChangeCategory::ModFiles));
    assert!(a.contains(EntityKind::Primary, ChangeCategory::ForcedRedraw));
    assert!(a.contains(EntityKind::Pet, ChangeCategory::PetNames));
}

// ── Hash equality rules ──────────────────────────────────────────

#[test]
fn sub_hash_match_beats_aggregate_divergence() {
    let a = hashes("m1", "agg1");
    let b = hashes("m1", "agg2");
    assert!(a.matches(&b));
}

#[test]
fn empty_sub_hashes_never_match() {
    let a = SubHashes::default();
    assert!(!a.matches(&SubHashes::default()));
}
