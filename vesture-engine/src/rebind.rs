//! Independent reconciliation of the secondary (mount/companion) entity.
//!
//! The secondary entity is created and destroyed by the game far more often
//! than the primary one, so it gets its own cadence: a per-tick reconcile
//! with a structural-hash short circuit and a cooldown on rebind calls to
//! avoid provider call storms.

use crate::config::EngineConfig;
use crate::content::ContentResolver;
use crate::pipeline::ApplicationPipeline;
use crate::world::WorldView;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};
use vesture_model::{AppearanceSnapshot, ChangeCategory, FileReference};
use vesture_types::{EntityHandle, EntityKind, PeerId};

#[derive(Debug, Default)]
struct SecondaryState {
    last_handle: Option<EntityHandle>,
    last_structure: Option<String>,
    last_rebind: Option<Instant>,
    last_resource_trigger: Option<Instant>,
}

/// Reconciles the secondary entity's appearance on its own cadence,
/// reusing the session's pipeline (and through it the shared mod scope).
pub struct SecondaryEntityRebinder {
    peer: PeerId,
    config: EngineConfig,
    world: Arc<dyn WorldView>,
    content: Arc<dyn ContentResolver>,
    pipeline: Arc<ApplicationPipeline>,
    state: Mutex<SecondaryState>,
    in_flight: AtomicBool,
}

impl SecondaryEntityRebinder {
    pub(crate) fn new(
        peer: PeerId,
        config: EngineConfig,
        world: Arc<dyn WorldView>,
        content: Arc<dyn ContentResolver>,
        pipeline: Arc<ApplicationPipeline>,
    ) -> Self {
        Self {
            peer,
            config,
            world,
            content,
            pipeline,
            state: Mutex::new(SecondaryState::default()),
            in_flight: AtomicBool::new(false),
        }
    }

    /// The handle last reconciled, for revert-on-dispose.
    #[must_use]
    pub fn last_handle(&self) -> Option<EntityHandle> {
        self.state.lock().last_handle
    }

    /// One reconciliation pass; the recurring trigger.
    pub async fn tick(&self, snapshot: Option<&AppearanceSnapshot>) {
        let Some(snapshot) = snapshot else { return };
        if !has_secondary_data(snapshot) {
            return;
        }
        if !self.world.render_context().appliable() {
            return;
        }
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return;
        }
        self.reconcile(snapshot, false).await;
        self.in_flight.store(false, Ordering::SeqCst);
    }

    /// Proactive rebind+reapply on an external resource-load notification,
    /// outside the normal cadence. Cooldown-limited on its own timer.
    pub async fn notify_resource_load(&self, snapshot: Option<&AppearanceSnapshot>) {
        let Some(snapshot) = snapshot else { return };
        if !has_secondary_data(snapshot) {
            return;
        }
        {
            let state = self.state.lock();
            if let Some(last) = state.last_resource_trigger {
                if last.elapsed() < self.config.rebind_cooldown {
                    debug!(peer = %self.peer, "resource-load trigger inside cooldown, ignoring");
                    return;
                }
            }
        }
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut state = self.state.lock();
            state.last_resource_trigger = Some(Instant::now());
            // Force the structural short circuit to miss.
            state.last_structure = None;
        }
        self.reconcile(snapshot, true).await;
        self.in_flight.store(false, Ordering::SeqCst);
    }

    async fn reconcile(&self, snapshot: &AppearanceSnapshot, forced: bool) {
        let Some(handle) = self
            .world
            .resolve_entity(self.peer, EntityKind::Secondary)
            .await
        else {
            return;
        };

        let refs = snapshot.references_for(EntityKind::Secondary);
        let structure = structure_hash(refs);

        let (handle_changed, structure_changed) = {
            let state = self.state.lock();
            (
                state.last_handle != Some(handle),
                state.last_structure.as_deref() != Some(structure.as_str()),
            )
        };

        if !handle_changed && !structure_changed && !forced {
            return;
        }

        if handle_changed {
            // Rebind attempts are rate-limited; a blocked rebind is retried
            // on the next tick, not dropped. A failed rebind does not burn
            // the cooldown window.
            {
                let state = self.state.lock();
                if let Some(last) = state.last_rebind {
                    if last.elapsed() < self.config.rebind_cooldown {
                        debug!(peer = %self.peer, "rebind inside cooldown, retrying next tick");
                        return;
                    }
                }
            }

            if let Err(e) = self.pipeline.ensure_scope_bound(handle.object_index).await {
                warn!(peer = %self.peer, error = %e, "secondary scope rebind failed");
                return;
            }
            self.state.lock().last_rebind = Some(Instant::now());
            debug!(peer = %self.peer, %handle, "secondary scope rebound");
        }

        // Pre-apply whatever content is already resolved; a full fetch is
        // the primary pipeline's job.
        let outcome = self.content.resolve(refs).await;
        if !outcome.resolved.is_empty() {
            if let Err(e) = self
                .pipeline
                .apply_overrides(handle.object_index, snapshot, &outcome.resolved)
                .await
            {
                warn!(peer = %self.peer, error = %e, "secondary override push failed");
            }
        }

        for category in [ChangeCategory::Customization, ChangeCategory::Accessory] {
            if let Err(e) = self
                .pipeline
                .apply_category(handle, EntityKind::Secondary, snapshot, category)
                .await
            {
                warn!(peer = %self.peer, ?category, error = %e, "secondary category failed");
            }
        }
        self.pipeline.redraw(handle).await;

        let mut state = self.state.lock();
        state.last_handle = Some(handle);
        state.last_structure = Some(structure);
    }
}

fn has_secondary_data(snapshot: &AppearanceSnapshot) -> bool {
    !snapshot.references_for(EntityKind::Secondary).is_empty()
        || snapshot
            .customization_for(EntityKind::Secondary)
            .is_some()
        || snapshot.accessory_for(EntityKind::Secondary).is_some()
}

/// Order-independent structural hash over the secondary reference set:
/// content hash, game paths, swap path. Lets the rebinder skip work when
/// the data hasn't changed regardless of reference ordering.
pub fn structure_hash(refs: &[FileReference]) -> String {
    let mut lines: Vec<String> = refs
        .iter()
        .map(|r| {
            let mut paths = r.game_paths.clone();
            paths.sort();
            format!(
                "{}|{}|{}",
                r.hash,
                paths.join(","),
                r.swap_path.as_deref().unwrap_or("")
            )
        })
        .collect();
    lines.sort();

    let mut hasher = Sha256::new();
    for line in &lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}
