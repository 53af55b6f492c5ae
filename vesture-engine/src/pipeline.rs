//! One application attempt: sequencing capability-provider calls.

use crate::config::EngineConfig;
use crate::content::ResolvedFile;
use crate::directory::{AttemptOutcome, CompletionEvent, FailureReason, PeerDirectory};
use crate::error::EngineResult;
use crate::providers::Providers;
use crate::world::WorldView;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use vesture_model::{AppearanceSnapshot, AppliedState, ChangeCategory, ChangeSet};
use vesture_types::{AttemptId, EntityHandle, EntityKind, PeerId, ScopeId};

/// The per-session mod-application scope and the slot it is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeBinding {
    pub scope: ScopeId,
    pub object_index: u16,
}

/// Everything one pipeline run needs. Exists only for the duration of the
/// attempt.
pub struct AttemptRun {
    pub id: AttemptId,
    pub snapshot: AppearanceSnapshot,
    pub changes: ChangeSet,
    pub resolved: Vec<ResolvedFile>,
    pub handle: EntityHandle,
    /// A redraw was deferred by an earlier skipped attempt.
    pub redraw_deferred: bool,
    pub cancel: CancellationToken,
}

/// How a pipeline run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Success; AppliedState was swapped.
    Applied { bytes: u64 },
    /// Superseded/disposed. AppliedState untouched, nothing emitted.
    Cancelled,
    /// The target entity went away for good mid-run.
    EntityInvalid,
}

enum DrawWait {
    Settled,
    TimedOut,
    Cancelled,
    Invalid,
}

/// Sequences capability-provider calls for one attempt, under one
/// cancellation scope.
///
/// Holds the session's shared applied-state and mod-scope cells; the
/// secondary rebinder reuses the same cells through its own pipeline
/// reference.
pub struct ApplicationPipeline {
    peer: PeerId,
    config: EngineConfig,
    world: Arc<dyn WorldView>,
    providers: Providers,
    directory: Arc<dyn PeerDirectory>,
    applied: Arc<RwLock<AppliedState>>,
    mod_scope: Arc<Mutex<Option<ScopeBinding>>>,
}

impl ApplicationPipeline {
    pub(crate) fn new(
        peer: PeerId,
        config: EngineConfig,
        world: Arc<dyn WorldView>,
        providers: Providers,
        directory: Arc<dyn PeerDirectory>,
        applied: Arc<RwLock<AppliedState>>,
        mod_scope: Arc<Mutex<Option<ScopeBinding>>>,
    ) -> Self {
        Self {
            peer,
            config,
            world,
            providers,
            directory,
            applied,
            mod_scope,
        }
    }

    /// Runs the attempt to completion, cancellation, or entity loss.
    pub async fn run(&self, run: AttemptRun) -> PipelineOutcome {
        match self.wait_draw_settled(run.handle, &run.cancel).await {
            DrawWait::Settled => {}
            DrawWait::Cancelled => return PipelineOutcome::Cancelled,
            DrawWait::Invalid => return self.entity_lost(run.id).await,
            DrawWait::TimedOut => {
                warn!(peer = %self.peer, handle = %run.handle, "draw wait expired, applying anyway");
            }
        }

        let mut bytes = 0u64;
        let mods_changed = run.changes.contains_any(ChangeCategory::ModFiles)
            || run.changes.contains_any(ChangeCategory::ModManipulation);
        if mods_changed {
            match self.push_mod_data(&run).await {
                Ok(applied_bytes) => bytes = applied_bytes,
                Err(e) => {
                    warn!(peer = %self.peer, error = %e, "mod data push failed, continuing");
                }
            }
        }

        if run.cancel.is_cancelled() {
            return PipelineOutcome::Cancelled;
        }

        let mut redrew = false;
        for kind in run.changes.kinds() {
            let handle = if kind == EntityKind::Primary {
                run.handle
            } else {
                match self.world.resolve_entity(self.peer, kind).await {
                    Some(h) => h,
                    None => {
                        debug!(peer = %self.peer, %kind, "entity not rendered, skipping kind");
                        continue;
                    }
                }
            };

            for category in run.changes.categories_for(kind) {
                if run.cancel.is_cancelled() {
                    return PipelineOutcome::Cancelled;
                }
                if kind == EntityKind::Primary && !self.world.is_valid(handle) {
                    return self.entity_lost(run.id).await;
                }

                match category {
                    // Already pushed above, in one provider call.
                    ChangeCategory::ModFiles | ChangeCategory::ModManipulation => {}
                    ChangeCategory::ForcedRedraw => {
                        self.redraw(handle).await;
                        redrew = true;
                    }
                    other => {
                        if let Err(e) =
                            self.apply_category(handle, kind, &run.snapshot, other).await
                        {
                            warn!(
                                peer = %self.peer,
                                %kind,
                                ?category,
                                error = %e,
                                "category failed, skipping it"
                            );
                        }
                    }
                }
            }
        }

        // Mod file changes need a redraw to take effect even when the
        // snapshot didn't ask for one.
        let wants_redraw = (run.changes.contains_any(ChangeCategory::ModFiles)
            && !run.changes.contains_any(ChangeCategory::ForcedRedraw))
            || run.redraw_deferred;
        if wants_redraw && !redrew {
            if run.cancel.is_cancelled() {
                return PipelineOutcome::Cancelled;
            }
            self.redraw(run.handle).await;
        }

        if run.cancel.is_cancelled() {
            return PipelineOutcome::Cancelled;
        }

        *self.applied.write() =
            AppliedState::applied(run.snapshot.hashes.clone(), Some(run.handle));
        self.directory
            .attempt_complete(CompletionEvent {
                peer: self.peer,
                attempt: run.id,
                outcome: AttemptOutcome::Applied { bytes },
            })
            .await;
        debug!(peer = %self.peer, attempt = %run.id, bytes, "snapshot applied");
        PipelineOutcome::Applied { bytes }
    }

    /// Applies one visual category through its provider. An empty payload
    /// means the peer cleared the category, which maps to a revert.
    pub async fn apply_category(
        &self,
        handle: EntityHandle,
        kind: EntityKind,
        snapshot: &AppearanceSnapshot,
        category: ChangeCategory,
    ) -> EngineResult<()> {
        let (provider, payload) = match category {
            ChangeCategory::Customization => (
                self.providers.customization.as_ref(),
                snapshot.customization_for(kind),
            ),
            ChangeCategory::Accessory => (
                self.providers.accessory.as_ref(),
                snapshot.accessory_for(kind),
            ),
            ChangeCategory::Title => (
                self.providers.title.as_ref(),
                Some(snapshot.title.as_str()).filter(|s| !s.is_empty()),
            ),
            ChangeCategory::Status => (
                self.providers.status.as_ref(),
                Some(snapshot.status.as_str()).filter(|s| !s.is_empty()),
            ),
            ChangeCategory::PetNames => (
                self.providers.pet_names.as_ref(),
                Some(snapshot.pet_names.as_str()).filter(|s| !s.is_empty()),
            ),
            _ => (None, None),
        };

        let Some(provider) = provider else {
            debug!(peer = %self.peer, ?category, "no provider, skipping");
            return Ok(());
        };

        match payload {
            Some(payload) => provider.apply(handle, payload).await,
            None => provider.revert(handle).await,
        }
    }

    /// Lazily creates the mod scope and binds it to the slot. Repeating
    /// with the same slot is a no-op.
    pub async fn ensure_scope_bound(&self, object_index: u16) -> EngineResult<ScopeId> {
        let existing = *self.mod_scope.lock();
        let scope = match existing {
            Some(binding) if binding.object_index == object_index => return Ok(binding.scope),
            Some(binding) => binding.scope,
            None => self.providers.mods.create_scope(self.peer).await?,
        };
        self.providers.mods.assign_scope(scope, object_index).await?;
        *self.mod_scope.lock() = Some(ScopeBinding {
            scope,
            object_index,
        });
        Ok(scope)
    }

    /// Binds the scope to the slot and replaces its override mapping and
    /// manipulation blob in one provider call.
    pub async fn apply_overrides(
        &self,
        object_index: u16,
        snapshot: &AppearanceSnapshot,
        resolved: &[ResolvedFile],
    ) -> EngineResult<()> {
        let scope = self.ensure_scope_bound(object_index).await?;
        let overrides = build_overrides(snapshot, resolved);
        self.providers
            .mods
            .set_overrides(scope, overrides, &snapshot.manipulation)
            .await
    }

    /// Pushes the attempt's resolved mod data; returns the applied byte
    /// count.
    async fn push_mod_data(&self, run: &AttemptRun) -> EngineResult<u64> {
        let bytes: u64 = run.resolved.iter().map(|f| f.size).sum();
        self.apply_overrides(run.handle.object_index, &run.snapshot, &run.resolved)
            .await?;
        Ok(bytes)
    }

    /// Triggers a redraw and waits (bounded) for the acknowledgement.
    pub async fn redraw(&self, handle: EntityHandle) {
        match tokio::time::timeout(
            self.config.redraw_ack_timeout,
            self.providers.mods.redraw(handle),
        )
        .await
        {
            Ok(Ok(())) => debug!(peer = %self.peer, %handle, "redraw acknowledged"),
            Ok(Err(e)) => warn!(peer = %self.peer, error = %e, "redraw failed"),
            Err(_) => warn!(peer = %self.peer, "redraw not acknowledged in time"),
        }
    }

    /// Bounded wait for the entity to finish any externally-driven draw.
    async fn wait_draw_settled(
        &self,
        handle: EntityHandle,
        cancel: &CancellationToken,
    ) -> DrawWait {
        let deadline = Instant::now() + self.config.draw_wait_timeout;
        loop {
            if cancel.is_cancelled() {
                return DrawWait::Cancelled;
            }
            if !self.world.is_valid(handle) {
                return DrawWait::Invalid;
            }
            if !self.world.is_drawing(handle) {
                return DrawWait::Settled;
            }
            if Instant::now() >= deadline {
                return DrawWait::TimedOut;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.draw_poll_interval) => {}
                _ = cancel.cancelled() => return DrawWait::Cancelled,
            }
        }
    }

    async fn entity_lost(&self, attempt: AttemptId) -> PipelineOutcome {
        warn!(peer = %self.peer, %attempt, "target entity invalidated mid-apply");
        self.directory
            .attempt_complete(CompletionEvent {
                peer: self.peer,
                attempt,
                outcome: AttemptOutcome::Failed {
                    reason: FailureReason::EntityInvalid,
                },
            })
            .await;
        PipelineOutcome::EntityInvalid
    }
}

/// Maps every game path to its local override: resolved content first, then
/// pure path swaps.
fn build_overrides(
    snapshot: &AppearanceSnapshot,
    resolved: &[ResolvedFile],
) -> HashMap<String, PathBuf> {
    let mut overrides = HashMap::new();
    for file in resolved {
        for game_path in &file.reference.game_paths {
            overrides.insert(game_path.clone(), file.path.clone());
        }
    }
    for kind in EntityKind::ALL {
        for reference in snapshot.references_for(kind) {
            if let Some(swap) = &reference.swap_path {
                for game_path in &reference.game_paths {
                    overrides.insert(game_path.clone(), PathBuf::from(swap));
                }
            }
        }
    }
    overrides
}
