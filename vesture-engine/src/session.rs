//! Per-peer session controller.
//!
//! Owns one peer's full lifecycle: receives snapshots, decides whether they
//! differ from what is applied, and orchestrates download → application,
//! deferring or aborting when the world says "not now". At most one
//! application runs per session at any time; a newer snapshot supersedes an
//! outstanding download.

use crate::config::EngineConfig;
use crate::content::{ContentResolver, ResourceBudget};
use crate::directory::{AttemptOutcome, CompletionEvent, FailureReason, PeerDirectory};
use crate::download::{DownloadCoordinator, DownloadFailure};
use crate::pipeline::{ApplicationPipeline, AttemptRun, PipelineOutcome, ScopeBinding};
use crate::providers::Providers;
use crate::rebind::SecondaryEntityRebinder;
use crate::visibility::{GateState, VisibilityGate};
use crate::world::WorldView;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vesture_model::{AppearanceSnapshot, AppliedState, ChangeCategory, ChangeSet};
use vesture_types::{AttemptId, EntityHandle, EntityKind, PeerId, SubHashes};

/// The session's lifecycle state. Transitions are checked; an illegal one
/// is logged and refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No resolved entity handle yet.
    Unbound,
    /// Handle resolved, peer not reported visible.
    BoundNotVisible,
    /// Handle resolved, peer reported visible.
    BoundVisible,
    /// An application attempt is running.
    Applying,
    /// Torn down; terminal.
    Disposed,
}

impl SessionState {
    /// Whether moving to `next` is a legal transition.
    #[must_use]
    pub fn can_transition(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Disposed, _) => false,
            (_, Disposed) => true,
            (Unbound, BoundNotVisible) => true,
            (BoundNotVisible, BoundVisible | Applying | Unbound) => true,
            (BoundVisible, BoundNotVisible | Applying | Unbound) => true,
            (Applying, BoundVisible | BoundNotVisible | Unbound) => true,
            (a, b) => a == b,
        }
    }
}

/// Why an apply call was deferred (retried automatically later).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    /// Local actor is in combat/performance.
    RestrictedActivity,
    /// The target entity handle can't currently be resolved.
    UnresolvedEntity,
    /// The visibility gate is closed (zone transition/cutscene).
    VisibilityGated,
}

/// Why an apply call was skipped without starting work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// An attempt with matching hashes is already in flight.
    AlreadyInFlight,
    /// The session is disposed.
    Disposed,
}

/// What `apply_snapshot` decided to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyDisposition {
    /// Download + application started in the background.
    Started,
    /// Already applied; nothing to do.
    NoOp,
    /// Cached as pending; auto-retried on the next relevant trigger.
    Deferred(DeferReason),
    /// Dropped in favor of in-flight work.
    Skipped(SkipReason),
    /// Hard abort; not retried until new data arrives.
    Rejected(FailureReason),
}

struct PendingApply {
    attempt: AttemptId,
    snapshot: AppearanceSnapshot,
    force: bool,
}

struct InProgress {
    attempt: AttemptId,
    hashes: SubHashes,
}

/// One peer's session: long-lived owner of the applied state, the pipeline,
/// and the secondary rebinder.
pub struct PeerSession {
    peer: PeerId,
    config: EngineConfig,
    world: Arc<dyn WorldView>,
    directory: Arc<dyn PeerDirectory>,
    providers: Providers,
    downloads: DownloadCoordinator,
    pipeline: Arc<ApplicationPipeline>,
    rebinder: SecondaryEntityRebinder,

    state: Mutex<SessionState>,
    gate: Mutex<VisibilityGate>,
    applied: Arc<RwLock<AppliedState>>,
    mod_scope: Arc<Mutex<Option<ScopeBinding>>>,
    /// Snapshot backing the current AppliedState; the diff baseline.
    applied_snapshot: Mutex<Option<AppearanceSnapshot>>,
    /// Most recently received snapshot (feeds the secondary rebinder).
    last_snapshot: Mutex<Option<AppearanceSnapshot>>,
    pending: Mutex<Option<PendingApply>>,
    in_progress: Mutex<Option<InProgress>>,
    last_handle: Mutex<Option<EntityHandle>>,
    redraw_deferred: AtomicBool,
    mods_differ: AtomicBool,

    root_cancel: CancellationToken,
    download_cancel: Mutex<CancellationToken>,
    apply_running: AtomicBool,
    apply_done: Notify,
}

impl PeerSession {
    /// Creates a session for a newly known peer.
    pub fn new(
        peer: PeerId,
        config: EngineConfig,
        world: Arc<dyn WorldView>,
        content: Arc<dyn ContentResolver>,
        budget: Arc<dyn ResourceBudget>,
        providers: Providers,
        directory: Arc<dyn PeerDirectory>,
    ) -> Arc<Self> {
        let applied = Arc::new(RwLock::new(AppliedState::default()));
        let mod_scope = Arc::new(Mutex::new(None));
        let pipeline = Arc::new(ApplicationPipeline::new(
            peer,
            config.clone(),
            Arc::clone(&world),
            providers.clone(),
            Arc::clone(&directory),
            Arc::clone(&applied),
            Arc::clone(&mod_scope),
        ));
        let rebinder = SecondaryEntityRebinder::new(
            peer,
            config.clone(),
            Arc::clone(&world),
            Arc::clone(&content),
            Arc::clone(&pipeline),
        );
        let downloads = DownloadCoordinator::new(content, budget, config.clone());
        let root_cancel = CancellationToken::new();
        let download_cancel = Mutex::new(root_cancel.child_token());

        Arc::new(Self {
            peer,
            gate: Mutex::new(VisibilityGate::new(config.grace_window)),
            config,
            world,
            directory,
            providers,
            downloads,
            pipeline,
            rebinder,
            state: Mutex::new(SessionState::Unbound),
            applied,
            mod_scope,
            applied_snapshot: Mutex::new(None),
            last_snapshot: Mutex::new(None),
            pending: Mutex::new(None),
            in_progress: Mutex::new(None),
            last_handle: Mutex::new(None),
            redraw_deferred: AtomicBool::new(false),
            mods_differ: AtomicBool::new(false),
            root_cancel,
            download_cancel,
            apply_running: AtomicBool::new(false),
            apply_done: Notify::new(),
        })
    }

    /// The peer this session belongs to.
    #[must_use]
    pub fn peer(&self) -> PeerId {
        self.peer
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// A copy of the applied state (hashes + handle).
    #[must_use]
    pub fn applied_state(&self) -> AppliedState {
        self.applied.read().clone()
    }

    // ── Public entry point ───────────────────────────────────────

    /// Applies a received snapshot to the peer's rendered entity.
    ///
    /// Deferrals are cached and retried automatically on the next tick that
    /// clears them; hard rejections emit a failure completion and wait for
    /// new data.
    pub async fn apply_snapshot(
        self: &Arc<Self>,
        attempt: AttemptId,
        snapshot: AppearanceSnapshot,
        force: bool,
    ) -> ApplyDisposition {
        if self.state() == SessionState::Disposed {
            return ApplyDisposition::Skipped(SkipReason::Disposed);
        }

        *self.last_snapshot.lock() = Some(snapshot.clone());

        // 1. Restricted activity: defer, retried when it clears.
        if self.world.activity().restricted() {
            debug!(peer = %self.peer, %attempt, "restricted activity, deferring");
            *self.pending.lock() = Some(PendingApply {
                attempt,
                snapshot,
                force,
            });
            return ApplyDisposition::Deferred(DeferReason::RestrictedActivity);
        }

        // 2. No resolvable handle: remember that mods differ, defer.
        let Some(handle) = self
            .world
            .resolve_entity(self.peer, EntityKind::Primary)
            .await
        else {
            debug!(peer = %self.peer, %attempt, "entity unresolved, deferring");
            self.mods_differ.store(true, Ordering::SeqCst);
            *self.pending.lock() = Some(PendingApply {
                attempt,
                snapshot,
                force,
            });
            return ApplyDisposition::Deferred(DeferReason::UnresolvedEntity);
        };
        *self.last_handle.lock() = Some(handle);
        if self.state() == SessionState::Unbound {
            self.transition(SessionState::BoundNotVisible);
        }

        // 3. Matching attempt already in flight: don't start another.
        if let Some(in_progress) = self.in_progress.lock().as_ref() {
            if in_progress.hashes.matches(&snapshot.hashes) {
                debug!(
                    peer = %self.peer,
                    %attempt,
                    running = %in_progress.attempt,
                    "matching attempt in flight, skipping"
                );
                if force {
                    self.redraw_deferred.store(true, Ordering::SeqCst);
                }
                return ApplyDisposition::Skipped(SkipReason::AlreadyInFlight);
            }
        }

        // 4. Hash equality against the applied state.
        let mut force_customization = false;
        {
            let applied = self.applied.read();
            if applied.hashes.matches(&snapshot.hashes)
                && !force
                && !self.mods_differ.load(Ordering::SeqCst)
            {
                if applied.entity == Some(handle) {
                    debug!(peer = %self.peer, %attempt, "already applied, no-op");
                    return ApplyDisposition::NoOp;
                }
                // Same data, new handle: provider state was reset
                // externally, so customization must be replayed.
                force_customization = true;
            }
        }

        // 5. Gated visibility suppresses new downloads: cache the snapshot
        // and retry once the gate reopens.
        if self.gate.lock().state() == GateState::Gated {
            debug!(peer = %self.peer, %attempt, "visibility gated, deferring");
            *self.pending.lock() = Some(PendingApply {
                attempt,
                snapshot,
                force,
            });
            return ApplyDisposition::Deferred(DeferReason::VisibilityGated);
        }

        // 6. Hard "not now": not deferred, not retried until new data.
        if !self.world.render_context().appliable() {
            warn!(peer = %self.peer, %attempt, "non-appliable render context, aborting");
            self.fail_attempt(attempt, FailureReason::RenderContext).await;
            return ApplyDisposition::Rejected(FailureReason::RenderContext);
        }
        if !self.providers.has_required() {
            warn!(peer = %self.peer, %attempt, "required provider unavailable, aborting");
            self.fail_attempt(attempt, FailureReason::ProviderUnavailable)
                .await;
            return ApplyDisposition::Rejected(FailureReason::ProviderUnavailable);
        }

        // 7. Diff, record in-progress hashes, hand off.
        let baseline = if self.mods_differ.swap(false, Ordering::SeqCst) {
            None
        } else {
            self.applied_snapshot.lock().clone()
        };
        let mut changes = ChangeSet::diff(baseline.as_ref(), &snapshot);
        if force || force_customization {
            for kind in EntityKind::ALL {
                if snapshot.customization_for(kind).is_some() {
                    changes.insert(kind, ChangeCategory::Customization);
                }
            }
        }
        if force {
            changes.insert(EntityKind::Primary, ChangeCategory::ForcedRedraw);
        }
        if changes.is_empty() && !self.redraw_deferred.load(Ordering::SeqCst) {
            debug!(peer = %self.peer, %attempt, "empty change set, no-op");
            return ApplyDisposition::NoOp;
        }

        *self.in_progress.lock() = Some(InProgress {
            attempt,
            hashes: snapshot.hashes.clone(),
        });

        // A newer snapshot supersedes any outstanding download.
        let download_cancel = {
            let mut guard = self.download_cancel.lock();
            guard.cancel();
            *guard = self.root_cancel.child_token();
            guard.clone()
        };

        info!(
            peer = %self.peer,
            %attempt,
            kinds = changes.kinds().len(),
            "starting application attempt"
        );
        let session = Arc::clone(self);
        tokio::spawn(async move {
            session
                .run_attempt(attempt, snapshot, changes, handle, download_cancel)
                .await;
        });
        ApplyDisposition::Started
    }

    // ── Attempt execution ────────────────────────────────────────

    async fn run_attempt(
        self: Arc<Self>,
        attempt: AttemptId,
        snapshot: AppearanceSnapshot,
        changes: ChangeSet,
        handle: EntityHandle,
        download_cancel: CancellationToken,
    ) {
        let refs = snapshot.downloadable_references(&EntityKind::ALL);
        let resolved = match self
            .downloads
            .resolve_all(self.peer, &snapshot, &refs, &download_cancel)
            .await
        {
            Ok(resolved) => resolved,
            Err(DownloadFailure::Cancelled) => {
                debug!(peer = %self.peer, %attempt, "download superseded");
                self.clear_in_progress(attempt);
                return;
            }
            Err(DownloadFailure::BudgetRejected) => {
                self.fail_attempt(attempt, FailureReason::BudgetRejected).await;
                self.clear_in_progress(attempt);
                return;
            }
            Err(DownloadFailure::ContentMissing { outstanding }) => {
                warn!(peer = %self.peer, %attempt, outstanding, "content unresolvable");
                self.fail_attempt(attempt, FailureReason::ContentMissing).await;
                self.clear_in_progress(attempt);
                return;
            }
        };

        // Never two applications at once on one session.
        if !self.wait_for_apply_slot(&download_cancel).await {
            self.clear_in_progress(attempt);
            return;
        }
        self.transition(SessionState::Applying);

        let run = AttemptRun {
            id: attempt,
            snapshot: snapshot.clone(),
            changes,
            resolved,
            handle,
            redraw_deferred: self.redraw_deferred.swap(false, Ordering::SeqCst),
            cancel: self.root_cancel.child_token(),
        };
        let outcome = self.pipeline.run(run).await;
        self.apply_running.store(false, Ordering::SeqCst);
        self.apply_done.notify_waiters();

        match outcome {
            PipelineOutcome::Applied { .. } => {
                *self.applied_snapshot.lock() = Some(snapshot);
                let visible = self.gate.lock().last_reported() == Some(true);
                self.transition(if visible {
                    SessionState::BoundVisible
                } else {
                    SessionState::BoundNotVisible
                });
            }
            PipelineOutcome::Cancelled => {
                debug!(peer = %self.peer, %attempt, "attempt cancelled");
                let visible = self.gate.lock().last_reported() == Some(true);
                self.transition(if visible {
                    SessionState::BoundVisible
                } else {
                    SessionState::BoundNotVisible
                });
            }
            PipelineOutcome::EntityInvalid => {
                // Full reapplication on the next valid sighting.
                *self.applied.write() = AppliedState::default();
                *self.applied_snapshot.lock() = None;
                self.mods_differ.store(true, Ordering::SeqCst);
                let report = self.gate.lock().force_not_visible();
                if report {
                    self.directory.report_visibility(self.peer, false).await;
                }
                self.transition(SessionState::Unbound);
            }
        }
        self.clear_in_progress(attempt);
    }

    /// Cooperative bounded wait for the prior application to finish.
    /// Returns false when cancelled while waiting.
    async fn wait_for_apply_slot(&self, cancel: &CancellationToken) -> bool {
        loop {
            if cancel.is_cancelled() || self.root_cancel.is_cancelled() {
                return false;
            }
            if self
                .apply_running
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return true;
            }
            tokio::select! {
                _ = self.apply_done.notified() => {}
                _ = tokio::time::sleep(self.config.handoff_poll_interval) => {}
                _ = cancel.cancelled() => return false,
            }
        }
    }

    fn clear_in_progress(&self, attempt: AttemptId) {
        let mut guard = self.in_progress.lock();
        if guard.as_ref().is_some_and(|p| p.attempt == attempt) {
            *guard = None;
        }
    }

    async fn fail_attempt(&self, attempt: AttemptId, reason: FailureReason) {
        self.directory
            .attempt_complete(CompletionEvent {
                peer: self.peer,
                attempt,
                outcome: AttemptOutcome::Failed { reason },
            })
            .await;
    }

    fn transition(&self, next: SessionState) {
        let mut state = self.state.lock();
        if state.can_transition(next) {
            *state = next;
        } else {
            warn!(peer = %self.peer, from = ?*state, to = ?next, "illegal state transition refused");
        }
    }

    // ── Recurring trigger ────────────────────────────────────────

    /// The recurring external tick: revalidates the handle, retries
    /// deferred applies, drives visibility and the secondary rebinder.
    pub async fn tick(self: &Arc<Self>) {
        if self.state() == SessionState::Disposed {
            return;
        }

        // The handle is a hint. Re-resolve every tick, never compare a
        // stale one for identity.
        let handle = self
            .world
            .resolve_entity(self.peer, EntityKind::Primary)
            .await;
        *self.last_handle.lock() = handle;
        match (handle, self.state()) {
            (Some(_), SessionState::Unbound) => self.transition(SessionState::BoundNotVisible),
            (None, SessionState::BoundNotVisible | SessionState::BoundVisible) => {
                self.transition(SessionState::Unbound);
            }
            _ => {}
        }

        // Deferred snapshot: retry once the restriction cleared, the handle
        // resolves, and the gate is open.
        let retry = {
            let mut pending = self.pending.lock();
            if pending.is_some()
                && !self.world.activity().restricted()
                && handle.is_some()
                && self.gate.lock().state() == GateState::Open
            {
                pending.take()
            } else {
                None
            }
        };
        if let Some(p) = retry {
            debug!(peer = %self.peer, attempt = %p.attempt, "retrying deferred snapshot");
            let _ = self.apply_snapshot(p.attempt, p.snapshot, p.force).await;
        }

        // Visibility: edge-reported, gate-suppressed. An unresolvable
        // entity counts as not proximate so the downward edge still fires.
        let proximate = handle.is_some_and(|h| {
            self.world
                .distance_to(self.peer)
                .is_some_and(|d| d <= self.config.visibility_range)
                && self.world.on_screen(h)
        });
        let report = self.gate.lock().evaluate(proximate);
        if let Some(visible) = report {
            self.directory.report_visibility(self.peer, visible).await;
            match self.state() {
                SessionState::BoundNotVisible | SessionState::BoundVisible => {
                    self.transition(if visible {
                        SessionState::BoundVisible
                    } else {
                        SessionState::BoundNotVisible
                    });
                }
                _ => {}
            }
        }

        let snapshot = self.last_snapshot.lock().clone();
        self.rebinder.tick(snapshot.as_ref()).await;
    }

    // ── External notifications ───────────────────────────────────

    /// Zone transition started: gate visibility, cancel in-flight
    /// downloads.
    pub fn note_zone_change(&self) {
        self.gate.lock().note_zone_change();
        self.download_cancel.lock().cancel();
    }

    /// Zone load finished: reopen the gate (grace window starts).
    pub fn note_zone_loaded(&self) {
        self.gate.lock().note_zone_loaded();
    }

    /// Cutscene started/ended.
    pub fn note_cutscene(&self, active: bool) {
        self.gate.lock().note_cutscene(active);
    }

    /// External resource-load notification tied to the secondary entity.
    pub async fn notify_resource_load(&self) {
        let snapshot = self.last_snapshot.lock().clone();
        self.rebinder.notify_resource_load(snapshot.as_ref()).await;
    }

    // ── Teardown ─────────────────────────────────────────────────

    /// Tears the session down: cancels everything and reverts all applied
    /// capability state. Idempotent.
    pub async fn dispose(&self) {
        {
            let mut state = self.state.lock();
            if *state == SessionState::Disposed {
                return;
            }
            *state = SessionState::Disposed;
        }
        self.root_cancel.cancel();
        self.download_cancel.lock().cancel();

        let primary = {
            let last = *self.last_handle.lock();
            last.or(self.applied.read().entity)
        };
        if let Some(handle) = primary {
            for provider in self.providers.capabilities() {
                if let Err(e) = provider.revert(handle).await {
                    warn!(peer = %self.peer, error = %e, "revert failed during dispose");
                }
            }
        }
        if let Some(handle) = self.rebinder.last_handle() {
            for provider in self.providers.capabilities() {
                if let Err(e) = provider.revert(handle).await {
                    warn!(peer = %self.peer, error = %e, "secondary revert failed during dispose");
                }
            }
        }

        let binding = self.mod_scope.lock().take();
        if let Some(binding) = binding {
            if let Err(e) = self.providers.mods.remove_scope(binding.scope).await {
                warn!(peer = %self.peer, error = %e, "scope removal failed during dispose");
            }
        }
        info!(peer = %self.peer, "session disposed");
    }
}
