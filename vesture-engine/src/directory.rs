//! Peer-directory collaborator: visibility reports and attempt outcomes.

use async_trait::async_trait;
use vesture_types::{AttemptId, PeerId};

/// Why an application attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Content still missing after the retry budget.
    ContentMissing,
    /// The resource-budget gate rejected the attempt.
    BudgetRejected,
    /// The target entity went away permanently mid-apply.
    EntityInvalid,
    /// Non-appliable render context (cutscene/gpose).
    RenderContext,
    /// A required capability provider is unavailable.
    ProviderUnavailable,
}

/// How an application attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The snapshot was applied; `bytes` is the applied content size.
    Applied { bytes: u64 },
    /// The attempt failed for good (new data required to retry).
    Failed { reason: FailureReason },
}

/// Completion report for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionEvent {
    pub peer: PeerId,
    pub attempt: AttemptId,
    pub outcome: AttemptOutcome,
}

/// Receives visibility transitions and attempt completions.
#[async_trait]
pub trait PeerDirectory: Send + Sync {
    /// Reports a visibility edge (called once per transition, never
    /// repeated while steady-state).
    async fn report_visibility(&self, peer: PeerId, visible: bool);

    /// Reports that an application attempt completed or failed.
    async fn attempt_complete(&self, event: CompletionEvent);
}

/// Recording directory for tests.
pub mod mock {
    use super::*;
    use parking_lot::Mutex;

    /// Collects every report for later inspection.
    #[derive(Default)]
    pub struct RecordingDirectory {
        visibility: Mutex<Vec<(PeerId, bool)>>,
        completions: Mutex<Vec<CompletionEvent>>,
    }

    impl RecordingDirectory {
        pub fn new() -> Self {
            Self::default()
        }

        /// Visibility reports in order.
        pub fn visibility_reports(&self) -> Vec<(PeerId, bool)> {
            self.visibility.lock().clone()
        }

        /// Completion events in order.
        pub fn completions(&self) -> Vec<CompletionEvent> {
            self.completions.lock().clone()
        }

        /// Outcomes only, in order.
        pub fn outcomes(&self) -> Vec<AttemptOutcome> {
            self.completions.lock().iter().map(|e| e.outcome).collect()
        }
    }

    #[async_trait]
    impl PeerDirectory for RecordingDirectory {
        async fn report_visibility(&self, peer: PeerId, visible: bool) {
            self.visibility.lock().push((peer, visible));
        }

        async fn attempt_complete(&self, event: CompletionEvent) {
            self.completions.lock().push(event);
        }
    }
}
