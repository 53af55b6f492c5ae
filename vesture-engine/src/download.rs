//! Bounded-retry content resolution for one application attempt.

use crate::config::EngineConfig;
use crate::content::{ContentResolver, ResolvedFile, ResourceBudget};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use vesture_model::{AppearanceSnapshot, FileReference};
use vesture_types::PeerId;

/// Why a resolution attempt gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadFailure {
    /// Superseded or disposed; never reported as an error.
    Cancelled,
    /// The resource-budget gate rejected the attempt.
    BudgetRejected,
    /// References remained missing after the retry budget (or only
    /// forbidden content was left).
    ContentMissing { outstanding: usize },
}

/// Resolves a snapshot's file references, fetching what is missing, under a
/// bounded retry loop.
///
/// One coordinator exists per session; its fetch lock serializes fetches so
/// a new attempt waits for the session's prior outstanding download.
pub struct DownloadCoordinator {
    content: Arc<dyn ContentResolver>,
    budget: Arc<dyn ResourceBudget>,
    config: EngineConfig,
    fetch_lock: Mutex<()>,
}

impl DownloadCoordinator {
    /// Creates a coordinator for one session.
    pub fn new(
        content: Arc<dyn ContentResolver>,
        budget: Arc<dyn ResourceBudget>,
        config: EngineConfig,
    ) -> Self {
        Self {
            content,
            budget,
            config,
            fetch_lock: Mutex::new(()),
        }
    }

    /// Resolves every reference, fetching missing content, until satisfied
    /// or the retry budget runs out. All waits honor `cancel`.
    pub async fn resolve_all(
        &self,
        peer: PeerId,
        snapshot: &AppearanceSnapshot,
        refs: &[FileReference],
        cancel: &CancellationToken,
    ) -> Result<Vec<ResolvedFile>, DownloadFailure> {
        if refs.is_empty() {
            return Ok(Vec::new());
        }

        for round in 0..self.config.download_attempts {
            if cancel.is_cancelled() {
                return Err(DownloadFailure::Cancelled);
            }

            let outcome = self.content.resolve(refs).await;
            if outcome.missing.is_empty() {
                return Ok(outcome.resolved);
            }

            debug!(
                %peer,
                round,
                missing = outcome.missing.len(),
                "content missing, fetching"
            );

            // Serialize behind any outstanding download for this session.
            let _guard = tokio::select! {
                guard = self.fetch_lock.lock() => guard,
                _ = cancel.cancelled() => return Err(DownloadFailure::Cancelled),
            };

            if !self.budget.admit(peer, snapshot).await {
                warn!(%peer, "resource budget rejected download, aborting attempt");
                return Err(DownloadFailure::BudgetRejected);
            }

            if cancel.is_cancelled() {
                return Err(DownloadFailure::Cancelled);
            }

            if let Err(e) = self.content.fetch(peer, &outcome.missing).await {
                warn!(%peer, error = %e, "fetch round failed");
            }

            let recheck = self.content.resolve(refs).await;
            if recheck.missing.is_empty() {
                return Ok(recheck.resolved);
            }

            // Nothing left but content we can never obtain: stop early.
            let forbidden = self.content.forbidden().await;
            if recheck
                .missing
                .iter()
                .all(|r| forbidden.contains(&r.hash))
            {
                debug!(
                    %peer,
                    outstanding = recheck.missing.len(),
                    "remaining missing content is forbidden, giving up"
                );
                return Err(DownloadFailure::ContentMissing {
                    outstanding: recheck.missing.len(),
                });
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.download_backoff) => {}
                _ = cancel.cancelled() => return Err(DownloadFailure::Cancelled),
            }
        }

        let final_pass = self.content.resolve(refs).await;
        if final_pass.missing.is_empty() {
            Ok(final_pass.resolved)
        } else {
            Err(DownloadFailure::ContentMissing {
                outstanding: final_pass.missing.len(),
            })
        }
    }
}
