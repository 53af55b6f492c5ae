use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use vesture_engine::content::mock::{MockBudget, MockResolver};
use vesture_engine::{DownloadCoordinator, DownloadFailure, EngineConfig};
use vesture_model::{AppearanceSnapshot, FileReference};
use vesture_types::PeerId;

fn coordinator(
    resolver: &Arc<MockResolver>,
    budget: &Arc<MockBudget>,
) -> DownloadCoordinator {
    DownloadCoordinator::new(
        Arc::clone(resolver) as _,
        Arc::clone(budget) as _,
        EngineConfig::default(),
    )
}

fn reference(hash: &str, path: &str) -> FileReference {
    FileReference::new(vec![path.to_string()], hash)
}

// ── Happy paths ──────────────────────────────────────────────────

#[tokio::test]
async fn empty_reference_set_resolves_immediately() {
    let resolver = Arc::new(MockResolver::new());
    let budget = Arc::new(MockBudget::new());
    let coord = coordinator(&resolver, &budget);

    let resolved = coord
        .resolve_all(
            PeerId::new(),
            &AppearanceSnapshot::default(),
            &[],
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert!(resolved.is_empty());
    assert_eq!(resolver.fetch_calls(), 0);
}

#[tokio::test]
async fn fully_cached_content_skips_fetching() {
    let resolver = Arc::new(MockResolver::new());
    resolver.cache("aa11", "/cache/aa11", 100);
    let budget = Arc::new(MockBudget::new());
    let coord = coordinator(&resolver, &budget);

    let resolved = coord
        .resolve_all(
            PeerId::new(),
            &AppearanceSnapshot::default(),
            &[reference("aa11", "chara/a.tex")],
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].size, 100);
    assert_eq!(resolver.fetch_calls(), 0);
    assert_eq!(budget.calls(), 0);
}

#[tokio::test]
async fn missing_content_is_fetched_then_resolved() {
    let resolver = Arc::new(MockResolver::new());
    resolver.cache("aa11", "/cache/aa11", 100);
    resolver.fetchable("bb22", "/cache/bb22", 200);
    let budget = Arc::new(MockBudget::new());
    let coord = coordinator(&resolver, &budget);

    let resolved = coord
        .resolve_all(
            PeerId::new(),
            &AppearanceSnapshot::default(),
            &[reference("aa11", "chara/a.tex"), reference("bb22", "chara/b.tex")],
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(resolved.len(), 2);
    assert_eq!(resolver.fetch_calls(), 1);
    assert_eq!(budget.calls(), 1);
}

// ── Bounded termination ──────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn unresolvable_content_terminates_within_retry_budget() {
    let resolver = Arc::new(MockResolver::new());
    let budget = Arc::new(MockBudget::new());
    let coord = coordinator(&resolver, &budget);

    let result = coord
        .resolve_all(
            PeerId::new(),
            &AppearanceSnapshot::default(),
            &[reference("dead", "chara/x.tex")],
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(
        result.unwrap_err(),
        DownloadFailure::ContentMissing { outstanding: 1 }
    );
    assert_eq!(resolver.fetch_calls(), EngineConfig::default().download_attempts);
}

#[tokio::test]
async fn forbidden_remainder_short_circuits() {
    // Three missing; the first fetch satisfies two, the third is forbidden.
    let resolver = Arc::new(MockResolver::new());
    resolver.fetchable("aa11", "/cache/aa11", 10);
    resolver.fetchable("bb22", "/cache/bb22", 20);
    resolver.forbid("cc33");
    let budget = Arc::new(MockBudget::new());
    let coord = coordinator(&resolver, &budget);

    let result = coord
        .resolve_all(
            PeerId::new(),
            &AppearanceSnapshot::default(),
            &[
                reference("aa11", "p1"),
                reference("bb22", "p2"),
                reference("cc33", "p3"),
            ],
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(
        result.unwrap_err(),
        DownloadFailure::ContentMissing { outstanding: 1 }
    );
    // One round, not ten: the forbidden remainder stops the loop early.
    assert_eq!(resolver.fetch_calls(), 1);
}

// ── Budget gate ──────────────────────────────────────────────────

#[tokio::test]
async fn budget_rejection_aborts_before_fetching() {
    let resolver = Arc::new(MockResolver::new());
    resolver.fetchable("aa11", "/cache/aa11", 10);
    let budget = Arc::new(MockBudget::new());
    budget.set_allow(false);
    let coord = coordinator(&resolver, &budget);

    let result = coord
        .resolve_all(
            PeerId::new(),
            &AppearanceSnapshot::default(),
            &[reference("aa11", "p1")],
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(result.unwrap_err(), DownloadFailure::BudgetRejected);
    assert_eq!(resolver.fetch_calls(), 0);
}

// ── Cancellation ─────────────────────────────────────────────────

#[tokio::test]
async fn pre_cancelled_token_ends_silently() {
    let resolver = Arc::new(MockResolver::new());
    resolver.fetchable("aa11", "/cache/aa11", 10);
    let budget = Arc::new(MockBudget::new());
    let coord = coordinator(&resolver, &budget);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = coord
        .resolve_all(
            PeerId::new(),
            &AppearanceSnapshot::default(),
            &[reference("aa11", "p1")],
            &cancel,
        )
        .await;
    assert_eq!(result.unwrap_err(), DownloadFailure::Cancelled);
    assert_eq!(resolver.fetch_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_backoff_is_honored() {
    let resolver = Arc::new(MockResolver::new());
    let budget = Arc::new(MockBudget::new());
    let coord = Arc::new(coordinator(&resolver, &budget));

    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();
    let task_coord = Arc::clone(&coord);
    let task = tokio::spawn(async move {
        task_coord
            .resolve_all(
                PeerId::new(),
                &AppearanceSnapshot::default(),
                &[reference("dead", "p1")],
                &task_cancel,
            )
            .await
    });

    // Let the first round run into its backoff, then cancel.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    cancel.cancel();
    let result = task.await.unwrap();
    assert_eq!(result.unwrap_err(), DownloadFailure::Cancelled);
    assert!(resolver.fetch_calls() <= 1);
}
