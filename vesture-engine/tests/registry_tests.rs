use std::sync::Arc;
use vesture_engine::content::mock::{MockBudget, MockResolver};
use vesture_engine::directory::mock::RecordingDirectory;
use vesture_engine::providers::mock::{MockCapability, MockModProvider};
use vesture_engine::world::mock::MockWorld;
use vesture_engine::{
    CapabilityProvider, EngineConfig, ModProvider, Providers, SessionRegistry, SessionState,
};
use vesture_types::PeerId;

fn registry() -> SessionRegistry {
    let providers = Providers {
        mods: Arc::new(MockModProvider::new()) as Arc<dyn ModProvider>,
        customization: Some(Arc::new(MockCapability::new("customization"))
            as Arc<dyn CapabilityProvider>),
        accessory: None,
        title: None,
        status: None,
        pet_names: None,
    };
    SessionRegistry::new(
        EngineConfig::default(),
        Arc::new(MockWorld::new()),
        Arc::new(MockResolver::new()),
        Arc::new(MockBudget::new()),
        providers,
        Arc::new(RecordingDirectory::new()),
    )
}

#[tokio::test]
async fn ensure_creates_a_session_once() {
    let registry = registry();
    let peer = PeerId::new();
    assert!(registry.is_empty());

    let first = registry.ensure(peer);
    let second = registry.ensure(peer);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn sessions_are_isolated_per_peer() {
    let registry = registry();
    let a = registry.ensure(PeerId::new());
    let b = registry.ensure(PeerId::new());
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(registry.len(), 2);
}

#[tokio::test]
async fn get_returns_only_known_peers() {
    let registry = registry();
    let peer = PeerId::new();
    assert!(registry.get(peer).is_none());
    registry.ensure(peer);
    assert!(registry.get(peer).is_some());
}

#[tokio::test]
async fn remove_disposes_the_session() {
    let registry = registry();
    let peer = PeerId::new();
    let session = registry.ensure(peer);

    registry.remove(peer).await;
    assert_eq!(session.state(), SessionState::Disposed);
    assert!(registry.get(peer).is_none());
}

#[tokio::test]
async fn dispose_all_tears_down_every_session() {
    let registry = registry();
    let a = registry.ensure(PeerId::new());
    let b = registry.ensure(PeerId::new());

    registry.dispose_all().await;
    assert!(registry.is_empty());
    assert_eq!(a.state(), SessionState::Disposed);
    assert_eq!(b.state(), SessionState::Disposed);
}

#[tokio::test]
async fn tick_all_survives_disposed_sessions() {
    let registry = registry();
    let peer = PeerId::new();
    let session = registry.ensure(peer);
    session.dispose().await;

    // A disposed session left in the map is skipped, not an error.
    registry.tick_all().await;
}
