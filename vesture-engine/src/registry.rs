//! Arena of peer sessions keyed by stable peer identifiers.

use crate::config::EngineConfig;
use crate::content::{ContentResolver, ResourceBudget};
use crate::directory::PeerDirectory;
use crate::providers::Providers;
use crate::session::PeerSession;
use crate::world::WorldView;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use vesture_types::PeerId;

/// Owns all live peer sessions and the shared collaborators they are built
/// from. Sessions are keyed by `PeerId`; resolved entity addresses are
/// volatile attributes inside the session, never keys.
pub struct SessionRegistry {
    config: EngineConfig,
    world: Arc<dyn WorldView>,
    content: Arc<dyn ContentResolver>,
    budget: Arc<dyn ResourceBudget>,
    providers: Providers,
    directory: Arc<dyn PeerDirectory>,
    sessions: RwLock<HashMap<PeerId, Arc<PeerSession>>>,
}

impl SessionRegistry {
    /// Creates a registry over the shared collaborators.
    pub fn new(
        config: EngineConfig,
        world: Arc<dyn WorldView>,
        content: Arc<dyn ContentResolver>,
        budget: Arc<dyn ResourceBudget>,
        providers: Providers,
        directory: Arc<dyn PeerDirectory>,
    ) -> Self {
        Self {
            config,
            world,
            content,
            budget,
            providers,
            directory,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the session for a peer, creating it when the peer becomes
    /// known.
    pub fn ensure(&self, peer: PeerId) -> Arc<PeerSession> {
        if let Some(session) = self.sessions.read().get(&peer) {
            return Arc::clone(session);
        }
        let mut sessions = self.sessions.write();
        Arc::clone(sessions.entry(peer).or_insert_with(|| {
            PeerSession::new(
                peer,
                self.config.clone(),
                Arc::clone(&self.world),
                Arc::clone(&self.content),
                Arc::clone(&self.budget),
                self.providers.clone(),
                Arc::clone(&self.directory),
            )
        }))
    }

    /// The session for a peer, if one exists.
    pub fn get(&self, peer: PeerId) -> Option<Arc<PeerSession>> {
        self.sessions.read().get(&peer).map(Arc::clone)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// True when no sessions exist.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Removes a peer's session, reverting everything it applied.
    pub async fn remove(&self, peer: PeerId) {
        let session = self.sessions.write().remove(&peer);
        if let Some(session) = session {
            session.dispose().await;
        }
    }

    /// Tears down every session (plugin session end).
    pub async fn dispose_all(&self) {
        let sessions: Vec<_> = self.sessions.write().drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.dispose().await;
        }
    }

    /// Drives every session's recurring tick.
    pub async fn tick_all(&self) {
        let sessions: Vec<_> = self.sessions.read().values().map(Arc::clone).collect();
        for session in sessions {
            session.tick().await;
        }
    }

    /// Broadcasts a zone-transition start to every session.
    pub fn note_zone_change(&self) {
        for session in self.sessions.read().values() {
            session.note_zone_change();
        }
    }

    /// Broadcasts a zone-load completion to every session.
    pub fn note_zone_loaded(&self) {
        for session in self.sessions.read().values() {
            session.note_zone_loaded();
        }
    }

    /// Broadcasts a cutscene start/end to every session.
    pub fn note_cutscene(&self, active: bool) {
        for session in self.sessions.read().values() {
            session.note_cutscene(active);
        }
    }
}
