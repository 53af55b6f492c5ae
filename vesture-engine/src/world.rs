//! World-view collaborator: resolving and inspecting rendered entities.
//!
//! Everything the engine knows about the live scene comes through this
//! trait. Handles returned here are volatile hints and must be revalidated
//! before every use.

use async_trait::async_trait;
use vesture_types::{EntityHandle, EntityKind, PeerId};

/// The render context the local actor is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderContext {
    /// Application is allowed.
    Normal,
    /// Cutscene in progress; application is a hard "not now".
    Cutscene,
    /// Posing mode; application is a hard "not now".
    GPose,
}

impl RenderContext {
    /// True when applying appearance state is allowed.
    #[must_use]
    pub fn appliable(self) -> bool {
        matches!(self, RenderContext::Normal)
    }
}

/// What the local actor is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Idle,
    /// Combat restricts application; deferred, retried when it clears.
    Combat,
    /// Performance mode restricts application the same way.
    Performing,
}

impl Activity {
    /// True when application must be deferred.
    #[must_use]
    pub fn restricted(self) -> bool {
        !matches!(self, Activity::Idle)
    }
}

/// Read-only view of the rendered scene.
#[async_trait]
pub trait WorldView: Send + Sync {
    /// Resolves the current handle for one of a peer's entities, if the
    /// entity is currently rendered.
    async fn resolve_entity(&self, peer: PeerId, kind: EntityKind) -> Option<EntityHandle>;

    /// True when the handle still points at a live entity.
    fn is_valid(&self, handle: EntityHandle) -> bool;

    /// True while the entity is mid-draw (externally driven).
    fn is_drawing(&self, handle: EntityHandle) -> bool;

    /// The local actor's render context.
    fn render_context(&self) -> RenderContext;

    /// The local actor's activity.
    fn activity(&self) -> Activity;

    /// Distance from the local actor to the peer, if known.
    fn distance_to(&self, peer: PeerId) -> Option<f32>;

    /// True when the handle projects onto the screen.
    fn on_screen(&self, handle: EntityHandle) -> bool;
}

/// A scriptable world view for tests.
pub mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};

    /// In-memory world whose state tests mutate directly.
    #[derive(Default)]
    pub struct MockWorld {
        inner: Mutex<State>,
    }

    #[derive(Default)]
    struct State {
        entities: HashMap<(PeerId, EntityKind), EntityHandle>,
        invalid: HashSet<EntityHandle>,
        drawing: HashSet<EntityHandle>,
        off_screen: HashSet<EntityHandle>,
        distances: HashMap<PeerId, f32>,
        render_context: Option<RenderContext>,
        activity: Option<Activity>,
    }

    impl MockWorld {
        /// Creates a world with everything idle and appliable.
        pub fn new() -> Self {
            Self::default()
        }

        /// Places (or moves) a peer's entity.
        pub fn put_entity(&self, peer: PeerId, kind: EntityKind, handle: EntityHandle) {
            let mut s = self.inner.lock();
            s.entities.insert((peer, kind), handle);
            s.invalid.remove(&handle);
        }

        /// Removes a peer's entity from the scene.
        pub fn remove_entity(&self, peer: PeerId, kind: EntityKind) {
            let mut s = self.inner.lock();
            if let Some(handle) = s.entities.remove(&(peer, kind)) {
                s.invalid.insert(handle);
            }
        }

        /// Marks a handle permanently invalid without removing the mapping.
        pub fn invalidate(&self, handle: EntityHandle) {
            self.inner.lock().invalid.insert(handle);
        }

        /// Marks/unmarks a handle as mid-draw.
        pub fn set_drawing(&self, handle: EntityHandle, drawing: bool) {
            let mut s = self.inner.lock();
            if drawing {
                s.drawing.insert(handle);
            } else {
                s.drawing.remove(&handle);
            }
        }

        /// Sets the local render context.
        pub fn set_render_context(&self, ctx: RenderContext) {
            self.inner.lock().render_context = Some(ctx);
        }

        /// Sets the local activity.
        pub fn set_activity(&self, activity: Activity) {
            self.inner.lock().activity = Some(activity);
        }

        /// Sets the distance to a peer.
        pub fn set_distance(&self, peer: PeerId, distance: f32) {
            self.inner.lock().distances.insert(peer, distance);
        }

        /// Marks a handle as off-screen.
        pub fn set_off_screen(&self, handle: EntityHandle, off: bool) {
            let mut s = self.inner.lock();
            if off {
                s.off_screen.insert(handle);
            } else {
                s.off_screen.remove(&handle);
            }
        }
    }

    #[async_trait]
    impl WorldView for MockWorld {
        async fn resolve_entity(
            &self,
            peer: PeerId,
            kind: EntityKind,
        ) -> Option<EntityHandle> {
            self.inner.lock().entities.get(&(peer, kind)).copied()
        }

        fn is_valid(&self, handle: EntityHandle) -> bool {
            let s = self.inner.lock();
            !s.invalid.contains(&handle)
                && s.entities.values().any(|h| *h == handle)
        }

        fn is_drawing(&self, handle: EntityHandle) -> bool {
            self.inner.lock().drawing.contains(&handle)
        }

        fn render_context(&self) -> RenderContext {
            self.inner
                .lock()
                .render_context
                .unwrap_or(RenderContext::Normal)
        }

        fn activity(&self) -> Activity {
            self.inner.lock().activity.unwrap_or(Activity::Idle)
        }

        fn distance_to(&self, peer: PeerId) -> Option<f32> {
            self.inner.lock().distances.get(&peer).copied()
        }

        fn on_screen(&self, handle: EntityHandle) -> bool {
            !self.inner.lock().off_screen.contains(&handle)
        }
    }
}
