//! Capability-provider collaborators.
//!
//! Each provider performs one category of visual mutation. Calls are
//! idempotent: re-applying the same payload to the same handle is safe.

use crate::error::EngineResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use vesture_types::{EntityHandle, PeerId, ScopeId};

/// Mod application: scope management, file overrides, redraws.
#[async_trait]
pub trait ModProvider: Send + Sync {
    /// Creates a scope for a peer's overrides.
    async fn create_scope(&self, peer: PeerId) -> EngineResult<ScopeId>;

    /// Binds the scope to an entity slot. Safe to repeat.
    async fn assign_scope(&self, scope: ScopeId, object_index: u16) -> EngineResult<()>;

    /// Removes the scope and everything bound through it.
    async fn remove_scope(&self, scope: ScopeId) -> EngineResult<()>;

    /// Replaces the scope's file-override mapping and manipulation blob.
    async fn set_overrides(
        &self,
        scope: ScopeId,
        overrides: HashMap<String, PathBuf>,
        manipulation: &str,
    ) -> EngineResult<()>;

    /// Triggers a redraw of the entity; resolves once the entity
    /// acknowledges. Callers race this against a deadline.
    async fn redraw(&self, handle: EntityHandle) -> EngineResult<()>;
}

/// One non-mod capability: customization, accessory, title, status, or
/// pet names.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// Applies the payload to the entity.
    async fn apply(&self, handle: EntityHandle, payload: &str) -> EngineResult<()>;

    /// Reverts everything applied to the entity.
    async fn revert(&self, handle: EntityHandle) -> EngineResult<()>;
}

/// The set of providers a session works with.
///
/// Mod application and customization are required; the rest degrade to
/// skipped change categories when absent.
#[derive(Clone)]
pub struct Providers {
    pub mods: Arc<dyn ModProvider>,
    pub customization: Option<Arc<dyn CapabilityProvider>>,
    pub accessory: Option<Arc<dyn CapabilityProvider>>,
    pub title: Option<Arc<dyn CapabilityProvider>>,
    pub status: Option<Arc<dyn CapabilityProvider>>,
    pub pet_names: Option<Arc<dyn CapabilityProvider>>,
}

impl Providers {
    /// Creates a registry with only the required providers.
    pub fn new(
        mods: Arc<dyn ModProvider>,
        customization: Arc<dyn CapabilityProvider>,
    ) -> Self {
        Self {
            mods,
            customization: Some(customization),
            accessory: None,
            title: None,
            status: None,
            pet_names: None,
        }
    }

    /// True when every provider the pipeline cannot run without is present.
    #[must_use]
    pub fn has_required(&self) -> bool {
        self.customization.is_some()
    }

    /// All optional capability providers, for revert-on-dispose.
    pub(crate) fn capabilities(&self) -> impl Iterator<Item = &Arc<dyn CapabilityProvider>> {
        [
            self.customization.as_ref(),
            self.accessory.as_ref(),
            self.title.as_ref(),
            self.status.as_ref(),
            self.pet_names.as_ref(),
        ]
        .into_iter()
        .flatten()
    }
}

/// Recording providers for tests.
pub mod mock {
    use super::*;
    use crate::error::EngineError;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    /// Mod provider that records every call.
    #[derive(Default)]
    pub struct MockModProvider {
        next_scope: AtomicU32,
        fail_scopes: AtomicBool,
        assignments: Mutex<Vec<(ScopeId, u16)>>,
        overrides: Mutex<Vec<(ScopeId, usize)>>,
        redraws: Mutex<Vec<EntityHandle>>,
        removed: Mutex<Vec<ScopeId>>,
    }

    impl MockModProvider {
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes subsequent scope create/assign calls fail.
        pub fn set_fail_scopes(&self, fail: bool) {
            self.fail_scopes.store(fail, Ordering::SeqCst);
        }

        /// Scope assignments made so far, in order.
        pub fn assignments(&self) -> Vec<(ScopeId, u16)> {
            self.assignments.lock().clone()
        }

        /// `(scope, override_count)` per `set_overrides` call.
        pub fn override_pushes(&self) -> Vec<(ScopeId, usize)> {
            self.overrides.lock().clone()
        }

        /// Redraw calls so far.
        pub fn redraws(&self) -> Vec<EntityHandle> {
            self.redraws.lock().clone()
        }

        /// Removed scopes so far.
        pub fn removed_scopes(&self) -> Vec<ScopeId> {
            self.removed.lock().clone()
        }

        /// Total provider calls of any kind.
        pub fn total_calls(&self) -> usize {
            self.assignments.lock().len()
                + self.overrides.lock().len()
                + self.redraws.lock().len()
                + self.removed.lock().len()
        }
    }

    #[async_trait]
    impl ModProvider for MockModProvider {
        async fn create_scope(&self, _peer: PeerId) -> EngineResult<ScopeId> {
            if self.fail_scopes.load(Ordering::SeqCst) {
                return Err(EngineError::provider("mods", "mock scope failure"));
            }
            let raw = self.next_scope.fetch_add(1, Ordering::SeqCst);
            Ok(ScopeId::new(raw))
        }

        async fn assign_scope(&self, scope: ScopeId, object_index: u16) -> EngineResult<()> {
            if self.fail_scopes.load(Ordering::SeqCst) {
                return Err(EngineError::provider("mods", "mock scope failure"));
            }
            self.assignments.lock().push((scope, object_index));
            Ok(())
        }

        async fn remove_scope(&self, scope: ScopeId) -> EngineResult<()> {
            self.removed.lock().push(scope);
            Ok(())
        }

        async fn set_overrides(
            &self,
            scope: ScopeId,
            overrides: HashMap<String, PathBuf>,
            _manipulation: &str,
        ) -> EngineResult<()> {
            self.overrides.lock().push((scope, overrides.len()));
            Ok(())
        }

        async fn redraw(&self, handle: EntityHandle) -> EngineResult<()> {
            self.redraws.lock().push(handle);
            Ok(())
        }
    }

    /// Capability provider that records applies/reverts and can be made to
    /// fail.
    pub struct MockCapability {
        name: &'static str,
        fail: AtomicBool,
        applies: Mutex<Vec<(EntityHandle, String)>>,
        reverts: Mutex<Vec<EntityHandle>>,
    }

    impl MockCapability {
        pub fn new(name: &'static str) -> Self {
            Self {
                name,
                fail: AtomicBool::new(false),
                applies: Mutex::new(Vec::new()),
                reverts: Mutex::new(Vec::new()),
            }
        }

        /// Makes subsequent `apply` calls fail.
        pub fn set_fail(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        /// Recorded `(handle, payload)` applies.
        pub fn applies(&self) -> Vec<(EntityHandle, String)> {
            self.applies.lock().clone()
        }

        /// Recorded reverts.
        pub fn reverts(&self) -> Vec<EntityHandle> {
            self.reverts.lock().clone()
        }
    }

    #[async_trait]
    impl CapabilityProvider for MockCapability {
        async fn apply(&self, handle: EntityHandle, payload: &str) -> EngineResult<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(EngineError::provider(self.name, "mock failure"));
            }
            self.applies.lock().push((handle, payload.to_string()));
            Ok(())
        }

        async fn revert(&self, handle: EntityHandle) -> EngineResult<()> {
            self.reverts.lock().push(handle);
            Ok(())
        }
    }
}
