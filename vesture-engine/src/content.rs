//! Content-resolution and resource-budget collaborators.
//!
//! The engine never touches the file cache itself: it asks the resolver
//! which references are already on disk, asks it to fetch the rest, and
//! checks the budget gate before fetching.

use crate::error::EngineResult;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use vesture_model::{AppearanceSnapshot, FileReference};
use vesture_types::{ContentHash, PeerId};

/// A reference resolved to local content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    /// The reference that was resolved.
    pub reference: FileReference,
    /// Local path of the cached content.
    pub path: PathBuf,
    /// Size of the cached content in bytes.
    pub size: u64,
}

/// Outcome of one resolution pass.
#[derive(Debug, Clone, Default)]
pub struct ResolveOutcome {
    /// References with content already on disk.
    pub resolved: Vec<ResolvedFile>,
    /// References still missing locally.
    pub missing: Vec<FileReference>,
}

/// Resolves content-addressed file references against the local cache.
#[async_trait]
pub trait ContentResolver: Send + Sync {
    /// Splits the references into already-cached and still-missing sets.
    async fn resolve(&self, refs: &[FileReference]) -> ResolveOutcome;

    /// Requests a fetch of the missing references for a peer. Completion
    /// does not guarantee success; callers re-resolve afterwards.
    async fn fetch(&self, peer: PeerId, missing: &[FileReference]) -> EngineResult<()>;

    /// Hashes known to be forbidden/unobtainable. Attempts whose remaining
    /// missing set is contained here will never succeed.
    async fn forbidden(&self) -> HashSet<ContentHash>;
}

/// Decides whether a pending download/apply fits the resource budget.
///
/// A rejection may have side effects (e.g. auto-pausing the peer); those
/// belong to the implementation, not the engine.
#[async_trait]
pub trait ResourceBudget: Send + Sync {
    /// True when the attempt may proceed.
    async fn admit(&self, peer: PeerId, snapshot: &AppearanceSnapshot) -> bool;
}

/// Scriptable resolver and budget for tests.
pub mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    /// In-memory resolver: a cached set, a fetchable set moved into the
    /// cache by `fetch`, and a forbidden set.
    #[derive(Default)]
    pub struct MockResolver {
        inner: Mutex<Store>,
        fetch_calls: AtomicU32,
    }

    #[derive(Default)]
    struct Store {
        cached: HashMap<ContentHash, (PathBuf, u64)>,
        fetchable: HashMap<ContentHash, (PathBuf, u64)>,
        forbidden: HashSet<ContentHash>,
    }

    impl MockResolver {
        pub fn new() -> Self {
            Self::default()
        }

        /// Marks content as already cached.
        pub fn cache(&self, hash: impl Into<ContentHash>, path: &str, size: u64) {
            self.inner
                .lock()
                .cached
                .insert(hash.into(), (PathBuf::from(path), size));
        }

        /// Marks content as obtainable on the next `fetch`.
        pub fn fetchable(&self, hash: impl Into<ContentHash>, path: &str, size: u64) {
            self.inner
                .lock()
                .fetchable
                .insert(hash.into(), (PathBuf::from(path), size));
        }

        /// Marks a hash as forbidden.
        pub fn forbid(&self, hash: impl Into<ContentHash>) {
            self.inner.lock().forbidden.insert(hash.into());
        }

        /// Number of `fetch` calls made so far.
        pub fn fetch_calls(&self) -> u32 {
            self.fetch_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ContentResolver for MockResolver {
        async fn resolve(&self, refs: &[FileReference]) -> ResolveOutcome {
            let store = self.inner.lock();
            let mut outcome = ResolveOutcome::default();
            for r in refs {
                match store.cached.get(&r.hash) {
                    Some((path, size)) => outcome.resolved.push(ResolvedFile {
                        reference: r.clone(),
                        path: path.clone(),
                        size: *size,
                    }),
                    None => outcome.missing.push(r.clone()),
                }
            }
            outcome
        }

        async fn fetch(&self, _peer: PeerId, missing: &[FileReference]) -> EngineResult<()> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            let mut store = self.inner.lock();
            for r in missing {
                if let Some(entry) = store.fetchable.remove(&r.hash) {
                    store.cached.insert(r.hash.clone(), entry);
                }
            }
            Ok(())
        }

        async fn forbidden(&self) -> HashSet<ContentHash> {
            self.inner.lock().forbidden.clone()
        }
    }

    /// Budget gate with a settable verdict and a call counter.
    pub struct MockBudget {
        allow: AtomicBool,
        calls: AtomicU32,
    }

    impl Default for MockBudget {
        fn default() -> Self {
            Self {
                allow: AtomicBool::new(true),
                calls: AtomicU32::new(0),
            }
        }
    }

    impl MockBudget {
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes subsequent admissions pass or fail.
        pub fn set_allow(&self, allow: bool) {
            self.allow.store(allow, Ordering::SeqCst);
        }

        /// Number of admission checks so far.
        pub fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ResourceBudget for MockBudget {
        async fn admit(&self, _peer: PeerId, _snapshot: &AppearanceSnapshot) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.allow.load(Ordering::SeqCst)
        }
    }
}
