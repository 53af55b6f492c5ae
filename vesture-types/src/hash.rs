//! Content hashes and per-subsystem snapshot hashes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Content-addressed file hash, as received from the wire (opaque hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Wraps a hash string, lowercasing it for stable comparisons.
    #[must_use]
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into().to_ascii_lowercase())
    }

    /// Returns the hash as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentHash {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Independently computed hashes over the major appearance subsystems, plus
/// one aggregate hash over the whole snapshot.
///
/// Empty strings mean "not computed"; equality checks treat empty as
/// never-matching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubHashes {
    /// Hash over mod file references and the manipulation blob.
    pub mods: String,
    /// Hash over the customization payloads.
    pub customization: String,
    /// Hash over the accessory payloads.
    pub accessory: String,
    /// Hash over title/status/pet-name payloads.
    pub status: String,
    /// Hash over the whole snapshot.
    pub aggregate: String,
}

impl SubHashes {
    /// True when every sub-hash is non-empty and equal to `other`'s.
    #[must_use]
    pub fn subs_match(&self, other: &SubHashes) -> bool {
        let pairs = [
            (&self.mods, &other.mods),
            (&self.customization, &other.customization),
            (&self.accessory, &other.accessory),
            (&self.status, &other.status),
        ];
        pairs.iter().all(|(a, b)| !a.is_empty() && a == b)
    }

    /// Hash-equality as the session controller sees it: all sub-hashes
    /// non-empty and equal, OR aggregate hashes non-empty and equal.
    ///
    /// Matching sub-hashes are treated as sufficient even when the aggregate
    /// differs. Intentional fast-path, kept as observed behavior.
    #[must_use]
    pub fn matches(&self, other: &SubHashes) -> bool {
        if self.subs_match(other) {
            return true;
        }
        !self.aggregate.is_empty() && self.aggregate == other.aggregate
    }

    /// True when no hash has been recorded at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
            && self.customization.is_empty()
            && self.accessory.is_empty()
            && self.status.is_empty()
            && self.aggregate.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full(mods: &str, agg: &str) -> SubHashes {
        SubHashes {
            mods: mods.into(),
            customization: "c1".into(),
            accessory: "a1".into(),
            status: "s1".into(),
            aggregate: agg.into(),
        }
    }

    #[test]
    fn subs_match_requires_non_empty() {
        let empty = SubHashes::default();
        assert!(!empty.subs_match(&empty));

        let a = full("m1", "agg1");
        let b = full("m1", "agg2");
        assert!(a.subs_match(&b));
    }

    #[test]
    fn matching_subs_win_over_divergent_aggregate() {
        let a = full("m1", "agg1");
        let b = full("m1", "agg2");
        assert!(a.matches(&b));
    }

    #[test]
    fn aggregate_match_is_sufficient_alone() {
        let a = SubHashes {
            aggregate: "agg".into(),
            ..Default::default()
        };
        let b = SubHashes {
            aggregate: "agg".into(),
            ..Default::default()
        };
        assert!(a.matches(&b));
        assert!(!a.subs_match(&b));
    }

    #[test]
    fn content_hash_is_case_insensitive() {
        assert_eq!(ContentHash::new("ABCDEF"), ContentHash::new("abcdef"));
    }
}
