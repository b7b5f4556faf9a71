//! Hash-derived identities for events, cliques and jobs.
//!
//! Names are folded into 64-bit keys with a boost-style `hash_combine`.
//! `DefaultHasher::new()` uses fixed keys, so the same name always yields the
//! same key within a build; keys are lookup identities only, and the registry
//! rejects collisions between distinct names.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Fold `value` into `seed`.
pub fn hash_combine<T: Hash + ?Sized>(seed: &mut u64, value: &T) {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    let h = hasher.finish();
    *seed ^= h
        .wrapping_add(0x9e37_79b9)
        .wrapping_add(*seed << 6)
        .wrapping_add(*seed >> 2);
}

/// Hash a single name starting from a zero seed.
pub fn name_hash(name: &str) -> u64 {
    let mut seed = 0;
    hash_combine(&mut seed, name);
    seed
}

/// Key of an event record (hash of its qualified resource name).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey(pub u64);

impl EventKey {
    pub fn of(name: &str) -> Self {
        Self(name_hash(name))
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evt#{:016x}", self.0)
    }
}

/// Key of a clique record (hash of its declared name).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CliqueKey(pub u64);

impl CliqueKey {
    pub fn of(name: &str) -> Self {
        Self(name_hash(name))
    }
}

impl fmt::Display for CliqueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clq#{:016x}", self.0)
    }
}

/// Correlation tag of the job bound to an event. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobTag(u64);

impl JobTag {
    /// Combine thread, task and parameter id, in that order.
    pub fn new(thread: &str, task: &str, param_id: &str) -> Self {
        let mut seed = 0;
        hash_combine(&mut seed, thread);
        hash_combine(&mut seed, task);
        hash_combine(&mut seed, param_id);
        // 0 is the idle value of the trace signal
        Self(seed.max(1))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job#{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_hash_deterministic() {
        assert_eq!(name_hash("simd0.dme"), name_hash("simd0.dme"));
        assert_ne!(name_hash("simd0.dme"), name_hash("simd0.eu"));
        assert_eq!(EventKey::of("simd0.eu"), EventKey(name_hash("simd0.eu")));
    }

    #[test]
    fn test_job_tag_order_matters() {
        let a = JobTag::new("t1", "k1", "p1");
        let b = JobTag::new("k1", "t1", "p1");
        assert_eq!(a, JobTag::new("t1", "k1", "p1"));
        assert_ne!(a, b);
        assert_ne!(a.value(), 0);
    }

    #[test]
    fn test_hash_combine_chains() {
        let mut one = 0;
        hash_combine(&mut one, "a");
        let mut two = one;
        hash_combine(&mut two, "b");
        assert_ne!(one, two);
    }
}
