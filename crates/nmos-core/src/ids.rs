//! Resource identifiers.
//!
//! spec.md §3.1: "a UUID generated from a repeatable seed (same seed ⇒
//! same ID on restart) or freshly random." The repeatable derivation is
//! taken from `nmos-cpp`'s `make_repeatable_id`: a UUIDv5 over a
//! namespace UUID and a stable path such as `"/x-nmos/node/self"` — the
//! distilled spec doesn't name the exact derivation, so we follow the
//! original rather than inventing one.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A resource's identity. Newtype over [`Uuid`] so `ResourceId` values
/// can't be accidentally compared against unrelated UUIDs (correlation
/// ids, request ids) at a type level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub Uuid);

impl ResourceId {
    /// Namespace UUID for repeatable id derivation. Arbitrary but fixed —
    /// any fixed namespace works as long as the same one is used across
    /// restarts; this one was generated once and then frozen.
    const SEED_NAMESPACE: Uuid = Uuid::from_bytes([
        0x2f, 0x6a, 0x8e, 0x10, 0x4d, 0x90, 0x4b, 0x63, 0x9a, 0x11, 0xcd, 0x90, 0x1a, 0x5e, 0x7f,
        0x02,
    ]);

    /// Fresh, unpredictable id for a resource not seeded from a fixed
    /// configuration value.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Deterministic id: the same `(seed, path)` always yields the same
    /// id, enabling a Node to reclaim its old identity after a restart.
    /// `path` should be a stable, unique string per sub-resource, e.g.
    /// `"/x-nmos/node/device/0"`.
    pub fn repeatable(seed: &str, path: &str) -> Self {
        let seed_ns = Uuid::new_v5(&Self::SEED_NAMESPACE, seed.as_bytes());
        Self(Uuid::new_v5(&seed_ns, path.as_bytes()))
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::str::FromStr for ResourceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Opaque id for a registry subscription, sharing the same
/// dedup-by-derivation idea: duplicate subscriptions (same
/// `resource_path` + `params` + `authorization`) must resolve to the same
/// id per spec.md §4.5, so subscription ids are `repeatable`-derived
/// from their canonicalised request rather than random when
/// `persist == false`.
pub type SubscriptionId = ResourceId;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeatable_id_is_stable_across_calls() {
        let a = ResourceId::repeatable("N", "/x-nmos/node/self");
        let b = ResourceId::repeatable("N", "/x-nmos/node/self");
        assert_eq!(a, b);
    }

    #[test]
    fn different_paths_yield_different_ids() {
        let node = ResourceId::repeatable("N", "/x-nmos/node/self");
        let device = ResourceId::repeatable("N", "/x-nmos/node/device/0");
        assert_ne!(node, device);
    }

    #[test]
    fn different_seeds_yield_different_ids() {
        let a = ResourceId::repeatable("N", "/x-nmos/node/self");
        let b = ResourceId::repeatable("M", "/x-nmos/node/self");
        assert_ne!(a, b);
    }

    #[test]
    fn random_ids_are_not_repeatable() {
        assert_ne!(ResourceId::random(), ResourceId::random());
    }
}
