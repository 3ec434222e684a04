//! The `DnsSdClient` contract of spec.md §4.2, plus the candidate
//! ordering rule shared by every implementation: "returns instances
//! sorted by ascending `pri`, with ties broken by a uniform-random
//! shuffle so load spreads across equal peers."

use std::time::Duration;

use async_trait::async_trait;
use nmos_core::Result;
use rand::seq::SliceRandom;

use crate::service_types::{Priority, ServiceType, TxtRecords};

/// A still-unresolved instance as returned by `browse`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrowseResult {
    pub instance_name: String,
    pub ttl: Duration,
}

/// A fully resolved instance: host, port and parsed TXT records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedInstance {
    pub instance_name: String,
    pub host: String,
    pub port: u16,
    pub txt: TxtRecords,
}

impl ResolvedInstance {
    pub fn priority(&self) -> Priority {
        self.txt.priority()
    }

    pub fn base_url(&self) -> String {
        let proto = self.txt.api_proto().unwrap_or("http");
        format!("{proto}://{}:{}", self.host, self.port)
    }
}

/// Earliest/latest bound pair for a `resolve` call: return as soon as one
/// result is known but give up waiting after the latest bound.
#[derive(Clone, Copy, Debug)]
pub struct ResolveTimeouts {
    pub earliest: Duration,
    pub latest: Duration,
}

impl Default for ResolveTimeouts {
    fn default() -> Self {
        Self {
            earliest: Duration::from_millis(250),
            latest: Duration::from_secs(5),
        }
    }
}

/// Handle to a live advertisement; dropping or calling `withdraw`
/// retracts it.
#[async_trait]
pub trait Advertisement: Send + Sync {
    async fn withdraw(&self) -> Result<()>;
}

/// Browse/resolve/advertise contract, per spec.md §4.2. Implementations:
/// [`crate::mdns_client::MdnsDnsSdClient`] (production, backed by
/// `mdns-sd`) and [`crate::static_fallback::StaticFallbackClient`] (test
/// / zero-config wrapper).
#[async_trait]
pub trait DnsSdClient: Send + Sync {
    async fn browse(
        &self,
        service_type: ServiceType,
        domain: &str,
        timeout: Duration,
    ) -> Result<Vec<BrowseResult>>;

    async fn resolve(
        &self,
        service_type: ServiceType,
        instance_name: &str,
        timeout: ResolveTimeouts,
    ) -> Result<ResolvedInstance>;

    async fn advertise(
        &self,
        service_type: ServiceType,
        port: u16,
        txt: TxtRecords,
    ) -> Result<Box<dyn Advertisement>>;
}

/// Browse then resolve every instance of `service_type`, returning them
/// ordered per spec.md §4.2's discovery-ordering contract: ascending
/// `pri`, ties shuffled uniformly at random. Instances matching
/// [`Priority::DO_NOT_ADVERTISE`] are dropped — `pri = max-int` opts out
/// of discovery even while present on the network.
pub async fn discover_candidates(
    client: &dyn DnsSdClient,
    service_type: ServiceType,
    domain: &str,
    browse_timeout: Duration,
    resolve_timeout: ResolveTimeouts,
) -> Result<Vec<ResolvedInstance>> {
    let found = client.browse(service_type, domain, browse_timeout).await?;
    let mut resolved = Vec::with_capacity(found.len());
    for instance in found {
        match client
            .resolve(service_type, &instance.instance_name, resolve_timeout)
            .await
        {
            Ok(r) => resolved.push(r),
            Err(err) => {
                tracing::debug!(instance = %instance.instance_name, error = %err, "resolve failed, skipping instance");
            }
        }
    }
    Ok(order_candidates(resolved))
}

/// The ordering rule in isolation, so callers who already have resolved
/// instances (e.g. after appending a static fallback) can (re)apply it
/// without re-browsing.
pub fn order_candidates(mut candidates: Vec<ResolvedInstance>) -> Vec<ResolvedInstance> {
    candidates.retain(|c| c.priority().is_advertisable());
    let mut rng = rand::thread_rng();
    candidates.shuffle(&mut rng);
    candidates.sort_by_key(|c| c.priority());
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(name: &str, pri: u32) -> ResolvedInstance {
        let mut txt = TxtRecords::default();
        txt.insert("pri", pri.to_string());
        ResolvedInstance {
            instance_name: name.into(),
            host: "127.0.0.1".into(),
            port: 80,
            txt,
        }
    }

    #[test]
    fn sorts_ascending_by_priority() {
        let candidates = vec![instance("b", 50), instance("a", 10), instance("c", 30)];
        let ordered = order_candidates(candidates);
        let pris: Vec<u32> = ordered.iter().map(|c| c.priority().0).collect();
        assert_eq!(pris, vec![10, 30, 50]);
    }

    #[test]
    fn drops_do_not_advertise_instances() {
        let candidates = vec![instance("a", 10), instance("opted_out", u32::MAX)];
        let ordered = order_candidates(candidates);
        assert_eq!(ordered.len(), 1);
        assert_eq!(ordered[0].instance_name, "a");
    }

    #[test]
    fn ties_are_shuffled_across_many_runs() {
        let mut first_seen_first = 0;
        for _ in 0..200 {
            let candidates = vec![instance("a", 10), instance("b", 10)];
            let ordered = order_candidates(candidates);
            if ordered[0].instance_name == "a" {
                first_seen_first += 1;
            }
        }
        // Statistical, not exact: should land well away from 0 or 200.
        assert!(first_seen_first > 50 && first_seen_first < 150, "{first_seen_first}");
    }
}
