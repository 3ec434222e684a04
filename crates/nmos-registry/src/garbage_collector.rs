//! The Registry Garbage Collector of spec.md §4.4.

use std::sync::Arc;
use std::time::Duration;

use nmos_core::{Clock, ResourceStore, ShutdownToken};

/// Sleeps for `min(expiry_interval / 2, 1s)`, then scans the Node index
/// for resources whose heartbeat deadline has passed and cascades their
/// erasure. Intended to be spawned as its own long-lived task per
/// registry (spec.md §5).
pub async fn run(store: ResourceStore, clock: Arc<dyn Clock>, expiry_interval: Duration, shutdown: ShutdownToken) {
    let poll_interval = expiry_interval.checked_div(2).unwrap_or(expiry_interval).min(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("garbage collector shutting down");
                return;
            }
            _ = clock.sleep(poll_interval) => {}
        }
        let now = clock.now();
        let erased = store.expire_nodes(now, expiry_interval);
        if !erased.is_empty() {
            tracing::info!(count = erased.len(), "garbage collector expired resources");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nmos_core::{Health, NodeData, Resource, ResourceData, ResourceId, SystemClock, TaiTimestamp, Version};

    #[tokio::test]
    async fn expires_a_node_whose_health_deadline_passed() {
        let store = ResourceStore::new(true);
        let id = ResourceId::random();
        store
            .insert(Resource::new(
                id,
                Version(TaiTimestamp::ZERO),
                ResourceData::Node(NodeData {
                    hostname: None,
                    api_versions: vec![],
                    href: "http://localhost".into(),
                    services: vec![],
                    extra: serde_json::Value::Null,
                }),
                Health::LastHeartbeat(0),
            ))
            .unwrap();

        let erased = store.expire_nodes(TaiTimestamp::new(20, 0), Duration::from_secs(12));
        assert_eq!(erased.len(), 1);
        assert!(store.find(id).is_none());

        // A fresh heartbeat within the window must not expire.
        let store2 = ResourceStore::new(true);
        let id2 = ResourceId::random();
        store2
            .insert(Resource::new(
                id2,
                Version(TaiTimestamp::ZERO),
                ResourceData::Node(NodeData {
                    hostname: None,
                    api_versions: vec![],
                    href: "http://localhost".into(),
                    services: vec![],
                    extra: serde_json::Value::Null,
                }),
                Health::LastHeartbeat(18),
            ))
            .unwrap();
        let erased2 = store2.expire_nodes(TaiTimestamp::new(20, 0), Duration::from_secs(12));
        assert!(erased2.is_empty());
        let _ = SystemClock;
    }
}
