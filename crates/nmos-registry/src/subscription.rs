//! Subscription resources and the per-subscription grain pump, per
//! spec.md §4.5/§4.6.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use nmos_core::{ChangeRecord, Resource, ResourceId, ResourceType, Result, TaiTimestamp, Version};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::query::{resource_matches, Filter};

/// A client's POST body for `/subscriptions` (spec.md §4.5).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub resource_path: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    pub persist: bool,
    pub max_update_rate_ms: u64,
    #[serde(default)]
    pub authorization: bool,
}

impl SubscriptionRequest {
    /// Canonical form used for dedup-by-derivation: two requests that
    /// differ only in key order or whitespace collapse to the same id.
    fn canonical(&self) -> String {
        let params: Vec<(&String, &String)> = self.params.iter().collect();
        format!("{}|{:?}|{}", self.resource_path, params, self.authorization)
    }

    /// spec.md §4.5: "Duplicate subscriptions (same `resource_path` +
    /// `params` + `authorization`) must dedup to the same id if
    /// non-persistent and unexpired." Persistent subscriptions always
    /// get a fresh random id since by definition they're meant to
    /// survive as distinct, independently-managed registrations.
    pub fn resolve_id(&self) -> ResourceId {
        if self.persist {
            ResourceId::random()
        } else {
            ResourceId::repeatable("subscription", &self.canonical())
        }
    }

    pub fn resource_type(&self) -> Option<ResourceType> {
        let plural = self.resource_path.trim_start_matches('/');
        [
            ResourceType::Node,
            ResourceType::Device,
            ResourceType::Source,
            ResourceType::Flow,
            ResourceType::Sender,
            ResourceType::Receiver,
        ]
        .into_iter()
        .find(|t| t.plural() == plural)
    }

    pub fn filters(&self) -> Vec<Filter> {
        self.params
            .iter()
            .map(|(k, v)| Filter {
                field: k.clone(),
                op: crate::query::FilterOp::Eq,
                value: v.clone(),
            })
            .collect()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GrainTiming {
    pub origin_timestamp: Version,
    pub sync_timestamp: Version,
    pub creation_timestamp: Version,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GrainEntry {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre: Option<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post: Option<Json>,
}

/// One batched diff delivered on a subscription websocket, per spec.md
/// §4.6.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Grain {
    pub topic: String,
    pub timing: GrainTiming,
    pub data: Vec<GrainEntry>,
}

fn topic_for(resource_path: &str) -> String {
    format!("/{}/", resource_path.trim_matches('/'))
}

fn entry_path(resource_path: &str, id: ResourceId) -> String {
    format!("/{}/{}", resource_path.trim_matches('/'), id)
}

/// Build the initial full-state grain emitted on connection open
/// (spec.md §4.6: "optionally emit a sync grain containing the full
/// current matching set as `post`-only entries").
pub fn sync_grain(resource_path: &str, now: Version, matching: &[Resource]) -> Grain {
    let data = matching
        .iter()
        .map(|r| GrainEntry {
            path: entry_path(resource_path, r.id),
            pre: None,
            post: Some(serde_json::to_value(&r.data).unwrap_or(Json::Null)),
        })
        .collect();
    Grain {
        topic: topic_for(resource_path),
        timing: GrainTiming {
            origin_timestamp: now,
            sync_timestamp: now,
            creation_timestamp: now,
        },
        data,
    }
}

/// Build a delta grain from a batch of accumulated change records,
/// applying the subscription's filters to whichever of pre/post a
/// record carries (post is preferred so a resource that newly starts
/// matching a filter shows up as a create).
pub fn delta_grain(resource_path: &str, now: Version, batch: &[ChangeRecord], filters: &[Filter]) -> Grain {
    let data = batch
        .iter()
        .filter(|c| {
            let candidate = c.post.as_ref().or(c.pre.as_ref());
            candidate.map(|r| resource_matches(r, filters)).unwrap_or(true)
        })
        .map(|c| GrainEntry {
            path: entry_path(resource_path, c.id),
            pre: c.pre.as_ref().map(|r| serde_json::to_value(&r.data).unwrap_or(Json::Null)),
            post: c.post.as_ref().map(|r| serde_json::to_value(&r.data).unwrap_or(Json::Null)),
        })
        .collect();
    Grain {
        topic: topic_for(resource_path),
        timing: GrainTiming {
            origin_timestamp: now,
            sync_timestamp: now,
            creation_timestamp: now,
        },
        data,
    }
}

/// Close code a slow-consumer disconnect uses, interpreted by clients as
/// "resync required" per spec.md §4.6.
pub const RESYNC_REQUIRED_CLOSE_CODE: u16 = 4000;

/// The bounded FIFO + backpressure tracking for one subscription,
/// per spec.md §4.6: "a bounded FIFO of pending change records (cap
/// derived from `max_update_rate_ms` × `paging_limit`)... if the FIFO
/// fills, the subscription is marked errored."
pub struct SubscriptionQueue {
    queue: Mutex<VecDeque<ChangeRecord>>,
    capacity: usize,
    errored: AtomicBool,
}

impl SubscriptionQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            errored: AtomicBool::new(false),
        }
    }

    /// Offer a change record relevant to this subscription's resource
    /// type. Returns `false` once the queue has filled and the
    /// subscription has been marked errored — callers should then close
    /// the connection with [`RESYNC_REQUIRED_CLOSE_CODE`].
    pub fn offer(&self, change: ChangeRecord) -> bool {
        if self.errored.load(Ordering::Acquire) {
            return false;
        }
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            self.errored.store(true, Ordering::Release);
            return false;
        }
        queue.push_back(change);
        true
    }

    pub fn is_errored(&self) -> bool {
        self.errored.load(Ordering::Acquire)
    }

    pub fn drain(&self) -> Vec<ChangeRecord> {
        self.queue.lock().drain(..).collect()
    }
}

/// Per-connection writer, implemented by the websocket transport layer
/// (left as an external collaborator per spec.md §1).
#[async_trait]
pub trait GrainSink: Send + Sync {
    async fn send_grain(&self, grain: Grain) -> Result<()>;
    async fn close(&self, code: u16);
}

/// How often an otherwise-empty grain is sent to keep a subscription
/// connection alive (spec.md §4.6: "no less frequently than a keepalive
/// interval"). Not settings-driven in the spec; five seconds matches the
/// IS-07 events-API health cadence (spec.md §6.3) this crate otherwise
/// borrows.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);

/// Capacity derivation the spec names directly: `max_update_rate_ms *
/// paging_limit`, with a floor so a `max_update_rate_ms` of `0`
/// (send-as-fast-as-possible) doesn't produce a zero-capacity queue.
pub fn queue_capacity(max_update_rate_ms: u64, paging_limit: usize) -> usize {
    (max_update_rate_ms.max(1) as usize * paging_limit).max(paging_limit)
}

/// Drives one subscription's grain emission loop: batch accumulated
/// deltas no more often than `max_update_rate`, never less often than
/// [`KEEPALIVE_INTERVAL`] (an empty grain serves as the keepalive).
pub async fn run_pump(
    resource_path: String,
    filters: Vec<Filter>,
    queue: std::sync::Arc<SubscriptionQueue>,
    sink: std::sync::Arc<dyn GrainSink>,
    clock: std::sync::Arc<dyn nmos_core::Clock>,
    max_update_rate: Duration,
    shutdown: nmos_core::ShutdownToken,
) {
    let tick = max_update_rate.max(Duration::from_millis(1)).min(KEEPALIVE_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = clock.sleep(tick) => {}
        }
        if queue.is_errored() {
            sink.close(RESYNC_REQUIRED_CLOSE_CODE).await;
            return;
        }
        let batch = queue.drain();
        let now = Version(clock.now());
        let grain = delta_grain(&resource_path, now, &batch, &filters);
        if let Err(err) = sink.send_grain(grain).await {
            tracing::warn!(resource_path, error = %err, "subscription pump failed to send grain, stopping");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persist_false_requests_dedup_to_the_same_id() {
        let a = SubscriptionRequest {
            resource_path: "/senders".into(),
            params: BTreeMap::new(),
            persist: false,
            max_update_rate_ms: 100,
            authorization: false,
        };
        let b = a.clone();
        assert_eq!(a.resolve_id(), b.resolve_id());
    }

    #[test]
    fn persist_true_requests_get_fresh_ids() {
        let a = SubscriptionRequest {
            resource_path: "/senders".into(),
            params: BTreeMap::new(),
            persist: true,
            max_update_rate_ms: 100,
            authorization: false,
        };
        let b = a.clone();
        assert_ne!(a.resolve_id(), b.resolve_id());
    }

    #[test]
    fn queue_marks_errored_once_full() {
        let q = SubscriptionQueue::new(1);
        let change = |id: ResourceId| ChangeRecord {
            timestamp: Version(TaiTimestamp::ZERO),
            resource_type: ResourceType::Sender,
            id,
            pre: None,
            post: None,
        };
        assert!(q.offer(change(ResourceId::random())));
        assert!(!q.offer(change(ResourceId::random())));
        assert!(q.is_errored());
    }
}
