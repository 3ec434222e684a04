//! The Resource Store of spec.md §4.1: an in-memory, versioned, indexed
//! collection of typed resources with a cursor-based change feed.
//!
//! Grounded on the teacher's single-writer-lock discipline (`spark-core`'s
//! `router`/`data_plane` modules hold shared routing tables behind a
//! `parking_lot::RwLock` and broadcast changes rather than requiring
//! pollers), generalized here to a typed resource tree. `parking_lot`
//! gives the "readers concurrent, writers exclusive" contract of spec.md
//! §4.1 directly; a `tokio::sync::broadcast` channel stands in for the
//! "signals the change-condition variable" line — every subscriber (the
//! garbage collector, a query subscription pump, a contract test) gets
//! its own lagging-tolerant receiver instead of contending on one condvar.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::error::{NmosError, Result};
use crate::ids::ResourceId;
use crate::model::{Resource, ResourceType};
use crate::time::{TaiTimestamp, Version, VersionClock};

/// One committed mutation, as broadcast to every change listener.
///
/// Either `pre` or `post` may be absent: a create has `pre = None`, a
/// delete has `post = None`, an update has both.
#[derive(Clone, Debug)]
pub struct ChangeRecord {
    pub timestamp: Version,
    pub resource_type: ResourceType,
    pub id: ResourceId,
    pub pre: Option<Resource>,
    pub post: Option<Resource>,
}

impl ChangeRecord {
    fn created(post: Resource, timestamp: Version) -> Self {
        Self {
            timestamp,
            resource_type: post.resource_type(),
            id: post.id,
            pre: None,
            post: Some(post),
        }
    }

    fn updated(pre: Resource, post: Resource, timestamp: Version) -> Self {
        Self {
            timestamp,
            resource_type: post.resource_type(),
            id: post.id,
            pre: Some(pre),
            post: Some(post),
        }
    }

    fn deleted(pre: Resource, timestamp: Version) -> Self {
        Self {
            timestamp,
            resource_type: pre.resource_type(),
            id: pre.id,
            pre: Some(pre),
            post: None,
        }
    }
}

/// Capacity of the change broadcast channel. A lagging receiver (e.g. a
/// subscription pump stalled behind a slow client) observes
/// [`broadcast::error::RecvError::Lagged`] once it falls this far behind;
/// callers that care about every grain (subscriptions, §4.6) treat that
/// as the "backpressure" signal spec.md §4.6 describes and resync.
const CHANGE_CHANNEL_CAPACITY: usize = 4096;

struct Indices {
    by_id: BTreeMap<ResourceId, Resource>,
    by_type: BTreeMap<ResourceType, BTreeSet<ResourceId>>,
    by_created: BTreeMap<(Version, ResourceId), ResourceId>,
    by_parent: BTreeMap<ResourceId, BTreeSet<ResourceId>>,
}

impl Indices {
    fn new() -> Self {
        Self {
            by_id: BTreeMap::new(),
            by_type: BTreeMap::new(),
            by_created: BTreeMap::new(),
            by_parent: BTreeMap::new(),
        }
    }

    fn link(&mut self, resource: &Resource) {
        self.by_type
            .entry(resource.resource_type())
            .or_default()
            .insert(resource.id);
        self.by_created
            .insert((resource.created, resource.id), resource.id);
        for parent in resource.data.parents() {
            self.by_parent.entry(parent).or_default().insert(resource.id);
        }
    }

    fn unlink(&mut self, resource: &Resource) {
        if let Some(set) = self.by_type.get_mut(&resource.resource_type()) {
            set.remove(&resource.id);
        }
        self.by_created.remove(&(resource.created, resource.id));
        for parent in resource.data.parents() {
            if let Some(set) = self.by_parent.get_mut(&parent) {
                set.remove(&resource.id);
            }
        }
    }

    fn children_of(&self, id: ResourceId) -> Vec<ResourceId> {
        self.by_parent
            .get(&id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }
}

/// The store itself. Cheaply cloneable (an `Arc` inside); every clone
/// shares the same lock and change feed.
#[derive(Clone)]
pub struct ResourceStore {
    inner: Arc<parking_lot::RwLock<Indices>>,
    version_clock: Arc<VersionClock>,
    changes: broadcast::Sender<ChangeRecord>,
    permissive_referential_integrity: bool,
}

impl ResourceStore {
    pub fn new(permissive_referential_integrity: bool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(parking_lot::RwLock::new(Indices::new())),
            version_clock: Arc::new(VersionClock::new()),
            changes,
            permissive_referential_integrity,
        }
    }

    /// Next version this store's clock would issue. Exposed so callers
    /// building a [`Resource`] before `insert` can stamp `created` ==
    /// `version` with the value that will actually be used — `insert`
    /// re-stamps `version` regardless, but the repeatable-id / activation
    /// code paths sometimes need a timestamp up front.
    pub fn tick_version(&self) -> Version {
        self.version_clock.tick()
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<ChangeRecord> {
        self.changes.subscribe()
    }

    fn check_referential_integrity(&self, indices: &Indices, resource: &Resource) -> Result<()> {
        if self.permissive_referential_integrity {
            return Ok(());
        }
        for parent in resource.data.parents() {
            if !indices.by_id.contains_key(&parent) {
                return Err(NmosError::referential(format!(
                    "{} {} references unknown parent {}",
                    resource.resource_type().plural(),
                    resource.id,
                    parent
                )));
            }
        }
        Ok(())
    }

    /// Insert a brand-new resource. Fails with `AlreadyExists` if the id
    /// is already present with different content (re-sending an
    /// identical payload, as a Node's re-registration does after a
    /// Registry restart, is tolerated and returns the stored resource
    /// unchanged as if it were a no-op `modify`).
    pub fn insert(&self, mut resource: Resource) -> Result<Resource> {
        resource.validate_envelope()?;
        let mut guard = self.inner.write();
        if let Some(existing) = guard.by_id.get(&resource.id) {
            if existing.data == resource.data
                && existing.label == resource.label
                && existing.description == resource.description
                && existing.tags == resource.tags
            {
                return Ok(existing.clone());
            }
            return Err(NmosError::already_exists(format!(
                "{} {} already exists",
                resource.resource_type().plural(),
                resource.id
            )));
        }
        self.check_referential_integrity(&guard, &resource)?;
        let version = self.version_clock.tick();
        resource.created = version;
        resource.version = version;
        guard.link(&resource);
        guard.by_id.insert(resource.id, resource.clone());
        drop(guard);
        let _ = self.changes.send(ChangeRecord::created(resource.clone(), version));
        Ok(resource)
    }

    /// Apply `mutator` to the stored resource and commit the result with
    /// a fresh version. `mutator` runs with the write lock held but must
    /// not perform I/O (spec.md §4.1/§5: "readers may hold the lock
    /// across validation but not across network I/O").
    pub fn modify(
        &self,
        id: ResourceId,
        mutator: impl FnOnce(&mut Resource) -> Result<()>,
    ) -> Result<Resource> {
        let mut guard = self.inner.write();
        let pre = guard
            .by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| NmosError::not_found(format!("resource {id} not found")))?;
        let mut post = pre.clone();
        mutator(&mut post)?;
        post.validate_envelope()?;
        self.check_referential_integrity(&guard, &post)?;
        let version = self.version_clock.tick();
        post.version = version;
        guard.unlink(&pre);
        guard.link(&post);
        guard.by_id.insert(id, post.clone());
        drop(guard);
        let _ = self
            .changes
            .send(ChangeRecord::updated(pre, post.clone(), version));
        Ok(post)
    }

    /// Erase a resource. With `cascade = true` (the default for the
    /// Registry's garbage collector and a Node/Device DELETE), all
    /// descendants are erased first in spec.md §4.1's fixed order:
    /// Node → Device → {Source → Flow → Sender, Receiver}. Returns every
    /// resource actually erased, in emission order, so callers can fire
    /// one delete grain per child (scenario E).
    pub fn erase(&self, id: ResourceId, cascade: bool) -> Result<Vec<Resource>> {
        let mut guard = self.inner.write();
        if !guard.by_id.contains_key(&id) {
            return Err(NmosError::not_found(format!("resource {id} not found")));
        }
        let mut targets = vec![id];
        if cascade {
            let mut frontier = vec![id];
            while let Some(next) = frontier.pop() {
                for child in guard.children_of(next) {
                    targets.push(child);
                    frontier.push(child);
                }
            }
        }
        targets.sort_by_key(|rid| {
            guard
                .by_id
                .get(rid)
                .map(|r| r.resource_type().cascade_rank())
                .unwrap_or(u8::MAX)
        });
        targets.dedup();

        let version = self.version_clock.tick();
        let mut erased = Vec::with_capacity(targets.len());
        for target in targets {
            if let Some(resource) = guard.by_id.remove(&target) {
                guard.unlink(&resource);
                erased.push(resource);
            }
        }
        drop(guard);
        for resource in &erased {
            let _ = self
                .changes
                .send(ChangeRecord::deleted(resource.clone(), version));
        }
        Ok(erased)
    }

    pub fn find(&self, id: ResourceId) -> Option<Resource> {
        self.inner.read().by_id.get(&id).cloned()
    }

    /// All resources of a given type, in creation order.
    pub fn scan_type(&self, resource_type: ResourceType) -> Vec<Resource> {
        let guard = self.inner.read();
        guard
            .by_created
            .values()
            .filter_map(|id| guard.by_id.get(id))
            .filter(|r| r.resource_type() == resource_type)
            .cloned()
            .collect()
    }

    /// All resources matching an arbitrary predicate, in creation order.
    pub fn scan(&self, predicate: impl Fn(&Resource) -> bool) -> Vec<Resource> {
        let guard = self.inner.read();
        guard
            .by_created
            .values()
            .filter_map(|id| guard.by_id.get(id))
            .filter(|r| predicate(r))
            .cloned()
            .collect()
    }

    /// Resources created strictly after `since` and at or before `until`,
    /// in creation order — the cursor window spec.md §4.5 paginates over.
    pub fn scan_window(
        &self,
        resource_type: ResourceType,
        since: Option<Version>,
        until: Option<Version>,
    ) -> Vec<Resource> {
        let guard = self.inner.read();
        guard
            .by_created
            .range(Self::window_bounds(since))
            .filter_map(|((created, _), id)| {
                if let Some(until) = until {
                    if *created > until {
                        return None;
                    }
                }
                guard.by_id.get(id)
            })
            .filter(|r| r.resource_type() == resource_type)
            .cloned()
            .collect()
    }

    fn window_bounds(
        since: Option<Version>,
    ) -> (
        std::ops::Bound<(Version, ResourceId)>,
        std::ops::Bound<(Version, ResourceId)>,
    ) {
        use std::ops::Bound;
        match since {
            Some(v) => (
                Bound::Excluded((v, ResourceId(uuid::Uuid::max()))),
                Bound::Unbounded,
            ),
            None => (Bound::Unbounded, Bound::Unbounded),
        }
    }

    /// Expire every resource of type [`ResourceType::Node`] whose health
    /// deadline has passed, cascading. Used by the garbage collector
    /// (spec.md §4.4); exposed here rather than only in `nmos-registry`
    /// because it needs direct index access under one lock acquisition
    /// to satisfy "the collector never deletes while a mutation on the
    /// same id is in flight".
    pub fn expire_nodes(&self, now: TaiTimestamp, expiry_interval: Duration) -> Vec<Resource> {
        let expired_ids: Vec<ResourceId> = {
            let guard = self.inner.read();
            guard
                .by_type
                .get(&ResourceType::Node)
                .into_iter()
                .flatten()
                .filter_map(|id| guard.by_id.get(id))
                .filter(|r| r.health.is_expired(now.seconds, expiry_interval.as_secs()))
                .map(|r| r.id)
                .collect()
        };
        let mut erased = Vec::new();
        for id in expired_ids {
            if let Ok(mut batch) = self.erase(id, true) {
                erased.append(&mut batch);
            }
        }
        erased
    }

    /// Block until the next change or `timeout` elapses, whichever comes
    /// first. A thin convenience over [`Self::subscribe_changes`] for
    /// callers (tests, simple pollers) that don't want to hold a
    /// long-lived receiver.
    pub async fn wait_for_change(&self, timeout: Duration) -> Option<ChangeRecord> {
        let mut rx = self.subscribe_changes();
        tokio::time::timeout(timeout, rx.recv()).await.ok()?.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Format, NodeData, ResourceData, SourceData};

    fn node(id: ResourceId) -> Resource {
        Resource::new(
            id,
            Version(TaiTimestamp::ZERO),
            ResourceData::Node(NodeData {
                hostname: None,
                api_versions: vec![],
                href: "http://localhost".into(),
                services: vec![],
                extra: serde_json::Value::Null,
            }),
            crate::model::Health::LastHeartbeat(0),
        )
    }

    #[test]
    fn insert_assigns_strictly_increasing_version_and_stamps_created() {
        let store = ResourceStore::new(false);
        let id = ResourceId::random();
        let stored = store.insert(node(id)).unwrap();
        assert_eq!(stored.created, stored.version);

        let updated = store
            .modify(id, |r| {
                r.label = "relabeled".into();
                Ok(())
            })
            .unwrap();
        assert!(updated.version > stored.version);
        assert_eq!(updated.created, stored.created, "created must not move on update");
    }

    #[test]
    fn duplicate_insert_with_different_content_is_rejected() {
        let store = ResourceStore::new(false);
        let id = ResourceId::random();
        store.insert(node(id)).unwrap();
        let mut other = node(id);
        other.label = "different".into();
        assert!(store.insert(other).is_err());
    }

    #[test]
    fn referential_error_on_dangling_parent() {
        let store = ResourceStore::new(false);
        let source = Resource::new(
            ResourceId::random(),
            Version(TaiTimestamp::ZERO),
            ResourceData::Source(SourceData {
                device_id: ResourceId::random(),
                format: Format::Video,
                extra: serde_json::Value::Null,
            }),
            crate::model::Health::LastHeartbeat(0),
        );
        assert!(store.insert(source).is_err());
    }

    #[test]
    fn cascade_erase_removes_all_descendants() {
        let store = ResourceStore::new(true);
        let node_id = ResourceId::random();
        store.insert(node(node_id)).unwrap();
        let device_id = ResourceId::random();
        store
            .insert(Resource::new(
                device_id,
                Version(TaiTimestamp::ZERO),
                ResourceData::Device(crate::model::DeviceData {
                    node_id,
                    device_type: "urn:x-nmos:device:generic".into(),
                    senders: vec![],
                    receivers: vec![],
                    extra: serde_json::Value::Null,
                }),
                crate::model::Health::LastHeartbeat(0),
            ))
            .unwrap();
        let source_id = ResourceId::random();
        store
            .insert(Resource::new(
                source_id,
                Version(TaiTimestamp::ZERO),
                ResourceData::Source(SourceData {
                    device_id,
                    format: Format::Video,
                    extra: serde_json::Value::Null,
                }),
                crate::model::Health::LastHeartbeat(0),
            ))
            .unwrap();

        let erased = store.erase(node_id, true).unwrap();
        assert_eq!(erased.len(), 3);
        assert!(store.find(node_id).is_none());
        assert!(store.find(device_id).is_none());
        assert!(store.find(source_id).is_none());
    }

    #[tokio::test]
    async fn wait_for_change_observes_insert() {
        let store = ResourceStore::new(true);
        let rx_store = store.clone();
        let handle = tokio::spawn(async move { rx_store.wait_for_change(Duration::from_secs(1)).await });
        tokio::task::yield_now().await;
        store.insert(node(ResourceId::random())).unwrap();
        let change = handle.await.unwrap();
        assert!(change.is_some());
    }
}
