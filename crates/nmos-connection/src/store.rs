//! Holds every Sender's/Receiver's [`ConnectionResource`] behind one
//! read/write lock, mirroring `nmos_core::ResourceStore`'s single-writer
//! discipline (spec.md §5) but scoped to connection documents rather
//! than the full resource envelope.

use std::collections::HashMap;

use nmos_core::{NmosError, Result, ResourceId};
use parking_lot::RwLock;
use serde_json::Value as Json;

use crate::connection_resource::{ConnectionResource, ConnectionResourceKind};

#[derive(Default)]
pub struct ConnectionStore {
    inner: RwLock<HashMap<ResourceId, ConnectionResource>>,
}

impl ConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: ResourceId, kind: ConnectionResourceKind, constraints: Json) {
        self.inner
            .write()
            .insert(id, ConnectionResource::new(id, kind, constraints));
    }

    pub fn remove(&self, id: ResourceId) {
        self.inner.write().remove(&id);
    }

    pub fn with_mut<R>(
        &self,
        id: ResourceId,
        f: impl FnOnce(&mut ConnectionResource) -> Result<R>,
    ) -> Result<R> {
        let mut guard = self.inner.write();
        let resource = guard
            .get_mut(&id)
            .ok_or_else(|| NmosError::not_found(format!("no connection resource for {id}")))?;
        f(resource)
    }

    pub fn generation(&self, id: ResourceId) -> Option<u64> {
        self.inner.read().get(&id).map(|r| r.generation())
    }

    pub fn staged_snapshot(&self, id: ResourceId) -> Option<Json> {
        self.inner.read().get(&id).map(|r| r.staged.clone())
    }

    pub fn active_snapshot(&self, id: ResourceId) -> Option<Json> {
        self.inner.read().get(&id).map(|r| r.active.clone())
    }

    pub fn constraints_snapshot(&self, id: ResourceId) -> Option<Json> {
        self.inner.read().get(&id).map(|r| r.constraints.clone())
    }

    pub fn kind(&self, id: ResourceId) -> Option<ConnectionResourceKind> {
        self.inner.read().get(&id).map(|r| r.kind)
    }

    pub fn staged_transport_params(&self, id: ResourceId) -> Option<Json> {
        self.inner.read().get(&id).map(|r| r.staged_transport_params())
    }

    pub fn transportfile(&self, id: ResourceId) -> Option<Option<String>> {
        self.inner.read().get(&id).map(|r| r.transportfile.clone())
    }
}
