//! `RegistryModel`: the Registry-side wiring of spec.md §2's Resource
//! Store, Garbage Collector, Query Engine and Subscription machinery
//! into one owned object, per spec.md §9's "a per-server `Model` struct
//! owns resources, settings, shutdown channel and condition variable; no
//! process-wide singletons."

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::Value as Json;

use nmos_core::{
    Health, Resource, ResourceData, ResourceStore, Result, SettingsHandle, SubscriptionData,
    TaiTimestamp,
};

use crate::subscription::SubscriptionRequest;

pub struct RegistryModel {
    pub store: ResourceStore,
    pub settings: SettingsHandle,
}

impl RegistryModel {
    pub fn new(settings: SettingsHandle) -> Arc<Self> {
        let permissive = settings.load().permissive_referential_integrity;
        Arc::new(Self {
            store: ResourceStore::new(permissive),
            settings,
        })
    }

    /// Parse a Registration API POST body into a [`Resource`], stamped
    /// with a fresh version from this store's clock (the wire body's own
    /// `version`, if any, is ignored — spec.md §4.1's versioning
    /// contract is store-assigned, not client-assigned).
    pub fn resource_from_wire(&self, body: Json) -> Result<Resource> {
        let mut resource = Resource::from_wire(body, self.store.tick_version())?;
        resource.health = Health::LastHeartbeat(TaiTimestamp::now().seconds);
        Ok(resource)
    }

    /// Inverse of [`Self::resource_from_wire`], for responses.
    pub fn resource_to_wire(&self, resource: &Resource) -> Json {
        resource.to_wire()
    }

    /// spec.md §6.2: "POST resource (returns 200/201)". Registries
    /// accept re-POSTing an existing id as an update (200); a genuinely
    /// new id is created (201).
    pub fn register(&self, resource: Resource) -> Result<(StatusCode, Resource)> {
        if self.store.find(resource.id).is_some() {
            let updated = self.store.modify(resource.id, move |r| {
                r.label = resource.label.clone();
                r.description = resource.description.clone();
                r.tags = resource.tags.clone();
                r.data = resource.data.clone();
                r.health = Health::LastHeartbeat(TaiTimestamp::now().seconds);
                Ok(())
            })?;
            Ok((StatusCode::OK, updated))
        } else {
            let mut resource = resource;
            resource.health = Health::LastHeartbeat(TaiTimestamp::now().seconds);
            let inserted = self.store.insert(resource)?;
            Ok((StatusCode::CREATED, inserted))
        }
    }

    /// spec.md §4.5: create (or, for a non-persistent duplicate, return
    /// the existing) subscription resource.
    pub fn create_subscription(&self, request: SubscriptionRequest) -> Result<(StatusCode, Resource)> {
        let id = request.resolve_id();
        if let Some(existing) = self.store.find(id) {
            return Ok((StatusCode::OK, existing));
        }
        let ws_href = format!("ws://localhost/x-nmos/query/v1.3/subscriptions/{id}");
        let data = ResourceData::Subscription(SubscriptionData {
            resource_path: request.resource_path,
            params: request.params,
            persist: request.persist,
            max_update_rate_ms: request.max_update_rate_ms,
            authorization: request.authorization,
            ws_href: Some(ws_href),
        });
        let resource = Resource::new(id, self.store.tick_version(), data, Health::NeverExpire);
        let inserted = self.store.insert(resource)?;
        Ok((StatusCode::CREATED, inserted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nmos_core::{ResourceId, Settings};
    use serde_json::json;

    #[test]
    fn round_trips_a_node_through_the_wire_format() {
        let model = RegistryModel::new(SettingsHandle::new(Settings::default()));
        let id = ResourceId::random();
        let body = json!({
            "type": "node",
            "data": {
                "id": id.to_string(),
                "version": "0:0",
                "label": "my-node",
                "description": "",
                "tags": {},
                "hostname": null,
                "api_versions": [],
                "href": "http://localhost",
                "services": [],
            }
        });
        let resource = model.resource_from_wire(body).unwrap();
        assert_eq!(resource.id, id);
        assert_eq!(resource.label, "my-node");

        let (status, stored) = model.register(resource).unwrap();
        assert_eq!(status, StatusCode::CREATED);
        let wire = model.resource_to_wire(&stored);
        assert_eq!(wire["type"], json!("node"));
        assert_eq!(wire["data"]["label"], json!("my-node"));
    }

    #[test]
    fn re_posting_the_same_id_updates_rather_than_conflicts() {
        let model = RegistryModel::new(SettingsHandle::new(Settings::default()));
        let id = ResourceId::random();
        let make_body = |label: &str| {
            json!({
                "type": "node",
                "data": {
                    "id": id.to_string(),
                    "version": "0:0",
                    "label": label,
                    "description": "",
                    "tags": {},
                    "hostname": null,
                    "api_versions": [],
                    "href": "http://localhost",
                    "services": [],
                }
            })
        };
        let first = model.resource_from_wire(make_body("a")).unwrap();
        let (status, _) = model.register(first).unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let second = model.resource_from_wire(make_body("b")).unwrap();
        let (status, updated) = model.register(second).unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated.label, "b");
    }
}
