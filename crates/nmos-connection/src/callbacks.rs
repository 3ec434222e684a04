//! The two connection-specific external collaborators of spec.md §6.4,
//! plus the IS-07 events surface of §6.3/SPEC_FULL.md §2.

use async_trait::async_trait;
use nmos_core::{Resource, ResourceId, Result};
use serde_json::Value as Json;

/// Replaces every occurrence of the literal `"auto"` in a staged
/// transport-params document with a concrete value, given the owning
/// resource. May fail, in which case the activation aborts per
/// spec.md §4.7 step 2 and §8's atomicity property: `active` and
/// `staged` are left byte-identical to their pre-PATCH state.
///
/// Takes the resource envelope and its staged transport params by value
/// rather than a borrow of the live [`crate::connection_resource::ConnectionResource`]
/// — the scheduler calls this without holding the connection lock
/// (spec.md §5: readers may hold a lock across validation, never across
/// network I/O), so there is nothing live to borrow from at the call site.
#[async_trait]
pub trait AutoResolver: Send + Sync {
    async fn resolve(&self, resource: &Resource, staged_transport_params: Json) -> Result<Json>;
}

/// An [`AutoResolver`] that requires every `"auto"` to already have been
/// resolved by the caller — useful for constraint sets with no free
/// parameters, or in tests that supply already-concrete transport params.
pub struct IdentityAutoResolver;

#[async_trait]
impl AutoResolver for IdentityAutoResolver {
    async fn resolve(&self, _resource: &Resource, staged_transport_params: Json) -> Result<Json> {
        Ok(staged_transport_params)
    }
}

/// Rebuilds the SDP transport file for a Sender after its `active`
/// document changes (spec.md §4.7 step 4). Senders only — Receivers have
/// no outbound transport file.
#[async_trait]
pub trait TransportfileSetter: Send + Sync {
    async fn set_transportfile(&self, resource: &Resource, active_endpoint: &Json) -> Result<String>;
}

/// IS-07 Events-API websocket message kinds (spec.md §6.3). The actual
/// websocket I/O and event payload interpretation stay out of scope
/// (spec.md §1); this enum is the shared vocabulary a connection-aware
/// transport layer subscribes/unsubscribes against when a Receiver's
/// active subscription changes.
#[derive(Clone, Debug, PartialEq)]
pub enum EventsWsMessage {
    State { source_id: ResourceId, payload: Json },
    Health,
    Shutdown,
    Reboot,
}

/// Notified when a Sender/Receiver's active subscription block changes
/// as a result of an activation, so an Events-API transport can
/// subscribe/unsubscribe its websocket accordingly.
#[async_trait]
pub trait EventsSubscriptionChanged: Send + Sync {
    async fn subscription_changed(&self, resource_id: ResourceId, peer_id: Option<ResourceId>, active: bool);
}
