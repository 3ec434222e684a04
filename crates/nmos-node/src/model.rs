//! The Node's own [`ResourceStore`] plus the collaborators its long-lived
//! tasks share: settings, a DNS-SD client, an HTTP transport and a clock.
//! Per spec.md §9: "a per-server `Model` struct owns resources, settings,
//! shutdown channel and condition variable; no process-wide singletons."

use std::sync::Arc;

use nmos_core::{Clock, ResourceId, ResourceStore, ResourceType, Settings, SettingsHandle};
use nmos_discovery::DnsSdClient;

use crate::transport::ApiTransport;

pub struct NodeModel {
    /// This Node's own resource id (the id of its `Node` resource).
    pub self_id: ResourceId,
    /// Every resource this Node owns: the Node resource itself plus its
    /// Devices/Sources/Flows/Senders/Receivers. Health is always
    /// `NeverExpire` here — the Node trusts its own application, not a
    /// remote heartbeat, to know when a local resource is gone
    /// (spec.md §3.3).
    pub store: ResourceStore,
    pub settings: SettingsHandle,
    pub dns: Arc<dyn DnsSdClient>,
    pub transport: Arc<dyn ApiTransport>,
    pub clock: Arc<dyn Clock>,
}

impl NodeModel {
    pub fn new(
        self_id: ResourceId,
        settings: Settings,
        dns: Arc<dyn DnsSdClient>,
        transport: Arc<dyn ApiTransport>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new(Self {
            self_id,
            store: ResourceStore::new(settings.permissive_referential_integrity),
            settings: SettingsHandle::new(settings),
            dns,
            transport,
            clock,
        })
    }

    /// Sub-resources in the topologically safe registration order of
    /// spec.md §4.3 step 2: "Devices after Node, Sources before Flows,
    /// Flows before Senders, Receivers after Device." The Node resource
    /// itself is registered separately as step 1 and isn't included here.
    pub fn owned_sub_resources_in_registration_order(&self) -> Vec<nmos_core::Resource> {
        [
            ResourceType::Device,
            ResourceType::Source,
            ResourceType::Flow,
            ResourceType::Sender,
            ResourceType::Receiver,
        ]
        .into_iter()
        .flat_map(|t| self.store.scan_type(t))
        .collect()
    }
}
