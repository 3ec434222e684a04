//! End-to-end scenario A (spec.md §7): a single Node discovers an
//! in-process Registry, registers its Node resource and a child Device,
//! keeps heartbeating, and survives the Registry's garbage collector
//! expiring it and coming back on the next heartbeat's 404.

use std::sync::Arc;
use std::time::Duration;

use nmos_contract_tests::{resolved_instance, InMemoryDnsSdClient, InProcessTransport};
use nmos_core::{
    DeviceData, Health, MockClock, NodeData, Resource, ResourceData, ResourceId, ResourceType, Settings,
    ShutdownHandle, TaiTimestamp, Version,
};
use nmos_discovery::ServiceType;
use nmos_node::NodeModel;
use nmos_registry::RegistryModel;

const REGISTRY_BASE_URL: &str = "http://registry.local:8080";

fn node_resource(id: ResourceId) -> Resource {
    Resource::new(
        id,
        Version(TaiTimestamp::ZERO),
        ResourceData::Node(NodeData {
            hostname: Some("test-node".into()),
            api_versions: vec![],
            href: "http://node.local:9000".into(),
            services: vec![],
            extra: serde_json::Value::Null,
        }),
        Health::NeverExpire,
    )
}

fn device_resource(id: ResourceId, node_id: ResourceId) -> Resource {
    Resource::new(
        id,
        Version(TaiTimestamp::ZERO),
        ResourceData::Device(DeviceData {
            node_id,
            device_type: "urn:x-nmos:device:generic".into(),
            senders: vec![],
            receivers: vec![],
            extra: serde_json::Value::Null,
        }),
        Health::NeverExpire,
    )
}

#[tokio::test]
async fn node_registers_itself_and_its_device_with_the_registry() {
    let registry = RegistryModel::new(nmos_core::SettingsHandle::new(Settings::default()));
    let transport = Arc::new(InProcessTransport::new().with_registry(REGISTRY_BASE_URL, registry.clone()));

    let dns = InMemoryDnsSdClient::new();
    dns.seed(
        ServiceType::Register,
        resolved_instance("registry-1", "registry.local", 8080, 0),
    );

    let clock = MockClock::new(TaiTimestamp::ZERO);
    let self_id = ResourceId::random();
    let device_id = ResourceId::random();

    let node_model = NodeModel::new(self_id, Settings::default(), dns, transport, clock.clone());
    node_model.store.insert(node_resource(self_id)).unwrap();
    node_model.store.insert(device_resource(device_id, self_id)).unwrap();

    let (shutdown_handle, shutdown_token) = ShutdownHandle::new();
    let task = tokio::spawn(nmos_node::registration::run(node_model.clone(), shutdown_token));

    // Registration backs off starting at 1s; give the task a few ticks to
    // discover and register against the first candidate before we assert.
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert!(registry.store.find(self_id).is_some(), "node should have registered itself");
    assert!(registry.store.find(device_id).is_some(), "node should have registered its device");

    shutdown_handle.trigger();
    let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
}

#[tokio::test]
async fn heartbeat_re_registers_after_registry_expires_the_node() {
    let registry = RegistryModel::new(nmos_core::SettingsHandle::new(Settings::default()));
    let transport = Arc::new(InProcessTransport::new().with_registry(REGISTRY_BASE_URL, registry.clone()));
    let dns = InMemoryDnsSdClient::new();
    dns.seed(
        ServiceType::Register,
        resolved_instance("registry-1", "registry.local", 8080, 0),
    );

    let clock = MockClock::new(TaiTimestamp::ZERO);
    let self_id = ResourceId::random();

    let mut settings = Settings::default();
    settings.heartbeat_interval = Duration::from_secs(5);
    let node_model = NodeModel::new(self_id, settings, dns, transport, clock.clone());
    node_model.store.insert(node_resource(self_id)).unwrap();

    let (shutdown_handle, shutdown_token) = ShutdownHandle::new();
    let task = tokio::spawn(nmos_node::registration::run(node_model.clone(), shutdown_token));
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(registry.store.find(self_id).is_some());

    // Simulate the registry's garbage collector expiring the Node out
    // from under the heartbeat loop (spec.md §4.3: "a 404 on heartbeat
    // means re-register").
    registry.store.erase(self_id, true).unwrap();
    assert!(registry.store.find(self_id).is_none());

    clock.advance(Duration::from_secs(6));
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }

    assert!(
        registry.store.find(self_id).is_some(),
        "node must re-register once its heartbeat sees a 404"
    );

    shutdown_handle.trigger();
    let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
}

#[test]
fn cascade_delete_removes_device_with_its_node() {
    let registry = RegistryModel::new(nmos_core::SettingsHandle::new(Settings::default()));
    let node_id = ResourceId::random();
    let device_id = ResourceId::random();
    registry.store.insert(node_resource(node_id)).unwrap();
    registry.store.insert(device_resource(device_id, node_id)).unwrap();

    let erased = registry.store.erase(node_id, true).unwrap();
    let erased_types: Vec<_> = erased.iter().map(Resource::resource_type).collect();
    assert!(erased_types.contains(&ResourceType::Node));
    assert!(erased_types.contains(&ResourceType::Device));
    assert!(registry.store.find(node_id).is_none());
    assert!(registry.store.find(device_id).is_none());
}
