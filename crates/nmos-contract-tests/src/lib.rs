//! Fakes shared by the scenario and property tests under `tests/`: an
//! in-memory `DnsSdClient` (no real mDNS socket), an in-process
//! `ApiTransport` that calls straight into a [`nmos_registry::RegistryModel`]
//! (no real HTTP socket, per `nmos_node::transport`'s doc comment), and a
//! couple of minimal `nmos-connection` callback stand-ins.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value as Json;

use nmos_core::{NmosError, Resource, Result};
use nmos_discovery::{Advertisement, BrowseResult, DnsSdClient, ResolveTimeouts, ResolvedInstance, ServiceType, TxtRecords};
use nmos_node::ApiTransport;
use nmos_registry::RegistryModel;

/// A `TransportfileSetter` that always returns the same canned SDP,
/// for scenario tests that don't care about its actual contents, only
/// that the activation sequence reaches it.
pub struct StaticTransportfileSetter {
    sdp: String,
}

impl StaticTransportfileSetter {
    pub fn new(sdp: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { sdp: sdp.into() })
    }
}

#[async_trait]
impl nmos_connection::TransportfileSetter for StaticTransportfileSetter {
    async fn set_transportfile(&self, _resource: &Resource, _active_endpoint: &Json) -> Result<String> {
        Ok(self.sdp.clone())
    }
}

/// An advertised instance plus a switch to simulate it going dark
/// mid-test (scenario D: "stop the first mid-heartbeat").
struct Advertised {
    instance: ResolvedInstance,
    alive: Arc<std::sync::atomic::AtomicBool>,
}

/// A `DnsSdClient` backed by an in-process table instead of real mDNS
/// sockets, so tests can advertise/browse/resolve deterministically and
/// flip an instance's liveness without touching the network.
#[derive(Default)]
pub struct InMemoryDnsSdClient {
    instances: Mutex<HashMap<ServiceType, Vec<Advertised>>>,
}

impl InMemoryDnsSdClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a candidate directly (bypassing `advertise`), returning
    /// a handle the test can use to kill it.
    pub fn seed(&self, service_type: ServiceType, instance: ResolvedInstance) -> Arc<std::sync::atomic::AtomicBool> {
        let alive = Arc::new(std::sync::atomic::AtomicBool::new(true));
        self.instances
            .lock()
            .entry(service_type)
            .or_default()
            .push(Advertised {
                instance,
                alive: alive.clone(),
            });
        alive
    }
}

#[async_trait]
impl DnsSdClient for InMemoryDnsSdClient {
    async fn browse(&self, service_type: ServiceType, _domain: &str, _timeout: Duration) -> Result<Vec<BrowseResult>> {
        Ok(self
            .instances
            .lock()
            .get(&service_type)
            .into_iter()
            .flatten()
            .filter(|a| a.alive.load(std::sync::atomic::Ordering::SeqCst))
            .map(|a| BrowseResult {
                instance_name: a.instance.instance_name.clone(),
                ttl: Duration::from_secs(120),
            })
            .collect())
    }

    async fn resolve(
        &self,
        service_type: ServiceType,
        instance_name: &str,
        _timeout: ResolveTimeouts,
    ) -> Result<ResolvedInstance> {
        self.instances
            .lock()
            .get(&service_type)
            .into_iter()
            .flatten()
            .find(|a| a.instance.instance_name == instance_name && a.alive.load(std::sync::atomic::Ordering::SeqCst))
            .map(|a| a.instance.clone())
            .ok_or_else(|| NmosError::not_found(format!("no such instance {instance_name}")))
    }

    async fn advertise(&self, service_type: ServiceType, port: u16, txt: TxtRecords) -> Result<Box<dyn Advertisement>> {
        let instance_name = format!("self-advertised-{port}");
        let instance = ResolvedInstance {
            instance_name: instance_name.clone(),
            host: "127.0.0.1".into(),
            port,
            txt,
        };
        let alive = self.seed(service_type, instance);
        Ok(Box::new(InMemoryAdvertisement { alive }))
    }
}

struct InMemoryAdvertisement {
    alive: Arc<std::sync::atomic::AtomicBool>,
}

#[async_trait]
impl Advertisement for InMemoryAdvertisement {
    async fn withdraw(&self) -> Result<()> {
        self.alive.store(false, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}

pub fn resolved_instance(name: &str, host: &str, port: u16, priority: u32) -> ResolvedInstance {
    let mut txt = TxtRecords::default();
    txt.insert("pri", priority.to_string());
    txt.insert("api_proto", "http");
    ResolvedInstance {
        instance_name: name.to_string(),
        host: host.to_string(),
        port,
        txt,
    }
}

/// An `ApiTransport` that routes straight into a [`RegistryModel`],
/// mirroring `nmos_registry::http`'s routes without an actual socket.
/// The candidate's `base_url()` is used only to pick which registry a
/// given test instance addresses (keyed by host:port), so tests can run
/// several registries side by side in one process.
pub struct InProcessTransport {
    registries: HashMap<String, Arc<RegistryModel>>,
}

impl InProcessTransport {
    pub fn new() -> Self {
        Self {
            registries: HashMap::new(),
        }
    }

    pub fn with_registry(mut self, base_url: impl Into<String>, model: Arc<RegistryModel>) -> Self {
        self.registries.insert(base_url.into(), model);
        self
    }

    fn model_for<'a>(&'a self, url: &str) -> Result<&'a Arc<RegistryModel>> {
        let (base, _path) = split_base_and_path(url);
        self.registries
            .get(base)
            .ok_or_else(|| NmosError::transient(format!("no registry reachable at {base}")))
    }
}

impl Default for InProcessTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn split_base_and_path(url: &str) -> (&str, &str) {
    let after_scheme = url.split("://").nth(1).unwrap_or(url);
    match after_scheme.find('/') {
        Some(idx) => (&url[..url.len() - (after_scheme.len() - idx)], &after_scheme[idx..]),
        None => (url, "/"),
    }
}

#[async_trait]
impl ApiTransport for InProcessTransport {
    async fn get(&self, url: &str, _timeout: Duration) -> Result<(u16, Json)> {
        let model = self.model_for(url)?;
        let (_, path) = split_base_and_path(url);
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        match segments.as_slice() {
            [resource_type, id] => {
                let _ = resource_type;
                let id = id.parse().map_err(|_| NmosError::validation("invalid id"))?;
                match model.store.find(id) {
                    Some(resource) => Ok((200, model.resource_to_wire(&resource))),
                    None => Ok((404, Json::Null)),
                }
            }
            _ => Ok((404, Json::Null)),
        }
    }

    async fn post(&self, url: &str, body: Json, _timeout: Duration) -> Result<(u16, Json)> {
        let model = self.model_for(url)?;
        let (_, path) = split_base_and_path(url);
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        match segments.as_slice() {
            ["resource"] => {
                let resource: Resource = model.resource_from_wire(body)?;
                let (status, stored) = model.register(resource)?;
                Ok((status.as_u16(), model.resource_to_wire(&stored)))
            }
            ["health", "nodes", id] => {
                let id = id.parse().map_err(|_| NmosError::validation("invalid id"))?;
                if model.store.find(id).is_none() {
                    return Ok((404, Json::Null));
                }
                model.store.modify(id, |r| {
                    r.health = nmos_core::Health::LastHeartbeat(nmos_core::TaiTimestamp::now().seconds);
                    Ok(())
                })?;
                Ok((200, Json::Null))
            }
            ["subscriptions"] => {
                let request = serde_json::from_value(body).map_err(|e| NmosError::validation(e.to_string()))?;
                let (status, subscription) = model.create_subscription(request)?;
                Ok((status.as_u16(), model.resource_to_wire(&subscription)))
            }
            _ => Ok((404, Json::Null)),
        }
    }

    async fn delete(&self, url: &str, _timeout: Duration) -> Result<u16> {
        let model = self.model_for(url)?;
        let (_, path) = split_base_and_path(url);
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        match segments.as_slice() {
            ["resource", _resource_type, id] => {
                let id = id.parse().map_err(|_| NmosError::validation("invalid id"))?;
                match model.store.erase(id, true) {
                    Ok(_) => Ok(204),
                    Err(_) => Ok(404),
                }
            }
            _ => Ok(404),
        }
    }
}
