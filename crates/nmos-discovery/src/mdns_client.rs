//! Production [`DnsSdClient`] backed by `mdns-sd`.
//!
//! spec.md §1 treats the underlying mDNS library itself as out of scope
//! — this module is the thin adaptation layer translating its event
//! stream into the browse/resolve/advertise contract, in the spirit of
//! the teacher's transport adapters (`spark-transport-tcp` wrapping
//! `tokio::net::TcpListener`): a small, single-purpose shim with no
//! domain logic of its own.

use std::time::Duration;

use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use nmos_core::{NmosError, Result};

use crate::client::{Advertisement, BrowseResult, DnsSdClient, ResolveTimeouts, ResolvedInstance};
use crate::service_types::{ServiceType, TxtRecords};

pub struct MdnsDnsSdClient {
    daemon: ServiceDaemon,
}

impl MdnsDnsSdClient {
    pub fn new() -> Result<Self> {
        let daemon = ServiceDaemon::new()
            .map_err(|err| NmosError::transient(format!("mdns daemon start failed: {err}")).with_cause(err))?;
        Ok(Self { daemon })
    }
}

fn txt_records_of(info: &ServiceInfo) -> TxtRecords {
    let mut txt = TxtRecords::default();
    for property in info.get_properties().iter() {
        txt.insert(property.key().to_string(), property.val_str().to_string());
    }
    txt
}

/// Default TTL assumed for a resolved instance when the underlying
/// library doesn't surface the record's own TTL. NMOS instances
/// re-advertise well inside this window, so it's a conservative cap
/// rather than a value callers should rely on precisely.
const ASSUMED_HOST_TTL: Duration = Duration::from_secs(120);

#[async_trait]
impl DnsSdClient for MdnsDnsSdClient {
    async fn browse(
        &self,
        service_type: ServiceType,
        _domain: &str,
        timeout: Duration,
    ) -> Result<Vec<BrowseResult>> {
        let ty_domain = service_type.ty_domain();
        let receiver = self
            .daemon
            .browse(&ty_domain)
            .map_err(|err| NmosError::transient(format!("mdns browse failed: {err}")).with_cause(err))?;

        let mut results = Vec::new();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            let event = match tokio::time::timeout(remaining, receiver.recv_async()).await {
                Ok(Ok(event)) => event,
                _ => break,
            };
            match event {
                ServiceEvent::ServiceResolved(info) => {
                    results.push(BrowseResult {
                        instance_name: info.get_fullname().to_string(),
                        ttl: ASSUMED_HOST_TTL,
                    });
                }
                ServiceEvent::SearchStopped(_) => break,
                _ => {}
            }
        }
        let _ = self.daemon.stop_browse(&ty_domain);
        Ok(results)
    }

    async fn resolve(
        &self,
        service_type: ServiceType,
        instance_name: &str,
        timeout: ResolveTimeouts,
    ) -> Result<ResolvedInstance> {
        let ty_domain = service_type.ty_domain();
        let receiver = self
            .daemon
            .browse(&ty_domain)
            .map_err(|err| NmosError::transient(format!("mdns browse failed: {err}")).with_cause(err))?;

        let deadline = tokio::time::Instant::now() + timeout.latest;
        let resolved = loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break None;
            }
            let event = match tokio::time::timeout(remaining, receiver.recv_async()).await {
                Ok(Ok(event)) => event,
                _ => break None,
            };
            if let ServiceEvent::ServiceResolved(info) = event {
                if info.get_fullname() == instance_name {
                    break Some(info);
                }
            }
        };
        let _ = self.daemon.stop_browse(&ty_domain);

        let info = resolved.ok_or_else(|| {
            NmosError::transient(format!("mdns resolve timed out for {instance_name}"))
        })?;
        let host = info
            .get_addresses()
            .iter()
            .next()
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| info.get_hostname().trim_end_matches('.').to_string());

        Ok(ResolvedInstance {
            instance_name: instance_name.to_string(),
            host,
            port: info.get_port(),
            txt: txt_records_of(&info),
        })
    }

    async fn advertise(
        &self,
        service_type: ServiceType,
        port: u16,
        txt: TxtRecords,
    ) -> Result<Box<dyn Advertisement>> {
        let host_label = std::env::var("HOSTNAME").unwrap_or_else(|_| "nmos-node".to_string());
        let hostname = format!("{host_label}.local.");
        let instance_name = format!("{host_label}-{port}");
        let ty_domain = service_type.ty_domain();
        let properties: Vec<(String, String)> = txt.0.into_iter().collect();

        let service_info = ServiceInfo::new(
            &ty_domain,
            &instance_name,
            &hostname,
            "",
            port,
            &properties[..],
        )
        .map_err(|err| NmosError::validation(format!("invalid service info: {err}")).with_cause(err))?
        .enable_addr_auto();

        let fullname = service_info.get_fullname().to_string();
        self.daemon
            .register(service_info)
            .map_err(|err| NmosError::transient(format!("mdns register failed: {err}")).with_cause(err))?;

        Ok(Box::new(MdnsAdvertisement {
            daemon: self.daemon.clone(),
            fullname,
        }))
    }
}

struct MdnsAdvertisement {
    daemon: ServiceDaemon,
    fullname: String,
}

#[async_trait]
impl Advertisement for MdnsAdvertisement {
    async fn withdraw(&self) -> Result<()> {
        self.daemon
            .unregister(&self.fullname)
            .map(|_| ())
            .map_err(|err| NmosError::transient(format!("mdns unregister failed: {err}")).with_cause(err))
    }
}
