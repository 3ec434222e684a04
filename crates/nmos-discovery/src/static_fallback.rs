//! Static-configuration fallback, per spec.md §4.2: "When the underlying
//! library returns zero results within the timeout, a fallback entry
//! synthesised from static configuration (if any) is appended."

use std::time::Duration;

use async_trait::async_trait;
use nmos_core::Result;

use crate::client::{discover_candidates, order_candidates, Advertisement, DnsSdClient, ResolveTimeouts, ResolvedInstance};
use crate::service_types::ServiceType;

/// A single statically-configured candidate, e.g. from a configuration
/// file naming a known Registry when mDNS is unavailable or firewalled.
#[derive(Clone, Debug)]
pub struct StaticCandidate {
    pub service_type: ServiceType,
    pub instance: ResolvedInstance,
}

/// Wraps another [`DnsSdClient`] and appends configured static
/// candidates whenever a browse+resolve round for a matching service
/// type comes back empty. `advertise` delegates unchanged — static
/// fallback only concerns discovery, not advertisement.
pub struct StaticFallbackClient<C> {
    inner: C,
    statics: Vec<StaticCandidate>,
}

impl<C: DnsSdClient> StaticFallbackClient<C> {
    pub fn new(inner: C, statics: Vec<StaticCandidate>) -> Self {
        Self { inner, statics }
    }

    /// Browse+resolve through the wrapped client, then append any
    /// statically configured candidates for `service_type` if nothing
    /// was discovered. Ordering (§4.2) is reapplied over the combined
    /// set so a higher-priority static entry can still win.
    pub async fn discover(
        &self,
        service_type: ServiceType,
        domain: &str,
        browse_timeout: Duration,
        resolve_timeout: ResolveTimeouts,
    ) -> Result<Vec<ResolvedInstance>> {
        let mut found =
            discover_candidates(&self.inner, service_type, domain, browse_timeout, resolve_timeout).await?;
        if found.is_empty() {
            found.extend(
                self.statics
                    .iter()
                    .filter(|s| s.service_type == service_type)
                    .map(|s| s.instance.clone()),
            );
            found = order_candidates(found);
        }
        Ok(found)
    }
}

#[async_trait]
impl<C: DnsSdClient> DnsSdClient for StaticFallbackClient<C> {
    async fn browse(
        &self,
        service_type: ServiceType,
        domain: &str,
        timeout: Duration,
    ) -> Result<Vec<crate::client::BrowseResult>> {
        self.inner.browse(service_type, domain, timeout).await
    }

    async fn resolve(
        &self,
        service_type: ServiceType,
        instance_name: &str,
        timeout: ResolveTimeouts,
    ) -> Result<ResolvedInstance> {
        self.inner.resolve(service_type, instance_name, timeout).await
    }

    async fn advertise(
        &self,
        service_type: ServiceType,
        port: u16,
        txt: crate::service_types::TxtRecords,
    ) -> Result<Box<dyn Advertisement>> {
        self.inner.advertise(service_type, port, txt).await
    }
}
