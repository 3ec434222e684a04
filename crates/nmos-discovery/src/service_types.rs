//! The DNS-SD service-type vocabulary of spec.md §6.1.
//!
//! Only the vocabulary and the TXT record shape are specified here — the
//! underlying mDNS/unicast-DNS library is an external collaborator per
//! spec.md §1.

use std::collections::BTreeMap;
use std::fmt;

use nmos_core::ApiVersion;

/// One of the four service types a Node/Registry/System participant
/// browses for or advertises.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ServiceType {
    /// `_nmos-register._tcp` — the current Registration API type.
    Register,
    /// `_nmos-registration._tcp` — deprecated predecessor, still browsed
    /// as a fallback per SPEC_FULL.md §2.
    LegacyRegistration,
    /// `_nmos-query._tcp` — Query API.
    Query,
    /// `_nmos-node._tcp` — peer-to-peer Node API.
    Node,
    /// `_nmos-system._tcp` — System API.
    System,
}

impl ServiceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceType::Register => "_nmos-register._tcp",
            ServiceType::LegacyRegistration => "_nmos-registration._tcp",
            ServiceType::Query => "_nmos-query._tcp",
            ServiceType::Node => "_nmos-node._tcp",
            ServiceType::System => "_nmos-system._tcp",
        }
    }

    /// `local.`-suffixed fully qualified type, the form `mdns-sd` expects
    /// for `browse`/`ServiceInfo::new`.
    pub fn ty_domain(self) -> String {
        format!("{}.local.", self.as_str())
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority extracted from the TXT `pri` key. `0..=99` is an active
/// instance; `100..` marks a development build that should only be used
/// if nothing better is advertised; [`Priority::DO_NOT_ADVERTISE`]
/// (`max-int`) opts an instance out of discovery entirely even though
/// it's present on the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub u32);

impl Priority {
    pub const DO_NOT_ADVERTISE: Priority = Priority(u32::MAX);

    pub fn is_advertisable(self) -> bool {
        self != Self::DO_NOT_ADVERTISE
    }
}

/// Parsed TXT record set common to every NMOS service type.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxtRecords(pub BTreeMap<String, String>);

impl TxtRecords {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn priority(&self) -> Priority {
        match self.get("pri").and_then(|v| v.parse::<u32>().ok()) {
            Some(p) => Priority(p),
            None => Priority::DO_NOT_ADVERTISE,
        }
    }

    /// `api_ver`: comma-separated list of supported API versions, e.g.
    /// `"v1.2,v1.3"`.
    pub fn api_versions(&self) -> Vec<ApiVersion> {
        self.get("api_ver")
            .map(|v| v.split(',').filter_map(parse_api_version).collect())
            .unwrap_or_default()
    }

    pub fn api_proto(&self) -> Option<&str> {
        self.get("api_proto")
    }

    pub fn api_auth(&self) -> bool {
        self.get("api_auth")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    /// 8-bit resource-class version counters advertised by a peer-to-peer
    /// Node (`ver_slf`, `ver_src`, `ver_flw`, `ver_dvc`, `ver_snd`,
    /// `ver_rcv`), incremented each time that resource class changes so a
    /// browsing peer can tell whether it needs to re-fetch.
    pub fn resource_version_counter(&self, key: &str) -> Option<u8> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }
}

fn parse_api_version(s: &str) -> Option<ApiVersion> {
    let s = s.trim().strip_prefix('v')?;
    let (major, minor) = s.split_once('.')?;
    Some(ApiVersion::new(major.parse().ok()?, minor.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_api_versions_list() {
        let mut txt = TxtRecords::default();
        txt.insert("api_ver", "v1.2,v1.3");
        assert_eq!(
            txt.api_versions(),
            vec![ApiVersion::new(1, 2), ApiVersion::new(1, 3)]
        );
    }

    #[test]
    fn missing_pri_is_do_not_advertise() {
        assert_eq!(TxtRecords::default().priority(), Priority::DO_NOT_ADVERTISE);
    }
}
