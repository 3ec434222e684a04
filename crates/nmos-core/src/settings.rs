//! The Settings document shared by Node and Registry.
//!
//! nmos-cpp keeps this as a single mutable JSON value guarded by the
//! model mutex (`nmos::settings`, see `nmos/settings.h` in
//! `original_source`). We give it a typed shape instead — SPEC_FULL.md
//! §1.3 — held behind [`arc_swap::ArcSwap`] (a teacher workspace
//! dependency) so long-lived tasks can read a consistent snapshot without
//! holding a lock across I/O, and a reload can swap in a new document
//! atomically without stopping those tasks.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::model::ApiVersion;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Seed for repeatable resource ids; `None` means fresh random ids.
    pub seed_id: Option<String>,

    pub label: String,
    pub description: String,

    pub api_versions: Vec<ApiVersion>,
    pub api_proto: ApiProto,
    pub api_auth: bool,

    /// Lower bound of the discovery backoff window (spec.md §4.3 default
    /// 1s).
    pub discovery_backoff_min: Duration,
    /// Upper bound the backoff ceiling saturates at (default 30s).
    pub discovery_backoff_max: Duration,
    /// Multiplicative growth factor applied to the ceiling after each
    /// failed discovery/registration attempt (default 1.5).
    pub discovery_backoff_factor: f64,
    /// How many failed discovery rounds a Node tolerates before falling
    /// back to peer-to-peer operation (spec.md §4.3).
    pub peer_to_peer_discovery_attempts: u32,

    /// Heartbeat period once registered (default 5s).
    pub heartbeat_interval: Duration,
    /// Per-request timeout for heartbeat POSTs (default 5s).
    pub heartbeat_timeout: Duration,
    /// Per-request timeout for registration POSTs (default 30s).
    pub registration_timeout: Duration,

    /// Registry-side expiry interval: a node not heartbeating within this
    /// window is garbage collected (default 12s).
    pub registry_expiry_interval: Duration,

    /// Bounds for the uniform `system_interval_min..max` re-fetch sleep
    /// of the System API behaviour (spec.md §4.8, default ~3600s each).
    pub system_interval_min: Duration,
    pub system_interval_max: Duration,
    pub system_fetch_timeout: Duration,

    pub paging_default_limit: usize,
    pub paging_max_limit: usize,

    /// Whether to accept child resources whose declared parent is not
    /// (yet) present in the store — spec.md §3.2's "permissive mode".
    pub permissive_referential_integrity: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiProto {
    Http,
    Https,
}

impl ApiProto {
    pub fn as_str(self) -> &'static str {
        match self {
            ApiProto::Http => "http",
            ApiProto::Https => "https",
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            seed_id: None,
            label: String::new(),
            description: String::new(),
            api_versions: vec![ApiVersion::new(1, 3)],
            api_proto: ApiProto::Http,
            api_auth: false,
            discovery_backoff_min: Duration::from_secs(1),
            discovery_backoff_max: Duration::from_secs(30),
            discovery_backoff_factor: 1.5,
            peer_to_peer_discovery_attempts: 3,
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(5),
            registration_timeout: Duration::from_secs(30),
            registry_expiry_interval: Duration::from_secs(12),
            system_interval_min: Duration::from_secs(3600),
            system_interval_max: Duration::from_secs(3610),
            system_fetch_timeout: Duration::from_secs(30),
            paging_default_limit: 10,
            paging_max_limit: 100,
            permissive_referential_integrity: false,
        }
    }
}

/// Hot-swappable handle to a [`Settings`] document. Cloning is cheap
/// (`Arc` to the swap cell); every clone observes the latest `store`.
#[derive(Clone)]
pub struct SettingsHandle {
    inner: Arc<ArcSwap<Settings>>,
}

impl SettingsHandle {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(settings)),
        }
    }

    pub fn load(&self) -> Arc<Settings> {
        self.inner.load_full()
    }

    pub fn store(&self, settings: Settings) {
        self.inner.store(Arc::new(settings));
    }
}

impl Default for SettingsHandle {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}
