//! DNS-SD service vocabulary (spec.md §6.1) and the browse/resolve/
//! advertise client contract (spec.md §4.2).

pub mod client;
pub mod mdns_client;
pub mod service_types;
pub mod static_fallback;

pub use client::{
    discover_candidates, order_candidates, Advertisement, BrowseResult, DnsSdClient,
    ResolveTimeouts, ResolvedInstance,
};
pub use mdns_client::MdnsDnsSdClient;
pub use service_types::{Priority, ServiceType, TxtRecords};
pub use static_fallback::{StaticCandidate, StaticFallbackClient};
