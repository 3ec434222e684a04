//! Resource model, TAI time/version, the resource store and the shared
//! error taxonomy for the NMOS coordination core (spec.md §3, §4.1).
//!
//! Everything downstream (`nmos-discovery`, `nmos-node`, `nmos-registry`,
//! `nmos-connection`) depends on this crate and nothing else in the
//! workspace; it has no knowledge of HTTP, DNS-SD or WebSockets.

pub mod callbacks;
pub mod error;
pub mod ids;
pub mod model;
pub mod settings;
pub mod shutdown;
pub mod store;
pub mod time;

pub use error::{ErrorCategory, NmosError, Result};
pub use ids::{ResourceId, SubscriptionId};
pub use model::{
    ApiVersion, DeviceData, EndpointSubscription, FlowData, Format, Health, NodeData,
    ReceiverData, Resource, ResourceData, ResourceType, SenderData, SourceData, SubscriptionData,
};
pub use settings::{ApiProto, Settings, SettingsHandle};
pub use shutdown::{ShutdownHandle, ShutdownToken};
pub use store::{ChangeRecord, ResourceStore};
pub use time::{Clock, MockClock, SystemClock, TaiTimestamp, Version, VersionClock};
