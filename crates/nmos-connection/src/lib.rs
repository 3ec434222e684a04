//! The IS-05 connection (staged/active) state machine and activation
//! scheduler of spec.md §4.7.

pub mod activation;
pub mod callbacks;
pub mod connection_resource;
pub mod http;
pub mod merge;
pub mod scheduler;
pub mod store;

pub use activation::{ActivationMode, ActivationRequest, MAX_ABSOLUTE_SKEW};
pub use callbacks::{AutoResolver, EventsSubscriptionChanged, EventsWsMessage, IdentityAutoResolver, TransportfileSetter};
pub use connection_resource::{ConnectionResource, ConnectionResourceKind, PatchOutcome};
pub use http::ConnectionApiState;
pub use merge::deep_merge;
pub use scheduler::ActivationScheduler;
pub use store::ConnectionStore;
