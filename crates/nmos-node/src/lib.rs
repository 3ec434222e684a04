//! Node-side coordination behaviours of spec.md §4.3, §4.8 and the
//! peer-to-peer fallback of §4.3's last paragraph: registration,
//! heartbeat, backoff, System API consumption and a minimal Node API
//! HTTP surface.

pub mod backoff;
pub mod http;
pub mod model;
pub mod peer_to_peer;
pub mod registration;
pub mod system;
pub mod transport;

pub use backoff::Backoff;
pub use model::NodeModel;
pub use transport::{ApiTransport, ReqwestTransport};
