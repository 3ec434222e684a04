//! The Registry: resource store wiring, garbage collection, the RQL-lite
//! query engine, cursor pagination, subscriptions and the HTTP/WS surface
//! (spec.md §4.4–§4.6, §6.2).

pub mod garbage_collector;
pub mod http;
pub mod pagination;
pub mod query;
pub mod registry;
pub mod subscription;

pub use pagination::{link_header, paginate, Page, PageRequest};
pub use query::{parse_filters, resource_matches, Filter, FilterOp};
pub use registry::RegistryModel;
pub use subscription::{
    delta_grain, queue_capacity, run_pump, sync_grain, Grain, GrainEntry, GrainSink, GrainTiming,
    SubscriptionQueue, SubscriptionRequest, KEEPALIVE_INTERVAL, RESYNC_REQUIRED_CLOSE_CODE,
};
