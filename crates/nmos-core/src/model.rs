//! The resource model of spec.md §3.2: seven polymorphic entities sharing
//! a common envelope.
//!
//! Design note from spec.md §9 followed literally: "Tagged variants (one
//! per resource type with a shared envelope) are preferred over open maps
//! for internal indexing — convert at the HTTP boundary." `ResourceData`
//! is that tagged variant; an `extra` JSON bag on each variant carries
//! whatever additional wire fields a schema version defines that this
//! core doesn't need to reason about structurally (geometry, colorimetry,
//! capability constraint-sets, …) — exactly the boundary the design note
//! draws.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::{NmosError, Result};
use crate::ids::ResourceId;
use crate::time::Version;

/// Major/minor API version pair, e.g. `v1.3`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
}

impl ApiVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}", self.major, self.minor)
    }
}

/// Media format declared by a Source/Flow, per spec.md §3.2.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Video,
    Audio,
    Data,
    Mux,
    Event,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Format::Video => "video",
            Format::Audio => "audio",
            Format::Data => "data",
            Format::Mux => "mux",
            Format::Event => "event",
        };
        f.write_str(s)
    }
}

/// Discriminant for [`ResourceData`], used wherever only the *kind* of
/// resource matters (indices, cascade ordering, route dispatch).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Node,
    Device,
    Source,
    Flow,
    Sender,
    Receiver,
    Subscription,
}

impl ResourceType {
    /// Plural path segment, as used in Node/Registration/Query API URLs
    /// (`/nodes`, `/devices`, …).
    pub fn plural(self) -> &'static str {
        match self {
            ResourceType::Node => "nodes",
            ResourceType::Device => "devices",
            ResourceType::Source => "sources",
            ResourceType::Flow => "flows",
            ResourceType::Sender => "senders",
            ResourceType::Receiver => "receivers",
            ResourceType::Subscription => "subscriptions",
        }
    }

    /// Cascade-delete rank: parents always precede children. Used to sort
    /// a batch of deletions so cascades always walk Node → Device →
    /// {Source → Flow → Sender, Receiver}, per spec.md §4.1.
    pub fn cascade_rank(self) -> u8 {
        match self {
            ResourceType::Node => 0,
            ResourceType::Device => 1,
            ResourceType::Source => 2,
            ResourceType::Flow => 3,
            ResourceType::Sender => 4,
            ResourceType::Receiver => 4,
            ResourceType::Subscription => 255,
        }
    }
}

/// A `{receiver_id?, active}` or `{sender_id?, active}` subscription block
/// carried by a Sender/Receiver resource (distinct from the Registry-level
/// [`SubscriptionData`], which is a query subscription, not a media one).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointSubscription {
    pub peer_id: Option<ResourceId>,
    pub active: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    pub hostname: Option<String>,
    pub api_versions: Vec<ApiVersion>,
    pub href: String,
    #[serde(default)]
    pub services: Vec<Json>,
    #[serde(default)]
    pub extra: Json,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceData {
    pub node_id: ResourceId,
    pub device_type: String,
    #[serde(default)]
    pub senders: Vec<ResourceId>,
    #[serde(default)]
    pub receivers: Vec<ResourceId>,
    #[serde(default)]
    pub extra: Json,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceData {
    pub device_id: ResourceId,
    pub format: Format,
    #[serde(default)]
    pub extra: Json,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowData {
    pub source_id: ResourceId,
    pub device_id: ResourceId,
    pub format: Format,
    #[serde(default)]
    pub extra: Json,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SenderData {
    pub flow_id: ResourceId,
    pub device_id: ResourceId,
    pub transport: String,
    #[serde(default)]
    pub subscription: EndpointSubscription,
    #[serde(default)]
    pub extra: Json,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReceiverData {
    pub device_id: ResourceId,
    pub format: Format,
    pub transport: String,
    #[serde(default)]
    pub subscription: EndpointSubscription,
    #[serde(default)]
    pub extra: Json,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionData {
    pub resource_path: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    pub persist: bool,
    pub max_update_rate_ms: u64,
    pub authorization: bool,
    pub ws_href: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceData {
    Node(NodeData),
    Device(DeviceData),
    Source(SourceData),
    Flow(FlowData),
    Sender(SenderData),
    Receiver(ReceiverData),
    Subscription(SubscriptionData),
}

impl ResourceData {
    pub fn resource_type(&self) -> ResourceType {
        match self {
            ResourceData::Node(_) => ResourceType::Node,
            ResourceData::Device(_) => ResourceType::Device,
            ResourceData::Source(_) => ResourceType::Source,
            ResourceData::Flow(_) => ResourceType::Flow,
            ResourceData::Sender(_) => ResourceType::Sender,
            ResourceData::Receiver(_) => ResourceType::Receiver,
            ResourceData::Subscription(_) => ResourceType::Subscription,
        }
    }

    /// The immediate parent this resource must reference, if any.
    /// Flow/Sender have two parents in principle (see [`Self::parents`]);
    /// this returns the "owning" one used for cascade delete.
    pub fn owning_parent(&self) -> Option<ResourceId> {
        match self {
            ResourceData::Node(_) => None,
            ResourceData::Device(d) => Some(d.node_id),
            ResourceData::Source(s) => Some(s.device_id),
            ResourceData::Flow(f) => Some(f.device_id),
            ResourceData::Sender(s) => Some(s.device_id),
            ResourceData::Receiver(r) => Some(r.device_id),
            ResourceData::Subscription(_) => None,
        }
    }

    /// All resources this one must reference for referential integrity,
    /// per spec.md §3.2's "Parent reference" column (Flow references both
    /// its Source and Device; Sender references both its Flow and Device).
    pub fn parents(&self) -> Vec<ResourceId> {
        match self {
            ResourceData::Node(_) => vec![],
            ResourceData::Device(d) => vec![d.node_id],
            ResourceData::Source(s) => vec![s.device_id],
            ResourceData::Flow(f) => vec![f.source_id, f.device_id],
            ResourceData::Sender(s) => vec![s.flow_id, s.device_id],
            ResourceData::Receiver(r) => vec![r.device_id],
            ResourceData::Subscription(_) => vec![],
        }
    }
}

/// Monotonic wall-time seconds of a resource's last heartbeat, per
/// spec.md §3.3. `NeverExpire` is used for locally-owned self-resources
/// on a Node — the Node trusts its own application, not a remote
/// heartbeat, to know when a resource is gone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Health {
    NeverExpire,
    LastHeartbeat(u64),
}

impl Health {
    pub fn is_expired(self, now_seconds: u64, expiry_interval_seconds: u64) -> bool {
        match self {
            Health::NeverExpire => false,
            Health::LastHeartbeat(last) => {
                now_seconds.saturating_sub(last) > expiry_interval_seconds
            }
        }
    }
}

/// A resource: the shared envelope plus its type-specific data, per
/// spec.md §3.2/§3.4.
#[derive(Clone, Debug, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    /// Version assigned when this resource was first inserted. Distinct
    /// from `version` (bumped on every mutation) — the store's
    /// creation-ordered index (spec.md §3.5) sorts on this field so that
    /// an update never reshuffles a client's pagination cursor.
    pub created: Version,
    pub version: Version,
    pub label: String,
    pub description: String,
    pub tags: BTreeMap<String, Vec<String>>,
    pub data: ResourceData,
    pub health: Health,
}

impl Resource {
    /// A freshly-created resource: `created` and `version` start equal.
    pub fn new(id: ResourceId, version: Version, data: ResourceData, health: Health) -> Self {
        Self {
            id,
            created: version,
            version,
            label: String::new(),
            description: String::new(),
            tags: BTreeMap::new(),
            data,
            health,
        }
    }

    pub fn resource_type(&self) -> ResourceType {
        self.data.resource_type()
    }

    /// The owning Node's id, used by the Registry's `{parent-id}` index
    /// and by garbage-collection cascades. `None` only for a Node itself
    /// (whose own id *is* the node id) or a Subscription (not part of the
    /// resource tree).
    pub fn node_id(&self, lookup_device_node: impl Fn(ResourceId) -> Option<ResourceId>) -> Option<ResourceId> {
        match &self.data {
            ResourceData::Node(_) => Some(self.id),
            ResourceData::Device(d) => Some(d.node_id),
            ResourceData::Source(s) => lookup_device_node(s.device_id),
            ResourceData::Flow(f) => Some(f.device_id).and_then(&lookup_device_node),
            ResourceData::Sender(s) => lookup_device_node(s.device_id),
            ResourceData::Receiver(r) => lookup_device_node(r.device_id),
            ResourceData::Subscription(_) => None,
        }
    }

    /// Validate the envelope invariants the store enforces directly
    /// (spec.md §4.1): `id` is a UUID (guaranteed by the type), `version`
    /// monotone (checked by the caller against the previous stored
    /// version), `type` recognised (guaranteed by `ResourceData` being a
    /// closed enum). This function exists for the one remaining runtime
    /// check: a resource must not reference itself as its own parent.
    pub fn validate_envelope(&self) -> Result<()> {
        if self.data.parents().contains(&self.id) {
            return Err(NmosError::validation(format!(
                "resource {} cannot reference itself as its own parent",
                self.id
            )));
        }
        Ok(())
    }

    /// Parse a Registration/Node API wire body, `{"type": "<type>",
    /// "data": {...envelope and type-specific fields flattened
    /// together...}}`, into a [`Resource`]. Shared by `nmos-registry`
    /// (incoming POSTs) and `nmos-node` (building its own self/sub-
    /// resource envelopes) so the wire shape is defined exactly once.
    /// `version` in the wire body, if present, is ignored — callers
    /// supply the version the resource should actually carry (the
    /// store's own clock, or a value already agreed with a peer).
    pub fn from_wire(body: Json, version: Version) -> Result<Self> {
        let resource_type = body
            .get("type")
            .and_then(Json::as_str)
            .ok_or_else(|| NmosError::validation("missing \"type\""))?
            .to_string();
        let mut data = body
            .get("data")
            .cloned()
            .ok_or_else(|| NmosError::validation("missing \"data\""))?;
        let object = data
            .as_object_mut()
            .ok_or_else(|| NmosError::validation("\"data\" must be an object"))?;
        object.insert("type".to_string(), Json::String(resource_type));

        let id: ResourceId = object
            .get("id")
            .and_then(Json::as_str)
            .ok_or_else(|| NmosError::validation("missing \"data.id\""))?
            .parse()
            .map_err(|_| NmosError::validation("\"data.id\" is not a UUID"))?;
        let label = object.get("label").and_then(Json::as_str).unwrap_or("").to_string();
        let description = object
            .get("description")
            .and_then(Json::as_str)
            .unwrap_or("")
            .to_string();
        let tags: BTreeMap<String, Vec<String>> = object
            .get("tags")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| NmosError::validation(e.to_string()))?
            .unwrap_or_default();

        let resource_data: ResourceData =
            serde_json::from_value(data).map_err(|e| NmosError::validation(e.to_string()))?;

        let mut resource = Resource::new(id, version, resource_data, Health::NeverExpire);
        resource.label = label;
        resource.description = description;
        resource.tags = tags;
        Ok(resource)
    }

    /// Inverse of [`Self::from_wire`].
    pub fn to_wire(&self) -> Json {
        let mut data = serde_json::to_value(&self.data).unwrap_or(Json::Null);
        if let Some(object) = data.as_object_mut() {
            object.remove("type");
            object.insert("id".to_string(), Json::String(self.id.to_string()));
            object.insert("version".to_string(), Json::String(self.version.to_wire()));
            object.insert("label".to_string(), Json::String(self.label.clone()));
            object.insert(
                "description".to_string(),
                Json::String(self.description.clone()),
            );
            object.insert("tags".to_string(), serde_json::to_value(&self.tags).unwrap_or(Json::Null));
        }
        serde_json::json!({
            "type": self.resource_type().plural().trim_end_matches('s'),
            "data": data,
        })
    }
}
