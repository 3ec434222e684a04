//! The Node API surface of spec.md §6.2: `GET self`, `GET devices`,
//! `GET sources`, `GET flows`, `GET senders`, `GET receivers`, and the
//! `PUT receivers/{id}/target` subscribe/unsubscribe shorthand. Mirrors
//! `nmos-registry::http`'s small-surface approach — this is not a full
//! IS-04/IS-05 path/schema rendition, just enough routing to exercise
//! `NodeModel` end to end.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use nmos_core::{NmosError, ResourceData, ResourceId, ResourceType};

use crate::model::NodeModel;

pub struct ApiError(NmosError);

impl From<NmosError> for ApiError {
    fn from(err: NmosError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.category().http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({
            "code": status.as_u16(),
            "error": self.0.code(),
            "debug": self.0.message(),
        });
        (status, Json(body)).into_response()
    }
}

pub fn router(model: Arc<NodeModel>) -> Router {
    Router::new()
        .route("/self", get(get_self))
        .route("/devices", get(list_devices))
        .route("/sources", get(list_sources))
        .route("/flows", get(list_flows))
        .route("/senders", get(list_senders))
        .route("/receivers", get(list_receivers))
        .route("/receivers/:id/target", put(set_receiver_target))
        .with_state(model)
}

async fn get_self(State(model): State<Arc<NodeModel>>) -> Result<Json<JsonValue>, ApiError> {
    let resource = model
        .store
        .find(model.self_id)
        .ok_or_else(|| NmosError::not_found("Node has no self resource yet"))?;
    Ok(Json(resource.to_wire()))
}

fn list(model: &NodeModel, resource_type: ResourceType) -> Json<Vec<JsonValue>> {
    Json(
        model
            .store
            .scan_type(resource_type)
            .iter()
            .map(|r| r.to_wire())
            .collect(),
    )
}

async fn list_devices(State(model): State<Arc<NodeModel>>) -> Json<Vec<JsonValue>> {
    list(&model, ResourceType::Device)
}

async fn list_sources(State(model): State<Arc<NodeModel>>) -> Json<Vec<JsonValue>> {
    list(&model, ResourceType::Source)
}

async fn list_flows(State(model): State<Arc<NodeModel>>) -> Json<Vec<JsonValue>> {
    list(&model, ResourceType::Flow)
}

async fn list_senders(State(model): State<Arc<NodeModel>>) -> Json<Vec<JsonValue>> {
    list(&model, ResourceType::Sender)
}

async fn list_receivers(State(model): State<Arc<NodeModel>>) -> Json<Vec<JsonValue>> {
    list(&model, ResourceType::Receiver)
}

#[derive(Deserialize)]
pub struct TargetRequest {
    /// `None` unsubscribes.
    pub sender_id: Option<ResourceId>,
}

/// `PUT receivers/{id}/target`: the Node API's subscribe/unsubscribe
/// shorthand (spec.md §6.2). This sets the Receiver's own subscription
/// state directly — full IS-05 staged/active negotiation belongs to the
/// Connection API, not this shorthand.
async fn set_receiver_target(
    State(model): State<Arc<NodeModel>>,
    Path(id): Path<String>,
    Json(request): Json<TargetRequest>,
) -> Result<StatusCode, ApiError> {
    let id: ResourceId = id.parse().map_err(|_| NmosError::validation("invalid id"))?;
    model.store.modify(id, move |resource| {
        let ResourceData::Receiver(data) = &mut resource.data else {
            return Err(NmosError::validation(format!("{id} is not a Receiver")));
        };
        data.subscription.peer_id = request.sender_id;
        data.subscription.active = request.sender_id.is_some();
        Ok(())
    })?;
    Ok(StatusCode::OK)
}
