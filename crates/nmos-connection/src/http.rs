//! A small axum HTTP surface over the IS-05 Connection API (spec.md
//! §6.2): `GET single/<senders|receivers>/{id}/{constraints|staged|
//! active|transportfile}`, `PATCH .../staged`, `POST bulk/<senders|
//! receivers>`. Mirrors `nmos_registry::http`'s routing style and, per
//! spec.md §1's Non-goals, makes no attempt at full IS-05 path/schema
//! fidelity beyond what exercises the staged/active state machine.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use nmos_core::{Clock, NmosError, ResourceId};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::connection_resource::{ConnectionResourceKind, PatchOutcome};
use crate::scheduler::ActivationScheduler;
use crate::store::ConnectionStore;

pub struct ApiError(NmosError);

impl From<NmosError> for ApiError {
    fn from(err: NmosError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.category().http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({
            "code": status.as_u16(),
            "error": self.0.code(),
            "debug": self.0.message(),
        });
        (status, Json(body)).into_response()
    }
}

#[derive(Clone)]
pub struct ConnectionApiState {
    pub connections: Arc<ConnectionStore>,
    pub scheduler: Arc<ActivationScheduler>,
    pub clock: Arc<dyn Clock>,
}

pub fn router(state: ConnectionApiState) -> Router {
    Router::new()
        .route("/single/:kind/:id/constraints", get(get_constraints))
        .route("/single/:kind/:id/staged", get(get_staged).patch(patch_staged))
        .route("/single/:kind/:id/active", get(get_active))
        .route("/single/:kind/:id/transportfile", get(get_transportfile))
        .route("/bulk/:kind", post(bulk_patch))
        .with_state(state)
}

fn parse_kind(segment: &str) -> Result<ConnectionResourceKind, ApiError> {
    match segment {
        "senders" => Ok(ConnectionResourceKind::Sender),
        "receivers" => Ok(ConnectionResourceKind::Receiver),
        _ => Err(NmosError::not_found(format!("unknown connection resource kind {segment}")).into()),
    }
}

fn parse_id(id: &str) -> Result<ResourceId, ApiError> {
    id.parse().map_err(|_| NmosError::validation("invalid id").into())
}

async fn get_constraints(
    State(state): State<ConnectionApiState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<JsonValue>, ApiError> {
    let _ = parse_kind(&kind)?;
    let id = parse_id(&id)?;
    state
        .connections
        .constraints_snapshot(id)
        .map(Json)
        .ok_or_else(|| NmosError::not_found(format!("no connection resource for {id}")).into())
}

async fn get_staged(
    State(state): State<ConnectionApiState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<JsonValue>, ApiError> {
    let _ = parse_kind(&kind)?;
    let id = parse_id(&id)?;
    state
        .connections
        .staged_snapshot(id)
        .map(Json)
        .ok_or_else(|| NmosError::not_found(format!("no connection resource for {id}")).into())
}

async fn get_active(
    State(state): State<ConnectionApiState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<JsonValue>, ApiError> {
    let _ = parse_kind(&kind)?;
    let id = parse_id(&id)?;
    state
        .connections
        .active_snapshot(id)
        .map(Json)
        .ok_or_else(|| NmosError::not_found(format!("no connection resource for {id}")).into())
}

async fn get_transportfile(
    State(state): State<ConnectionApiState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let _ = parse_kind(&kind)?;
    let id = parse_id(&id)?;
    let transportfile = state
        .connections
        .transportfile(id)
        .ok_or_else(|| NmosError::not_found(format!("no connection resource for {id}")))?;
    match transportfile {
        Some(sdp) => Ok(([("content-type", "application/sdp")], sdp).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// Reads an `If-Match` header as the optimistic-concurrency
/// `expected_generation` guard. Not an IS-05 wire field; an HTTP-level
/// precondition on top of it (spec.md §8, Scenario F).
fn expected_generation(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("if-match")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim_matches('"').parse().ok())
}

async fn patch_staged(
    State(state): State<ConnectionApiState>,
    Path((kind, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<JsonValue>,
) -> Result<Json<JsonValue>, ApiError> {
    let _ = parse_kind(&kind)?;
    let id = parse_id(&id)?;
    apply_patch(&state, id, body, expected_generation(&headers)).await?;
    state
        .connections
        .staged_snapshot(id)
        .map(Json)
        .ok_or_else(|| NmosError::not_found(format!("no connection resource for {id}")).into())
}

#[derive(Deserialize)]
struct BulkEntry {
    id: ResourceId,
    params: JsonValue,
}

async fn bulk_patch(
    State(state): State<ConnectionApiState>,
    Path(kind): Path<String>,
    Json(entries): Json<Vec<BulkEntry>>,
) -> Result<Json<Vec<JsonValue>>, ApiError> {
    let _ = parse_kind(&kind)?;
    let mut results = Vec::with_capacity(entries.len());
    for entry in entries {
        let outcome = apply_patch(&state, entry.id, entry.params, None).await;
        results.push(match outcome {
            Ok(()) => serde_json::json!({"id": entry.id, "code": 200}),
            Err(err) => serde_json::json!({
                "id": entry.id,
                "code": StatusCode::from_u16(err.0.category().http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR).as_u16(),
                "error": err.0.code(),
            }),
        });
    }
    Ok(Json(results))
}

async fn apply_patch(
    state: &ConnectionApiState,
    id: ResourceId,
    body: JsonValue,
    expected_generation: Option<u64>,
) -> Result<(), ApiError> {
    let receive_time = state.clock.now();
    let outcome = state
        .connections
        .with_mut(id, |cr| cr.patch_staged(body, receive_time, expected_generation))?;
    match outcome {
        PatchOutcome::NoActivation | PatchOutcome::Cancelled => {}
        PatchOutcome::ScheduleAt(fire_time) => {
            if fire_time <= receive_time {
                state.scheduler.fire_now(id).await;
            } else {
                state.scheduler.schedule(id, fire_time);
            }
        }
    }
    Ok(())
}
