//! A small axum HTTP/WebSocket surface over the Registration and Query
//! APIs (spec.md §6.2). Per spec.md §1's Non-goals, "Specific REST path
//! schemas" are boilerplate once the data model and state machine are
//! correct — this module wires just enough routing to exercise
//! `ResourceStore`, the query engine and the subscription pump end to
//! end; it does not attempt full IS-04 path/schema fidelity.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::Value as JsonValue;

use nmos_core::{ErrorCategory, Health, NmosError, ResourceId, ResourceType, TaiTimestamp, Version};

use crate::pagination::{link_header, paginate, PageRequest};
use crate::query::{parse_filters, resource_matches};
use crate::registry::RegistryModel;
use crate::subscription::SubscriptionRequest;

/// Wraps [`NmosError`] so handlers can `?`-propagate it and get the
/// right HTTP status automatically.
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

pub fn router(model: Arc<RegistryModel>) -> Router {
    Router::new()
        .route("/health/nodes/:id", post(heartbeat))
        .route("/resource", post(register_resource))
        .route("/resource/:type/:id", delete(delete_resource))
        .route("/:type", get(list_resources))
        .route("/:type/:id", get(get_resource))
        .route("/subscriptions", post(create_subscription))
        .with_state(model)
}

fn parse_resource_type(segment: &str) -> Result<ResourceType, ApiError> {
    [
        ResourceType::Node,
        ResourceType::Device,
        ResourceType::Source,
        ResourceType::Flow,
        ResourceType::Sender,
        ResourceType::Receiver,
        ResourceType::Subscription,
    ]
    .into_iter()
    .find(|t| t.plural() == segment)
    .ok_or_else(|| ApiError(NmosError::not_found(format!("unknown resource type {segment}"))))
}

async fn heartbeat(State(model): State<Arc<RegistryModel>>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    let id: ResourceId = id.parse().map_err(|_| NmosError::validation("invalid id"))?;
    model.store.modify(id, |r| {
        r.health = Health::LastHeartbeat(TaiTimestamp::now().seconds);
        Ok(())
    })?;
    Ok(StatusCode::OK)
}

async fn register_resource(
    State(model): State<Arc<RegistryModel>>,
    Json(body): Json<JsonValue>,
) -> Result<(StatusCode, Json<JsonValue>), ApiError> {
    let resource = model.resource_from_wire(body)?;
    let (status, stored) = model.register(resource)?;
    Ok((status, Json(model.resource_to_wire(&stored))))
}

async fn delete_resource(
    State(model): State<Arc<RegistryModel>>,
    Path((resource_type, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let _ = parse_resource_type(resource_type.trim_end_matches('s'))?;
    let id: ResourceId = id.parse().map_err(|_| NmosError::validation("invalid id"))?;
    model.store.erase(id, true)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_resource(
    State(model): State<Arc<RegistryModel>>,
    Path((_resource_type, id)): Path<(String, String)>,
) -> Result<Json<JsonValue>, ApiError> {
    let id: ResourceId = id.parse().map_err(|_| NmosError::validation("invalid id"))?;
    let resource = model
        .store
        .find(id)
        .ok_or_else(|| NmosError::not_found(format!("resource {id} not found")))?;
    let expiry_interval = model.settings.load().registry_expiry_interval.as_secs();
    if resource.health.is_expired(TaiTimestamp::now().seconds, expiry_interval) {
        return Err(NmosError::not_found(format!("resource {id} not found")).into());
    }
    Ok(Json(model.resource_to_wire(&resource)))
}

async fn list_resources(
    State(model): State<Arc<RegistryModel>>,
    Path(resource_type): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<(HeaderMap, Json<Vec<JsonValue>>), ApiError> {
    let resource_type = parse_resource_type(&resource_type)?;
    let query = params
        .iter()
        .filter(|(k, _)| !k.starts_with("paging."))
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    let filters = parse_filters(&query);

    let since = params.get("paging.since").and_then(|s| Version::parse(s));
    let until = params.get("paging.until").and_then(|s| Version::parse(s));
    let limit = params.get("paging.limit").and_then(|s| s.parse().ok());

    let settings = model.settings.load();
    let candidates: Vec<_> = model
        .store
        .scan_window(resource_type, since, until)
        .into_iter()
        .filter(|r| resource_matches(r, &filters))
        .collect();
    let page = paginate(
        candidates,
        PageRequest { since, until, limit },
        settings.paging_default_limit,
        settings.paging_max_limit,
    );

    // `first`/`last` anchor to the full filtered result set, not the
    // `since`/`until`-restricted window above, so they stay meaningful
    // even mid-scroll.
    let full_window: Vec<_> = model
        .store
        .scan_window(resource_type, None, None)
        .into_iter()
        .filter(|r| resource_matches(r, &filters))
        .collect();
    let window_first = full_window.first().map(|r| r.created).unwrap_or(page.since);
    let last_page_start_index = full_window.len().saturating_sub(page.limit.max(1));
    let window_last_page_since = full_window
        .get(last_page_start_index)
        .map(|r| r.created)
        .unwrap_or(window_first);

    let mut headers = HeaderMap::new();
    headers.insert("X-Paging-Since", header_value(page.since.to_wire()));
    headers.insert("X-Paging-Until", header_value(page.until.to_wire()));
    headers.insert("X-Paging-Limit", header_value(page.limit.to_string()));
    let base_url = format!("/{}", resource_type.plural());
    headers.insert(
        "Link",
        header_value(link_header(&base_url, &page, window_first, window_last_page_since)),
    );

    let body = page.items.iter().map(|r| model.resource_to_wire(r)).collect();
    Ok((headers, Json(body)))
}

fn header_value(value: String) -> HeaderValue {
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static(""))
}

async fn create_subscription(
    State(model): State<Arc<RegistryModel>>,
    Json(request): Json<SubscriptionRequest>,
) -> Result<(StatusCode, Json<JsonValue>), ApiError> {
    let (status, subscription) = model.create_subscription(request)?;
    Ok((status, Json(model.resource_to_wire(&subscription))))
}

impl From<ErrorCategory> for StatusCode {
    fn from(category: ErrorCategory) -> Self {
        StatusCode::from_u16(category.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}
