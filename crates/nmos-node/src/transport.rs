//! The HTTP client seam a Node's registration and system behaviours POST
//! and GET through. Kept as a trait, per spec.md §1's "HTTP/WebSocket
//! transport libraries... specified only as interface contracts" —
//! [`ReqwestTransport`] is the production implementation (the teacher
//! workspace already carries `reqwest` for exactly this), while
//! contract tests substitute an in-process fake that calls straight into
//! a `nmos-registry` model without touching a socket.

use std::time::Duration;

use async_trait::async_trait;
use nmos_core::{NmosError, Result};
use serde_json::Value as Json;

/// Any completed HTTP exchange returns `Ok`, status code and all — a
/// 404 or 409 is information the caller needs, not a transport failure.
/// Only connection-level failures (refused, reset, timed out) are `Err`,
/// and are always [`nmos_core::ErrorCategory::Transient`] so the
/// registration/system state machines treat them as "try the next
/// candidate" per spec.md §4.3/§4.8.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> Result<(u16, Json)>;
    async fn post(&self, url: &str, body: Json, timeout: Duration) -> Result<(u16, Json)>;
    async fn delete(&self, url: &str, timeout: Duration) -> Result<u16>;

    /// The Registration API heartbeat: an empty-bodied POST, status code
    /// only. Default implementation just reuses `post`.
    async fn heartbeat(&self, url: &str, timeout: Duration) -> Result<u16> {
        let (status, _) = self.post(url, Json::Null, timeout).await?;
        Ok(status)
    }
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_body(response: reqwest::Response) -> Json {
    response.json::<Json>().await.unwrap_or(Json::Null)
}

#[async_trait]
impl ApiTransport for ReqwestTransport {
    async fn get(&self, url: &str, timeout: Duration) -> Result<(u16, Json)> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| NmosError::transient(e.to_string()))?;
        let status = response.status().as_u16();
        Ok((status, read_body(response).await))
    }

    async fn post(&self, url: &str, body: Json, timeout: Duration) -> Result<(u16, Json)> {
        let response = self
            .client
            .post(url)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| NmosError::transient(e.to_string()))?;
        let status = response.status().as_u16();
        Ok((status, read_body(response).await))
    }

    async fn delete(&self, url: &str, timeout: Duration) -> Result<u16> {
        let response = self
            .client
            .delete(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| NmosError::transient(e.to_string()))?;
        Ok(response.status().as_u16())
    }
}
