//! External collaborators the core consumes, per spec.md §6.4.
//!
//! These are the seams where application/infrastructure code plugs in:
//! schema validation, system-config delivery, certificate material and
//! authorization token checks. `nmos-connection` defines two more
//! (`AutoResolver`, `TransportfileSetter`) that need connection-specific
//! types and so don't belong here.

use async_trait::async_trait;
use serde_json::Value as Json;

use crate::error::Result;
use crate::model::{ApiVersion, ResourceType};

/// Validates a resource payload against the schema for its type and API
/// version. Side-effect-free.
#[async_trait]
pub trait SchemaValidator: Send + Sync {
    async fn validate(
        &self,
        api_version: ApiVersion,
        resource_type: ResourceType,
        payload: &Json,
    ) -> Result<()>;
}

/// A validator that accepts everything — useful for tests and for
/// embedders who validate upstream of this crate (e.g. at the HTTP
/// deserialization boundary) and don't need it duplicated here.
pub struct NoopSchemaValidator;

#[async_trait]
impl SchemaValidator for NoopSchemaValidator {
    async fn validate(
        &self,
        _api_version: ApiVersion,
        _resource_type: ResourceType,
        _payload: &Json,
    ) -> Result<()> {
        Ok(())
    }
}

/// Delivered whenever the System API behaviour (spec.md §4.8) fetches a
/// new global-config document.
#[async_trait]
pub trait SystemChangedHandler: Send + Sync {
    async fn system_changed(&self, uri: &str, document: &Json);
}

#[async_trait]
impl<F> SystemChangedHandler for F
where
    F: Fn(&str, &Json) + Send + Sync,
{
    async fn system_changed(&self, uri: &str, document: &Json) {
        (self)(uri, document)
    }
}

/// Loads trust material for outbound TLS connections. Side-effect-free
/// from the core's point of view: it never inspects the returned bytes,
/// only hands them to the transport layer.
#[async_trait]
pub trait LoadCaCertificates: Send + Sync {
    async fn load(&self) -> Result<Vec<u8>>;
}

/// Loads the certificate/key material this process presents as a server.
#[async_trait]
pub trait LoadServerCertificates: Send + Sync {
    async fn load(&self) -> Result<Vec<u8>>;
}

/// Set of OAuth2 scopes granted by a bearer token.
pub type ScopeSet = std::collections::BTreeSet<String>;

/// Validates an authorization bearer token and returns the scopes it
/// grants. Out of scope to implement (spec.md §1 excludes OAuth2 itself)
/// — this is purely the interface contract the HTTP layer calls through.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate_authorization_token(&self, token: &str) -> Result<ScopeSet>;
}
