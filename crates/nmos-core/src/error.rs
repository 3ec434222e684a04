//! The error taxonomy of spec.md §7, given a concrete Rust shape.
//!
//! Grounded on the teacher's `spark_core::error::{CoreError, ErrorCategory}`
//! split: a small, stable `ErrorCategory` enum drives automated policy
//! (retry, failover, fatal shutdown), while `NmosError` itself carries a
//! code, a message and an optional boxed cause — simplified from the
//! teacher's builder-style `CoreError` to a `thiserror`-derived struct
//! since we don't need the teacher's `no_std` constraint or its
//! category-matrix lookup table; the category is attached at the
//! construction site instead of inferred from the code.

use thiserror::Error;

/// Drives automated policy exactly as spec.md §7 describes it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed or schema-incorrect input. HTTP 400.
    Validation,
    /// Resource absent or expired. HTTP 404.
    NotFound,
    /// Id collision, version regression, referential error. HTTP 409.
    Conflict,
    /// Token validation failed. HTTP 401.
    Unauthorized,
    /// Token valid but scope insufficient. HTTP 403.
    Forbidden,
    /// Network, DNS, or 5xx from a peer. Triggers candidate failover and
    /// backoff; never surfaced as a fatal, user-visible error.
    Transient,
    /// Unrecoverable state in a long-lived task. Causes controlled
    /// shutdown.
    Fatal,
}

impl ErrorCategory {
    /// The HTTP status an API handler should translate this category
    /// into. `Transient` and `Fatal` have no single HTTP mapping since
    /// they're meant to be handled before a response is ever written
    /// (failover / shutdown); callers that do need to surface one (e.g.
    /// a handler that ran out of failover candidates) should pick 503.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCategory::Validation => 400,
            ErrorCategory::Unauthorized => 401,
            ErrorCategory::Forbidden => 403,
            ErrorCategory::NotFound => 404,
            ErrorCategory::Conflict => 409,
            ErrorCategory::Transient | ErrorCategory::Fatal => 503,
        }
    }

    pub fn is_retryable_against_next_candidate(self) -> bool {
        matches!(self, ErrorCategory::Transient)
    }
}

/// The crate-wide error type. Every fallible operation in `nmos-core`,
/// and by convention every downstream crate, returns `Result<T, NmosError>`.
#[derive(Debug, Error)]
#[error("[{code}] {message}")]
pub struct NmosError {
    code: &'static str,
    message: String,
    category: ErrorCategory,
    #[source]
    cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl NmosError {
    pub fn new(code: &'static str, category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            category,
            cause: None,
        }
    }

    pub fn with_cause(
        mut self,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("core.validation", ErrorCategory::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("core.not_found", ErrorCategory::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("core.conflict", ErrorCategory::Conflict, message)
    }

    pub fn referential(message: impl Into<String>) -> Self {
        Self::new("core.referential_error", ErrorCategory::Conflict, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new("core.already_exists", ErrorCategory::Conflict, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("core.unauthorized", ErrorCategory::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("core.forbidden", ErrorCategory::Forbidden, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new("core.transient", ErrorCategory::Transient, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new("core.fatal", ErrorCategory::Fatal, message)
    }
}

pub type Result<T> = std::result::Result<T, NmosError>;
