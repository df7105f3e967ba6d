//! The crate-wide error taxonomy (§7). One enum covers every error class;
//! each variant knows how to render itself into the wire-shape
//! [`TypedError`] the serializer emits.
//!
//! Grounded on this codebase's split between an internal, cloneable error
//! enum and the handful of wire-facing conversions hung off it, rather than
//! a boxed `dyn Error` trait object.

use std::collections::BTreeMap;

use gateway_json::{Path, Value};
use thiserror::Error;

/// One error in the response's `errors` array (§3, §7).
#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct TypedError {
    pub message: String,
    #[serde(skip_serializing_if = "Path::is_empty")]
    pub path: Path,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<ErrorLocation>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, Value>,
}

#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct ErrorLocation {
    pub line: u32,
    pub column: u32,
}

impl TypedError {
    pub fn new(message: impl Into<String>) -> Self {
        TypedError { message: message.into(), ..Default::default() }
    }

    pub fn with_path(mut self, path: Path) -> Self {
        self.path = path;
        self
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extensions.insert(key.into(), value.into());
        self
    }
}

/// Create an internal (class-1/"should never happen") error, mirroring the
/// `internal_error!`/`bail!` helpers this codebase's federation error module
/// exposes for planner-stage failures.
#[macro_export]
macro_rules! planner_error {
    ( $( $arg:tt )+ ) => {
        $crate::error::GatewayError::Planner(format!( $( $arg )+ ))
    };
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// unresolvable field location, missing boundary lookup, or non-boundary
    /// cross-service selection (§4.3, class 1: fatal, request-level, no data)
    #[error("query planning failed: {0}")]
    Planner(String),

    /// a step's request failed at the transport layer (class 2: attached to
    /// the step's path, other steps proceed)
    #[error("request to subgraph `{service}` failed: {source}")]
    Transport {
        service: String,
        #[source]
        source: ClientError,
    },

    /// a typed error returned by a backend (class 3)
    #[error("subgraph `{service}` returned an error: {message}")]
    Subgraph { service: String, message: String },

    /// the per-operation request budget was exhausted (class 4)
    #[error("request budget of {max} outbound requests exceeded")]
    BudgetExceeded { max: u32 },

    /// a non-nullability violation bubbled past a field (class 5)
    #[error("non-nullable field at `{path}` resolved to null")]
    NullBubbled { path: Path },

    /// a step task panicked (class 7)
    #[error("internal error evaluating step: {0}")]
    Panicked(String),

    /// the request was cancelled or its deadline elapsed (class 8)
    #[error("request cancelled")]
    Cancelled,

    #[error("malformed response data: {0}")]
    Value(#[from] gateway_json::ValueError),
}

impl GatewayError {
    /// Whether this error aborts the whole request (no partial data), or is
    /// merely attached to one step/field while the rest of the plan
    /// proceeds. Planner, budget, and cancellation errors are request-level
    /// (§7 classes 1, 4, 8).
    pub fn is_request_level(&self) -> bool {
        matches!(self, GatewayError::Planner(_) | GatewayError::BudgetExceeded { .. } | GatewayError::Cancelled)
    }

    pub fn into_typed_error(self, path_prefix: &Path) -> TypedError {
        match self {
            GatewayError::Planner(message) => TypedError::new(message),
            GatewayError::Transport { service, source } => {
                TypedError::new(source.to_string()).with_path(path_prefix.clone()).with_extension("serviceName", service)
            }
            GatewayError::Subgraph { service, message } => {
                TypedError::new(message).with_path(path_prefix.clone()).with_extension("serviceName", service)
            }
            GatewayError::BudgetExceeded { max } => TypedError::new(format!("request budget of {max} outbound requests exceeded")),
            GatewayError::NullBubbled { path } => {
                TypedError::new(format!("Cannot return null for non-nullable field at `{path}`")).with_path(path)
            }
            GatewayError::Panicked(message) => TypedError::new(message).with_path(path_prefix.clone()),
            GatewayError::Cancelled => TypedError::new("the request was cancelled"),
            GatewayError::Value(e) => TypedError::new(e.to_string()).with_path(path_prefix.clone()),
        }
    }
}

/// Errors surfaced by the service client (§4.2), kept distinct from
/// [`GatewayError`] so callers can classify transport vs. protocol failures
/// before wrapping them with step metadata.
#[derive(Debug, Error, Clone)]
pub enum ClientError {
    #[error("response exceeded the configured size limit of {limit} bytes")]
    SizeExceeded { limit: u64 },
    #[error("unexpected response status {status}")]
    UnexpectedStatus { status: u16 },
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response body: {0}")]
    Decode(String),
}
