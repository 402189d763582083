//! Gateway and backend traits and their request/response types.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::contract::{Contract, ParsedValues};
use crate::error::ErrorKind;
use crate::usage::Usage;

use super::credentials::Credential;

/// One structured-output request for one unit of work.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    /// Identifier resolved to a backend and credential.
    pub integration_name: String,
    /// Provider model id, passed through verbatim.
    pub model: String,
    /// Sampling temperature in `[0, 1]`.
    pub temperature: f64,
    /// Fully resolved user prompt.
    pub prompt: String,
    /// Fields the response must contain; also rendered as the JSON Schema.
    pub contract: Contract,
}

/// A successful, contract-validated provider result.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    /// One parsed value per contract field, in contract order.
    pub values: ParsedValues,
    /// Token counts, when the backend reports them.
    pub usage: Option<Usage>,
}

/// Failure of a single provider call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("network error: {0}")]
    Network(String),
}

impl GatewayError {
    /// Whether another attempt can succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Timeout(_))
    }

    /// Error kind recorded on the row.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) => ErrorKind::Auth,
            Self::RateLimited(_) => ErrorKind::RateLimited,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Malformed(_) => ErrorKind::Malformed,
            Self::Network(_) => ErrorKind::Network,
        }
    }

    /// Classify a failed HTTP exchange.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = format!("{} {}", status, truncate(body, 300));
        match status.as_u16() {
            401 | 403 => Self::Auth(message),
            429 => Self::RateLimited(message),
            408 | 504 => Self::Timeout(message),
            _ => Self::Network(message),
        }
    }

    /// Classify a transport error.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Performs a single contract-constrained provider call.
///
/// Implementations must be thread-safe (Send + Sync) so one gateway can
/// serve every concurrent unit of a run.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn call(&self, request: &GatewayRequest) -> Result<GatewayResponse, GatewayError>;
}

/// Request as seen by a concrete backend adapter.
#[derive(Debug)]
pub struct BackendRequest<'a> {
    pub model: &'a str,
    pub temperature: f64,
    /// Instructions plus the embedded schema.
    pub system_prompt: String,
    /// The resolved row prompt.
    pub user_prompt: &'a str,
    /// JSON Schema rendering of the contract.
    pub schema: Value,
    pub contract: &'a Contract,
}

/// Raw completion returned by a backend, before contract validation.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Response text expected to hold a JSON object.
    pub content: String,
    pub usage: Option<Usage>,
}

/// Wire adapter for one kind of AI backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Name of this backend (for logging/debugging).
    fn name(&self) -> &str;

    async fn complete(
        &self,
        credential: &Credential,
        request: &BackendRequest<'_>,
    ) -> Result<Completion, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            GatewayError::from_status(StatusCode::UNAUTHORIZED, ""),
            GatewayError::Auth(_)
        ));
        assert!(matches!(
            GatewayError::from_status(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            GatewayError::RateLimited(_)
        ));
        assert!(matches!(
            GatewayError::from_status(StatusCode::GATEWAY_TIMEOUT, ""),
            GatewayError::Timeout(_)
        ));
        assert!(matches!(
            GatewayError::from_status(StatusCode::INTERNAL_SERVER_ERROR, ""),
            GatewayError::Network(_)
        ));
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(GatewayError::RateLimited(String::new()).is_retryable());
        assert!(GatewayError::Timeout(String::new()).is_retryable());
        assert!(!GatewayError::Auth(String::new()).is_retryable());
        assert!(!GatewayError::Malformed(String::new()).is_retryable());
        assert!(!GatewayError::Network(String::new()).is_retryable());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
