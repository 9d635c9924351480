//! Shared error and result types

use hyper::StatusCode;
use std::time::Duration;

/// Result alias used throughout the gateway
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors surfaced by the gateway and its collaborators
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// Startup gate has not passed (or has failed)
    #[error("Service not ready: {0}")]
    NotReady(String),

    /// Preflight polling exhausted, or an outbound call missed its deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Record name absent from the backing store
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backing store rejected a duplicate record name
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Backing store returned a payload that does not match its schema
    #[error("Backing store returned malformed data: {0}")]
    BackingStoreCorruption(String),

    /// Graph mirror write failed; never returned to HTTP callers
    #[error("Mirror write failed: {0}")]
    MirrorWriteFailure(String),

    /// Missing or malformed request fields
    #[error("Validation error: {0}")]
    Validation(String),

    /// Collaborator reported an error or could not be reached
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status used when this error reaches a response
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::AlreadyExists(_) => StatusCode::CONFLICT,
            GatewayError::BackingStoreCorruption(_) | GatewayError::Backend(_) => {
                StatusCode::BAD_GATEWAY
            }
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::MirrorWriteFailure(_)
            | GatewayError::Config(_)
            | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand to a caller.
    ///
    /// Client errors echo their detail; server-side failures get a generic
    /// message and the detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            GatewayError::NotReady(_)
            | GatewayError::NotFound(_)
            | GatewayError::AlreadyExists(_)
            | GatewayError::Validation(_) => self.to_string(),
            GatewayError::Timeout(_) => "Upstream request timed out".to_string(),
            GatewayError::BackingStoreCorruption(_) => {
                "Backing store returned an unreadable response".to_string()
            }
            GatewayError::Backend(_) => "Backing service request failed".to_string(),
            GatewayError::MirrorWriteFailure(_)
            | GatewayError::Config(_)
            | GatewayError::Internal(_) => "Internal server error".to_string(),
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status().is_server_error()
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        GatewayError::Internal(e.to_string())
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout(e.to_string())
        } else if e.is_decode() {
            GatewayError::BackingStoreCorruption(e.to_string())
        } else {
            GatewayError::Backend(e.to_string())
        }
    }
}

/// Run an outbound call under a deadline, mapping expiry to `Timeout`
pub async fn with_deadline<T, F>(deadline: Duration, what: &str, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout(format!(
            "{} exceeded {}ms",
            what,
            deadline.as_millis()
        ))),
    }
}
