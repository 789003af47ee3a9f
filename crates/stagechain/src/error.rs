//! Error types for protection and delivery.

use std::fmt;

use axum::http::StatusCode;
use stagechain_core::ChainError;
use stagechain_store::StoreError;
use thiserror::Error;

/// Errors that can occur while protecting a script.
#[derive(Debug, Error)]
pub enum ProtectError {
    /// The script was missing, empty or whitespace-only.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Chain generation failed.
    #[error("generation failure: {0}")]
    Generation(ChainError),

    /// The chain could not be persisted.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl ProtectError {
    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProtectError::Store(_))
    }
}

impl From<ChainError> for ProtectError {
    fn from(e: ChainError) -> Self {
        match e {
            ChainError::InvalidInput(msg) => ProtectError::InvalidInput(msg),
            other => ProtectError::Generation(other),
        }
    }
}

/// Result type for protection.
pub type Result<T> = std::result::Result<T, ProtectError>;

/// Errors that stop the server from starting or running.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The stage database could not be opened.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The chain configuration was rejected.
    #[error("configuration error: {0}")]
    Config(#[from] ProtectError),

    /// Binding or serving failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where in the delivery state machine a request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPhase {
    /// Nothing checked yet.
    Received,
    /// Client identity accepted; stage not yet looked up.
    ClientChecked,
    /// Stage found and live; access header not yet checked.
    AuthChecked,
    /// Access header accepted.
    Found,
    /// Content returned.
    Served,
}

impl fmt::Display for DeliveryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeliveryPhase::Received => "received",
            DeliveryPhase::ClientChecked => "client_checked",
            DeliveryPhase::AuthChecked => "auth_checked",
            DeliveryPhase::Found => "found",
            DeliveryPhase::Served => "served",
        };
        f.write_str(name)
    }
}

/// Why a stage request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// Client identity or access header mismatch.
    Forbidden,
    /// Unknown or expired stage.
    NotFound,
    /// The store failed.
    Internal,
}

/// A refused stage request.
///
/// The phase is for logs only; clients see nothing beyond the status and a
/// fixed body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{kind:?} at {phase}")]
pub struct Rejection {
    /// What went wrong.
    pub kind: RejectionKind,
    /// The state the request was in when refused.
    pub phase: DeliveryPhase,
}

impl Rejection {
    pub(crate) fn new(kind: RejectionKind, phase: DeliveryPhase) -> Self {
        Self { kind, phase }
    }

    /// HTTP status for this rejection.
    pub fn status(&self) -> StatusCode {
        match self.kind {
            RejectionKind::Forbidden => StatusCode::FORBIDDEN,
            RejectionKind::NotFound => StatusCode::NOT_FOUND,
            RejectionKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Generic response body. Never reveals which check failed.
    pub fn body(&self) -> &'static str {
        match self.kind {
            RejectionKind::Forbidden => "Forbidden",
            RejectionKind::NotFound => "Not Found",
            RejectionKind::Internal => "Internal Server Error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_is_separated() {
        let err: ProtectError = ChainError::InvalidInput("blank".into()).into();
        assert!(matches!(err, ProtectError::InvalidInput(_)));

        let err: ProtectError = ChainError::GenerationFailure("boom".into()).into();
        assert!(matches!(err, ProtectError::Generation(_)));
        assert!(!err.is_retryable());

        let err: ProtectError = StoreError::Unavailable("down".into()).into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_forbidden_body_is_generic() {
        let identity = Rejection::new(RejectionKind::Forbidden, DeliveryPhase::Received);
        let token = Rejection::new(RejectionKind::Forbidden, DeliveryPhase::AuthChecked);
        assert_eq!(identity.status(), token.status());
        assert_eq!(identity.body(), token.body());
    }
}
