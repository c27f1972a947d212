//! Softphone errors surfaced to the agent UI

use crate::domain::shared::error::{DomainError, ServiceError};
use crate::domain::transport::TransportError;
use thiserror::Error;

pub type SoftphoneResult<T> = std::result::Result<T, SoftphoneError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SoftphoneError {
    /// Token issuance or registration failed; fatal for the session
    #[error("Session initialization failed: {0}")]
    SessionInit(String),

    /// Non-fatal; the active call is unaffected
    #[error("Token renewal failed: {0}")]
    TokenRenewal(String),

    /// Dial/connect rejected by the transport
    #[error("Call setup failed: {0}")]
    CallSetup(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Report submission failed: {0}")]
    ReportSubmission(String),

    #[error("Not allowed in the current state: {0}")]
    InvalidState(String),

    #[error("Softphone session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("Softphone session closed")]
    SessionClosed,

    #[error("Back-office request failed: {0}")]
    Service(#[from] ServiceError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for SoftphoneError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::ValidationError(msg) => SoftphoneError::Validation(msg),
            DomainError::InvalidStateTransition(msg) | DomainError::InvalidOperation(msg) => {
                SoftphoneError::InvalidState(msg)
            }
        }
    }
}

impl From<TransportError> for SoftphoneError {
    fn from(err: TransportError) -> Self {
        SoftphoneError::CallSetup(err.to_string())
    }
}
