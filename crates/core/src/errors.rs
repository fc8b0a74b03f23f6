use thiserror::Error;

use crate::domain::purchase_request::PrStatus;
use crate::domain::organization::{OrganizationId, RuleNumber};
use crate::ports::StoreError;
use crate::workflow::WorkflowAction;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("permission denied: {0}")]
    Permission(String),
    #[error("invalid transition: cannot {action} a purchase request in status {from}")]
    InvalidTransition { from: PrStatus, action: WorkflowAction },
    #[error("approval rules for organization `{organization_id}` are not initialized (missing {missing:?})")]
    RulesNotInitialized { organization_id: OrganizationId, missing: Vec<RuleNumber> },
    #[error("approval rule {rule:?} for organization `{organization_id}` is out of range: {reason}")]
    RuleOutOfRange { organization_id: OrganizationId, rule: RuleNumber, reason: String },
    #[error("amount currency `{currency}` does not match rule currency `{rule_currency}`")]
    CurrencyMismatch { currency: String, rule_currency: String },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{kind} `{id}` was not found")]
    NotFound { kind: &'static str, id: String },
    #[error("concurrent modification: {0}")]
    Conflict(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    /// A stored document that can never be decoded. Retrying will not help.
    #[error("unreadable stored document: {0}")]
    Corrupted(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

/// Error taxonomy shared by the interactive surface and the sweep reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Permission,
    NotFound,
    InvalidTransition,
    Conflict,
    Config,
    TransientIo,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Permission => "permission",
            Self::NotFound => "not_found",
            Self::InvalidTransition => "invalid_transition",
            Self::Conflict => "conflict",
            Self::Config => "config",
            Self::TransientIo => "transient_io",
            Self::Internal => "internal",
        }
    }
}

impl ApplicationError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Domain(DomainError::Validation(_))
            | Self::Domain(DomainError::CurrencyMismatch { .. }) => ErrorKind::Validation,
            Self::Domain(DomainError::Permission(_)) => ErrorKind::Permission,
            Self::Domain(DomainError::InvalidTransition { .. }) => ErrorKind::InvalidTransition,
            Self::Domain(DomainError::RulesNotInitialized { .. })
            | Self::Domain(DomainError::RuleOutOfRange { .. }) => ErrorKind::Config,
            Self::Domain(DomainError::InvariantViolation(_)) => ErrorKind::Internal,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Persistence(_) | Self::Integration(_) => ErrorKind::TransientIo,
            Self::Corrupted(_) => ErrorKind::Internal,
            Self::Configuration(_) => ErrorKind::Config,
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::StaleWrite { .. } | StoreError::Duplicate { .. } => {
                Self::Conflict(value.to_string())
            }
            StoreError::Unavailable(_) => Self::Persistence(value.to_string()),
            StoreError::Malformed { .. } => Self::Corrupted(value.to_string()),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "You do not have permission to perform this action.",
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::Conflict { .. } => {
                "The record changed while you were working on it. Reload and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    /// HTTP status for the interactive surface.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::Forbidden { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 409,
            Self::ServiceUnavailable { .. } => 503,
            Self::Internal { .. } => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "bad_request",
            Self::Forbidden { .. } => "forbidden",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Internal { .. } => "internal",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::Forbidden { message, .. }
            | Self::NotFound { message, .. }
            | Self::Conflict { message, .. }
            | Self::ServiceUnavailable { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let message = value.to_string();
        let correlation_id = "unassigned".to_owned();
        match value.kind() {
            ErrorKind::Validation => Self::BadRequest { message, correlation_id },
            ErrorKind::Permission => Self::Forbidden { message, correlation_id },
            ErrorKind::NotFound => Self::NotFound { message, correlation_id },
            ErrorKind::InvalidTransition | ErrorKind::Conflict => {
                Self::Conflict { message, correlation_id }
            }
            ErrorKind::TransientIo => Self::ServiceUnavailable { message, correlation_id },
            ErrorKind::Config | ErrorKind::Internal => Self::Internal { message, correlation_id },
        }
    }
}
