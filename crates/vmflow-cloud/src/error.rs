//! Control-plane error types and their classification

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a control-plane failure
///
/// Every error surfaced by a [`ControlPlane`](crate::ControlPlane) maps to
/// exactly one kind. The kind drives the retry and halt policy of the
/// [`Provisioner`](crate::Provisioner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The resource is already present. Treated as success.
    AlreadyExists,
    PermissionDenied,
    QuotaExceeded,
    /// A resource the call depends on is missing
    NotFound,
    /// Network failure or timeout, eligible for retry
    Transient,
    /// Unrecoverable, e.g. malformed parameters
    Fatal,
    /// A static address was reserved but could not be attached to the instance
    PartialRebind,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        self == ErrorKind::Transient
    }

    /// Kind of a local I/O failure, e.g. while spawning a CLI
    pub fn from_io(error: &std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::Interrupted => ErrorKind::Transient,
            _ => ErrorKind::Fatal,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::AlreadyExists => "AlreadyExists",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::QuotaExceeded => "QuotaExceeded",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Transient => "Transient",
            ErrorKind::Fatal => "Fatal",
            ErrorKind::PartialRebind => "PartialRebind",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cloud control-plane errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Build an error of the given kind
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::AlreadyExists => CloudError::AlreadyExists(message),
            ErrorKind::PermissionDenied => CloudError::PermissionDenied(message),
            ErrorKind::QuotaExceeded => CloudError::QuotaExceeded(message),
            ErrorKind::NotFound => CloudError::NotFound(message),
            ErrorKind::Transient => CloudError::Transient(message),
            ErrorKind::Fatal | ErrorKind::PartialRebind => CloudError::CommandFailed(message),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CloudError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            CloudError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            CloudError::QuotaExceeded(_) => ErrorKind::QuotaExceeded,
            CloudError::NotFound(_) => ErrorKind::NotFound,
            CloudError::Transient(_) | CloudError::Timeout(_) => ErrorKind::Transient,
            CloudError::Io(e) => ErrorKind::from_io(e),
            CloudError::InvalidConfig(_)
            | CloudError::CommandFailed(_)
            | CloudError::LockError(_)
            | CloudError::Json(_) => ErrorKind::Fatal,
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

/// Errors raised while building a [`ProvisioningPlan`](crate::ProvisioningPlan)
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PlanError {
    #[error("Duplicate resource id: {0}")]
    DuplicateId(String),

    #[error("Resource {resource} depends on unknown resource {dependency}")]
    UnknownDependency { resource: String, dependency: String },

    #[error("Circular dependency detected. Remaining resources: {}", .0.join(", "))]
    Cycle(Vec<String>),
}
