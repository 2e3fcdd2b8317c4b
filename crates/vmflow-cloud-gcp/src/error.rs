//! Google Cloud control-plane error types

use thiserror::Error;
use vmflow_cloud::{CloudError, ErrorKind};

#[derive(Error, Debug)]
pub enum GcpError {
    #[error("gcloud not found. Please install the Google Cloud CLI: https://cloud.google.com/sdk/docs/install")]
    GcloudNotFound,

    #[error("gcloud command failed ({kind}): {message}")]
    CommandFailed { kind: ErrorKind, message: String },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Startup script rendering failed: {0}")]
    Template(#[from] tera::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cloud error: {0}")]
    CloudError(#[from] CloudError),
}

impl GcpError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GcpError::CommandFailed { kind, .. } => *kind,
            GcpError::CloudError(e) => e.kind(),
            GcpError::IoError(e) => ErrorKind::from_io(e),
            GcpError::GcloudNotFound
            | GcpError::Unsupported(_)
            | GcpError::Template(_)
            | GcpError::JsonError(_) => ErrorKind::Fatal,
        }
    }
}

impl From<GcpError> for CloudError {
    fn from(e: GcpError) -> Self {
        match e {
            GcpError::CloudError(inner) => inner,
            other => CloudError::from_kind(other.kind(), other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, GcpError>;

/// Markers searched in gcloud stderr, checked in order
const CLASSIFIERS: &[(ErrorKind, &[&str])] = &[
    (
        ErrorKind::AlreadyExists,
        &["already exists", "alreadyexists", "already_exists"],
    ),
    (
        ErrorKind::QuotaExceeded,
        &[
            "quota_exceeded",
            "quota exceeded",
            "exceeded quota",
            "quota '",
            "rate_limit_exceeded",
        ],
    ),
    (
        ErrorKind::PermissionDenied,
        &[
            "permission_denied",
            "permission denied",
            "does not have permission",
            "' permission for",
            "forbidden",
            "code=403",
            "(403)",
        ],
    ),
    (
        ErrorKind::NotFound,
        &[
            "not_found",
            "was not found",
            "not found",
            "does not exist",
            "code=404",
            "(404)",
        ],
    ),
    (
        ErrorKind::Transient,
        &[
            "unavailable",
            "deadline_exceeded",
            "deadline exceeded",
            "internal error",
            "backend error",
            "code=500",
            "code=502",
            "code=503",
            "(500)",
            "(502)",
            "(503)",
            "connection reset",
            "connection aborted",
            "timed out",
            "temporarily",
            "try again",
            "concurrent operation",
            "resource is not ready",
        ],
    ),
];

/// Map gcloud stderr output to an [`ErrorKind`]
///
/// Anything not recognised (including `INVALID_ARGUMENT`) is `Fatal`.
pub fn classify_stderr(stderr: &str) -> ErrorKind {
    let lowered = stderr.to_lowercase();
    if is_service_account_propagation(&lowered) {
        return ErrorKind::Transient;
    }
    CLASSIFIERS
        .iter()
        .find(|(_, markers)| markers.iter().any(|m| lowered.contains(m)))
        .map(|(kind, _)| *kind)
        .unwrap_or(ErrorKind::Fatal)
}

/// IAM rejects bindings for a service account created moments ago until it
/// has propagated, reporting it as missing
fn is_service_account_propagation(lowered: &str) -> bool {
    lowered.contains("service account") && lowered.contains("does not exist")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_already_exists() {
        let stderr = "ERROR: (gcloud.compute.addresses.create) Could not fetch resource:\n \
                      - The resource 'projects/demo/regions/us-central1/addresses/web-ip' already exists";
        assert_eq!(classify_stderr(stderr), ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_classify_permission_denied() {
        let stderr = "ERROR: (gcloud.compute.firewall-rules.create) Could not fetch resource:\n \
                      - Required 'compute.firewalls.create' permission for 'projects/demo/global/firewalls/web-allow-8080'";
        assert_eq!(classify_stderr(stderr), ErrorKind::PermissionDenied);

        let stderr = "ERROR: (gcloud.projects.add-iam-policy-binding) [me@example.com] does not have permission to access projects instance [demo]";
        assert_eq!(classify_stderr(stderr), ErrorKind::PermissionDenied);

        let stderr = "ERROR: (gcloud.iam.service-accounts.create) PERMISSION_DENIED: Permission 'iam.serviceAccounts.create' denied";
        assert_eq!(classify_stderr(stderr), ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_classify_quota() {
        let stderr = "ERROR: (gcloud.compute.addresses.create) Could not fetch resource:\n \
                      - Quota 'STATIC_ADDRESSES' exceeded.  Limit: 8.0 in region us-central1.";
        assert_eq!(classify_stderr(stderr), ErrorKind::QuotaExceeded);

        let stderr = "ERROR: QUOTA_EXCEEDED: Quota 'CPUS' exceeded";
        assert_eq!(classify_stderr(stderr), ErrorKind::QuotaExceeded);
    }

    #[test]
    fn test_classify_not_found() {
        let stderr = "ERROR: (gcloud.compute.instances.describe) Could not fetch resource:\n \
                      - The resource 'projects/demo/zones/us-central1-a/instances/web-vm' was not found";
        assert_eq!(classify_stderr(stderr), ErrorKind::NotFound);

        let stderr = "ERROR: (gcloud.iam.service-accounts.describe) NOT_FOUND: Unknown service account";
        assert_eq!(classify_stderr(stderr), ErrorKind::NotFound);
    }

    #[test]
    fn test_classify_transient() {
        assert_eq!(
            classify_stderr("ERROR: gcloud crashed (ConnectionResetError): Connection reset by peer"),
            ErrorKind::Transient
        );
        assert_eq!(
            classify_stderr("ERROR: (gcloud.projects.add-iam-policy-binding) ABORTED: There were concurrent policy changes. Please retry the whole read-modify-write with exponential backoff. concurrent operation"),
            ErrorKind::Transient
        );
        assert_eq!(
            classify_stderr("ERROR: UNAVAILABLE: The service is currently unavailable."),
            ErrorKind::Transient
        );
    }

    #[test]
    fn test_classify_unpropagated_service_account_is_transient() {
        let stderr = "ERROR: (gcloud.projects.add-iam-policy-binding) INVALID_ARGUMENT: \
                      Service account web-sa@demo.iam.gserviceaccount.com does not exist.";
        assert_eq!(classify_stderr(stderr), ErrorKind::Transient);
    }

    #[test]
    fn test_classify_does_not_exist_is_not_found() {
        let stderr = "ERROR: (gcloud.compute.instances.create) Could not fetch resource:\n \
                      - The resource 'projects/demo/global/networks/default' does not exist";
        assert_eq!(classify_stderr(stderr), ErrorKind::NotFound);
    }

    #[test]
    fn test_io_errors_classify_like_cloud_errors() {
        for kind in [
            std::io::ErrorKind::ConnectionAborted,
            std::io::ErrorKind::TimedOut,
            std::io::ErrorKind::PermissionDenied,
        ] {
            let gcp = GcpError::IoError(std::io::Error::from(kind));
            let cloud = CloudError::Io(std::io::Error::from(kind));
            assert_eq!(gcp.kind(), cloud.kind(), "{:?}", kind);
        }
        let aborted = GcpError::IoError(std::io::ErrorKind::ConnectionAborted.into());
        assert_eq!(aborted.kind(), ErrorKind::Transient);
    }

    #[test]
    fn test_classify_unknown_is_fatal() {
        assert_eq!(
            classify_stderr("ERROR: (gcloud.compute.instances.create) INVALID_ARGUMENT: Invalid value for field 'resource.machineType'"),
            ErrorKind::Fatal
        );
    }

    #[test]
    fn test_into_cloud_error_keeps_kind() {
        let err = GcpError::CommandFailed {
            kind: ErrorKind::QuotaExceeded,
            message: "quota".to_string(),
        };
        let cloud: CloudError = err.into();
        assert_eq!(cloud.kind(), ErrorKind::QuotaExceeded);

        let cloud: CloudError = GcpError::GcloudNotFound.into();
        assert_eq!(cloud.kind(), ErrorKind::Fatal);
    }
}
