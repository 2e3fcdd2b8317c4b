//! Control-plane trait definition

use crate::error::Result;
use crate::resource::{Attributes, ResourceKind, ResourceSpec};
use async_trait::async_trait;
use std::time::Duration;

/// Cloud control-plane abstraction
///
/// The provisioner treats every call as an opaque request/response. Failures
/// are reported as [`CloudError`](crate::CloudError)s whose
/// [`kind`](crate::CloudError::kind) decides whether the call is retried.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Returns the control-plane name (e.g., "gcp")
    fn name(&self) -> &str;

    /// Whether the resource described by `spec` is already present
    async fn exists(&self, spec: &ResourceSpec) -> Result<bool>;

    /// Create the resource described by `spec`
    async fn create(&self, spec: &ResourceSpec) -> Result<()>;

    /// Read the attributes of an existing resource
    async fn describe(&self, kind: ResourceKind, id: &str) -> Result<Attributes>;

    /// Grant `role` on `resource` to `principal`
    async fn bind_iam(&self, resource: &str, principal: &str, role: &str) -> Result<()>;

    /// Remove the access config `name` from `instance`
    async fn delete_access_config(&self, instance: &str, name: &str) -> Result<()>;

    /// Attach `address` to `instance` under the access config `name`
    async fn add_access_config(&self, instance: &str, name: &str, address: &str) -> Result<()>;
}

/// Retry configuration for control-plane calls
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,

    /// Timeout applied to every single call
    pub call_timeout: Duration,
}

impl RetryConfig {
    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }

    /// No waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            call_timeout: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_for(1), Duration::from_secs(1));
        assert_eq!(retry.delay_for(2), Duration::from_secs(2));
        assert_eq!(retry.delay_for(3), Duration::from_secs(4));
    }

    #[test]
    fn test_backoff_is_capped() {
        let retry = RetryConfig {
            max_delay: Duration::from_secs(5),
            ..RetryConfig::default()
        };
        assert_eq!(retry.delay_for(10), Duration::from_secs(5));
    }
}
