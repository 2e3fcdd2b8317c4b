//! vmflow cloud provisioning core
//!
//! This crate declares cloud resources, orders them into a dependency-respecting
//! plan and executes the plan idempotently against a control plane.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   vmflow CLI                     │
//! │                  (vmflow up)                     │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                 vmflow-cloud                     │
//! │  ┌──────────────┐  ┌──────────────────────────┐ │
//! │  │  Blueprint   │─▶│  ProvisioningPlan (topo) │ │
//! │  └──────────────┘  └────────────┬─────────────┘ │
//! │  ┌──────────────────────────────▼─────────────┐ │
//! │  │  Provisioner ─▶ ProvisioningReport         │ │
//! │  │  trait ControlPlane { ... }                │ │
//! │  └────────────────────────────────────────────┘ │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//!           ┌───────▼───────┐
//!           │  gcp (gcloud) │
//!           └───────────────┘
//! ```

pub mod blueprint;
pub mod error;
pub mod lock;
pub mod plan;
pub mod provider;
pub mod provisioner;
pub mod report;
pub mod resource;

// Re-exports
pub use blueprint::Blueprint;
pub use error::{CloudError, ErrorKind, PlanError, Result};
pub use lock::RunLock;
pub use plan::ProvisioningPlan;
pub use provider::{ControlPlane, RetryConfig};
pub use provisioner::{CancelHandle, Provisioner};
pub use report::{
    ExecutionResult, HaltReason, ProvisioningReport, ReportSummary, RunState, StepFailure,
    StepRecord,
};
pub use resource::{
    Attributes, DEFAULT_ACCESS_CONFIG_NAME, Environment, ResourceKind, ResourceSpec, attrs, params,
};
