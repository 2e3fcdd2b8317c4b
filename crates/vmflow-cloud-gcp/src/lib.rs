//! Google Cloud control plane for vmflow
//!
//! This crate implements the `ControlPlane` trait for Google Cloud by driving
//! the `gcloud` CLI, and renders the startup payload injected into the VM.
//!
//! # Features
//!
//! - Service accounts and project IAM bindings
//! - Firewall rules, static addresses, instances
//! - External access config rebinding
//! - gcloud stderr classification into `ErrorKind`
//!
//! # Requirements
//!
//! - `gcloud` CLI must be installed and authenticated
//!
//! # Example
//!
//! ```ignore
//! use vmflow_cloud::{Blueprint, Environment, Provisioner};
//! use vmflow_cloud_gcp::GcloudControlPlane;
//! use std::sync::Arc;
//!
//! let env = Environment::new("my-project", "us-central1-a", "us-central1");
//! let plan = Blueprint::default().to_plan(&env)?;
//! let control_plane = Arc::new(GcloudControlPlane::new(env.clone()));
//!
//! let report = Provisioner::new(control_plane, env).run(&plan).await;
//! println!("{:?}", report.address);
//! ```

pub mod error;
pub mod gcloud;
pub mod provider;
pub mod startup_scripts;

pub use error::{GcpError, Result, classify_stderr};
pub use gcloud::{AddressInfo, Gcloud, IamPolicy, InstanceInfo};
pub use provider::{GcloudControlPlane, attributes_from_json};
pub use startup_scripts::{DEFAULT_PACKAGES, WEB_SERVER_TEMPLATE, WorkloadConfig};
