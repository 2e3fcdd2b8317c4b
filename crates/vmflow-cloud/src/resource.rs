//! Resource declarations

use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attributes returned by `describe` (IP, email, status, ...)
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Target environment of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub project_id: String,
    pub zone: String,
    pub region: String,
}

impl Environment {
    pub fn new(
        project_id: impl Into<String>,
        zone: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            zone: zone.into(),
            region: region.into(),
        }
    }

    /// Key used to serialize runs against the same environment
    pub fn key(&self) -> String {
        format!("{}:{}", self.project_id, self.zone)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, {})", self.project_id, self.zone, self.region)
    }
}

/// Kind of cloud resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    ServiceAccount,
    IamBinding,
    FirewallRule,
    StaticAddress,
    Instance,
    AccessConfig,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::ServiceAccount => write!(f, "service-account"),
            ResourceKind::IamBinding => write!(f, "iam-binding"),
            ResourceKind::FirewallRule => write!(f, "firewall-rule"),
            ResourceKind::StaticAddress => write!(f, "static-address"),
            ResourceKind::Instance => write!(f, "instance"),
            ResourceKind::AccessConfig => write!(f, "access-config"),
        }
    }
}

/// Parameter keys understood by the control planes
pub mod params {
    /// IAM role, e.g. `roles/logging.logWriter`
    pub const ROLE: &str = "role";
    /// IAM principal, e.g. `serviceAccount:sa@p.iam.gserviceaccount.com`
    pub const MEMBER: &str = "member";
    pub const DISPLAY_NAME: &str = "display_name";
    pub const PORT: &str = "port";
    pub const PROTOCOL: &str = "protocol";
    pub const SOURCE_RANGES: &str = "source_ranges";
    pub const TARGET_TAG: &str = "target_tag";
    pub const NETWORK: &str = "network";
    pub const MACHINE_TYPE: &str = "machine_type";
    pub const IMAGE_FAMILY: &str = "image_family";
    pub const IMAGE_PROJECT: &str = "image_project";
    pub const SERVICE_ACCOUNT: &str = "service_account";
    pub const SCOPES: &str = "scopes";
    pub const STARTUP_SCRIPT: &str = "startup_script";
    pub const INSTANCE: &str = "instance";
    pub const ADDRESS: &str = "address";
    pub const ACCESS_CONFIG_NAME: &str = "access_config_name";
}

/// Attribute keys returned by `describe`
pub mod attrs {
    /// Reserved external address of a static address
    pub const ADDRESS: &str = "address";
    /// External address currently attached to an instance
    pub const NAT_IP: &str = "nat_ip";
    pub const EMAIL: &str = "email";
    pub const STATUS: &str = "status";
}

/// Access config name used when a spec does not name one
pub const DEFAULT_ACCESS_CONFIG_NAME: &str = "external-nat";

/// Declaration of one cloud resource to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Stable identifier, also the resource name in the control plane
    pub id: String,

    pub kind: ResourceKind,

    /// Kind-specific parameters (see [`params`])
    #[serde(default)]
    pub params: BTreeMap<String, String>,

    /// Ids of the specs this one depends on
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl ResourceSpec {
    pub fn new(id: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            id: id.into(),
            kind,
            params: BTreeMap::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.depends_on.push(id.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Get a parameter the control plane cannot work without
    pub fn require_param(&self, key: &str) -> Result<&str> {
        self.param(key).ok_or_else(|| {
            CloudError::InvalidConfig(format!(
                "{} {} is missing parameter '{}'",
                self.kind, self.id, key
            ))
        })
    }
}
