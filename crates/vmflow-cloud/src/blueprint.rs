//! Web server deployment blueprint
//!
//! Static declaration of the resources needed to run one web workload on a
//! single VM, turned into a [`ProvisioningPlan`] by [`Blueprint::to_plan`].

use crate::error::{CloudError, PlanError, Result};
use crate::plan::ProvisioningPlan;
use crate::resource::{
    DEFAULT_ACCESS_CONFIG_NAME, Environment, ResourceKind, ResourceSpec, params,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ROLES: &[&str] = &[
    "roles/storage.objectViewer",
    "roles/logging.logWriter",
    "roles/pubsub.publisher",
];

/// Declaration of a single-VM web deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Blueprint {
    /// Prefix for every derived resource name
    pub prefix: String,

    pub service_account: Option<String>,

    /// Project-level roles granted to the service account
    pub roles: Vec<String>,

    pub firewall_rule: Option<String>,

    /// TCP port the workload listens on
    pub port: u16,

    pub target_tag: Option<String>,

    pub source_ranges: Vec<String>,

    pub network: String,

    pub address: Option<String>,

    pub instance: Option<String>,

    pub machine_type: String,

    pub image_family: String,

    pub image_project: String,

    pub scopes: String,

    /// Startup payload injected into the instance metadata
    pub startup_script: Option<String>,
}

impl Default for Blueprint {
    fn default() -> Self {
        Self {
            prefix: "web".to_string(),
            service_account: None,
            roles: DEFAULT_ROLES.iter().map(|r| r.to_string()).collect(),
            firewall_rule: None,
            port: 8080,
            target_tag: None,
            source_ranges: vec!["0.0.0.0/0".to_string()],
            network: "default".to_string(),
            address: None,
            instance: None,
            machine_type: "e2-micro".to_string(),
            image_family: "debian-12".to_string(),
            image_project: "debian-cloud".to_string(),
            scopes: "cloud-platform".to_string(),
            startup_script: None,
        }
    }
}

impl Blueprint {
    pub fn service_account_name(&self) -> String {
        self.service_account
            .clone()
            .unwrap_or_else(|| format!("{}-sa", self.prefix))
    }

    pub fn service_account_email(&self, env: &Environment) -> String {
        format!(
            "{}@{}.iam.gserviceaccount.com",
            self.service_account_name(),
            env.project_id
        )
    }

    pub fn firewall_rule_name(&self) -> String {
        self.firewall_rule
            .clone()
            .unwrap_or_else(|| format!("{}-allow-{}", self.prefix, self.port))
    }

    pub fn target_tag_name(&self) -> String {
        self.target_tag
            .clone()
            .unwrap_or_else(|| format!("{}-server", self.prefix))
    }

    pub fn address_name(&self) -> String {
        self.address
            .clone()
            .unwrap_or_else(|| format!("{}-ip", self.prefix))
    }

    pub fn instance_name(&self) -> String {
        self.instance
            .clone()
            .unwrap_or_else(|| format!("{}-vm", self.prefix))
    }

    pub fn access_config_id(&self) -> String {
        format!("{}-{}", self.instance_name(), DEFAULT_ACCESS_CONFIG_NAME)
    }

    /// Id of the IAM binding step for `role`
    pub fn binding_id(&self, role: &str) -> String {
        let short = role
            .trim_start_matches("roles/")
            .replace(['.', '_'], "-")
            .to_lowercase();
        format!("{}-{}", self.service_account_name(), short)
    }

    /// Check names and values before any call is made
    pub fn validate(&self) -> Result<()> {
        for name in [
            self.service_account_name(),
            self.firewall_rule_name(),
            self.address_name(),
            self.instance_name(),
            self.target_tag_name(),
        ] {
            if !is_valid_resource_name(&name) {
                return Err(CloudError::InvalidConfig(format!(
                    "'{}' is not a valid resource name (lowercase letters, digits and '-', starting with a letter)",
                    name
                )));
            }
        }

        let sa_len = self.service_account_name().len();
        if !(6..=30).contains(&sa_len) {
            return Err(CloudError::InvalidConfig(format!(
                "service account name must be 6-30 characters, got {}",
                sa_len
            )));
        }

        if self.port == 0 {
            return Err(CloudError::InvalidConfig("port must not be 0".to_string()));
        }

        if self.source_ranges.is_empty() {
            return Err(CloudError::InvalidConfig(
                "at least one firewall source range is required".to_string(),
            ));
        }

        Ok(())
    }

    /// Build the ordered plan for `env`
    pub fn to_plan(&self, env: &Environment) -> std::result::Result<ProvisioningPlan, PlanError> {
        let sa = self.service_account_name();
        let member = format!("serviceAccount:{}", self.service_account_email(env));
        let firewall = self.firewall_rule_name();
        let address = self.address_name();
        let instance = self.instance_name();
        let tag = self.target_tag_name();

        let mut specs = vec![
            ResourceSpec::new(&sa, ResourceKind::ServiceAccount)
                .with_param(params::DISPLAY_NAME, format!("{} service account", self.prefix)),
        ];

        for role in &self.roles {
            specs.push(
                ResourceSpec::new(self.binding_id(role), ResourceKind::IamBinding)
                    .with_param(params::MEMBER, &member)
                    .with_param(params::ROLE, role)
                    .depends_on(&sa),
            );
        }

        specs.push(
            ResourceSpec::new(&firewall, ResourceKind::FirewallRule)
                .with_param(params::PORT, self.port.to_string())
                .with_param(params::PROTOCOL, "tcp")
                .with_param(params::SOURCE_RANGES, self.source_ranges.join(","))
                .with_param(params::TARGET_TAG, &tag)
                .with_param(params::NETWORK, &self.network),
        );

        specs.push(ResourceSpec::new(&address, ResourceKind::StaticAddress));

        let mut vm = ResourceSpec::new(&instance, ResourceKind::Instance)
            .with_param(params::MACHINE_TYPE, &self.machine_type)
            .with_param(params::IMAGE_FAMILY, &self.image_family)
            .with_param(params::IMAGE_PROJECT, &self.image_project)
            .with_param(params::SERVICE_ACCOUNT, self.service_account_email(env))
            .with_param(params::SCOPES, &self.scopes)
            .with_param(params::TARGET_TAG, &tag)
            .with_param(params::NETWORK, &self.network)
            .depends_on(&sa)
            .depends_on(&firewall);
        if let Some(ref script) = self.startup_script {
            vm = vm.with_param(params::STARTUP_SCRIPT, script);
        }
        specs.push(vm);

        specs.push(
            ResourceSpec::new(self.access_config_id(), ResourceKind::AccessConfig)
                .with_param(params::INSTANCE, &instance)
                .with_param(params::ADDRESS, &address)
                .with_param(params::ACCESS_CONFIG_NAME, DEFAULT_ACCESS_CONFIG_NAME)
                .depends_on(&instance)
                .depends_on(&address),
        );

        ProvisioningPlan::new(specs)
    }
}

fn is_valid_resource_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.ends_with('-')
        && name.len() <= 63
}
