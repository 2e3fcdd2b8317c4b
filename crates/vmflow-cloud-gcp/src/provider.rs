//! Google Cloud control plane implementation

use crate::error::{GcpError, Result};
use crate::gcloud::{Gcloud, InstanceInfo};
use async_trait::async_trait;
use vmflow_cloud::{
    Attributes, ControlPlane, Environment, ErrorKind, ResourceKind, ResourceSpec, attrs, params,
};

/// Google Cloud control plane backed by the gcloud CLI
pub struct GcloudControlPlane {
    gcloud: Gcloud,
    environment: Environment,
}

impl GcloudControlPlane {
    pub fn new(environment: Environment) -> Self {
        Self {
            gcloud: Gcloud::new(&environment),
            environment,
        }
    }

    /// Use a preconfigured gcloud wrapper (custom binary path)
    pub fn with_gcloud(environment: Environment, gcloud: Gcloud) -> Self {
        Self {
            gcloud,
            environment,
        }
    }

    pub fn gcloud(&self) -> &Gcloud {
        &self.gcloud
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Check that gcloud is available
    pub async fn check_installed(&self) -> Result<String> {
        self.gcloud.check_installed().await
    }

    /// Current external address of an instance
    pub async fn instance_address(&self, instance: &str) -> Result<Option<String>> {
        let info = self.gcloud.describe_instance(instance).await?;
        Ok(info.nat_ip())
    }

    async fn create_instance(&self, spec: &ResourceSpec) -> Result<()> {
        // Keep the payload file alive until gcloud has read it
        let script_file = match spec.param(params::STARTUP_SCRIPT) {
            Some(script) => {
                let file = tempfile::Builder::new()
                    .prefix("vmflow-startup-")
                    .suffix(".sh")
                    .tempfile()?;
                tokio::fs::write(file.path(), script).await?;
                Some(file)
            }
            None => None,
        };

        let args = self
            .gcloud
            .create_args(spec, script_file.as_ref().map(|f| f.path()))?;
        self.gcloud.run_command(&args).await?;
        Ok(())
    }

    async fn access_config_in_place(&self, spec: &ResourceSpec) -> Result<bool> {
        let instance = spec.require_param(params::INSTANCE)?;
        let address = spec.require_param(params::ADDRESS)?;

        let info: InstanceInfo = match not_found_as_none(self.gcloud.describe_instance(instance).await)? {
            Some(info) => info,
            None => return Ok(false),
        };
        let reserved = match not_found_as_none(self.gcloud.describe_address(address).await)? {
            Some(reserved) => reserved,
            None => return Ok(false),
        };

        Ok(match (info.nat_ip(), reserved.address) {
            (Some(current), Some(reserved)) => current == reserved,
            _ => false,
        })
    }
}

/// Map a `NotFound` failure to `None`
fn not_found_as_none<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Extract the attributes the provisioner relies on from a describe document
pub fn attributes_from_json(kind: ResourceKind, document: &serde_json::Value) -> Attributes {
    let mut attributes = Attributes::new();

    if let Some(status) = document.get("status") {
        attributes.insert(attrs::STATUS.to_string(), status.clone());
    }

    match kind {
        ResourceKind::ServiceAccount => {
            if let Some(email) = document.get("email") {
                attributes.insert(attrs::EMAIL.to_string(), email.clone());
            }
        }
        ResourceKind::StaticAddress => {
            if let Some(address) = document.get("address") {
                attributes.insert(attrs::ADDRESS.to_string(), address.clone());
            }
        }
        ResourceKind::Instance => {
            let nat_ip = serde_json::from_value::<InstanceInfo>(document.clone())
                .ok()
                .and_then(|info| info.nat_ip());
            if let Some(ip) = nat_ip {
                attributes.insert(attrs::NAT_IP.to_string(), serde_json::Value::String(ip));
            }
        }
        ResourceKind::FirewallRule | ResourceKind::IamBinding | ResourceKind::AccessConfig => {}
    }

    attributes
}

#[async_trait]
impl ControlPlane for GcloudControlPlane {
    fn name(&self) -> &str {
        "gcp"
    }

    async fn exists(&self, spec: &ResourceSpec) -> vmflow_cloud::Result<bool> {
        match spec.kind {
            ResourceKind::IamBinding => {
                let member = spec.require_param(params::MEMBER)?;
                let role = spec.require_param(params::ROLE)?;
                let resource = spec
                    .param(params::INSTANCE)
                    .unwrap_or(self.environment.project_id.as_str());
                let policy = self.gcloud.get_iam_policy(resource).await?;
                Ok(policy.has_binding(role, member))
            }
            ResourceKind::AccessConfig => Ok(self.access_config_in_place(spec).await?),
            kind => {
                let found = not_found_as_none(self.gcloud.describe(kind, &spec.id).await)?;
                Ok(found.is_some())
            }
        }
    }

    async fn create(&self, spec: &ResourceSpec) -> vmflow_cloud::Result<()> {
        tracing::debug!("Creating {} {}", spec.kind, spec.id);
        match spec.kind {
            ResourceKind::Instance => self.create_instance(spec).await?,
            _ => {
                let args = self.gcloud.create_args(spec, None)?;
                self.gcloud.run_command(&args).await?;
            }
        }
        Ok(())
    }

    async fn describe(&self, kind: ResourceKind, id: &str) -> vmflow_cloud::Result<Attributes> {
        let document = self.gcloud.describe(kind, id).await?;
        Ok(attributes_from_json(kind, &document))
    }

    async fn bind_iam(
        &self,
        resource: &str,
        principal: &str,
        role: &str,
    ) -> vmflow_cloud::Result<()> {
        let args = self.gcloud.bind_iam_args(resource, principal, role);
        self.gcloud.run_command(&args).await?;
        Ok(())
    }

    async fn delete_access_config(&self, instance: &str, name: &str) -> vmflow_cloud::Result<()> {
        // gcloud reports a missing access config as an invalid argument
        let info = self.gcloud.describe_instance(instance).await?;
        let attached = info
            .network_interfaces
            .iter()
            .flat_map(|n| n.access_configs.iter())
            .any(|a| a.name.as_deref() == Some(name));
        if !attached {
            return Err(GcpError::CommandFailed {
                kind: ErrorKind::NotFound,
                message: format!("access config '{}' was not found on {}", name, instance),
            }
            .into());
        }

        let args = self.gcloud.delete_access_config_args(instance, name);
        self.gcloud.run_command(&args).await?;
        Ok(())
    }

    async fn add_access_config(
        &self,
        instance: &str,
        name: &str,
        address: &str,
    ) -> vmflow_cloud::Result<()> {
        let args = self.gcloud.add_access_config_args(instance, name, address);
        self.gcloud.run_command(&args).await?;
        Ok(())
    }
}
