//! gcloud CLI wrapper
//!
//! Wraps the `gcloud` commands needed to provision a single web VM.
//! Argument construction is kept separate from execution so it can be
//! checked without a Google Cloud account.

use crate::error::{GcpError, Result, classify_stderr};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use vmflow_cloud::{CloudError, DEFAULT_ACCESS_CONFIG_NAME, Environment, ResourceKind, ResourceSpec, params};

/// gcloud CLI wrapper bound to one project/zone/region
#[derive(Debug, Clone)]
pub struct Gcloud {
    binary: String,
    project: String,
    zone: String,
    region: String,
    check_timeout: Duration,
}

/// Upper bound for `gcloud --version`
const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

impl Gcloud {
    pub fn new(env: &Environment) -> Self {
        Self {
            binary: "gcloud".to_string(),
            project: env.project_id.clone(),
            zone: env.zone.clone(),
            region: env.region.clone(),
            check_timeout: DEFAULT_CHECK_TIMEOUT,
        }
    }

    /// Use another executable instead of `gcloud` from `PATH`
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Check that gcloud is installed, returning its version banner
    pub async fn check_installed(&self) -> Result<String> {
        let run = Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.check_timeout, run)
            .await
            .map_err(|_| {
                CloudError::Timeout(format!(
                    "{} --version did not finish within {:?}",
                    self.binary, self.check_timeout
                ))
            })?
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => GcpError::GcloudNotFound,
                _ => GcpError::IoError(e),
            })?;

        if !output.status.success() {
            return Err(GcpError::GcloudNotFound);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or_default().trim().to_string())
    }

    /// Full argument list for a command, with the global flags appended
    pub fn command_line(&self, args: &[String]) -> Vec<String> {
        let mut full = args.to_vec();
        full.push("--project".to_string());
        full.push(self.project.clone());
        full.push("--format=json".to_string());
        full.push("--quiet".to_string());
        full
    }

    /// Run a gcloud command and return stdout
    ///
    /// The child is killed if the returned future is dropped, so an outer
    /// timeout does not leave gcloud running.
    pub async fn run_command(&self, args: &[String]) -> Result<String> {
        let full = self.command_line(args);

        let mut cmd = Command::new(&self.binary);
        cmd.args(&full);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        tracing::debug!("Running: {} {}", self.binary, full.join(" "));

        let output = cmd.output().await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => GcpError::GcloudNotFound,
            _ => GcpError::IoError(e),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let kind = classify_stderr(&stderr);
            tracing::debug!("gcloud failed ({}): {}", kind, stderr);
            return Err(GcpError::CommandFailed {
                kind,
                message: stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run a command and parse its JSON output
    pub async fn run_json<T: serde::de::DeserializeOwned>(&self, args: &[String]) -> Result<T> {
        let output = self.run_command(args).await?;
        let trimmed = output.trim();
        let value = serde_json::from_str(if trimmed.is_empty() { "null" } else { trimmed })?;
        Ok(value)
    }

    /// Email of a service account created by `iam service-accounts create NAME`
    pub fn service_account_email(&self, name: &str) -> String {
        if name.contains('@') {
            name.to_string()
        } else {
            format!("{}@{}.iam.gserviceaccount.com", name, self.project)
        }
    }

    /// Arguments for describing an existing resource
    pub fn describe_args(&self, kind: ResourceKind, name: &str) -> Result<Vec<String>> {
        let args = match kind {
            ResourceKind::ServiceAccount => vec![
                "iam".to_string(),
                "service-accounts".to_string(),
                "describe".to_string(),
                self.service_account_email(name),
            ],
            ResourceKind::FirewallRule => vec![
                "compute".to_string(),
                "firewall-rules".to_string(),
                "describe".to_string(),
                name.to_string(),
            ],
            ResourceKind::StaticAddress => vec![
                "compute".to_string(),
                "addresses".to_string(),
                "describe".to_string(),
                name.to_string(),
                "--region".to_string(),
                self.region.clone(),
            ],
            ResourceKind::Instance => vec![
                "compute".to_string(),
                "instances".to_string(),
                "describe".to_string(),
                name.to_string(),
                "--zone".to_string(),
                self.zone.clone(),
            ],
            ResourceKind::IamBinding | ResourceKind::AccessConfig => {
                return Err(GcpError::Unsupported(format!(
                    "{} has no describe command",
                    kind
                )));
            }
        };
        Ok(args)
    }

    /// Arguments for creating the resource declared by `spec`
    ///
    /// `startup_script` is the path of a file holding the instance startup
    /// payload; gcloud reads it through `--metadata-from-file`.
    pub fn create_args(
        &self,
        spec: &ResourceSpec,
        startup_script: Option<&Path>,
    ) -> Result<Vec<String>> {
        let mut args: Vec<String> = Vec::new();
        match spec.kind {
            ResourceKind::ServiceAccount => {
                args.extend(["iam", "service-accounts", "create"].map(String::from));
                args.push(spec.id.clone());
                if let Some(display_name) = spec.param(params::DISPLAY_NAME) {
                    args.push("--display-name".to_string());
                    args.push(display_name.to_string());
                }
            }
            ResourceKind::FirewallRule => {
                let port = spec.require_param(params::PORT)?;
                let protocol = spec.param(params::PROTOCOL).unwrap_or("tcp");
                args.extend(["compute", "firewall-rules", "create"].map(String::from));
                args.push(spec.id.clone());
                args.push("--network".to_string());
                args.push(spec.param(params::NETWORK).unwrap_or("default").to_string());
                args.push("--direction".to_string());
                args.push("INGRESS".to_string());
                args.push("--allow".to_string());
                args.push(format!("{}:{}", protocol, port));
                if let Some(ranges) = spec.param(params::SOURCE_RANGES) {
                    args.push("--source-ranges".to_string());
                    args.push(ranges.to_string());
                }
                if let Some(tag) = spec.param(params::TARGET_TAG) {
                    args.push("--target-tags".to_string());
                    args.push(tag.to_string());
                }
            }
            ResourceKind::StaticAddress => {
                args.extend(["compute", "addresses", "create"].map(String::from));
                args.push(spec.id.clone());
                args.push("--region".to_string());
                args.push(self.region.clone());
            }
            ResourceKind::Instance => {
                args.extend(["compute", "instances", "create"].map(String::from));
                args.push(spec.id.clone());
                args.push("--zone".to_string());
                args.push(self.zone.clone());

                let flags = [
                    ("--machine-type", params::MACHINE_TYPE),
                    ("--image-family", params::IMAGE_FAMILY),
                    ("--image-project", params::IMAGE_PROJECT),
                    ("--service-account", params::SERVICE_ACCOUNT),
                    ("--scopes", params::SCOPES),
                    ("--tags", params::TARGET_TAG),
                    ("--network", params::NETWORK),
                ];
                for (flag, key) in flags {
                    if let Some(value) = spec.param(key) {
                        args.push(flag.to_string());
                        args.push(value.to_string());
                    }
                }

                if let Some(path) = startup_script {
                    args.push("--metadata-from-file".to_string());
                    args.push(format!("startup-script={}", path.display()));
                }
            }
            ResourceKind::IamBinding => {
                let member = spec.require_param(params::MEMBER)?;
                let role = spec.require_param(params::ROLE)?;
                let resource = spec.param(params::INSTANCE).unwrap_or(&self.project);
                args = self.bind_iam_args(resource, member, role);
            }
            ResourceKind::AccessConfig => {
                return Err(GcpError::Unsupported(
                    "access configs are rebound, not created".to_string(),
                ));
            }
        }
        Ok(args)
    }

    pub fn bind_iam_args(&self, resource: &str, member: &str, role: &str) -> Vec<String> {
        vec![
            "projects".to_string(),
            "add-iam-policy-binding".to_string(),
            resource.to_string(),
            "--member".to_string(),
            member.to_string(),
            "--role".to_string(),
            role.to_string(),
            "--condition=None".to_string(),
        ]
    }

    pub fn iam_policy_args(&self, resource: &str) -> Vec<String> {
        vec![
            "projects".to_string(),
            "get-iam-policy".to_string(),
            resource.to_string(),
        ]
    }

    pub fn delete_access_config_args(&self, instance: &str, name: &str) -> Vec<String> {
        vec![
            "compute".to_string(),
            "instances".to_string(),
            "delete-access-config".to_string(),
            instance.to_string(),
            "--zone".to_string(),
            self.zone.clone(),
            "--access-config-name".to_string(),
            name.to_string(),
        ]
    }

    pub fn add_access_config_args(&self, instance: &str, name: &str, address: &str) -> Vec<String> {
        vec![
            "compute".to_string(),
            "instances".to_string(),
            "add-access-config".to_string(),
            instance.to_string(),
            "--zone".to_string(),
            self.zone.clone(),
            "--access-config-name".to_string(),
            name.to_string(),
            "--address".to_string(),
            address.to_string(),
        ]
    }

    /// Describe a resource and return the raw JSON document
    pub async fn describe(&self, kind: ResourceKind, name: &str) -> Result<serde_json::Value> {
        let args = self.describe_args(kind, name)?;
        self.run_json(&args).await
    }

    pub async fn describe_instance(&self, name: &str) -> Result<InstanceInfo> {
        let args = self.describe_args(ResourceKind::Instance, name)?;
        self.run_json(&args).await
    }

    pub async fn describe_address(&self, name: &str) -> Result<AddressInfo> {
        let args = self.describe_args(ResourceKind::StaticAddress, name)?;
        self.run_json(&args).await
    }

    pub async fn get_iam_policy(&self, resource: &str) -> Result<IamPolicy> {
        self.run_json(&self.iam_policy_args(resource)).await
    }
}

/// Instance information from `compute instances describe`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceInfo {
    pub name: String,

    pub status: Option<String>,

    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterface>,
}

impl InstanceInfo {
    /// External address of the first access config that has one
    pub fn nat_ip(&self) -> Option<String> {
        self.network_interfaces
            .iter()
            .flat_map(|n| n.access_configs.iter())
            .find_map(|a| a.nat_ip.clone())
    }

    /// Name of the attached access config, if any
    pub fn access_config_name(&self) -> Option<String> {
        self.network_interfaces
            .iter()
            .flat_map(|n| n.access_configs.iter())
            .next()
            .map(|a| {
                a.name
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ACCESS_CONFIG_NAME.to_string())
            })
    }

    pub fn is_running(&self) -> bool {
        self.status.as_deref() == Some("RUNNING")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkInterface {
    #[serde(rename = "networkIP")]
    pub network_ip: Option<String>,

    #[serde(rename = "accessConfigs", default)]
    pub access_configs: Vec<AccessConfigInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessConfigInfo {
    pub name: Option<String>,

    #[serde(rename = "natIP")]
    pub nat_ip: Option<String>,

    #[serde(rename = "type")]
    pub config_type: Option<String>,
}

/// Static address information from `compute addresses describe`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddressInfo {
    pub name: String,

    pub address: Option<String>,

    /// `RESERVED` or `IN_USE`
    pub status: Option<String>,
}

/// Project IAM policy from `projects get-iam-policy`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IamPolicy {
    #[serde(default)]
    pub bindings: Vec<PolicyBinding>,

    pub etag: Option<String>,
}

impl IamPolicy {
    pub fn has_binding(&self, role: &str, member: &str) -> bool {
        self.bindings
            .iter()
            .any(|b| b.role == role && b.members.iter().any(|m| m == member))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyBinding {
    pub role: String,

    #[serde(default)]
    pub members: Vec<String>,
}
