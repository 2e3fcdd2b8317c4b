//! Startup payload for the web VM
//!
//! The payload is rendered with Tera from a built-in template and injected
//! into the instance metadata as `startup-script`. It runs as root on every
//! boot, so each step is safe to repeat.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tera::{Context, Tera};
use vmflow_cloud::Environment;

/// Python packages installed when the config lists none
pub const DEFAULT_PACKAGES: &[&str] = &[
    "fastapi",
    "uvicorn",
    "google-cloud-storage",
    "google-cloud-logging",
    "google-cloud-pubsub",
];

/// Built-in web server startup template
pub const WEB_SERVER_TEMPLATE: &str = r#"#!/bin/bash
# vmflow: web server startup

set -euo pipefail

APP_DIR={{ app_dir }}

echo "=== vmflow: startup ==="

if ! command -v python3 &> /dev/null || ! python3 -m venv --help &> /dev/null; then
    echo ">>> Installing Python..."
    apt-get update -y
    apt-get install -y python3 python3-venv python3-pip git
fi
{% if source_repo %}
if [ ! -d "$APP_DIR/.git" ]; then
    echo ">>> Fetching workload source..."
    rm -rf "$APP_DIR"
    git clone --depth 1 --branch {{ source_ref }} {{ source_repo }} "$APP_DIR"
else
    git -C "$APP_DIR" pull --ff-only || true
fi
{% else %}
mkdir -p "$APP_DIR"
{% endif %}
if [ ! -d "$APP_DIR/.venv" ]; then
    python3 -m venv "$APP_DIR/.venv"
fi
"$APP_DIR/.venv/bin/pip" install --quiet --upgrade {{ packages }}

export PROJECT_ID={{ project_id }}
export PORT={{ port }}
{%- if bucket_name %}
export BUCKET_NAME={{ bucket_name }}
{%- endif %}
{%- if topic_id %}
export TOPIC_ID={{ topic_id }}
{%- endif %}
{%- for name, value in extra_env %}
export {{ name }}={{ value }}
{%- endfor %}

cd "$APP_DIR"{% if source_subdir %}/{{ source_subdir }}{% endif %}

pkill -f "uvicorn {{ entrypoint }}" || true
nohup "$APP_DIR/.venv/bin/uvicorn" {{ entrypoint }} --host 0.0.0.0 --port "$PORT" \
    >> /var/log/vmflow-web.log 2>&1 &

echo "✅ vmflow: web server listening on port $PORT"
"#;

/// Workload settings baked into the startup payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Git repository holding the application
    pub source_repo: Option<String>,

    /// Branch or tag to check out
    pub source_ref: String,

    /// Directory inside the repository to run from
    pub source_subdir: Option<String>,

    /// ASGI entrypoint passed to uvicorn
    pub entrypoint: String,

    pub bucket_name: Option<String>,

    pub topic_id: Option<String>,

    pub packages: Vec<String>,

    pub app_dir: String,

    /// Additional environment variables exported before launch
    pub env: BTreeMap<String, String>,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            source_repo: None,
            source_ref: "main".to_string(),
            source_subdir: None,
            entrypoint: "main:app".to_string(),
            bucket_name: None,
            topic_id: None,
            packages: DEFAULT_PACKAGES.iter().map(|p| p.to_string()).collect(),
            app_dir: "/opt/vmflow/app".to_string(),
            env: BTreeMap::new(),
        }
    }
}

impl WorkloadConfig {
    /// Render the built-in template for `env`, listening on `port`
    pub fn render(&self, env: &Environment, port: u16) -> Result<String> {
        self.render_template(WEB_SERVER_TEMPLATE, env, port)
    }

    /// Render a custom template with the same variables as the built-in one
    pub fn render_template(&self, template: &str, env: &Environment, port: u16) -> Result<String> {
        let mut context = Context::new();
        context.insert("project_id", &shell_quote(&env.project_id));
        context.insert("zone", &shell_quote(&env.zone));
        context.insert("region", &shell_quote(&env.region));
        context.insert("port", &port);
        context.insert("app_dir", &shell_quote(&self.app_dir));
        context.insert("source_repo", &self.source_repo.as_deref().map(shell_quote));
        context.insert("source_ref", &shell_quote(&self.source_ref));
        context.insert("source_subdir", &self.source_subdir.as_deref().map(shell_quote));
        context.insert("entrypoint", &shell_quote(&self.entrypoint));
        context.insert("bucket_name", &self.bucket_name.as_deref().map(shell_quote));
        context.insert("topic_id", &self.topic_id.as_deref().map(shell_quote));
        context.insert(
            "packages",
            &self
                .packages
                .iter()
                .map(|p| shell_quote(p))
                .collect::<Vec<_>>()
                .join(" "),
        );
        let extra_env: BTreeMap<&str, String> = self
            .env
            .iter()
            .filter(|(name, _)| is_env_name(name))
            .map(|(name, value)| (name.as_str(), shell_quote(value)))
            .collect();
        context.insert("extra_env", &extra_env);

        let script = Tera::one_off(template, &context, false)?;
        tracing::debug!("Rendered startup payload ({} bytes)", script.len());
        Ok(script)
    }
}

/// Quote a value for a POSIX shell
fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:@=+,".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Environment {
        Environment::new("demo-project", "us-central1-a", "us-central1")
    }

    #[test]
    fn test_default_payload_exports_workload_env() {
        let workload = WorkloadConfig {
            source_repo: Some("https://github.com/example/web.git".to_string()),
            source_subdir: Some("hw4".to_string()),
            bucket_name: Some("demo-bucket".to_string()),
            topic_id: Some("error-logs".to_string()),
            ..Default::default()
        };

        let script = workload.render(&env(), 8080).unwrap();

        assert!(script.starts_with("#!/bin/bash"));
        assert!(script.contains("export PROJECT_ID=demo-project"));
        assert!(script.contains("export PORT=8080"));
        assert!(script.contains("export BUCKET_NAME=demo-bucket"));
        assert!(script.contains("export TOPIC_ID=error-logs"));
        assert!(script.contains("git clone --depth 1 --branch main https://github.com/example/web.git"));
        assert!(script.contains("cd \"$APP_DIR\"/hw4"));
        assert!(script.contains("uvicorn\" main:app --host 0.0.0.0"));
        assert!(script.contains("fastapi uvicorn google-cloud-storage"));
    }

    #[test]
    fn test_optional_sections_are_skipped() {
        let script = WorkloadConfig::default().render(&env(), 9000).unwrap();

        assert!(!script.contains("git clone"));
        assert!(!script.contains("BUCKET_NAME"));
        assert!(!script.contains("TOPIC_ID"));
        assert!(script.contains("export PORT=9000"));
        assert!(script.contains("mkdir -p \"$APP_DIR\""));
    }

    #[test]
    fn test_values_are_shell_quoted() {
        let mut workload = WorkloadConfig {
            bucket_name: Some("it's; rm -rf /".to_string()),
            ..Default::default()
        };
        workload.env.insert("GREETING".to_string(), "hello world".to_string());
        workload.env.insert("BAD NAME".to_string(), "x".to_string());

        let script = workload.render(&env(), 8080).unwrap();

        assert!(script.contains(r"export BUCKET_NAME='it'\''s; rm -rf /'"));
        assert!(script.contains("export GREETING='hello world'"));
        assert!(!script.contains("BAD NAME"));
    }

    #[test]
    fn test_custom_template() {
        let script = WorkloadConfig::default()
            .render_template("echo {{ project_id }} {{ zone }} {{ port }}", &env(), 80)
            .unwrap();
        assert_eq!(script, "echo demo-project us-central1-a 80");
    }

    #[test]
    fn test_broken_template_is_an_error() {
        let err = WorkloadConfig::default()
            .render_template("{{ unknown_variable }}", &env(), 80)
            .unwrap_err();
        assert!(matches!(err, crate::error::GcpError::Template(_)));
    }
}
