//! 環境設定ファイル (vmflow.yaml) のモデル

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use vmflow_cloud::{Blueprint, Environment, ProvisioningPlan, RetryConfig};
use vmflow_cloud_gcp::WorkloadConfig;

/// vmflow.yaml の内容
///
/// ```yaml
/// project: my-project
/// zone: us-central1-a
/// blueprint:
///   prefix: hw4
///   port: 8080
/// workload:
///   source_repo: https://github.com/example/web.git
///   bucket_name: my-bucket
///   topic_id: error-logs
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvisionConfig {
    /// プロジェクト ID
    pub project: Option<String>,

    /// ゾーン (例: us-central1-a)
    pub zone: Option<String>,

    /// リージョン (省略時はゾーンから導出)
    pub region: Option<String>,

    /// 作成するリソースの宣言
    pub blueprint: Blueprint,

    /// 起動スクリプトに埋め込むワークロード設定
    pub workload: WorkloadConfig,

    /// 起動スクリプトのファイル (設定ファイルからの相対パス可)
    pub startup_script_file: Option<PathBuf>,

    /// API 呼び出し1回あたりのタイムアウト (秒)
    pub call_timeout_secs: u64,

    /// Transient エラー時の最大試行回数
    pub max_attempts: u32,

    /// 最初のリトライまでの待ち時間 (秒)
    pub initial_delay_secs: u64,

    /// 設定ファイルの場所 (読み込み時に設定)
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            project: None,
            zone: None,
            region: None,
            blueprint: Blueprint::default(),
            workload: WorkloadConfig::default(),
            startup_script_file: None,
            call_timeout_secs: retry.call_timeout.as_secs(),
            max_attempts: retry.max_attempts,
            initial_delay_secs: retry.initial_delay.as_secs(),
            source: None,
        }
    }
}

impl ProvisionConfig {
    /// YAML 文字列から読み込む
    pub fn from_yaml(content: &str, path: &Path) -> Result<Self> {
        let mut config: ProvisionConfig =
            serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// 環境変数・コマンドライン引数で上書き
    pub fn apply_overrides(
        &mut self,
        project: Option<String>,
        zone: Option<String>,
        region: Option<String>,
    ) {
        if project.is_some() {
            self.project = project;
        }
        if zone.is_some() {
            // ゾーンを変えたら導出リージョンも追従させる
            if region.is_none() && self.zone != zone {
                self.region = None;
            }
            self.zone = zone;
        }
        if region.is_some() {
            self.region = region;
        }
    }

    /// 対象環境を解決
    pub fn environment(&self) -> Result<Environment> {
        let project = non_empty(&self.project).ok_or(ConfigError::MissingField("project"))?;
        let zone = non_empty(&self.zone).ok_or(ConfigError::MissingField("zone"))?;
        let region = match non_empty(&self.region) {
            Some(region) => region.to_string(),
            None => region_of(zone).ok_or_else(|| {
                ConfigError::Invalid(format!("ゾーン '{}' からリージョンを導出できません", zone))
            })?,
        };

        let in_region = zone
            .strip_prefix(region.as_str())
            .is_some_and(|rest| rest.starts_with('-'));
        if !in_region {
            return Err(ConfigError::Invalid(format!(
                "ゾーン '{}' はリージョン '{}' に属していません",
                zone, region
            )));
        }

        Ok(Environment::new(project, zone, region))
    }

    /// 実行前の検証
    pub fn validate(&self) -> Result<Environment> {
        let env = self.environment()?;
        self.blueprint.validate()?;

        if self.call_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "call_timeout_secs は 1 以上を指定してください".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_attempts は 1 以上を指定してください".to_string(),
            ));
        }
        if self.blueprint.startup_script.is_some() && self.startup_script_file.is_some() {
            return Err(ConfigError::Invalid(
                "blueprint.startup_script と startup_script_file は同時に指定できません".to_string(),
            ));
        }

        Ok(env)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_secs(self.initial_delay_secs),
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            ..RetryConfig::default()
        }
    }

    /// 起動スクリプトを解決
    ///
    /// 優先順位: blueprint.startup_script (リテラル) → startup_script_file → 組み込みテンプレート
    pub fn startup_script(&self, env: &Environment) -> Result<String> {
        if let Some(script) = &self.blueprint.startup_script {
            return Ok(script.clone());
        }

        if let Some(file) = &self.startup_script_file {
            let path = self.resolve_path(file);
            tracing::debug!("Reading startup script from {}", path.display());
            return Ok(std::fs::read_to_string(&path)?);
        }

        Ok(self.workload.render(env, self.blueprint.port)?)
    }

    /// 起動スクリプトを埋め込んだプランを作成
    pub fn to_plan(&self, env: &Environment) -> Result<ProvisioningPlan> {
        let mut blueprint = self.blueprint.clone();
        blueprint.startup_script = Some(self.startup_script(env)?);
        blueprint
            .to_plan(env)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match self.source.as_deref().and_then(Path::parent) {
            Some(base) => base.join(path),
            None => path.to_path_buf(),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// "us-central1-a" → "us-central1"
fn region_of(zone: &str) -> Option<String> {
    let (region, suffix) = zone.rsplit_once('-')?;
    if region.is_empty() || suffix.is_empty() || !region.contains('-') {
        return None;
    }
    Some(region.to_string())
}
