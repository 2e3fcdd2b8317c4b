use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ディレクトリが見つかりません")]
    ConfigDirNotFound,

    #[error(
        "設定ファイルが見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリ: vmflow.local.yaml, .vmflow.local.yaml, vmflow.yaml, .vmflow.yaml\n\
        - ./.vmflow/ ディレクトリ\n\
        - ~/.config/vmflow/vmflow.yaml\n\
        または VMFLOW_CONFIG_PATH 環境変数で直接指定できます"
    )]
    ConfigFileNotFound,

    #[error("設定ファイルの解析に失敗しました ({path}): {message}")]
    Parse { path: PathBuf, message: String },

    #[error("必須項目 '{0}' が設定されていません (設定ファイルまたは環境変数で指定してください)")]
    MissingField(&'static str),

    #[error("設定が不正です: {0}")]
    Invalid(String),

    #[error("起動スクリプトの生成に失敗しました: {0}")]
    StartupScript(#[from] vmflow_cloud_gcp::GcpError),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

impl From<vmflow_cloud::CloudError> for ConfigError {
    fn from(e: vmflow_cloud::CloudError) -> Self {
        ConfigError::Invalid(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
