//! vmflow.yaml の検出と読み込み

pub mod error;
pub mod model;

pub use error::*;
pub use model::ProvisionConfig;

use std::path::{Path, PathBuf};

/// 設定ファイルのパスを直接指定する環境変数
pub const CONFIG_PATH_ENV: &str = "VMFLOW_CONFIG_PATH";

/// プロジェクト内で探すファイル名。ローカル用 (.local) を共有用より優先する
const FILE_NAMES: [&str; 4] = [
    "vmflow.local.yaml",
    ".vmflow.local.yaml",
    "vmflow.yaml",
    ".vmflow.yaml",
];

/// vmflow の設定ディレクトリ (~/.config/vmflow)。無ければ作成する
pub fn get_config_dir() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("vmflow");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// 実行ロックを置くディレクトリ
pub fn get_lock_dir() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("locks"))
}

/// カレントディレクトリを起点に設定ファイルを探す
pub fn find_config_file() -> Result<PathBuf> {
    find_config_file_from(&std::env::current_dir()?)
}

/// `project_dir` を起点に設定ファイルを探す
///
/// 環境変数 → `project_dir` → `project_dir/.vmflow` → グローバル設定の順。
pub fn find_config_file_from(project_dir: &Path) -> Result<PathBuf> {
    if let Some(path) = path_from_env() {
        return Ok(path);
    }

    [project_dir.to_path_buf(), project_dir.join(".vmflow")]
        .iter()
        .find_map(|dir| first_existing(dir))
        .or_else(global_config_file)
        .ok_or(ConfigError::ConfigFileNotFound)
}

fn path_from_env() -> Option<PathBuf> {
    let path = PathBuf::from(std::env::var_os(CONFIG_PATH_ENV)?);
    if path.is_file() {
        return Some(path);
    }
    tracing::warn!(
        "{}={} が存在しないため無視します",
        CONFIG_PATH_ENV,
        path.display()
    );
    None
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

fn global_config_file() -> Option<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("vmflow").join("vmflow.yaml"))
        .filter(|path| path.is_file())
}

/// 設定ファイルを読み込む
pub fn load_config(path: &Path) -> Result<ProvisionConfig> {
    let content = std::fs::read_to_string(path)?;
    let config = ProvisionConfig::from_yaml(&content, path)?;
    tracing::debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// 明示パスがあればそれを、無ければ検出したファイルを読み込む
pub fn load(explicit: Option<&Path>) -> Result<ProvisionConfig> {
    match explicit {
        Some(path) => load_config(path),
        None => load_config(&find_config_file()?),
    }
}
