use anyhow::Context;
use colored::Colorize;
use std::process::ExitCode;
use vmflow_cloud_gcp::GcloudControlPlane;
use vmflow_config::ProvisionConfig;

pub async fn handle(config: &ProvisionConfig) -> anyhow::Result<ExitCode> {
    let env = config.environment().context("設定の検証に失敗しました")?;
    let instance = config.blueprint.instance_name();

    let control_plane = GcloudControlPlane::new(env);
    let address = control_plane
        .instance_address(&instance)
        .await
        .with_context(|| format!("インスタンス '{}' の取得に失敗しました", instance))?;

    match address {
        Some(address) => {
            println!("{}", address);
            Ok(ExitCode::SUCCESS)
        }
        None => {
            eprintln!(
                "{}",
                format!("✗ インスタンス '{}' に外部 IP アドレスがありません", instance)
                    .red()
                    .bold()
            );
            Ok(ExitCode::FAILURE)
        }
    }
}
