use crate::output::{self, OutputFormat};
use anyhow::Context;
use colored::Colorize;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use vmflow_cloud::{CancelHandle, Provisioner, RunLock};
use vmflow_cloud_gcp::{Gcloud, GcloudControlPlane};
use vmflow_config::ProvisionConfig;

pub async fn handle(
    mut config: ProvisionConfig,
    format: OutputFormat,
    timeout: Option<u64>,
    no_lock: bool,
) -> anyhow::Result<ExitCode> {
    if let Some(secs) = timeout {
        config.call_timeout_secs = secs;
    }

    let env = config.validate().context("設定の検証に失敗しました")?;
    let plan = config
        .to_plan(&env)
        .context("実行計画の作成に失敗しました")?;

    eprintln!("環境: {}", env.to_string().cyan());
    eprintln!("ステップ: {}", plan.len());

    let gcloud = Gcloud::new(&env)
        .with_check_timeout(Duration::from_secs(config.call_timeout_secs));
    let control_plane = GcloudControlPlane::with_gcloud(env.clone(), gcloud);
    let version = control_plane
        .check_installed()
        .await
        .context("gcloud を実行できません")?;
    tracing::debug!("Using {}", version);

    // 同じ project/zone への同時実行を防ぐ
    let lock = if no_lock {
        None
    } else {
        let lock_dir = vmflow_config::get_lock_dir()?;
        Some(
            RunLock::acquire(&lock_dir, &env)
                .await
                .context("別の vmflow が実行中です (--no-lock で無視できます)")?,
        )
    };

    let cancel = CancelHandle::new();
    let signal_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!();
                eprintln!(
                    "{}",
                    "中断を受け付けました。実行中のステップの完了を待っています...".yellow()
                );
                cancel.cancel();
            }
        })
    };

    eprintln!();
    let mut provisioner = Provisioner::new(Arc::new(control_plane), env)
        .with_retry(config.retry_config())
        .with_cancel_handle(cancel);
    let report = provisioner.run(&plan).await;

    signal_task.abort();

    if let Some(lock) = lock
        && let Err(e) = lock.release().await
    {
        tracing::warn!("Failed to release run lock: {}", e);
    }

    output::print_report(&report, format)?;
    Ok(output::exit_code(&report))
}
