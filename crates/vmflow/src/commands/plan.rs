use crate::output::OutputFormat;
use anyhow::Context;
use colored::Colorize;
use std::process::ExitCode;
use vmflow_cloud::{ProvisioningPlan, params};
use vmflow_config::ProvisionConfig;

pub fn handle(config: &ProvisionConfig, format: OutputFormat) -> anyhow::Result<ExitCode> {
    let env = config.validate().context("設定の検証に失敗しました")?;
    let plan = config
        .to_plan(&env)
        .context("実行計画の作成に失敗しました")?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(plan.specs())?);
        }
        OutputFormat::Text => {
            println!("環境: {}", env.to_string().cyan());
            println!();
            print_plan(&plan);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_plan(plan: &ProvisioningPlan) {
    for (index, spec) in plan.iter().enumerate() {
        println!("  {:>2}. [{}] {}", index + 1, spec.kind, spec.id.bold());
        if !spec.depends_on.is_empty() {
            println!("      {} {}", "←".dimmed(), spec.depends_on.join(", ").dimmed());
        }
        for (key, value) in &spec.params {
            // 起動スクリプトは長いので行数だけ
            if key == params::STARTUP_SCRIPT {
                println!("      {}: ({} 行)", key, value.lines().count());
            } else {
                println!("      {}: {}", key, value);
            }
        }
    }
}
