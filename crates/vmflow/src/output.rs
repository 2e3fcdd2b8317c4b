//! 実行結果の出力
//!
//! stdout には結果 (アドレス / FAILED 行 / JSON) だけを書き、
//! 進捗やサマリーは stderr に出す。

use colored::Colorize;
use std::process::ExitCode;
use vmflow_cloud::{ExecutionResult, HaltReason, ProvisioningReport, RunState, StepRecord};

/// Ctrl-C で中断した場合の終了コード
pub const EXIT_CANCELLED: u8 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// 1ステップ分の表示行
pub fn step_line(step: &StepRecord) -> String {
    let label = format!("[{}] {}", step.kind, step.id);
    match &step.result {
        ExecutionResult::Created => format!("  {} {} 作成しました", "✓".green(), label),
        ExecutionResult::AlreadyExists => {
            format!("  {} {} 既に存在します", "=".blue(), label.dimmed())
        }
        ExecutionResult::Failed(failure) => {
            let cause = failure
                .cause
                .map(|c| format!(" (原因: {})", c))
                .unwrap_or_default();
            format!(
                "  {} {} 失敗しました: {}{}\n      {}",
                "✗".red(),
                label,
                failure.kind.to_string().red().bold(),
                cause,
                failure.message
            )
        }
    }
}

/// 機械可読な失敗行: `FAILED <step-id> <ErrorKind>`
pub fn failure_line(report: &ProvisioningReport) -> Option<String> {
    report
        .failed_step()
        .map(|(id, kind)| format!("FAILED {} {}", id, kind))
}

pub fn print_report(report: &ProvisioningReport, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Text => {
            for step in &report.steps {
                eprintln!("{}", step_line(step));
            }
            eprintln!();
            eprintln!(
                "{} ({} ms)",
                report.summary().to_string().bold(),
                report.duration_ms
            );

            match &report.state {
                RunState::Succeeded => {
                    eprintln!("{}", "✓ 構築が完了しました".green().bold());
                    if let Some(address) = &report.address {
                        println!("{}", address);
                    }
                }
                RunState::Halted {
                    reason: HaltReason::Cancelled,
                    step,
                } => {
                    eprintln!(
                        "{}",
                        format!("中断しました (ステップ {} の前)", step + 1).yellow().bold()
                    );
                }
                _ => {
                    eprintln!("{}", "✗ 構築に失敗しました".red().bold());
                    if let Some(error) = &report.error {
                        eprintln!("  {}", error);
                    }
                    if let Some(line) = failure_line(report) {
                        println!("{}", line);
                    }
                }
            }
        }
    }
    Ok(())
}

pub fn exit_code(report: &ProvisioningReport) -> ExitCode {
    if report.is_success() {
        ExitCode::SUCCESS
    } else if report.is_cancelled() {
        ExitCode::from(EXIT_CANCELLED)
    } else {
        ExitCode::FAILURE
    }
}
