mod commands;
mod output;

use clap::{Parser, Subcommand};
use output::OutputFormat;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "vmflow")]
#[command(about = "Web サーバー VM を、何度実行しても同じ結果で構築する", long_about = None)]
struct Cli {
    /// 設定ファイルのパス (省略時は vmflow.yaml を検索)
    #[arg(short, long, global = true, env = "VMFLOW_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// プロジェクト ID (設定ファイルより優先)
    #[arg(long, global = true, env = "VMFLOW_PROJECT")]
    project: Option<String>,

    /// ゾーン (設定ファイルより優先)
    #[arg(long, global = true, env = "VMFLOW_ZONE")]
    zone: Option<String>,

    /// リージョン (省略時はゾーンから導出)
    #[arg(long, global = true, env = "VMFLOW_REGION")]
    region: Option<String>,

    /// 詳細ログを表示
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// リソースを順に作成し、外部 IP アドレスを出力
    Up {
        /// 出力形式
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
        /// API 呼び出し1回あたりのタイムアウト (秒)
        #[arg(long)]
        timeout: Option<u64>,
        /// 実行ロックを取得しない
        #[arg(long)]
        no_lock: bool,
    },
    /// 実行計画を表示
    Plan {
        /// 出力形式
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },
    /// インスタンスの外部 IP アドレスを表示
    Address,
    /// バージョン情報を表示
    Version,
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "info" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    // stdout は結果出力に使うので、ログは stderr へ
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    // Versionコマンドは設定ファイル不要
    if matches!(cli.command, Commands::Version) {
        println!("vmflow {}", env!("CARGO_PKG_VERSION"));
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = vmflow_config::load(cli.config.as_deref())?;
    config.apply_overrides(cli.project, cli.zone, cli.region);

    match cli.command {
        Commands::Up {
            output,
            timeout,
            no_lock,
        } => commands::up::handle(config, output, timeout, no_lock).await,
        Commands::Plan { output } => commands::plan::handle(&config, output),
        Commands::Address => commands::address::handle(&config).await,
        Commands::Version => {
            unreachable!("Version is handled before config loading");
        }
    }
}
