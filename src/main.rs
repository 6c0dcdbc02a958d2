//! Ngrok Wrapper CLI
//!
//! 启动、查看和停止本地 ngrok 隧道

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};
use ngrok_wrapper::cli::{handle_start, handle_status, handle_stop, StartArgs, TunnelCommandArgs};

#[derive(Parser)]
#[command(name = "ngrokw")]
#[command(about = "Ngrok Wrapper - 管理本地 ngrok 隧道")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 启动 ngrok 隧道并输出公网 URL
    Start(StartArgs),
    /// 查看持久化的 ngrok 是否仍在运行
    Status(TunnelCommandArgs),
    /// 终止持久化的 ngrok
    Stop(TunnelCommandArgs),
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ngrok_wrapper=info,ngrokw=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start(args) => handle_start(args),
        Commands::Status(args) => handle_status(args),
        Commands::Stop(args) => handle_stop(args),
    }
}
