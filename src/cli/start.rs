//! Start 命令 - 启动 ngrok 隧道并输出公网 URL
//!
//! 非持久模式下命令会一直等待 ngrok 退出；持久模式下启动后立即返回，ngrok 继续在后台运行。

use clap::Args;
use tracing::info;

use super::args::TunnelArgs;
use super::output::{format_report, TunnelReport};
use crate::supervisor;

/// Start 命令参数
#[derive(Args, Debug)]
pub struct StartArgs {
    #[command(flatten)]
    pub tunnel: TunnelArgs,

    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,
}

/// 处理 start 命令
pub fn handle_start(args: StartArgs) -> anyhow::Result<()> {
    let mut supervisor = supervisor::global()
        .lock()
        .unwrap_or_else(|e| e.into_inner());

    supervisor.start(args.tunnel.to_option_map())?;
    println!("{}", format_report(&TunnelReport::from_supervisor(&supervisor), args.json));

    if !args.tunnel.persistence {
        info!("Waiting for ngrok to exit (Ctrl-C to stop)");
        supervisor.wait()?;
    }

    Ok(())
}
