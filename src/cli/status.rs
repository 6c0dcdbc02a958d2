//! Status / Stop 命令 - 通过持久化记录查看或终止后台 ngrok

use clap::Args;

use super::args::TunnelArgs;
use super::output::{format_report, TunnelReport};
use crate::config::Options;
use crate::supervisor;

/// Status / Stop 命令参数
#[derive(Args, Debug)]
pub struct TunnelCommandArgs {
    #[command(flatten)]
    pub tunnel: TunnelArgs,

    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,
}

/// 处理 status 命令
pub fn handle_status(args: TunnelCommandArgs) -> anyhow::Result<()> {
    let options = Options::resolve(args.tunnel.to_option_map())?;
    let mut supervisor = supervisor::global()
        .lock()
        .unwrap_or_else(|e| e.into_inner());

    supervisor.attach(options)?;
    println!("{}", format_report(&TunnelReport::from_supervisor(&supervisor), args.json));
    Ok(())
}

/// 处理 stop 命令
pub fn handle_stop(args: TunnelCommandArgs) -> anyhow::Result<()> {
    let options = Options::resolve(args.tunnel.to_option_map())?;
    let mut supervisor = supervisor::global()
        .lock()
        .unwrap_or_else(|e| e.into_inner());

    supervisor.attach(options)?;
    let pid = supervisor.pid();
    supervisor.stop();

    let report = TunnelReport::from_supervisor(&supervisor);
    if args.json {
        println!("{}", format_report(&report, true));
    } else {
        match pid {
            Some(pid) => println!("已停止 ngrok (pid {})", pid),
            None => println!("没有正在运行的 ngrok"),
        }
    }
    Ok(())
}
