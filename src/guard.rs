//! 冲突检测 - 判断启动或复用 ngrok 进程是否安全
//!
//! 所有判断都基于进程表状态行：行首为 pid，行尾为 ngrok 报告的目标地址。

use crate::config::Addr;
use crate::error::{Result, TunnelError};
use tracing::warn;

/// 状态行开头的 pid
pub fn line_pid(line: &str) -> Option<u32> {
    line.split_whitespace().next()?.parse().ok()
}

/// 状态行实际绑定的端口（最后一个参数中 `:` 之后的部分）
pub fn bound_port(line: &str) -> &str {
    let last = line.split_whitespace().last().unwrap_or("");
    last.rsplit(':').next().unwrap_or(last)
}

/// 行尾为 `addr`，且前面是空白、`:` 或 `/`（`13001` 不算 `3001`）
fn tunnels_to(line: &str, addr: &str) -> bool {
    match line.trim_end().strip_suffix(addr) {
        Some(rest) => rest
            .chars()
            .last()
            .map_or(true, |c| c.is_whitespace() || c == ':' || c == '/'),
        None => false,
    }
}

fn owned_by(line: &str, pid: u32) -> bool {
    line_pid(line) == Some(pid)
}

/// 检查目标地址上是否有冲突的 ngrok 进程
///
/// - 除 `pid` 之外的任何 ngrok 进程在隧道 `addr` → 冲突
/// - `pid` 本身在隧道其他地址 → 冲突，错误信息包含实际端口
///
/// `pid` 为 None 时所有匹配行都视为外部进程。
pub fn check_conflicts(
    lines: &[String],
    signature: &str,
    pid: Option<u32>,
    addr: &Addr,
) -> Result<()> {
    let addr = addr.to_string();

    let other_on_addr = lines.iter().find(|line| {
        line.contains(signature)
            && pid.map_or(true, |pid| !owned_by(line, pid))
            && tunnels_to(line, &addr)
    });
    if let Some(line) = other_on_addr {
        warn!(addr = %addr, line = %line.trim(), "Other ngrok instance found on address");
        return Err(TunnelError::other_instance(&addr));
    }

    let Some(pid) = pid else {
        return Ok(());
    };

    let on_other_port = lines.iter().find(|line| {
        line.contains(signature) && owned_by(line, pid) && !tunnels_to(line, &addr)
    });
    if let Some(line) = on_other_port {
        let port = bound_port(line);
        warn!(pid = pid, port = %port, addr = %addr, "Ngrok pid tunneling on other port");
        return Err(TunnelError::other_port(pid, port));
    }

    Ok(())
}

/// `pid` 是否是正在隧道 `addr` 的 ngrok 进程
pub fn find_running(lines: &[String], signature: &str, pid: u32, addr: &Addr) -> bool {
    let addr = addr.to_string();
    lines
        .iter()
        .any(|line| line.contains(signature) && owned_by(line, pid) && tunnels_to(line, &addr))
}

/// 查找隧道 `addr` 的 ngrok 进程 pid
pub fn find_by_addr(lines: &[String], signature: &str, addr: &Addr) -> Option<u32> {
    let addr = addr.to_string();
    lines
        .iter()
        .filter(|line| line.contains(signature) && tunnels_to(line, &addr))
        .find_map(|line| line_pid(line))
}
