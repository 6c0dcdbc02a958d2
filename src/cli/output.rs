//! Output formatting for CLI commands

use serde::Serialize;

use crate::infra::process::ProcessInspector;
use crate::launcher::Launcher;
use crate::supervisor::{Status, Supervisor};

/// 隧道状态输出
#[derive(Debug, Serialize)]
pub struct TunnelReport {
    pub status: Status,
    pub pid: Option<u32>,
    pub url: Option<String>,
    pub secure_url: Option<String>,
    pub addr: String,
    pub port: Option<u16>,
}

impl TunnelReport {
    pub fn from_supervisor<I: ProcessInspector, L: Launcher>(supervisor: &Supervisor<I, L>) -> Self {
        Self {
            status: supervisor.status(),
            pid: supervisor.pid(),
            url: supervisor.url().map(str::to_string),
            secure_url: supervisor.secure_url().map(str::to_string),
            addr: supervisor.addr().to_string(),
            port: supervisor.port(),
        }
    }
}

/// Format output as JSON or plain text based on --json flag
pub fn format_report(report: &TunnelReport, json: bool) -> String {
    if json {
        return serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string());
    }

    let mut lines = vec![format!("status: {}", report.status)];
    if let Some(pid) = report.pid {
        lines.push(format!("  pid: {}", pid));
    }
    if let Some(url) = &report.url {
        lines.push(format!("  url: {}", url));
    }
    if let Some(secure_url) = &report.secure_url {
        lines.push(format!("  secure_url: {}", secure_url));
    }
    lines.push(format!("  addr: {}", report.addr));
    lines.join("\n")
}
