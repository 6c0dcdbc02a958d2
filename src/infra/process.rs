//! 进程检查 - 扫描系统进程表中的 ngrok 进程

use crate::error::Result;
use std::path::Path;
use sysinfo::{Pid, Process, Signal, System};
use tracing::{debug, warn};

/// ngrok 启动 HTTP 隧道时命令行中必然出现的片段
pub fn agent_signature(program: &str) -> String {
    let name = Path::new(program)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.to_string());
    format!("{} http -log", name)
}

/// 进程表访问能力，便于在测试中替换
pub trait ProcessInspector {
    /// 返回包含 `signature` 的进程状态行，格式为 `<pid> <command line>`
    fn status_lines(&mut self, signature: &str) -> Result<Vec<String>>;

    /// 进程是否存活（属于其他用户的进程也算存活）
    fn is_alive(&mut self, pid: u32) -> bool;

    /// 以不可捕获的信号终止进程，进程不存在时什么也不做
    fn kill(&mut self, pid: u32) -> Result<()>;
}

/// 基于 sysinfo 的进程检查器
pub struct SystemInspector {
    system: System,
}

impl SystemInspector {
    pub fn new() -> Self {
        Self { system: System::new() }
    }

    /// 刷新系统信息
    pub fn refresh(&mut self) {
        self.system.refresh_all();
    }

    fn status_line(pid: &Pid, process: &Process) -> String {
        let mut parts: Vec<String> = process
            .cmd()
            .iter()
            .map(|s| s.to_string_lossy().into_owned())
            .collect();

        // 程序名只保留文件名，与 `ps ax` 中 `ngrok http ...` 的写法对齐
        match parts.first_mut() {
            Some(program) => {
                let name = Path::new(program.as_str())
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned());
                if let Some(name) = name {
                    *program = name;
                }
            }
            None => parts.push(process.name().to_string_lossy().into_owned()),
        }

        format!("{} {}", pid.as_u32(), parts.join(" "))
    }
}

impl Default for SystemInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessInspector for SystemInspector {
    fn status_lines(&mut self, signature: &str) -> Result<Vec<String>> {
        self.refresh();

        let mut lines: Vec<(u32, String)> = self
            .system
            .processes()
            .iter()
            // Linux 下线程也会出现在进程列表中
            .filter(|(_, process)| process.thread_kind().is_none())
            .map(|(pid, process)| (pid.as_u32(), Self::status_line(pid, process)))
            .filter(|(_, line)| line.contains(signature))
            .collect();
        lines.sort_by_key(|(pid, _)| *pid);

        debug!(signature = %signature, count = lines.len(), "Scanned process table");
        Ok(lines.into_iter().map(|(_, line)| line).collect())
    }

    fn is_alive(&mut self, pid: u32) -> bool {
        #[cfg(unix)]
        {
            signal_alive(pid)
        }
        #[cfg(not(unix))]
        {
            self.refresh();
            self.system.process(Pid::from_u32(pid)).is_some()
        }
    }

    fn kill(&mut self, pid: u32) -> Result<()> {
        self.refresh();
        match self.system.process(Pid::from_u32(pid)) {
            Some(process) => {
                if process.kill_with(Signal::Kill).is_none() {
                    // 平台不支持 SIGKILL 时退回默认的 kill
                    process.kill();
                }
                debug!(pid = pid, "Sent kill signal");
            }
            None => warn!(pid = pid, "Process already gone, nothing to kill"),
        }
        Ok(())
    }
}

/// `kill(pid, 0)` 探测：ESRCH 视为不存在，EPERM 视为存在但属于其他用户
#[cfg(unix)]
pub fn signal_alive(pid: u32) -> bool {
    let raw = match libc::pid_t::try_from(pid) {
        Ok(raw) if raw > 0 => raw,
        _ => return false,
    };

    if unsafe { libc::kill(raw, 0) } == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// 单次启动流程内的进程表快照，按需惰性获取
pub struct ProcessTable<'a, I: ProcessInspector + ?Sized> {
    inspector: &'a mut I,
    signature: String,
    lines: Option<Vec<String>>,
}

impl<'a, I: ProcessInspector + ?Sized> ProcessTable<'a, I> {
    pub fn new(inspector: &'a mut I, signature: impl Into<String>) -> Self {
        Self {
            inspector,
            signature: signature.into(),
            lines: None,
        }
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// 返回缓存的状态行，`refetch` 为 true 时强制重新扫描
    pub fn lines(&mut self, refetch: bool) -> Result<&[String]> {
        if refetch || self.lines.is_none() {
            let lines = self.inspector.status_lines(&self.signature)?;
            self.lines = Some(lines);
        }
        Ok(self.lines.as_deref().unwrap_or_default())
    }

    pub fn inspector(&mut self) -> &mut I {
        &mut *self.inspector
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingInspector {
        scans: usize,
    }

    impl ProcessInspector for CountingInspector {
        fn status_lines(&mut self, signature: &str) -> Result<Vec<String>> {
            self.scans += 1;
            Ok(vec![format!("795 {} -log-level=debug 3001", signature)])
        }

        fn is_alive(&mut self, _pid: u32) -> bool {
            true
        }

        fn kill(&mut self, _pid: u32) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_agent_signature_uses_file_name() {
        assert_eq!(agent_signature("ngrok"), "ngrok http -log");
        assert_eq!(agent_signature("/usr/local/bin/ngrok"), "ngrok http -log");
    }

    #[test]
    fn test_process_table_caches_until_refetch() {
        let mut inspector = CountingInspector { scans: 0 };
        {
            let mut table = ProcessTable::new(&mut inspector, "ngrok http -log");
            assert_eq!(table.lines(false).unwrap().len(), 1);
            table.lines(false).unwrap();
            table.lines(true).unwrap();
        }
        assert_eq!(inspector.scans, 2);
    }

    #[test]
    fn test_scan_does_not_crash() {
        let mut inspector = SystemInspector::new();
        let lines = inspector.status_lines("ngrok http -log").unwrap();
        println!("Found {} ngrok processes", lines.len());
    }

    #[cfg(unix)]
    #[test]
    fn test_signal_current_process() {
        assert!(signal_alive(std::process::id()));
        assert!(!signal_alive(0));
    }
}
