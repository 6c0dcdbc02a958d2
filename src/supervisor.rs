//! ngrok 生命周期管理 - 复用、启动、停止
//!
//! 状态只有 `stopped` 和 `running` 两种；`running` 时一定持有 pid 及至少一个 URL。
//! 进程内的全局实例通过 [`global`] 获取，调用方负责串行化 `start`/`stop`。

use crate::config::{Addr, OptionMap, Options};
use crate::error::Result;
use crate::guard;
use crate::infra::process::{agent_signature, ProcessInspector, ProcessTable, SystemInspector};
use crate::launcher::{
    discover_pid, AgentCommand, AgentLauncher, Launcher, LogSink, PidDiscovery, SpawnMode,
};
use crate::scanner::{self, ScanOutcome};
use crate::store::{PersistedRecord, PersistenceStore};
use serde::Serialize;
use std::fmt;
use std::process::Child;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// 管理器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Stopped,
    Running,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Stopped => write!(f, "stopped"),
            Status::Running => write!(f, "running"),
        }
    }
}

/// 正在运行的隧道
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tunnel {
    pub pid: u32,
    pub url: Option<String>,
    pub secure_url: Option<String>,
}

impl Tunnel {
    /// http URL；ngrok 只报告 https 时返回 https URL
    pub fn public_url(&self) -> &str {
        self.url
            .as_deref()
            .or(self.secure_url.as_deref())
            .unwrap_or_default()
    }
}

/// 临时模式下的子进程，释放时终止并回收
struct ChildGuard(Child);

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Err(e) = self.0.kill() {
            debug!(pid = self.0.id(), error = %e, "Ngrok child already exited");
        }
        let _ = self.0.wait();
    }
}

/// 启动后、抓取 URL 前的中间状态
struct Spawned {
    pid: u32,
    child: Option<ChildGuard>,
    log: LogSink,
}

/// ngrok 进程管理器
pub struct Supervisor<I: ProcessInspector = SystemInspector, L: Launcher = AgentLauncher> {
    inspector: I,
    launcher: L,
    options: Options,
    tunnel: Option<Tunnel>,
    child: Option<ChildGuard>,
    poll_interval: Duration,
    pid_discovery: PidDiscovery,
}

impl Supervisor {
    /// 使用真实进程表和 ngrok 可执行文件
    pub fn system() -> Self {
        Self::new(SystemInspector::new(), AgentLauncher::default())
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::system()
    }
}

impl<I: ProcessInspector, L: Launcher> Supervisor<I, L> {
    pub fn new(inspector: I, launcher: L) -> Self {
        Self {
            inspector,
            launcher,
            options: Options::default(),
            tunnel: None,
            child: None,
            poll_interval: Duration::from_secs(1),
            pid_discovery: PidDiscovery::default(),
        }
    }

    /// 日志轮询间隔（默认 1 秒）
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_pid_discovery(mut self, discovery: PidDiscovery) -> Self {
        self.pid_discovery = discovery;
        self
    }

    /// 解析选项后启动
    pub fn start(&mut self, params: OptionMap) -> Result<String> {
        let options = Options::resolve(params)?;
        self.start_with(options)
    }

    /// 启动隧道并返回公网 URL，已在运行时直接返回当前 URL
    pub fn start_with(&mut self, options: Options) -> Result<String> {
        if let Some(tunnel) = &self.tunnel {
            debug!(pid = tunnel.pid, "Ngrok already running");
            return Ok(tunnel.public_url().to_string());
        }

        self.launcher.ensure_binary()?;
        self.options = options;

        let persistent = self.options.persistence;
        let store = persistent.then(|| PersistenceStore::for_options(&self.options));
        let signature = agent_signature(self.launcher.program());
        let mut table = ProcessTable::new(&mut self.inspector, signature.clone());

        let reused = match &store {
            Some(store) => reuse_persisted(&mut table, &signature, store, &self.options.addr)?,
            None => None,
        };

        let tunnel = match reused {
            Some(tunnel) => tunnel,
            None => {
                let mode = if persistent {
                    SpawnMode::Persistent
                } else {
                    SpawnMode::Ephemeral
                };
                let Spawned { pid, child, mut log } = spawn_new(
                    &mut table,
                    &signature,
                    &self.launcher,
                    &self.options,
                    mode,
                    &self.pid_discovery,
                )?;

                let outcome = scanner::fetch_urls(&mut log, self.options.timeout, self.poll_interval);
                drop(log);

                match outcome.and_then(ScanOutcome::into_urls) {
                    Ok((url, secure_url)) => {
                        self.child = child;
                        Tunnel { pid, url, secure_url }
                    }
                    Err(e) => {
                        warn!(pid = pid, error = %e, "Failed to fetch ngrok url, stopping");
                        terminate(table.inspector(), pid, child);
                        return Err(e);
                    }
                }
            }
        };

        if let Some(store) = &store {
            let record = PersistedRecord::new(tunnel.pid, tunnel.url.clone(), tunnel.secure_url.clone());
            if let Err(e) = store.save(&record) {
                warn!(path = %store.path().display(), error = %e, "Failed to store ngrok record");
            }
        }

        info!(
            pid = tunnel.pid,
            url = ?tunnel.url,
            secure_url = ?tunnel.secure_url,
            "Ngrok tunnel running"
        );
        let url = tunnel.public_url().to_string();
        self.tunnel = Some(tunnel);
        Ok(url)
    }

    /// 只尝试接管已持久化且仍在运行的 ngrok，不会启动新进程
    pub fn attach(&mut self, options: Options) -> Result<Status> {
        if self.tunnel.is_none() {
            self.options = options;
            let store = PersistenceStore::for_options(&self.options);
            let signature = agent_signature(self.launcher.program());
            let mut table = ProcessTable::new(&mut self.inspector, signature.clone());
            self.tunnel = reuse_persisted(&mut table, &signature, &store, &self.options.addr)?;
        }
        Ok(self.status())
    }

    /// 终止持有的 ngrok 进程
    pub fn stop(&mut self) -> Status {
        if let Some(tunnel) = self.tunnel.take() {
            info!(pid = tunnel.pid, "Stopping ngrok");
            terminate(&mut self.inspector, tunnel.pid, self.child.take());
        }
        self.status()
    }

    /// 阻塞直到临时模式的子进程退出；持久模式或未运行时立即返回
    pub fn wait(&mut self) -> Result<Status> {
        if let Some(mut child) = self.child.take() {
            let exit = child.0.wait()?;
            info!(status = %exit, "Ngrok exited");
            self.tunnel = None;
        }
        Ok(self.status())
    }

    /// 宿主退出时只终止临时模式的子进程，持久模式的进程保留
    pub fn release_child(&mut self) {
        if let Some(child) = self.child.take() {
            self.tunnel = None;
            drop(child);
        }
    }

    pub fn status(&self) -> Status {
        if self.tunnel.is_some() {
            Status::Running
        } else {
            Status::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.status() == Status::Running
    }

    pub fn is_stopped(&self) -> bool {
        self.status() == Status::Stopped
    }

    pub fn tunnel(&self) -> Option<&Tunnel> {
        self.tunnel.as_ref()
    }

    pub fn pid(&self) -> Option<u32> {
        self.tunnel.as_ref().map(|t| t.pid)
    }

    pub fn url(&self) -> Option<&str> {
        self.tunnel.as_ref().and_then(|t| t.url.as_deref())
    }

    pub fn secure_url(&self) -> Option<&str> {
        self.tunnel.as_ref().and_then(|t| t.secure_url.as_deref())
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn addr(&self) -> &Addr {
        &self.options.addr
    }

    pub fn port(&self) -> Option<u16> {
        self.options.port()
    }

    pub fn inspector(&self) -> &I {
        &self.inspector
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }
}

/// 从持久化记录恢复：pid 存活且仍在隧道目标地址时复用
fn reuse_persisted<I: ProcessInspector + ?Sized>(
    table: &mut ProcessTable<'_, I>,
    signature: &str,
    store: &PersistenceStore,
    addr: &Addr,
) -> Result<Option<Tunnel>> {
    let Some(record) = store.load() else {
        return Ok(None);
    };
    let Some(pid) = record.pid() else {
        debug!(pid = %record.pid, "Persisted ngrok pid is not a number");
        return Ok(None);
    };

    guard::check_conflicts(table.lines(false)?, signature, Some(pid), addr)?;

    if !table.inspector().is_alive(pid) {
        debug!(pid = pid, "Persisted ngrok process is gone");
        return Ok(None);
    }
    if !guard::find_running(table.lines(false)?, signature, pid, addr) {
        debug!(pid = pid, addr = %addr, "Persisted pid is not an ngrok tunnel to this address");
        return Ok(None);
    }
    if record.url.is_none() && record.secure_url.is_none() {
        // 进程仍占用目标地址但 URL 未知，终止后重新启动
        warn!(pid = pid, "Persisted ngrok record has no url, restarting it");
        table.inspector().kill(pid)?;
        table.lines(true)?;
        return Ok(None);
    }

    info!(pid = pid, path = %store.path().display(), "Reusing running ngrok");
    Ok(Some(Tunnel {
        pid,
        url: record.url,
        secure_url: record.secure_url,
    }))
}

/// 冲突检查后启动新的 ngrok 并确定其 pid
fn spawn_new<I: ProcessInspector + ?Sized, L: Launcher>(
    table: &mut ProcessTable<'_, I>,
    signature: &str,
    launcher: &L,
    options: &Options,
    mode: SpawnMode,
    discovery: &PidDiscovery,
) -> Result<Spawned> {
    guard::check_conflicts(table.lines(false)?, signature, None, &options.addr)?;

    let log = LogSink::open(options.log.as_deref())?;
    let command = AgentCommand::build(launcher.program(), options, log.path());
    let launched = launcher.launch(&command, &log, mode)?;
    let child = launched.child.map(ChildGuard);

    let pid = match (mode, launched.pid) {
        (SpawnMode::Ephemeral, Some(pid)) => pid,
        (_, launched_pid) => match discover_pid(table, &options.addr, discovery) {
            Ok(pid) => pid,
            Err(e) => {
                if let Some(launched_pid) = launched_pid {
                    warn!(pid = launched_pid, error = %e, "Ngrok pid not found, killing launched process");
                    terminate(table.inspector(), launched_pid, child);
                }
                return Err(e);
            }
        },
    };
    info!(pid = pid, mode = ?mode, addr = %options.addr, "Spawned ngrok");

    Ok(Spawned { pid, child, log })
}

fn terminate<I: ProcessInspector + ?Sized>(inspector: &mut I, pid: u32, child: Option<ChildGuard>) {
    match child {
        Some(child) => drop(child),
        None => {
            if let Err(e) = inspector.kill(pid) {
                warn!(pid = pid, error = %e, "Failed to kill ngrok");
            }
        }
    }
}

static GLOBAL: OnceLock<Mutex<Supervisor>> = OnceLock::new();

/// 进程内唯一的管理器
pub fn global() -> &'static Mutex<Supervisor> {
    GLOBAL.get_or_init(|| {
        #[cfg(unix)]
        unsafe {
            libc::atexit(release_global_child);
        }
        Mutex::new(Supervisor::system())
    })
}

#[cfg(unix)]
extern "C" fn release_global_child() {
    if let Some(supervisor) = GLOBAL.get() {
        if let Ok(mut supervisor) = supervisor.try_lock() {
            supervisor.release_child();
        }
    }
}
