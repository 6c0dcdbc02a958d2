//! 进程启动 - 构造 ngrok 命令行并启动进程
//!
//! 两种启动方式：
//! - 持久模式：脱离宿主会话在后台运行，宿主退出后继续存活
//! - 临时模式：作为宿主的直接子进程，随宿主一起退出

use crate::config::{Addr, Options, OPTIONAL_PARAMS};
use crate::error::{Result, TunnelError};
use crate::guard;
use crate::infra::process::{ProcessInspector, ProcessTable};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempPath;
use tracing::{debug, info};

pub const DEFAULT_PROGRAM: &str = "ngrok";

/// 启动方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnMode {
    Persistent,
    Ephemeral,
}

/// ngrok 命令行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCommand {
    pub program: String,
    pub args: Vec<String>,
    pub log_path: PathBuf,
}

impl AgentCommand {
    /// `<program> http -log=stdout -log-level=debug [-flag=value ...] -config <path> <addr>`
    pub fn build(program: &str, options: &Options, log_path: &Path) -> Self {
        let mut args = vec![
            "http".to_string(),
            "-log=stdout".to_string(),
            "-log-level=debug".to_string(),
        ];
        args.extend(OPTIONAL_PARAMS.iter().filter_map(|param| param.render(options)));
        args.push("-config".to_string());
        args.push(options.config.display().to_string());
        args.push(options.addr.to_string());

        Self {
            program: program.to_string(),
            args,
            log_path: log_path.to_path_buf(),
        }
    }

    /// 完整的 shell 形式，含输出重定向
    pub fn to_command_line(&self) -> String {
        format!(
            "{} {} > {}",
            self.program,
            self.args.join(" "),
            self.log_path.display()
        )
    }
}

/// ngrok 输出的日志文件
///
/// 启动调用期间独占；读取使用自己的句柄，ngrok 通过独立的追加句柄写入。
pub struct LogSink {
    file: File,
    path: PathBuf,
    _temp: Option<TempPath>,
}

impl LogSink {
    /// 打开指定路径（清空内容），未指定时创建临时文件
    pub fn open(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)?;
                Ok(Self {
                    file,
                    path: path.to_path_buf(),
                    _temp: None,
                })
            }
            None => {
                let (file, temp) = tempfile::Builder::new()
                    .prefix("ngrok")
                    .tempfile()?
                    .into_parts();
                Ok(Self {
                    file,
                    path: temp.to_path_buf(),
                    _temp: Some(temp),
                })
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 供 ngrok 写入的追加句柄
    pub fn writer(&self) -> Result<File> {
        Ok(OpenOptions::new().append(true).open(&self.path)?)
    }

    /// 从头读取当前全部内容
    pub fn read_all(&mut self) -> Result<String> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::new();
        self.file.read_to_end(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// 启动结果
pub struct Launched {
    /// 直接启动的进程 pid；持久模式下仅用于查找失败时的清理，真正的 pid 以进程表为准
    pub pid: Option<u32>,
    /// 临时模式下由调用方持有的子进程句柄
    pub child: Option<Child>,
}

impl Launched {
    pub fn child(child: Child) -> Self {
        Self {
            pid: Some(child.id()),
            child: Some(child),
        }
    }

    pub fn pid(pid: u32) -> Self {
        Self {
            pid: Some(pid),
            child: None,
        }
    }
}

/// ngrok 可执行文件的启动能力，便于在测试中替换
pub trait Launcher {
    /// 可执行文件名
    fn program(&self) -> &str;

    /// 确认可执行文件存在
    fn ensure_binary(&self) -> Result<()>;

    fn launch(&self, command: &AgentCommand, log: &LogSink, mode: SpawnMode) -> Result<Launched>;
}

/// 启动真实的 ngrok 进程
pub struct AgentLauncher {
    program: String,
}

impl AgentLauncher {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn spawn_error(&self, e: io::Error) -> TunnelError {
        if e.kind() == io::ErrorKind::NotFound {
            TunnelError::NotFound(self.program.clone())
        } else {
            TunnelError::Launch(e.to_string())
        }
    }
}

impl Default for AgentLauncher {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl Launcher for AgentLauncher {
    fn program(&self) -> &str {
        &self.program
    }

    fn ensure_binary(&self) -> Result<()> {
        let path = which::which(&self.program)
            .map_err(|_| TunnelError::NotFound(self.program.clone()))?;

        let output = Command::new(&path)
            .arg("version")
            .output()
            .map_err(|e| self.spawn_error(e))?;
        debug!(
            path = %path.display(),
            version = %String::from_utf8_lossy(&output.stdout).trim(),
            "Found ngrok binary"
        );
        Ok(())
    }

    fn launch(&self, command: &AgentCommand, log: &LogSink, mode: SpawnMode) -> Result<Launched> {
        let stdout = log.writer()?;
        let stderr = stdout.try_clone()?;

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);

        debug!(command = %command.to_command_line(), mode = ?mode, "Launching ngrok");

        match mode {
            SpawnMode::Persistent => {
                // 独立会话，宿主退出或收到终端信号时不受影响
                #[cfg(unix)]
                unsafe {
                    use std::os::unix::process::CommandExt;
                    cmd.pre_exec(|| {
                        if libc::setsid() == -1 {
                            return Err(io::Error::last_os_error());
                        }
                        Ok(())
                    });
                }

                let mut child = cmd.spawn().map_err(|e| self.spawn_error(e))?;
                let pid = child.id();
                info!(pid = pid, "Launched detached ngrok");

                // 回收子进程，避免宿主存活期间 ngrok 退出后留下僵尸进程
                thread::Builder::new()
                    .name("ngrok-reaper".to_string())
                    .spawn(move || {
                        let _ = child.wait();
                    })?;

                Ok(Launched::pid(pid))
            }
            SpawnMode::Ephemeral => {
                let child = cmd.spawn().map_err(|e| self.spawn_error(e))?;
                info!(pid = child.id(), "Launched ngrok child process");
                Ok(Launched::child(child))
            }
        }
    }
}

/// 持久模式下查找新进程 pid 的重试参数
#[derive(Debug, Clone, Copy)]
pub struct PidDiscovery {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub deadline: Duration,
}

impl Default for PidDiscovery {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(500),
            deadline: Duration::from_secs(5),
        }
    }
}

/// 轮询进程表，直到出现隧道 `addr` 的 ngrok 进程
pub fn discover_pid<I: ProcessInspector + ?Sized>(
    table: &mut ProcessTable<'_, I>,
    addr: &Addr,
    discovery: &PidDiscovery,
) -> Result<u32> {
    let started = Instant::now();
    let mut delay = discovery.initial_delay;

    loop {
        thread::sleep(delay);

        let signature = table.signature().to_string();
        let lines = table.lines(true)?;
        if let Some(pid) = guard::find_by_addr(lines, &signature, addr) {
            debug!(pid = pid, elapsed_ms = started.elapsed().as_millis() as u64, "Discovered ngrok pid");
            return Ok(pid);
        }

        if started.elapsed() >= discovery.deadline {
            return Err(TunnelError::Launch(format!(
                "no ngrok process tunneling to {} appeared within {:?}",
                addr, discovery.deadline
            )));
        }
        delay = (delay * 2).min(discovery.max_delay);
    }
}
