//! 测试用的假进程表与假启动器

#![allow(dead_code)]

use ngrok_wrapper::{
    AgentCommand, Launched, Launcher, LogSink, PidDiscovery, ProcessInspector, Result,
    SpawnMode, Supervisor, TunnelError,
};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::io::Write;
use std::rc::Rc;
use std::time::Duration;

pub const TUNNEL_LOG: &str = concat!(
    "t=2021-06-01T10:00:00 lvl=dbug msg=\"decoded response\" resp=\"&{URL:http://a.ngrok.io Proto:http Opts:map[]}\"\n",
    "t=2021-06-01T10:00:00 lvl=dbug msg=\"decoded response\" resp=\"&{URL:https://a.ngrok.io Proto:https Opts:map[]}\"\n",
);

pub const AUTH_FAILED_LOG: &str =
    "t=2021-06-01T10:00:00 lvl=eror msg=\"command failed\" err=\"authentication failed\"\n";

/// 模拟的系统进程状态，由假检查器和假启动器共享
#[derive(Clone, Default)]
pub struct FakeSystem {
    pub lines: Rc<RefCell<Vec<String>>>,
    pub alive: Rc<RefCell<HashSet<u32>>>,
    pub killed: Rc<RefCell<Vec<u32>>>,
}

impl FakeSystem {
    /// 登记一个正在运行的 ngrok 进程
    pub fn add_agent(&self, pid: u32, addr: &str) {
        self.lines.borrow_mut().push(format!(
            "{} ngrok http -log=stdout -log-level=debug -config /dev/null {}",
            pid, addr
        ));
        self.alive.borrow_mut().insert(pid);
    }
}

pub struct FakeInspector {
    pub system: FakeSystem,
}

impl ProcessInspector for FakeInspector {
    fn status_lines(&mut self, signature: &str) -> Result<Vec<String>> {
        Ok(self
            .system
            .lines
            .borrow()
            .iter()
            .filter(|line| line.contains(signature))
            .cloned()
            .collect())
    }

    fn is_alive(&mut self, pid: u32) -> bool {
        self.system.alive.borrow().contains(&pid)
    }

    fn kill(&mut self, pid: u32) -> Result<()> {
        self.system.killed.borrow_mut().push(pid);
        self.system.alive.borrow_mut().remove(&pid);
        let prefix = format!("{} ", pid);
        self.system
            .lines
            .borrow_mut()
            .retain(|line| !line.starts_with(&prefix));
        Ok(())
    }
}

pub struct FakeLauncher {
    pub system: FakeSystem,
    pub installed: bool,
    /// 写入日志的 ngrok 输出
    pub output: String,
    /// 是否以 ngrok 命令行出现在进程表中；否则以无法匹配的名字登记
    pub registers: bool,
    pub next_pid: u32,
    pub launches: Cell<usize>,
    pub commands: RefCell<Vec<(AgentCommand, SpawnMode)>>,
}

impl FakeLauncher {
    pub fn new(system: FakeSystem, output: &str) -> Self {
        Self {
            system,
            installed: true,
            output: output.to_string(),
            registers: true,
            next_pid: 4242,
            launches: Cell::new(0),
            commands: RefCell::new(Vec::new()),
        }
    }
}

impl Launcher for FakeLauncher {
    fn program(&self) -> &str {
        "ngrok"
    }

    fn ensure_binary(&self) -> Result<()> {
        if self.installed {
            Ok(())
        } else {
            Err(TunnelError::NotFound("ngrok".into()))
        }
    }

    fn launch(&self, command: &AgentCommand, log: &LogSink, mode: SpawnMode) -> Result<Launched> {
        self.launches.set(self.launches.get() + 1);
        self.commands.borrow_mut().push((command.clone(), mode));

        let mut writer = log.writer()?;
        writer.write_all(self.output.as_bytes())?;
        writer.flush()?;

        let pid = self.next_pid;
        let line = if self.registers {
            format!("{} {} {}", pid, command.program, command.args.join(" "))
        } else {
            format!("{} renamed-agent 30", pid)
        };
        self.system.lines.borrow_mut().push(line);
        self.system.alive.borrow_mut().insert(pid);

        Ok(Launched::pid(pid))
    }
}

pub type FakeSupervisor = Supervisor<FakeInspector, FakeLauncher>;

pub fn supervisor(system: &FakeSystem, output: &str) -> FakeSupervisor {
    supervisor_with(system, FakeLauncher::new(system.clone(), output))
}

pub fn supervisor_with(system: &FakeSystem, launcher: FakeLauncher) -> FakeSupervisor {
    Supervisor::new(FakeInspector { system: system.clone() }, launcher)
        .with_poll_interval(Duration::ZERO)
        .with_pid_discovery(PidDiscovery {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            deadline: Duration::from_millis(20),
        })
}
