//! Ngrok Wrapper - 管理本地 ngrok 进程并获取公网隧道 URL

pub mod cli;
pub mod config;
pub mod error;
pub mod guard;
pub mod infra;
pub mod launcher;
pub mod scanner;
pub mod store;
pub mod supervisor;

pub use config::{Addr, FlagValue, OptionMap, Options, OPTIONAL_PARAMS};
pub use error::{Result, TunnelError};
pub use infra::{ProcessInspector, ProcessTable, SystemInspector};
pub use launcher::{AgentCommand, AgentLauncher, Launched, Launcher, LogSink, PidDiscovery, SpawnMode};
pub use scanner::{fetch_urls, scan_log, ScanOutcome};
pub use store::{PersistedRecord, PersistenceStore};
pub use supervisor::{global, Status, Supervisor, Tunnel};
