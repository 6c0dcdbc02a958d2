//! 基础设施层 - 进程表与系统调用

pub mod process;

pub use process::{agent_signature, ProcessInspector, ProcessTable, SystemInspector};
