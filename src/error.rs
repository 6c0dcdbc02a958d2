//! 错误类型 - ngrok 进程管理的失败分类

use thiserror::Error;

/// ngrok 管理操作的错误
#[derive(Error, Debug)]
pub enum TunnelError {
    /// ngrok 可执行文件不存在
    #[error("Ngrok binary not found: {0}")]
    NotFound(String),

    /// 已有其他 ngrok 进程占用目标地址，或复用的 pid 指向其他端口
    #[error("ERROR: {0}")]
    Conflict(String),

    /// 超时仍未从日志中解析到外部 URL
    #[error("Unable to fetch external url")]
    FetchUrl,

    /// ngrok 自身报告的错误，原样透传
    #[error("{0}")]
    Agent(String),

    /// 启动 ngrok 失败
    #[error("failed to launch ngrok: {0}")]
    Launch(String),

    /// 选项类型不合法，或记录无法序列化
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TunnelError {
    /// Another agent already tunnels to `addr`.
    pub fn other_instance(addr: impl std::fmt::Display) -> Self {
        Self::Conflict(format!(
            "Other ngrok instances tunneling to port {} found",
            addr
        ))
    }

    /// The reused `pid` tunnels to `port` instead of the requested address.
    pub fn other_port(pid: u32, port: &str) -> Self {
        Self::Conflict(format!("Ngrok pid #{} tunneling on other port {}", pid, port))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// 库内统一的 Result 类型
pub type Result<T> = std::result::Result<T, TunnelError>;
