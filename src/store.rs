//! 进程记录持久化 - 跨宿主进程重启复用 ngrok
//!
//! 记录文件默认位于 ngrok 配置文件所在目录下的 `ngrok-process.json`。

use crate::config::Options;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const PERSISTENCE_FILE_NAME: &str = "ngrok-process.json";

/// 持久化的 ngrok 进程信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub pid: String,
    #[serde(rename = "ngrok_url")]
    pub url: Option<String>,
    #[serde(rename = "ngrok_url_https")]
    pub secure_url: Option<String>,
}

impl PersistedRecord {
    pub fn new(pid: u32, url: Option<String>, secure_url: Option<String>) -> Self {
        Self {
            pid: pid.to_string(),
            url,
            secure_url,
        }
    }

    /// 记录中的 pid，无法解析时返回 None
    pub fn pid(&self) -> Option<u32> {
        self.pid.trim().parse().ok()
    }
}

/// 进程记录文件
#[derive(Debug, Clone)]
pub struct PersistenceStore {
    path: PathBuf,
}

impl PersistenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 根据选项确定记录文件路径
    pub fn for_options(options: &Options) -> Self {
        match &options.persistence_file {
            Some(path) => Self::new(path.clone()),
            None => Self::new(Self::default_path(&options.config)),
        }
    }

    /// `<配置文件所在目录>/ngrok-process.json`
    pub fn default_path(config: &Path) -> PathBuf {
        config
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .join(PERSISTENCE_FILE_NAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取记录；文件缺失、格式错误等一律视为没有记录
    pub fn load(&self) -> Option<PersistedRecord> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "No persisted ngrok record");
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "Ignoring malformed ngrok record");
                None
            }
        }
    }

    /// 写入记录（带文件锁）
    pub fn save(&self, record: &PersistedRecord) -> Result<()> {
        use fs2::FileExt;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.path)?;

        file.lock_exclusive()?;
        file.set_len(0)?;
        file.write_all(serde_json::to_string(record)?.as_bytes())?;
        file.unlock()?;

        debug!(path = %self.path.display(), pid = %record.pid, "Stored ngrok record");
        Ok(())
    }
}
