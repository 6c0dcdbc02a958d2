//! 日志扫描 - 从 ngrok 输出中提取公网 URL

use crate::error::{Result, TunnelError};
use crate::launcher::LogSink;
use regex::Regex;
use std::sync::LazyLock;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// `URL:<url> Proto:<http|https> `
static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"URL:(\S+)\sProto:(https?)\s").expect("static url pattern"));

/// `msg="command failed" err="<message>"`
static ERROR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"msg="command failed" err="([^"]+)""#).expect("static error pattern")
});

/// 单次扫描或整个轮询的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// 至少解析到一个协议的 URL
    Success {
        url: Option<String>,
        secure_url: Option<String>,
    },
    /// ngrok 报告了错误
    AgentFailure { message: String },
    /// 尝试次数耗尽
    Timeout,
}

impl ScanOutcome {
    /// 转换为 (http URL, https URL)，失败时返回对应错误
    pub fn into_urls(self) -> Result<(Option<String>, Option<String>)> {
        match self {
            ScanOutcome::Success { url, secure_url } => Ok((url, secure_url)),
            ScanOutcome::AgentFailure { message } => Err(TunnelError::Agent(message)),
            ScanOutcome::Timeout => Err(TunnelError::FetchUrl),
        }
    }
}

/// 扫描日志内容。既没有 URL 也没有错误时返回 None
pub fn scan_log(content: &str) -> Option<ScanOutcome> {
    let mut url = None;
    let mut secure_url = None;
    for caps in URL_PATTERN.captures_iter(content) {
        let found = caps[1].to_string();
        match &caps[2] {
            "https" => secure_url = Some(found),
            _ => url = Some(found),
        }
    }

    if url.is_some() || secure_url.is_some() {
        return Some(ScanOutcome::Success { url, secure_url });
    }

    ERROR_PATTERN
        .captures_iter(content)
        .next()
        .map(|caps| ScanOutcome::AgentFailure {
            message: caps[1].to_string(),
        })
}

/// 轮询日志，最多 `attempts` 次，每次从头读取
pub fn fetch_urls(log: &mut LogSink, attempts: u32, interval: Duration) -> Result<ScanOutcome> {
    for attempt in 1..=attempts {
        let content = log.read_all()?;
        match scan_log(&content) {
            Some(outcome @ ScanOutcome::Success { .. }) => {
                debug!(attempt = attempt, "Fetched ngrok urls");
                return Ok(outcome);
            }
            Some(outcome) => {
                warn!(attempt = attempt, outcome = ?outcome, "Ngrok reported an error");
                return Ok(outcome);
            }
            None => {
                debug!(attempt = attempt, attempts = attempts, "No ngrok url yet");
            }
        }

        if attempt < attempts {
            thread::sleep(interval);
        }
    }

    Ok(ScanOutcome::Timeout)
}
