//! 配置解析 - 合并调用方选项与默认值
//!
//! 调用方以键值映射传入选项，`Options::resolve` 负责：
//! - 将旧版 `port` 键映射到 `addr`
//! - 填充默认值 (`addr=3001`, `timeout=10`, `config=/dev/null`)
//! - 反序列化为强类型的 [`Options`]

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;

/// 调用方传入的原始选项
pub type OptionMap = serde_json::Map<String, Value>;

pub const DEFAULT_ADDR: u16 = 3001;
pub const DEFAULT_TIMEOUT: u32 = 10;
pub const DEFAULT_CONFIG: &str = "/dev/null";

/// 隧道目标地址：纯端口，或 `host:port` / URL 字符串
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Addr {
    Port(u16),
    Remote(String),
}

impl Addr {
    /// 逻辑端口。字符串地址取最后一个 `:` 之后的部分
    pub fn port(&self) -> Option<u16> {
        match self {
            Addr::Port(port) => Some(*port),
            Addr::Remote(addr) => addr.rsplit(':').next()?.trim().parse().ok(),
        }
    }
}

impl Default for Addr {
    fn default() -> Self {
        Addr::Port(DEFAULT_ADDR)
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Addr::Port(port) => write!(f, "{}", port),
            Addr::Remote(addr) => write!(f, "{}", addr),
        }
    }
}

impl From<u16> for Addr {
    fn from(port: u16) -> Self {
        Addr::Port(port)
    }
}

impl From<&str> for Addr {
    fn from(addr: &str) -> Self {
        Addr::Remote(addr.to_string())
    }
}

/// 透传给 ngrok 的可选参数值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Integer(i64),
    Text(String),
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagValue::Bool(b) => write!(f, "{}", b),
            FlagValue::Integer(n) => write!(f, "{}", n),
            FlagValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for FlagValue {
    fn from(b: bool) -> Self {
        FlagValue::Bool(b)
    }
}

impl From<&str> for FlagValue {
    fn from(s: &str) -> Self {
        FlagValue::Text(s.to_string())
    }
}

/// 解析后的完整选项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Options {
    #[serde(default)]
    pub addr: Addr,
    #[serde(default = "default_config")]
    pub config: PathBuf,
    /// URL 抓取的最大尝试次数（每秒一次）
    #[serde(default = "default_timeout")]
    pub timeout: u32,
    #[serde(default)]
    pub persistence: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistence_file: Option<PathBuf>,
    /// ngrok 输出日志路径，缺省时使用临时文件
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authtoken: Option<FlagValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_tls: Option<FlagValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_header: Option<FlagValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<FlagValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspect: Option<FlagValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<FlagValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<FlagValue>,
}

fn default_config() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG)
}

fn default_timeout() -> u32 {
    DEFAULT_TIMEOUT
}

impl Default for Options {
    fn default() -> Self {
        Self {
            addr: Addr::default(),
            config: default_config(),
            timeout: DEFAULT_TIMEOUT,
            persistence: false,
            persistence_file: None,
            log: None,
            authtoken: None,
            bind_tls: None,
            host_header: None,
            hostname: None,
            inspect: None,
            region: None,
            subdomain: None,
        }
    }
}

impl Options {
    /// 合并调用方选项与默认值
    pub fn resolve(mut params: OptionMap) -> Result<Self> {
        // 兼容旧版本的 `port` 键
        if let Some(port) = params.remove("port") {
            params.insert("addr".to_string(), port);
        }

        let mut resolved = OptionMap::new();
        resolved.insert("addr".to_string(), Value::from(DEFAULT_ADDR));
        resolved.insert("timeout".to_string(), Value::from(DEFAULT_TIMEOUT));
        resolved.insert("config".to_string(), Value::from(DEFAULT_CONFIG));
        resolved.extend(params);

        Ok(serde_json::from_value(Value::Object(resolved))?)
    }

    pub fn port(&self) -> Option<u16> {
        self.addr.port()
    }
}

/// 可选参数表项：选项键与取值函数
pub struct OptionalParam {
    pub key: &'static str,
    value: fn(&Options) -> Option<&FlagValue>,
}

impl OptionalParam {
    /// 命令行参数名，下划线替换为连字符
    pub fn flag(&self) -> String {
        format!("-{}", self.key.replace('_', "-"))
    }

    pub fn value<'a>(&self, options: &'a Options) -> Option<&'a FlagValue> {
        (self.value)(options)
    }

    /// 渲染为 `-flag=value`，未设置时返回 None
    pub fn render(&self, options: &Options) -> Option<String> {
        self.value(options)
            .map(|value| format!("{}={}", self.flag(), value))
    }
}

/// 可识别的透传参数，按固定顺序拼接
pub const OPTIONAL_PARAMS: &[OptionalParam] = &[
    OptionalParam { key: "authtoken", value: |o| o.authtoken.as_ref() },
    OptionalParam { key: "bind_tls", value: |o| o.bind_tls.as_ref() },
    OptionalParam { key: "host_header", value: |o| o.host_header.as_ref() },
    OptionalParam { key: "hostname", value: |o| o.hostname.as_ref() },
    OptionalParam { key: "inspect", value: |o| o.inspect.as_ref() },
    OptionalParam { key: "region", value: |o| o.region.as_ref() },
    OptionalParam { key: "subdomain", value: |o| o.subdomain.as_ref() },
];
