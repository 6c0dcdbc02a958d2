//! 公共的隧道参数

use clap::Args;
use serde_json::Value;
use std::path::PathBuf;

use crate::config::OptionMap;

/// 对应 `Options` 的命令行参数
#[derive(Args, Debug, Clone, Default)]
pub struct TunnelArgs {
    /// 隧道目标地址：端口或 host:port
    #[arg(long)]
    pub addr: Option<String>,

    /// 旧版参数，等同于 --addr
    #[arg(long, hide = true)]
    pub port: Option<String>,

    /// ngrok 配置文件
    #[arg(long, env = "NGROK_CONFIG")]
    pub config: Option<String>,

    /// 抓取 URL 的最长等待秒数
    #[arg(long)]
    pub timeout: Option<u32>,

    /// 跨进程复用 ngrok
    #[arg(long)]
    pub persistence: bool,

    /// 进程记录文件（默认在配置文件同目录）
    #[arg(long)]
    pub persistence_file: Option<String>,

    /// ngrok 输出日志文件（默认临时文件）
    #[arg(long)]
    pub log: Option<String>,

    #[arg(long, env = "NGROK_AUTHTOKEN", hide_env_values = true)]
    pub authtoken: Option<String>,

    #[arg(long)]
    pub bind_tls: Option<String>,

    #[arg(long)]
    pub host_header: Option<String>,

    #[arg(long)]
    pub hostname: Option<String>,

    /// 是否启用 ngrok inspector
    #[arg(long, env = "NGROK_INSPECT")]
    pub inspect: Option<String>,

    #[arg(long)]
    pub region: Option<String>,

    #[arg(long)]
    pub subdomain: Option<String>,
}

impl TunnelArgs {
    /// 转换为 `Options::resolve` 使用的选项映射
    pub fn to_option_map(&self) -> OptionMap {
        let mut map = OptionMap::new();

        let mut put = |key: &str, value: Option<Value>| {
            if let Some(value) = value {
                map.insert(key.to_string(), value);
            }
        };

        put("addr", self.addr.as_deref().map(addr_value));
        put("port", self.port.as_deref().map(addr_value));
        put("config", self.config.as_deref().map(path_value));
        put("timeout", self.timeout.map(Value::from));
        put("persistence", self.persistence.then_some(Value::Bool(true)));
        put("persistence_file", self.persistence_file.as_deref().map(path_value));
        put("log", self.log.as_deref().map(path_value));
        put("authtoken", self.authtoken.clone().map(Value::String));
        put("bind_tls", self.bind_tls.as_deref().map(flag_value));
        put("host_header", self.host_header.clone().map(Value::String));
        put("hostname", self.hostname.clone().map(Value::String));
        put("inspect", self.inspect.as_deref().map(flag_value));
        put("region", self.region.clone().map(Value::String));
        put("subdomain", self.subdomain.clone().map(Value::String));

        map
    }
}

/// 纯数字视为端口
fn addr_value(addr: &str) -> Value {
    match addr.parse::<u16>() {
        Ok(port) => Value::from(port),
        Err(_) => Value::String(addr.to_string()),
    }
}

fn flag_value(value: &str) -> Value {
    match value {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        other => Value::String(other.to_string()),
    }
}

/// 展开 `~/` 为 home 目录
fn path_value(path: &str) -> Value {
    let expanded = match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    };
    Value::String(expanded.to_string_lossy().into_owned())
}
