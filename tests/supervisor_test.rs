//! Supervisor 生命周期测试

mod common;

use common::*;
use ngrok_wrapper::{Addr, Options, SpawnMode, Status, TunnelError};
use serde_json::json;

fn params(value: serde_json::Value) -> ngrok_wrapper::OptionMap {
    value.as_object().cloned().unwrap_or_default()
}

#[test]
fn test_before_start() {
    let system = FakeSystem::default();
    let supervisor = supervisor(&system, TUNNEL_LOG);
    assert!(!supervisor.is_running());
    assert!(supervisor.is_stopped());
    assert_eq!(supervisor.status(), Status::Stopped);
}

#[test]
fn test_start_exposes_tunnel() {
    let system = FakeSystem::default();
    let mut supervisor = supervisor(&system, TUNNEL_LOG);

    let url = supervisor.start(params(json!({}))).unwrap();
    assert_eq!(url, "http://a.ngrok.io");
    assert!(supervisor.is_running());
    assert_eq!(supervisor.status(), Status::Running);
    assert_eq!(supervisor.pid(), Some(4242));
    assert_eq!(supervisor.url(), Some("http://a.ngrok.io"));
    assert_eq!(supervisor.secure_url(), Some("https://a.ngrok.io"));
    assert_eq!(supervisor.addr(), &Addr::Port(3001));
    assert_eq!(supervisor.port(), Some(3001));

    let commands = supervisor.launcher().commands.borrow();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].1, SpawnMode::Ephemeral);
}

#[test]
fn test_start_twice_spawns_once() {
    let system = FakeSystem::default();
    let mut supervisor = supervisor(&system, TUNNEL_LOG);

    let first = supervisor.start(params(json!({}))).unwrap();
    let second = supervisor.start(params(json!({ "addr": 4000 }))).unwrap();
    assert_eq!(first, second);
    assert_eq!(supervisor.launcher().launches.get(), 1);
    assert_eq!(supervisor.addr(), &Addr::Port(3001));
}

#[test]
fn test_stop_clears_tunnel() {
    let system = FakeSystem::default();
    let mut supervisor = supervisor(&system, TUNNEL_LOG);

    assert_eq!(supervisor.stop(), Status::Stopped);
    assert!(system.killed.borrow().is_empty());

    supervisor.start(params(json!({}))).unwrap();
    assert_eq!(supervisor.stop(), Status::Stopped);
    assert_eq!(supervisor.pid(), None);
    assert_eq!(supervisor.url(), None);
    assert_eq!(supervisor.secure_url(), None);
    assert_eq!(*system.killed.borrow(), vec![4242]);

    // 停止后可以再次启动
    supervisor.start(params(json!({}))).unwrap();
    assert_eq!(supervisor.launcher().launches.get(), 2);
}

#[test]
fn test_agent_error_is_surfaced() {
    let system = FakeSystem::default();
    let mut supervisor = supervisor(&system, AUTH_FAILED_LOG);

    let err = supervisor
        .start(params(json!({ "subdomain": "test-subdomain" })))
        .unwrap_err();
    assert!(matches!(&err, TunnelError::Agent(message) if message == "authentication failed"));
    assert!(supervisor.is_stopped());
    assert_eq!(*system.killed.borrow(), vec![4242]);
}

#[test]
fn test_empty_log_times_out() {
    let system = FakeSystem::default();
    let mut supervisor = supervisor(&system, "");

    let err = supervisor.start(params(json!({ "timeout": 3 }))).unwrap_err();
    assert!(matches!(err, TunnelError::FetchUrl));
    assert_eq!(err.to_string(), "Unable to fetch external url");
    assert!(supervisor.is_stopped());
}

#[test]
fn test_https_only_returns_secure_url() {
    let system = FakeSystem::default();
    let mut supervisor = supervisor(&system, "URL:https://b.ngrok.io Proto:https \n");

    let url = supervisor.start(params(json!({ "bind_tls": true }))).unwrap();
    assert_eq!(url, "https://b.ngrok.io");
    assert_eq!(supervisor.url(), None);
}

#[test]
fn test_conflicting_instance_prevents_spawn() {
    let system = FakeSystem::default();
    system.add_agent(795, "https://localhost:3001");
    let mut supervisor = supervisor(&system, TUNNEL_LOG);

    let err = supervisor.start(params(json!({}))).unwrap_err();
    assert!(err.is_conflict());
    assert!(err.to_string().contains("port 3001"));
    assert_eq!(supervisor.launcher().launches.get(), 0);
    assert!(supervisor.is_stopped());
}

#[test]
fn test_missing_binary() {
    let system = FakeSystem::default();
    let mut launcher = FakeLauncher::new(system.clone(), TUNNEL_LOG);
    launcher.installed = false;
    let mut supervisor = supervisor_with(&system, launcher);

    let err = supervisor.start(params(json!({}))).unwrap_err();
    assert!(matches!(err, TunnelError::NotFound(_)));
    assert!(supervisor.is_stopped());
}

#[test]
fn test_legacy_port_and_flags_reach_command_line() {
    let system = FakeSystem::default();
    let mut supervisor = supervisor(&system, TUNNEL_LOG);

    supervisor
        .start(params(json!({ "port": 10010, "region": "eu", "inspect": false })))
        .unwrap();
    assert_eq!(supervisor.addr(), &Addr::Port(10010));

    let commands = supervisor.launcher().commands.borrow();
    let args = &commands[0].0.args;
    assert!(args.contains(&"-region=eu".to_string()));
    assert!(args.contains(&"-inspect=false".to_string()));
    assert!(!args.iter().any(|a| a.starts_with("-host-header=")));
    assert_eq!(args.last().map(String::as_str), Some("10010"));
}

#[test]
fn test_custom_log_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let log = dir.path().join("test.log");
    let system = FakeSystem::default();
    let mut supervisor = supervisor(&system, TUNNEL_LOG);

    supervisor
        .start_with(Options {
            log: Some(log.clone()),
            ..Options::default()
        })
        .unwrap();

    assert_eq!(supervisor.options().log.as_deref(), Some(log.as_path()));
    let content = std::fs::read_to_string(&log).unwrap();
    assert!(content.contains("URL:https://a.ngrok.io"));
    assert_eq!(supervisor.launcher().commands.borrow()[0].0.log_path, log);
}
