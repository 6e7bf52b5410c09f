//! End-to-end lifecycle scenarios against the public control surface.

use minerva_core::config::{BackendCommand, BackendSection, SupervisorConfig};
use minerva_core::supervisor::state_machine::State;
use minerva_core::supervisor::BackendSupervisor;
use std::path::PathBuf;
use std::time::Duration;

fn fast_config(port: u16, command: BackendCommand) -> SupervisorConfig {
    SupervisorConfig {
        bind_host: "127.0.0.1".to_string(),
        port,
        command,
        ready_max_attempts: 3,
        ready_interval: Duration::from_millis(10),
        ready_attempt_timeout: Duration::from_millis(100),
        shutdown_grace: Duration::from_millis(500),
        restart_settle: Duration::from_millis(10),
    }
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

/// 스펙 시나리오: development 엔트리 실행 불가 → start 실패, URL은 설정 파생
#[tokio::test]
async fn unreachable_dev_entry_fails_but_url_stays() {
    let supervisor = BackendSupervisor::new(fast_config(
        50051,
        BackendCommand::Script {
            backend_dir: PathBuf::from("/nonexistent/minerva/backend"),
            entry: "main.py".to_string(),
        },
    ));

    assert!(!supervisor.start().await);
    assert!(!supervisor.is_running());
    assert_eq!(supervisor.state(), State::Failed);
    assert_eq!(supervisor.server_url(), "http://127.0.0.1:50051");
}

/// 스펙 시나리오: 포트를 제3자가 선점 → start 성공, 스폰 없음
#[tokio::test]
async fn prebound_port_adopts_external_backend() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let supervisor = BackendSupervisor::new(fast_config(
        port,
        BackendCommand::Packaged {
            executable: PathBuf::from("/nonexistent/backend/minerva-backend"),
        },
    ));

    assert!(supervisor.start().await);
    assert!(supervisor.is_running());
    assert_eq!(supervisor.pid(), None, "nothing may be spawned");

    // 외부 소유 프로세스에 대한 stop은 no-op
    supervisor.stop().await;
    assert!(supervisor.is_running());

    // restart는 stop(no-op) 후 다시 adopt
    assert!(supervisor.restart().await);
    assert!(supervisor.is_running());

    drop(listener);
}

#[tokio::test]
async fn stop_before_any_start_is_safe() {
    let supervisor = BackendSupervisor::new(fast_config(
        free_port(),
        BackendCommand::Packaged {
            executable: PathBuf::from("/nonexistent/backend/minerva-backend"),
        },
    ));

    supervisor.stop().await;
    assert_eq!(supervisor.state(), State::Idle);
    assert!(!supervisor.is_running());
}

/// readiness 실패 시 프로세스는 남지만 stop()으로 수습 가능해야 함
#[cfg(unix)]
#[tokio::test]
async fn owned_process_survives_readiness_timeout_until_stop() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let exe = dir.path().join("minerva-backend");
    std::fs::write(&exe, "#!/bin/sh\nsleep 30\n").unwrap();
    std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();

    let supervisor = BackendSupervisor::new(fast_config(
        free_port(),
        BackendCommand::Packaged { executable: exe },
    ));

    assert!(!supervisor.start().await);
    assert_eq!(supervisor.state(), State::Failed);
    let (_, code) = supervisor.last_error().unwrap();
    assert_eq!(code, "READINESS_TIMEOUT");
    assert!(supervisor.pid().is_some(), "handle is kept for reconciliation");

    supervisor.stop().await;
    assert_eq!(supervisor.pid(), None);
    assert!(!supervisor.is_running());
}

/// 설정 섹션 → SupervisorConfig 해석 경로 전체 확인
#[tokio::test]
async fn config_section_resolves_to_dev_command() {
    let port = free_port();
    let mut section = BackendSection::default();
    section.bind_host = "127.0.0.1".to_string();
    section.port = port;
    section.mode = Some("development".to_string());
    section.backend_dir = Some("/nonexistent/minerva/backend".to_string());

    let config = SupervisorConfig::resolve(&section);
    assert_eq!(config.server_url(), format!("http://127.0.0.1:{}", port));

    let supervisor = BackendSupervisor::new(config);
    assert!(!supervisor.start().await);
    assert!(!supervisor.is_running());
}
