//! Backend process handle — direct spawning with stdio forwarding.
//!
//! Wraps the single spawned backend with:
//! - stdout/stderr capture re-emitted through `tracing` (uvicorn-style
//!   log level parsing; stdout defaults to info, stderr to error)
//! - exit observation via a `watch` channel so the supervisor's exit
//!   handler stays the only place that mutates lifecycle state
//! - cross-platform graceful/forced termination and the shutdown
//!   sequencer (graceful signal, bounded grace period, forced kill)

use regex::Regex;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use tokio::sync::watch;

use super::error::SupervisorError;

/// Matches the level keyword in uvicorn ("INFO:     ...") and python
/// logging ("... - ERROR - ...") output lines.
const LEVEL_PATTERN: &str = r"(?P<level>CRITICAL|FATAL|ERROR|WARNING|WARN|INFO|DEBUG|TRACE):?\s";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogSource {
    Stdout,
    Stderr,
}

/// The spawned backend, owned exclusively by the supervisor.
pub struct BackendProcess {
    pub pid: u32,
    #[allow(dead_code)]
    running_tx: Arc<watch::Sender<bool>>,
    running_rx: watch::Receiver<bool>,
}

impl BackendProcess {
    /// Spawn the backend and attach the output/exit observers.
    ///
    /// Does not wait for readiness; the caller polls the HTTP surface
    /// separately.
    pub fn spawn(
        program: &str,
        args: &[String],
        working_dir: &Path,
    ) -> Result<Self, SupervisorError> {
        let mut cmd = TokioCommand::new(program);
        cmd.args(args)
            .current_dir(working_dir)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(false);

        // Windows: hide console window
        apply_creation_flags(&mut cmd);

        let mut child = cmd.spawn().map_err(|e| SupervisorError::SpawnFailed {
            program: program.to_string(),
            source: e,
        })?;

        let pid = child
            .id()
            .ok_or_else(|| anyhow::anyhow!("Failed to get PID of spawned backend"))?;

        let (running_tx, running_rx) = watch::channel(true);
        let running_tx = Arc::new(running_tx);

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // ── stdout reader ────────────────────────────────────
        if let Some(stdout) = stdout {
            tokio::spawn(async move {
                let reader = BufReader::new(stdout);
                let mut lines = reader.lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    forward_line(LogSource::Stdout, &line);
                }
            });
        }

        // ── stderr reader ────────────────────────────────────
        if let Some(stderr) = stderr {
            tokio::spawn(async move {
                let reader = BufReader::new(stderr);
                let mut lines = reader.lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    forward_line(LogSource::Stderr, &line);
                }
            });
        }

        // ── process waiter ───────────────────────────────────
        {
            let running = running_tx.clone();
            tokio::spawn(async move {
                match child.wait().await {
                    Ok(status) => tracing::info!("Backend process exited with {}", status),
                    Err(e) => tracing::error!("Failed to wait for backend process: {}", e),
                }
                let _ = running.send(false);
            });
        }

        tracing::info!("Backend process started with PID {}", pid);

        Ok(Self {
            pid,
            running_tx,
            running_rx,
        })
    }

    /// Whether the process is still running.
    pub fn is_running(&self) -> bool {
        *self.running_rx.borrow()
    }

    /// Resolve once the process has exited (immediately if it already has).
    pub async fn exited(&self) {
        let mut rx = self.running_rx.clone();
        while *rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    /// Send a termination signal (크로스 플랫폼).
    ///
    /// `force: false` requests a cooperative shutdown (SIGTERM); `true`
    /// kills outright (SIGKILL). Windows has no cooperative equivalent,
    /// so both map to `TerminateProcess`.
    pub fn terminate(&self, force: bool) -> anyhow::Result<()> {
        let signal_name = if force { "KILL" } else { "TERM" };
        tracing::info!("Sending {} to backend process (pid {})", signal_name, self.pid);

        #[cfg(target_os = "windows")]
        {
            use winapi::um::handleapi::CloseHandle;
            use winapi::um::processthreadsapi::{OpenProcess, TerminateProcess};
            use winapi::um::winnt::PROCESS_TERMINATE;

            unsafe {
                let handle = OpenProcess(PROCESS_TERMINATE, 0, self.pid);
                if handle.is_null() {
                    return Err(anyhow::anyhow!("Failed to open process {}", self.pid));
                }

                let exit_code = if force { 1 } else { 0 };
                let result = TerminateProcess(handle, exit_code);
                CloseHandle(handle);

                if result == 0 {
                    return Err(anyhow::anyhow!("TerminateProcess failed for {}", self.pid));
                }
            }
        }

        #[cfg(not(target_os = "windows"))]
        {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;

            let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
            signal::kill(Pid::from_raw(self.pid as i32), signal)
                .map_err(|e| anyhow::anyhow!("Failed to send {} to {}: {}", signal_name, self.pid, e))?;
        }

        Ok(())
    }

    /// Shutdown sequencer: graceful signal, bounded grace period, forced
    /// kill. Always converges on process absence; never fails outward.
    ///
    /// The forced path returns once the kill is issued — the exit waiter
    /// observes the actual exit regardless of which path triggered it.
    pub async fn shutdown(&self, grace: Duration) {
        if !self.is_running() {
            return;
        }

        if let Err(e) = self.terminate(false) {
            tracing::warn!("Graceful termination signal failed: {}", e);
        }

        tokio::select! {
            _ = self.exited() => {
                tracing::info!("Backend exited within the grace period");
            }
            _ = tokio::time::sleep(grace) => {
                tracing::warn!("Backend still alive after {:?}, force killing", grace);
                if let Err(e) = self.terminate(true) {
                    tracing::warn!("Force kill failed: {}", e);
                }
            }
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────

/// Apply platform-specific flags to hide the console window on Windows.
#[cfg(target_os = "windows")]
pub(crate) fn apply_creation_flags(cmd: &mut TokioCommand) {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x08000000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(target_os = "windows"))]
pub(crate) fn apply_creation_flags(_cmd: &mut TokioCommand) {}

fn level_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| match Regex::new(LEVEL_PATTERN) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!("Invalid backend log pattern: {}", e);
            None
        }
    })
    .as_ref()
}

/// Re-emit one line of backend output through tracing.
fn forward_line(source: LogSource, line: &str) {
    let level = parse_log_level(line).unwrap_or(match source {
        LogSource::Stdout => LogLevel::Info,
        LogSource::Stderr => LogLevel::Error,
    });
    match level {
        LogLevel::Info => tracing::info!(target: "backend", "{}", line),
        LogLevel::Warn => tracing::warn!(target: "backend", "{}", line),
        LogLevel::Error => tracing::error!(target: "backend", "{}", line),
        LogLevel::Debug => tracing::debug!(target: "backend", "{}", line),
    }
}

/// Extract the log level keyword from a backend output line, if any.
fn parse_log_level(line: &str) -> Option<LogLevel> {
    let re = level_regex()?;
    let caps = re.captures(line)?;
    let level = caps.name("level")?;
    Some(match level.as_str() {
        "ERROR" | "FATAL" | "CRITICAL" => LogLevel::Error,
        "WARN" | "WARNING" => LogLevel::Warn,
        "DEBUG" | "TRACE" => LogLevel::Debug,
        _ => LogLevel::Info,
    })
}

// ─── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uvicorn_levels() {
        assert_eq!(
            parse_log_level("INFO:     Uvicorn running on http://0.0.0.0:50051"),
            Some(LogLevel::Info)
        );
        assert_eq!(
            parse_log_level("WARNING:  StatReload detected changes"),
            Some(LogLevel::Warn)
        );
        assert_eq!(
            parse_log_level("ERROR:    Application startup failed"),
            Some(LogLevel::Error)
        );
        // python logging 포맷
        assert_eq!(
            parse_log_level("2025-01-01 12:00:00,123 - app.db - DEBUG - opening connection"),
            Some(LogLevel::Debug)
        );
        assert_eq!(parse_log_level("Initializing database..."), None);
    }

    #[test]
    fn test_unparseable_stderr_defaults_to_error() {
        // forward_line 자체는 tracing으로 나가므로 기본값 규칙만 검증
        let level = parse_log_level("some raw traceback text").unwrap_or(LogLevel::Error);
        assert_eq!(level, LogLevel::Error);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_and_observe_exit() {
        let proc = BackendProcess::spawn(
            "sh",
            &["-c".to_string(), "exit 0".to_string()],
            &std::env::temp_dir(),
        )
        .unwrap();
        assert!(proc.pid > 0);

        tokio::time::timeout(Duration::from_secs(5), proc.exited())
            .await
            .expect("process should exit quickly");
        assert!(!proc.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let result = BackendProcess::spawn(
            "/nonexistent/minerva-backend",
            &[],
            &std::env::temp_dir(),
        );
        match result {
            Err(SupervisorError::SpawnFailed { program, .. }) => {
                assert!(program.contains("minerva-backend"));
            }
            other => panic!("expected SpawnFailed, got {:?}", other.map(|p| p.pid)),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_graceful_shutdown() {
        let proc = BackendProcess::spawn(
            "sh",
            &["-c".to_string(), "sleep 30".to_string()],
            &std::env::temp_dir(),
        )
        .unwrap();
        assert!(proc.is_running());

        proc.shutdown(Duration::from_secs(5)).await;

        tokio::time::timeout(Duration::from_secs(5), proc.exited())
            .await
            .expect("process should be gone after graceful shutdown");
        assert!(!proc.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_forced_kill_after_grace() {
        // SIGTERM을 무시하는 프로세스 → grace 초과 후 SIGKILL
        let proc = BackendProcess::spawn(
            "sh",
            &["-c".to_string(), "trap '' TERM; sleep 30".to_string()],
            &std::env::temp_dir(),
        )
        .unwrap();
        // give the shell a moment to install the trap
        tokio::time::sleep(Duration::from_millis(200)).await;

        proc.shutdown(Duration::from_millis(300)).await;

        tokio::time::timeout(Duration::from_secs(5), proc.exited())
            .await
            .expect("process should be force killed");
        assert!(!proc.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shutdown_on_dead_process_is_noop() {
        let proc = BackendProcess::spawn(
            "sh",
            &["-c".to_string(), "exit 0".to_string()],
            &std::env::temp_dir(),
        )
        .unwrap();
        proc.exited().await;

        // already dead — must return immediately without error
        proc.shutdown(Duration::from_secs(5)).await;
        assert!(!proc.is_running());
    }
}
