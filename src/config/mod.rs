//! Daemon configuration — `config/global.toml` + environment overrides.
//!
//! The `[backend]` section is resolved once at boot into an immutable
//! [`SupervisorConfig`]. Run mode (packaged executable vs. Python script)
//! becomes a tagged [`BackendCommand`] variant at that point, so the rest
//! of the daemon never branches on mode strings.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Executable name of the bundled backend build.
#[cfg(target_os = "windows")]
const BACKEND_EXE_NAME: &str = "minerva-backend.exe";
#[cfg(not(target_os = "windows"))]
const BACKEND_EXE_NAME: &str = "minerva-backend";

/// Entry script of the backend source tree (development mode).
const BACKEND_ENTRY: &str = "main.py";

#[derive(Deserialize, Debug, Clone, Default)]
pub struct GlobalConfig {
    #[serde(default)]
    pub backend: BackendSection,
}

/// Raw `[backend]` section as written in config/global.toml.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct BackendSection {
    pub bind_host: String,
    pub port: u16,
    /// "production" | "development"; unset → MINERVA_MODE env, then build profile
    pub mode: Option<String>,
    /// Override for the packaged executable path
    pub executable_path: Option<String>,
    /// Override for the backend source directory (development mode)
    pub backend_dir: Option<String>,
    pub ready_max_attempts: u32,
    pub ready_interval_ms: u64,
    pub ready_attempt_timeout_ms: u64,
    pub shutdown_grace_ms: u64,
    pub restart_settle_ms: u64,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 50051,
            mode: None,
            executable_path: None,
            backend_dir: None,
            ready_max_attempts: 30,
            ready_interval_ms: 1000,
            ready_attempt_timeout_ms: 1000,
            shutdown_grace_ms: 5000,
            restart_settle_ms: 1000,
        }
    }
}

impl GlobalConfig {
    /// Load config/global.toml. Missing file or unparseable content falls
    /// back to defaults — the daemon must come up even with no config.
    pub fn load() -> anyhow::Result<Self> {
        let s = std::fs::read_to_string("config/global.toml").unwrap_or_default();
        let cfg: Self = toml::from_str(&s).unwrap_or_default();
        Ok(cfg)
    }
}

/// How the backend gets launched. Selected once at construction; carries
/// everything the launcher needs for its variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCommand {
    /// Production: compiled PyInstaller executable
    Packaged { executable: PathBuf },
    /// Development: interpreter + entry script out of the source tree
    Script { backend_dir: PathBuf, entry: String },
}

/// Immutable supervisor configuration, resolved once at application boot.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub bind_host: String,
    pub port: u16,
    pub command: BackendCommand,
    pub ready_max_attempts: u32,
    pub ready_interval: Duration,
    pub ready_attempt_timeout: Duration,
    pub shutdown_grace: Duration,
    pub restart_settle: Duration,
}

impl SupervisorConfig {
    /// Resolve the raw config section into the immutable supervisor config.
    pub fn resolve(section: &BackendSection) -> Self {
        let port = if section.port == 0 {
            tracing::warn!("backend.port 0 is not a usable port, falling back to 50051");
            50051
        } else {
            section.port
        };

        let command = match resolve_mode(section) {
            RunMode::Production => {
                let executable = section
                    .executable_path
                    .as_ref()
                    .map(PathBuf::from)
                    .unwrap_or_else(default_executable_path);
                BackendCommand::Packaged { executable }
            }
            RunMode::Development => {
                let backend_dir = section
                    .backend_dir
                    .as_ref()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("./backend"));
                BackendCommand::Script {
                    backend_dir,
                    entry: BACKEND_ENTRY.to_string(),
                }
            }
        };

        Self {
            bind_host: section.bind_host.clone(),
            port,
            command,
            ready_max_attempts: section.ready_max_attempts,
            ready_interval: Duration::from_millis(section.ready_interval_ms),
            ready_attempt_timeout: Duration::from_millis(section.ready_attempt_timeout_ms),
            shutdown_grace: Duration::from_millis(section.shutdown_grace_ms),
            restart_settle: Duration::from_millis(section.restart_settle_ms),
        }
    }

    /// Base URL of the backend. Config-derived, valid regardless of run state.
    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.bind_host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    Production,
    Development,
}

/// Mode precedence: config value → MINERVA_MODE env → build profile.
fn resolve_mode(section: &BackendSection) -> RunMode {
    let explicit = section
        .mode
        .clone()
        .or_else(|| std::env::var("MINERVA_MODE").ok());

    match explicit.as_deref() {
        Some("production") | Some("prod") => RunMode::Production,
        Some("development") | Some("dev") => RunMode::Development,
        Some(other) => {
            tracing::warn!("Unknown backend mode '{}', using development", other);
            RunMode::Development
        }
        // 배포 빌드는 production, 그 외에는 development
        None => {
            if cfg!(debug_assertions) {
                RunMode::Development
            } else {
                RunMode::Production
            }
        }
    }
}

/// Default packaged executable location: `backend/` next to the daemon binary.
fn default_executable_path() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    exe_dir.join("backend").join(BACKEND_EXE_NAME)
}
