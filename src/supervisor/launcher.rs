//! Backend command resolution and spawning.
//!
//! Resolves the concrete command line out of the configured
//! [`BackendCommand`] variant and spawns it:
//! - Packaged: verify the executable exists (repairing a missing execute
//!   bit on Unix), run it from its own directory
//! - Script: prefer the interpreter inside the backend's `.venv`, fall
//!   back to the system interpreter on PATH, run from the source tree

use std::path::{Path, PathBuf};
use tokio::process::Command;

use super::backend_process::{apply_creation_flags, BackendProcess};
use super::error::SupervisorError;
use crate::config::{BackendCommand, SupervisorConfig};

/// Fully resolved backend command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

/// Resolve and spawn the backend. Fails when the command cannot be
/// resolved or the OS spawn fails; never waits for readiness.
pub async fn launch(config: &SupervisorConfig) -> Result<BackendProcess, SupervisorError> {
    let resolved = resolve_command(config).await?;

    tracing::info!(
        "Starting backend: {} {}",
        resolved.program,
        resolved.args.join(" ")
    );
    tracing::info!("Working directory: {}", resolved.working_dir.display());

    BackendProcess::spawn(&resolved.program, &resolved.args, &resolved.working_dir)
}

/// Resolve the command line for the configured variant.
pub async fn resolve_command(
    config: &SupervisorConfig,
) -> Result<ResolvedCommand, SupervisorError> {
    let host_port_args = [
        "--host".to_string(),
        config.bind_host.clone(),
        "--port".to_string(),
        config.port.to_string(),
    ];

    match &config.command {
        BackendCommand::Packaged { executable } => {
            if !executable.exists() {
                return Err(SupervisorError::ExecutableNotFound {
                    path: executable.display().to_string(),
                    hint: "Build it first with 'make build' in backend/, or place it in \
                           backend/ next to the daemon binary."
                        .to_string(),
                });
            }

            ensure_execute_permission(executable);

            // Run from the executable's own directory
            let working_dir = executable
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));

            Ok(ResolvedCommand {
                program: executable.to_string_lossy().into_owned(),
                args: host_port_args.to_vec(),
                working_dir,
            })
        }
        BackendCommand::Script { backend_dir, entry } => {
            let interpreter = resolve_interpreter(backend_dir).await?;

            let mut args = vec![entry.clone()];
            args.extend(host_port_args);

            Ok(ResolvedCommand {
                program: interpreter,
                args,
                working_dir: backend_dir.clone(),
            })
        }
    }
}

/// Best-effort repair of a missing execute bit (Unix only). If the chmod
/// fails the spawn will fail on its own and surface as `SpawnFailed`.
#[cfg(unix)]
fn ensure_execute_permission(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let Ok(metadata) = std::fs::metadata(path) else {
        return;
    };
    if metadata.permissions().mode() & 0o111 != 0 {
        return;
    }

    tracing::warn!(
        "Setting execute permissions on backend executable: {}",
        path.display()
    );
    let mut perms = metadata.permissions();
    perms.set_mode(0o755);
    if let Err(e) = std::fs::set_permissions(path, perms) {
        tracing::warn!("Failed to set execute permissions: {}", e);
    }
}

#[cfg(not(unix))]
fn ensure_execute_permission(_path: &Path) {}

/// Interpreter preference: `.venv` inside the backend tree, then PATH.
async fn resolve_interpreter(backend_dir: &Path) -> Result<String, SupervisorError> {
    let venv_python = venv_python_path(backend_dir);
    if is_executable_file(&venv_python) {
        tracing::info!("Using Python from virtualenv: {}", venv_python.display());
        return Ok(venv_python.to_string_lossy().into_owned());
    }

    tracing::info!("Could not find Python in .venv, falling back to system python");
    detect_system_python().await
}

#[cfg(target_os = "windows")]
fn venv_python_path(backend_dir: &Path) -> PathBuf {
    backend_dir.join(".venv").join("Scripts").join("python.exe")
}

#[cfg(not(target_os = "windows"))]
fn venv_python_path(backend_dir: &Path) -> PathBuf {
    backend_dir.join(".venv").join("bin").join("python")
}

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}

/// 시스템 PATH에서 Python 인터프리터 탐지
async fn detect_system_python() -> Result<String, SupervisorError> {
    let candidates = ["python", "python3", "py"];
    for cmd_name in candidates {
        let mut cmd = Command::new(cmd_name);
        cmd.arg("--version");
        apply_creation_flags(&mut cmd);

        if let Ok(output) = cmd.output().await {
            if output.status.success() {
                tracing::info!("Using system Python: {}", cmd_name);
                return Ok(cmd_name.to_string());
            }
        }
    }
    Err(SupervisorError::InterpreterNotFound)
}
