//! Supervisor 전용 에러 타입 — 실패 원인을 구분하여 상태 API가
//! 머신 리더블 코드를 노출할 수 있게 합니다.

/// Failure modes of a single `start()` attempt.
///
/// A bound port is deliberately not represented here: an already-listening
/// backend means `start()` succeeds without spawning.
#[derive(thiserror::Error, Debug)]
pub enum SupervisorError {
    #[error("Backend executable not found: {path}. {hint}")]
    ExecutableNotFound { path: String, hint: String },

    #[error("No usable Python interpreter found (tried .venv and PATH)")]
    InterpreterNotFound,

    #[error("Failed to spawn backend process '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Backend did not become ready within {attempts} attempts")]
    ReadinessTimeout { attempts: u32 },

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl SupervisorError {
    /// 머신 리더블 에러 코드 (상태 엔드포인트용)
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ExecutableNotFound { .. } => "EXECUTABLE_NOT_FOUND",
            Self::InterpreterNotFound => "INTERPRETER_NOT_FOUND",
            Self::SpawnFailed { .. } => "SPAWN_FAILED",
            Self::ReadinessTimeout { .. } => "READINESS_TIMEOUT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
