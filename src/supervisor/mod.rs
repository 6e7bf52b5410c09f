//! Backend supervisor — the single owner of the backend's lifecycle.
//!
//! Composes the port probe, launcher, readiness waiter and shutdown
//! sequencer into `start` / `stop` / `restart`, and is the only place
//! that mutates lifecycle state. Exit notifications from the spawned
//! process funnel through one watcher task per spawn, guarded by a
//! generation counter so a watcher left over from a previous process
//! cannot clobber the state of its successor.

pub mod backend_process;
pub mod error;
pub mod launcher;
pub mod port_probe;
pub mod readiness;
pub mod state_machine;

use std::sync::{Arc, Mutex, MutexGuard};

use backend_process::BackendProcess;
use error::SupervisorError;
use readiness::ReadinessWaiter;
use state_machine::{State, StateMachine};

use crate::config::{BackendCommand, SupervisorConfig};

struct Inner {
    machine: StateMachine,
    /// The one owned backend process; `None` when nothing is owned
    /// (idle, failed, or an externally started backend on the port).
    process: Option<Arc<BackendProcess>>,
    /// Bumped on every spawn and every completed stop; a watcher whose
    /// generation no longer matches must not touch state.
    generation: u64,
    last_error: Option<SupervisorError>,
}

pub struct BackendSupervisor {
    config: SupervisorConfig,
    inner: Arc<Mutex<Inner>>,
}

impl BackendSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            inner: Arc::new(Mutex::new(Inner {
                machine: StateMachine::new(),
                process: None,
                generation: 0,
                last_error: None,
            })),
        }
    }

    /// Mutex 락 획득 헬퍼 — poisoned여도 상태 머신은 계속 동작해야 함
    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Supervisor state lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Start the backend.
    ///
    /// Idempotent: a call while already `Starting` or `Running` returns
    /// success immediately without a second spawn — the state flags are
    /// the mutual-exclusion mechanism. Returns `false` when the launch
    /// or the readiness wait fails; the error is logged and recorded.
    pub async fn start(&self) -> bool {
        {
            let mut inner = self.lock();
            match inner.machine.state {
                State::Starting | State::Running => {
                    tracing::info!("Backend service is already running or starting");
                    return true;
                }
                State::Stopping => {
                    tracing::warn!("start() called while backend is stopping, ignoring");
                    return false;
                }
                State::Idle | State::Failed => {}
            }
            if let Err(e) = inner.machine.transition(State::Starting) {
                tracing::error!("Cannot begin backend start: {}", e);
                return false;
            }
            inner.last_error = None;
        }

        // Something already answers on the port? Assume an externally
        // started backend and use it instead of spawning a second one.
        if port_probe::is_port_bound(&self.config.bind_host, self.config.port).await {
            tracing::info!(
                "Backend already running on port {}, adopting it",
                self.config.port
            );
            let mut inner = self.lock();
            let _ = inner.machine.transition(State::Running);
            return true;
        }

        tracing::info!("Starting backend server...");
        let process = match launcher::launch(&self.config).await {
            Ok(process) => Arc::new(process),
            Err(e) => {
                tracing::error!("Failed to start backend server: {}", e);
                let mut inner = self.lock();
                let _ = inner.machine.transition(State::Failed);
                inner.last_error = Some(e);
                return false;
            }
        };

        let generation = {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.process = Some(process.clone());
            inner.generation
        };
        self.spawn_exit_watcher(process, generation);

        let waiter = ReadinessWaiter::from_config(&self.config);
        match waiter.wait_until_ready(&self.server_url()).await {
            Ok(result) => {
                let mut inner = self.lock();
                if inner.machine.state == State::Starting {
                    let _ = inner.machine.transition(State::Running);
                    tracing::info!(
                        "Backend server started on {} ({} readiness attempt(s))",
                        self.server_url(),
                        result.attempts
                    );
                    true
                } else {
                    // exit watcher가 먼저 상태를 정리한 경우
                    tracing::warn!("Backend exited while confirming readiness");
                    false
                }
            }
            Err(e) => {
                tracing::error!("Failed to start backend server: {}", e);
                let mut inner = self.lock();
                if inner.machine.state == State::Starting {
                    let _ = inner.machine.transition(State::Failed);
                }
                // The spawned process is deliberately left running; the
                // owned handle stays so a later stop() can reconcile it.
                inner.last_error = Some(e);
                false
            }
        }
    }

    /// Stop the backend.
    ///
    /// Safe no-op when no owned process exists — including an externally
    /// started backend adopted via the port probe, which this supervisor
    /// never kills. Always converges; never fails outward.
    pub async fn stop(&self) {
        let process = {
            let mut inner = self.lock();
            let Some(process) = inner.process.clone() else {
                tracing::info!("Backend server is not running (no owned process)");
                return;
            };
            if inner.machine.can_transition(&State::Stopping) {
                let _ = inner.machine.transition(State::Stopping);
            }
            process
        };

        tracing::info!("Stopping backend server...");
        process.shutdown(self.config.shutdown_grace).await;

        let mut inner = self.lock();
        // Invalidate the exit watcher for this spawn: the forced-kill path
        // does not re-wait, so finalize here instead of racing it.
        inner.generation += 1;
        inner.process = None;
        if inner.machine.state == State::Stopping {
            let _ = inner.machine.transition(State::Idle);
        }
        tracing::info!("Backend server stopped");
    }

    /// Stop, give the OS a moment to release the port, start again.
    pub async fn restart(&self) -> bool {
        tracing::info!("Restarting backend server...");
        self.stop().await;
        tokio::time::sleep(self.config.restart_settle).await;
        self.start().await
    }

    pub fn is_running(&self) -> bool {
        self.lock().machine.state == State::Running
    }

    pub fn state(&self) -> State {
        self.lock().machine.state.clone()
    }

    /// PID of the owned process, if any. An adopted external backend has
    /// no PID here.
    pub fn pid(&self) -> Option<u32> {
        self.lock().process.as_ref().map(|p| p.pid)
    }

    /// Base URL of the backend. Config-derived, valid regardless of state.
    pub fn server_url(&self) -> String {
        self.config.server_url()
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// "production" | "development", from the resolved command variant.
    pub fn mode_label(&self) -> &'static str {
        match self.config.command {
            BackendCommand::Packaged { .. } => "production",
            BackendCommand::Script { .. } => "development",
        }
    }

    /// Last recorded start failure as (message, machine-readable code).
    pub fn last_error(&self) -> Option<(String, &'static str)> {
        self.lock()
            .last_error
            .as_ref()
            .map(|e| (e.to_string(), e.error_code()))
    }

    /// Funnel the process's exit event into the single state-owning unit.
    fn spawn_exit_watcher(&self, process: Arc<BackendProcess>, generation: u64) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            process.exited().await;

            let mut guard = match inner.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if guard.generation != generation {
                // restart/stop 이후의 낡은 watcher
                return;
            }
            guard.process = None;
            match guard.machine.state {
                State::Starting => {
                    tracing::warn!("Backend exited before becoming ready");
                    let _ = guard.machine.transition(State::Failed);
                }
                State::Running => {
                    tracing::warn!("Backend exited unexpectedly");
                    let _ = guard.machine.transition(State::Idle);
                }
                State::Stopping => {
                    let _ = guard.machine.transition(State::Idle);
                }
                State::Idle | State::Failed => {}
            }
        });
    }
}
