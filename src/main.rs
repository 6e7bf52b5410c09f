use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use minerva_core::config::{GlobalConfig, SupervisorConfig};
use minerva_core::ipc::IPCServer;
use minerva_core::supervisor::BackendSupervisor;

const DEFAULT_IPC_ADDR: &str = "127.0.0.1:57464";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    tracing::info!("Minerva core daemon starting");

    let global = GlobalConfig::load()?;
    let config = SupervisorConfig::resolve(&global.backend);
    let supervisor = Arc::new(BackendSupervisor::new(config));

    // Initialize the backend early in startup
    if supervisor.start().await {
        tracing::info!("Backend server running at: {}", supervisor.server_url());
    } else {
        tracing::warn!("Backend service failed to initialize");
    }

    let listen_addr =
        std::env::var("MINERVA_IPC_ADDR").unwrap_or_else(|_| DEFAULT_IPC_ADDR.to_string());
    let ipc_server = IPCServer::new(supervisor.clone(), &listen_addr);

    // Graceful shutdown: Ctrl+C / SIGTERM 시 IPC 서버를 내리고 백엔드 정리
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            wait_for_termination_signal().await;
            tracing::info!("Shutdown signal received, cleaning up...");
            shutdown.cancel();
        });
    }

    if let Err(e) = ipc_server.start(shutdown.clone()).await {
        tracing::error!("IPC server error: {}", e);
    }

    // The backend must be gone before the daemon process exits.
    supervisor.stop().await;

    tracing::info!("Minerva core daemon shutting down");
    Ok(())
}

async fn wait_for_termination_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                tokio::signal::ctrl_c().await.ok();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}
