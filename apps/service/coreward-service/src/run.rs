use crate::args::ServiceArgs;
use crate::error::ServiceError;

use supervisor_core::SERVICE_VERSION;
use supervisor_core::command::{CommandRunner, SystemCommandRunner};
use supervisor_core::daemon::{CoreManager, DaemonSettings, ServiceHandler};
use supervisor_core::ipc::IpcServer;
use supervisor_core::network::platform_configurator;

use std::sync::Arc;

use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

/// Serve the daemon endpoint until a Shutdown request or a termination signal,
/// then stop the core and restore DNS.
pub async fn run(args: ServiceArgs) -> Result<(), ServiceError> {
    info!("coreward-service {SERVICE_VERSION} starting");
    info!("IPC endpoint: {}", args.endpoint);
    info!("State directory: {}", args.state_dir.display());

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner);
    let core = Arc::new(CoreManager::new(
        DaemonSettings {
            state_dir: args.state_dir.clone(),
            ..Default::default()
        },
        platform_configurator(runner),
    ));

    // A previous instance may have died with the DNS override applied
    core.recover().await;

    let server = IpcServer::bind_with_group(&args.endpoint, args.socket_group)?;
    let shutdown = server.shutdown_token();
    let handler = Arc::new(ServiceHandler::new(Arc::clone(&core), shutdown.clone()));

    tokio::spawn(cancel_on_signal(shutdown));

    let served = server
        .serve(handler)
        .await
        .inspect_err(|e| error!("IPC server stopped with error: {e}"));

    core.shutdown().await;
    info!("coreward-service stopped");

    served.map_err(ServiceError::from)
}

#[cfg(unix)]
async fn cancel_on_signal(shutdown: CancellationToken) {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut terminate, mut interrupt) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(terminate), Ok(interrupt)) => (terminate, interrupt),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Signal handlers unavailable: {e}");
                return;
            }
        };

    tokio::select! {
        _ = terminate.recv() => info!("SIGTERM received"),
        _ = interrupt.recv() => info!("SIGINT received"),
        _ = shutdown.cancelled() => return,
    }
    shutdown.cancel();
}

#[cfg(windows)]
async fn cancel_on_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("Ctrl-C received"),
            Err(e) => {
                warn!("Ctrl-C handler unavailable: {e}");
                return;
            }
        },
        _ = shutdown.cancelled() => return,
    }
    shutdown.cancel();
}
