//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::errors::AgentError;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::sync::prompt::{FixedPrompter, Prompter};
use crate::workers::flow_watcher;
use crate::workers::status::{self, ServicesState, StartupProgress};

/// Run the camsync agent
pub async fn run(
    options: AppOptions,
    app_state: Arc<AppState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), AgentError> {
    info!("Initializing camsync agent...");

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    tokio::pin!(shutdown_signal);
    let started = tokio::select! {
        result = init(&options, app_state, &shutdown_tx, &mut shutdown_manager) => Some(result),
        _ = &mut shutdown_signal => None,
    };
    let Some(started) = started else {
        info!("Shutdown signal received during startup, shutting down...");
        drop(shutdown_tx);
        return shutdown_manager.shutdown().await;
    };
    if let Err(e) = started {
        error!("Failed to start agent: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    // Shutdown
    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_tx: &broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), AgentError> {
    if options.lifecycle.wait_for_services {
        await_services(options, &app_state, shutdown_tx.subscribe()).await;
    }

    match app_state.workspace.refresh_account().await {
        Ok(nickname) => info!("Signed in to the cloud as {}", nickname),
        Err(e) => warn!("Cloud account unavailable: {}", e),
    }

    match app_state.workspace.startup_sync().await {
        Ok(Some(outcome)) => info!("Initial sync: {:?}", outcome),
        Ok(None) => {}
        Err(e) => error!("Initial sync failed: {}", e),
    }

    // No one is there to answer: differences are reported, not settled
    let prompter: Arc<dyn Prompter> = Arc::new(FixedPrompter::deferred());

    if options.enable_socket_server {
        init_socket_server(options, app_state.clone(), shutdown_manager, shutdown_tx.subscribe())
            .await?;
    }

    if options.enable_flow_watcher {
        init_flow_watcher(
            options.flow_watcher.clone(),
            app_state.clone(),
            prompter,
            shutdown_manager,
            shutdown_tx.subscribe(),
        )?;
    }

    Ok(())
}

async fn await_services(
    options: &AppOptions,
    app_state: &AppState,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    info!("Waiting for device services...");
    let (progress_tx, _progress_rx) = watch::channel(StartupProgress::default());
    let state = status::wait_for_services(
        app_state.collaborators.system.clone(),
        &options.service_wait,
        progress_tx,
        tokio::time::sleep,
        Box::pin(async move {
            let _ = shutdown_rx.recv().await;
        }),
    )
    .await;

    match state {
        ServicesState::Running => info!("Device services running"),
        _ => warn!("Device services did not come up, continuing anyway"),
    }
}

fn init_flow_watcher(
    options: flow_watcher::Options,
    app_state: Arc<AppState>,
    prompter: Arc<dyn Prompter>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), AgentError> {
    info!("Initializing flow watcher...");

    let flows = app_state.collaborators.flows.clone();
    let workspace = app_state.workspace.clone();

    let watcher_handle = tokio::spawn(async move {
        flow_watcher::run(
            &options,
            flows,
            workspace,
            prompter,
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_flow_watcher_handle(watcher_handle)?;
    Ok(())
}

async fn init_socket_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), AgentError> {
    info!("Initializing local HTTP server...");

    let server_state = ServerState::new(
        app_state.workspace.clone(),
        app_state.collaborators.system.clone(),
    );

    let server_handle = serve(&options.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_socket_server_handle(server_handle)?;
    Ok(())
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    socket_server_handle: Option<JoinHandle<Result<(), AgentError>>>,
    flow_watcher_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            socket_server_handle: None,
            flow_watcher_handle: None,
        }
    }

    pub fn with_flow_watcher_handle(&mut self, handle: JoinHandle<()>) -> Result<(), AgentError> {
        if self.flow_watcher_handle.is_some() {
            return Err(AgentError::ShutdownError("flow_watcher_handle already set".to_string()));
        }
        self.flow_watcher_handle = Some(handle);
        Ok(())
    }

    pub fn with_socket_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), AgentError>>,
    ) -> Result<(), AgentError> {
        if self.socket_server_handle.is_some() {
            return Err(AgentError::ShutdownError("server_handle already set".to_string()));
        }
        self.socket_server_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), AgentError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), AgentError> {
        info!("Shutting down camsync agent...");

        // 1. Flow watcher
        if let Some(handle) = self.flow_watcher_handle.take() {
            handle.await.map_err(|e| AgentError::ShutdownError(e.to_string()))?;
        }

        // 2. Socket server
        if let Some(handle) = self.socket_server_handle.take() {
            handle.await.map_err(|e| AgentError::ShutdownError(e.to_string()))??;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
