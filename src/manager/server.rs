//! Volume manager server

use crate::common::{ManagerConfig, Result};
use crate::manager::http::{create_router, ManagerState};
use crate::manager::VolumeManager;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ManagerServer {
    manager: Arc<VolumeManager>,
}

impl ManagerServer {
    /// Open the metadata store; nothing is bound yet
    pub fn new(config: ManagerConfig) -> Result<Self> {
        Ok(Self::with_manager(Arc::new(VolumeManager::open(config)?)))
    }

    pub fn with_manager(manager: Arc<VolumeManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<VolumeManager> {
        &self.manager
    }

    /// Serve on the configured address until Ctrl-C
    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(self.manager.config().bind_addr).await?;
        self.serve_with_shutdown(listener, shutdown_signal()).await
    }

    /// Serve on `listener` until `shutdown` resolves, then close the manager
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let config = self.manager.config();
        tracing::info!("Starting volume manager");
        tracing::info!("  HTTP API: {}", listener.local_addr()?);
        tracing::info!("  Backend: {:?} ({})", config.backend, config.db_path.display());
        tracing::info!("  Block size: {}", config.block_size);
        tracing::info!("  Replicas: {} ({:?})", config.replicas, config.spread);

        let router = create_router(ManagerState {
            manager: self.manager.clone(),
        });

        tracing::info!("✓ Volume manager ready");

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await;
        if let Err(e) = &served {
            tracing::error!("HTTP server error: {}", e);
        }

        self.manager.close()?;
        tracing::info!("Volume manager stopped");
        served.map_err(Into::into)
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
