// Status server - Router assembly and a stoppable axum serve task
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{health_check, ingestion_stats};
use anyhow::Context;
use axum::{Router, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/stats", get(ingestion_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Running status endpoint. Dropping it without calling `shutdown` leaves the
/// task serving until the runtime stops.
pub struct StatusServer {
    local_addr: SocketAddr,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<std::io::Result<()>>,
}

impl StatusServer {
    pub async fn start(addr: SocketAddr, state: Arc<AppState>) -> anyhow::Result<Self> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind status endpoint on {}", addr))?;
        let local_addr = listener.local_addr()?;

        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router(state))
                .with_graceful_shutdown(async move {
                    let _ = stopped.await;
                })
                .await
        });

        tracing::info!(addr = %local_addr, "status endpoint listening");
        Ok(Self {
            local_addr,
            stop,
            handle,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signal graceful shutdown and wait up to `grace` for in-flight requests
    /// to finish. A serve error or a stuck drain comes back as an error.
    pub async fn shutdown(self, grace: Duration) -> anyhow::Result<()> {
        let _ = self.stop.send(());
        match tokio::time::timeout(grace, self.handle).await {
            Ok(Ok(result)) => result.context("status endpoint failed"),
            Ok(Err(e)) => Err(anyhow::anyhow!("status endpoint task failed: {}", e)),
            Err(_) => anyhow::bail!("status endpoint did not stop within {:?}", grace),
        }
    }
}
