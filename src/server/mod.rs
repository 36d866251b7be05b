//! HTTP and WebSocket surface of the session engine.

pub mod handlers;
pub mod routes;
pub mod ws;

use crate::core::{HistoryArchive, SessionHandle};
use crate::utils::error::Result;
use std::net::SocketAddr;
use std::sync::Arc;

pub use routes::create_router;

/// Shared by every request handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub handle: SessionHandle,
    pub archive: Arc<dyn HistoryArchive>,
}

impl AppState {
    pub fn new(handle: SessionHandle, archive: Arc<dyn HistoryArchive>) -> Self {
        Self { handle, archive }
    }
}

/// Binds `addr` and serves until `shutdown` resolves.
pub async fn serve<F>(addr: SocketAddr, state: AppState, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("🚀 Listening on {}", listener.local_addr()?);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
