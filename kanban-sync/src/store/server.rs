//! Serves the reference store on a background tokio task.
use std::net::SocketAddr;

use tower_http::cors::CorsLayer;

use super::{store_router, RemoteStore};

/// Bind and serve. Port 0 picks a free port; the bound address is returned.
pub async fn spawn_store(
    store: RemoteStore,
    bind_address: &str,
    port: u16,
) -> Result<SocketAddr, std::io::Error> {
    // Mirrors the request origin so credentialed browser requests work.
    let app = store_router(store).layer(CorsLayer::very_permissive());

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", bind_address, port)).await?;
    let addr = listener.local_addr()?;
    log::info!(target: "kanban.store", "Board store listening on http://{}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            log::error!(target: "kanban.store", "Board store exited with error: {}", e);
        }
    });

    Ok(addr)
}
