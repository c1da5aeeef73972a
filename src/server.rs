//! Read-only HTTP view of the pipeline: `GET /` returns the latest
//! `{history, executed}` document.

use std::net::SocketAddr;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use eyre::Result;
use log::{error, info};
use serde_json::Value;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};

/// Router serving the status published on `status`
pub fn router(status: watch::Receiver<Value>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(status_handler))
        .layer(cors)
        .with_state(status)
}

async fn status_handler(State(status): State<watch::Receiver<Value>>) -> Json<Value> {
    Json(status.borrow().clone())
}

/// Binds `port` on all interfaces and serves in the background
///
/// # Errors
/// * The port can not be bound
pub async fn start_server(status: watch::Receiver<Value>, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("server: status on http://{addr}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router(status)).await {
            error!("server: {e}");
        }
    });
    Ok(())
}
