// HTTP state endpoint
// GET /state returns the latest LocationState as JSON.

use std::io;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::state::LocationState;

async fn get_state(State(rx): State<watch::Receiver<LocationState>>) -> Json<LocationState> {
    Json(*rx.borrow())
}

pub fn router(rx: watch::Receiver<LocationState>) -> Router {
    Router::new().route("/state", get(get_state)).with_state(rx)
}

/// Serve the state endpoint on an already bound listener until the process exits
pub async fn serve(listener: TcpListener, rx: watch::Receiver<LocationState>) -> io::Result<()> {
    info!("HTTP server on {}", listener.local_addr()?);
    axum::serve(listener, router(rx)).await
}
