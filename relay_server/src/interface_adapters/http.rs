// HTTP status endpoint for operators and desktop dashboards.

use crate::interface_adapters::state::AppState;
use axum::{Json, extract::State};
use std::sync::Arc;

#[derive(Debug, serde::Serialize)]
pub struct StatusResponse {
    pub producers: usize,
    pub consumers: usize,
    pub scans_routed: u64,
    pub scans_delivered: u64,
    pub uptime_secs: u64,
}

pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    // Copy the counters out so the hub lock is not held while serializing.
    let stats = state.hub.lock().await.stats();

    Json(StatusResponse {
        producers: stats.producers,
        consumers: stats.consumers,
        scans_routed: stats.scans_routed,
        scans_delivered: stats.scans_delivered,
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}
