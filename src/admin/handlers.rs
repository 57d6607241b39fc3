use axum::{extract::State, Json};
use serde::Serialize;

use crate::http::AppState;
use crate::session::SessionSnapshot;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub backend: String,
    pub sessions: usize,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        backend: state.config.backend.address.clone(),
        sessions: state.registry().len(),
    })
}

pub async fn get_sessions(State(state): State<AppState>) -> Json<Vec<SessionSnapshot>> {
    Json(state.registry().snapshot())
}
