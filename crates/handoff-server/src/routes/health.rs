//! Identity endpoint probed by port scanning clients

use crate::AppState;
use axum::{extract::State, routing::get, Json, Router};
use handoff_core::SERVER_NAME;
use serde_json::{json, Value};

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/", get(identity))
}

async fn identity(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "name": SERVER_NAME,
        "status": "ok",
        "port": state.port,
    }))
}
