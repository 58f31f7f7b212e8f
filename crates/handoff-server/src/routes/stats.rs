use crate::AppState;
use axum::{extract::State, routing::get, Json, Router};
use handoff_core::StoreStats;

pub fn stats_routes() -> Router<AppState> {
    Router::new().route("/stats", get(stats))
}

async fn stats(State(state): State<AppState>) -> Json<StoreStats> {
    Json(state.store.stats_snapshot())
}
