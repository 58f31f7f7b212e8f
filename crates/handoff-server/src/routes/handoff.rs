use crate::{ApiError, AppState};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use handoff_core::{
    ClearOutcome, Handoff, HandoffSummary, MergeOutcome, MergeSpec, MessageResponse, SaveInput,
    SaveOutcome, MAX_MESSAGES_RANGE,
};
use serde::Deserialize;
use tracing::debug;

const MERGE_SEGMENT: &str = "merge";

pub fn handoff_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/handoff",
            post(save_handoff).get(list_handoffs).delete(delete_all),
        )
        // A handoff may itself be keyed "merge"; only POST means merging
        .route(
            "/handoff/merge",
            post(merge_handoffs)
                .get(load_merge_keyed)
                .delete(delete_merge_keyed),
        )
        .route("/handoff/{key}", get(load_handoff).delete(delete_handoff))
}

async fn save_handoff(
    State(state): State<AppState>,
    payload: Result<Json<SaveInput>, JsonRejection>,
) -> Result<Json<SaveOutcome>, ApiError> {
    let Json(input) = payload?;
    debug!("Saving handoff '{}'", input.key);
    Ok(Json(state.store.save_handoff(input)?))
}

async fn list_handoffs(State(state): State<AppState>) -> Json<Vec<HandoffSummary>> {
    Json(state.store.list_handoffs())
}

#[derive(Debug, Deserialize)]
struct LoadQuery {
    max_messages: Option<String>,
}

fn parse_max_messages(raw: Option<&str>) -> Result<Option<usize>, ApiError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match raw.trim().parse::<usize>() {
        Ok(value) if MAX_MESSAGES_RANGE.contains(&value) => Ok(Some(value)),
        _ => Err(ApiError::bad_request(format!(
            "max_messages must be an integer between {} and {}",
            MAX_MESSAGES_RANGE.start(),
            MAX_MESSAGES_RANGE.end()
        ))),
    }
}

async fn load_handoff(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<LoadQuery>,
) -> Result<Json<Handoff>, ApiError> {
    let max_messages = parse_max_messages(query.max_messages.as_deref())?;
    Ok(Json(state.store.load_handoff(&key, max_messages)?))
}

async fn load_merge_keyed(
    state: State<AppState>,
    query: Query<LoadQuery>,
) -> Result<Json<Handoff>, ApiError> {
    load_handoff(state, Path(MERGE_SEGMENT.to_string()), query).await
}

async fn delete_merge_keyed(state: State<AppState>) -> Result<Json<MessageResponse>, ApiError> {
    delete_handoff(state, Path(MERGE_SEGMENT.to_string())).await
}

async fn delete_handoff(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    Ok(Json(state.store.delete_handoff(&key)?))
}

async fn delete_all(State(state): State<AppState>) -> Json<ClearOutcome> {
    Json(state.store.clear())
}

async fn merge_handoffs(
    State(state): State<AppState>,
    payload: Result<Json<MergeSpec>, JsonRejection>,
) -> Result<Json<MergeOutcome>, ApiError> {
    let Json(spec) = payload?;
    debug!("Merging handoffs {:?}", spec.keys);
    Ok(Json(state.store.merge_handoffs(spec)?))
}
