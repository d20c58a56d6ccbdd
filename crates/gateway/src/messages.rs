//! Message history endpoints.

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;

use recado_store::MessageRecord;

use crate::{contacts::resolve_address, error::ApiError, state::AppState};

#[derive(Deserialize)]
pub struct RecentQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

/// Conversation history for one contact, oldest first.
pub async fn conversation(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Vec<MessageRecord>>, ApiError> {
    let address = resolve_address(&address, state.default_cc())?;
    Ok(Json(state.messages.list_for(&address).await?))
}

/// Most recent messages across all conversations, newest first.
pub async fn recent(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<Vec<MessageRecord>>, ApiError> {
    Ok(Json(state.messages.recent(query.limit.min(500)).await?))
}
