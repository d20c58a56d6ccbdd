//! Quick-reply CRUD: canned texts the operator inserts into replies.

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Deserialize;

use recado_store::QuickReply;

use crate::{error::ApiError, state::AppState};

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<QuickReply>>, ApiError> {
    Ok(Json(state.quick_replies.list().await?))
}

#[derive(Deserialize)]
pub struct ReplyBody {
    pub text: String,
}

pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<ReplyBody>,
) -> Result<Json<QuickReply>, ApiError> {
    if body.text.trim().is_empty() {
        return Err(ApiError::bad_request("reply text required"));
    }
    Ok(Json(state.quick_replies.create(&body.text).await?))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<ReplyBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.text.trim().is_empty() {
        return Err(ApiError::bad_request("reply text required"));
    }
    state.quick_replies.update(id, &body.text).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.quick_replies.delete(id).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}
