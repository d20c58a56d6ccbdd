//! Callback reminder CRUD plus the upcoming-window view.

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Deserialize;

use recado_store::{Reminder, UpcomingReminder};

use crate::{contacts::resolve_address, error::ApiError, state::AppState};

#[derive(Deserialize)]
pub struct CreateBody {
    pub address: String,
    pub due_at: String,
    pub text: String,
}

pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateBody>,
) -> Result<Json<Reminder>, ApiError> {
    let address = resolve_address(&body.address, state.default_cc())?;
    let reminder = state
        .reminders
        .create(&address, &body.due_at, &body.text)
        .await?;
    Ok(Json(reminder))
}

pub async fn list_for(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Vec<Reminder>>, ApiError> {
    let address = resolve_address(&address, state.default_cc())?;
    Ok(Json(state.reminders.list_for(&address).await?))
}

#[derive(Deserialize)]
pub struct UpdateBody {
    pub due_at: String,
    pub text: String,
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.reminders.update(id, &body.due_at, &body.text).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn complete(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.reminders.complete(id).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.reminders.delete(id).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// Active reminders due within the next hour.
pub async fn upcoming(
    State(state): State<AppState>,
) -> Result<Json<Vec<UpcomingReminder>>, ApiError> {
    Ok(Json(state.reminders.upcoming().await?))
}
