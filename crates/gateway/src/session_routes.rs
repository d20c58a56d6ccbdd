//! Session status, notification slot, and campaign listing.

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Serialize;

use recado_session::SessionState;

use crate::{error::ApiError, state::AppState};

#[derive(Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Pairing payload to render as a QR code, when pairing is pending.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr: Option<String>,
}

pub async fn status(State(state): State<AppState>) -> Json<SessionStatus> {
    Json(SessionStatus {
        state: state.session.state(),
        qr: state.session.pending_qr(),
    })
}

pub async fn latest_notification(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match state.notifications.latest() {
        Some(notification) => Ok(Json(serde_json::json!({ "notification": notification }))),
        None => Ok(Json(serde_json::json!({ "notification": null }))),
    }
}

pub async fn clear_notification(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.notifications.clear();
    Json(serde_json::json!({ "ok": true }))
}

pub async fn campaigns(
    State(state): State<AppState>,
    Path(locale): Path<String>,
) -> Json<Vec<String>> {
    Json(state.catalog.names(Some(&locale)))
}
