//! Direct media sends from the conversation view.
//!
//! The CRM uploads the file content as base64; the handler stores a copy
//! under the media root, hands the bytes to the session, and records the
//! outbound message with its attachment.

use axum::{extract::State, response::Json};
use base64::Engine as _;
use serde::Deserialize;
use tracing::{info, warn};

use {
    recado_common::types::Direction,
    recado_inbound::blob::extension_for,
    recado_session::{MediaKind, MessageSender, SendPayload},
    recado_store::{Attachment, NewMessage},
};

use crate::{contacts::resolve_address, error::ApiError, state::AppState};

#[derive(Deserialize)]
pub struct MediaBody {
    pub to: String,
    pub content_base64: String,
    pub mime: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

pub async fn send_audio(
    state: State<AppState>,
    Json(body): Json<MediaBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    send_media(state, MediaKind::Audio, body).await
}

pub async fn send_image(
    state: State<AppState>,
    Json(body): Json<MediaBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    send_media(state, MediaKind::Image, body).await
}

pub async fn send_document(
    state: State<AppState>,
    Json(body): Json<MediaBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    send_media(state, MediaKind::Document, body).await
}

/// Body recorded for the message log when the upload carries no caption.
fn default_body(kind: MediaKind, file_name: Option<&str>) -> String {
    match kind {
        MediaKind::Audio => "Audio".to_string(),
        MediaKind::Image => "Image".to_string(),
        MediaKind::Video => "Video".to_string(),
        MediaKind::Document => file_name
            .map(str::to_string)
            .unwrap_or_else(|| "Document".to_string()),
    }
}

async fn send_media(
    State(state): State<AppState>,
    kind: MediaKind,
    body: MediaBody,
) -> Result<Json<serde_json::Value>, ApiError> {
    let address = resolve_address(&body.to, state.default_cc())?;
    let content = base64::engine::general_purpose::STANDARD
        .decode(&body.content_base64)
        .map_err(|e| ApiError::bad_request(format!("invalid media content: {e}")))?;
    if content.is_empty() {
        return Err(ApiError::bad_request("empty media content"));
    }
    if !state.session.is_connected() {
        return Err(recado_session::Error::NotConnected.into());
    }

    state.registry.ensure_exists(&address).await?;

    let extension = extension_for(kind, Some(&body.mime));
    let path = state
        .blobs
        .write(kind, &content, &extension)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let mut payload = SendPayload::media(kind, &content, body.mime.clone());
    if let Some(caption) = &body.caption {
        payload = payload.with_caption(caption.clone());
    }
    if let Some(name) = &body.file_name {
        payload = payload.with_file_name(name.clone());
    }
    state.session.send(&address, &payload).await?;

    let text = body
        .caption
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| default_body(kind, body.file_name.as_deref()));
    // The media went out; a failed log write must not fail the request.
    if let Err(e) = state
        .messages
        .append(NewMessage::with_attachment(
            address.clone(),
            Direction::Outbound,
            text,
            Attachment {
                path: path.clone(),
                mime: body.mime,
            },
        ))
        .await
    {
        warn!(address = %address, error = %e, "outbound media not persisted");
    }

    info!(address = %address, kind = %kind.as_str(), %path, "media sent");
    Ok(Json(serde_json::json!({ "ok": true, "path": path })))
}
