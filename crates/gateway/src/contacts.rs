//! Contact CRUD and bulk import.

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Deserialize;
use tracing::info;

use recado_common::types::{Address, Label};
use recado_store::{Contact, ImportSummary};

use crate::{error::ApiError, state::AppState};

/// Resolve a route/body address: a full protocol address verbatim, or a
/// bare phone number normalized with the configured country code.
pub(crate) fn resolve_address(raw: &str, default_cc: Option<&str>) -> Result<Address, ApiError> {
    if raw.contains('@') {
        return Ok(Address::parse(raw)?);
    }
    Ok(Address::from_phone(raw, default_cc)?)
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Contact>>, ApiError> {
    Ok(Json(state.registry.list_all().await?))
}

#[derive(Deserialize)]
pub struct SetLabelBody {
    pub label: String,
    #[serde(default)]
    pub archived: bool,
}

pub async fn set_label(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Json(body): Json<SetLabelBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let address = resolve_address(&address, state.default_cc())?;
    let label = Label::from(body.label);
    state
        .registry
        .set_label(&address, &label, body.archived)
        .await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Deserialize)]
pub struct SetNoteBody {
    pub note: String,
}

pub async fn set_note(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Json(body): Json<SetNoteBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let address = resolve_address(&address, state.default_cc())?;
    state.registry.set_note(&address, &body.note).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Deserialize)]
pub struct RenameBody {
    pub name: String,
}

pub async fn rename(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Json(body): Json<RenameBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let address = resolve_address(&address, state.default_cc())?;
    state.registry.rename(&address, &body.name).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let address = resolve_address(&address, state.default_cc())?;
    state.registry.delete(&address).await?;
    info!(address = %address, "contact deleted");
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Deserialize)]
pub struct ImportBody {
    pub numbers: Vec<String>,
}

/// Bulk import of phone numbers. Unparseable entries count as errors in
/// the summary instead of failing the request.
pub async fn import(
    State(state): State<AppState>,
    Json(body): Json<ImportBody>,
) -> Result<Json<ImportResult>, ApiError> {
    let mut addresses = Vec::with_capacity(body.numbers.len());
    let mut invalid = 0usize;
    for number in &body.numbers {
        match resolve_address(number, state.default_cc()) {
            Ok(address) => addresses.push(address),
            Err(_) => invalid += 1,
        }
    }
    let summary = state.registry.import(&addresses).await?;
    info!(
        total = body.numbers.len(),
        created = summary.created,
        invalid,
        "contact import"
    );
    Ok(Json(ImportResult { summary, invalid }))
}

#[derive(serde::Serialize)]
pub struct ImportResult {
    #[serde(flatten)]
    pub summary: ImportSummary,
    pub invalid: usize,
}
