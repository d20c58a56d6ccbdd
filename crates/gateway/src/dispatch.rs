//! Bulk dispatch endpoints. Requests block until the batch finishes and
//! return the full per-item report.

use axum::{extract::State, response::Json};
use serde::Deserialize;
use tracing::info;

use recado_common::types::{Address, Label};
use recado_dispatch::DispatchReport;

use crate::{contacts::resolve_address, error::ApiError, state::AppState};

fn resolve_targets(state: &AppState, raw: &[String]) -> Result<Vec<Address>, ApiError> {
    raw.iter()
        .map(|t| resolve_address(t, state.default_cc()))
        .collect()
}

#[derive(Deserialize)]
pub struct ListBody {
    pub targets: Vec<String>,
    pub message: String,
}

pub async fn send_list(
    State(state): State<AppState>,
    Json(body): Json<ListBody>,
) -> Result<Json<DispatchReport>, ApiError> {
    let targets = resolve_targets(&state, &body.targets)?;
    info!(targets = targets.len(), "list dispatch requested");
    let report = state
        .dispatcher
        .send_list(&targets, &body.message, &state.shutdown)
        .await?;
    Ok(Json(report))
}

#[derive(Deserialize)]
pub struct SegmentBody {
    pub labels: Vec<String>,
    pub message: String,
}

pub async fn send_segment(
    State(state): State<AppState>,
    Json(body): Json<SegmentBody>,
) -> Result<Json<DispatchReport>, ApiError> {
    let labels: Vec<Label> = body.labels.iter().map(|l| Label::from(l.as_str())).collect();
    info!(labels = ?body.labels, "segment dispatch requested");
    let report = state
        .dispatcher
        .send_segment(&labels, &body.message, &state.shutdown)
        .await?;
    Ok(Json(report))
}

#[derive(Deserialize)]
pub struct BroadcastBody {
    pub message: String,
}

/// One fixed text to every active contact, no label filter.
pub async fn send_broadcast(
    State(state): State<AppState>,
    Json(body): Json<BroadcastBody>,
) -> Result<Json<DispatchReport>, ApiError> {
    info!("broadcast dispatch requested");
    let report = state
        .dispatcher
        .send_active(&body.message, &state.shutdown)
        .await?;
    Ok(Json(report))
}

#[derive(Deserialize)]
pub struct CampaignBody {
    pub targets: Vec<String>,
    pub name: String,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub agent: Option<String>,
}

pub async fn send_campaign(
    State(state): State<AppState>,
    Json(body): Json<CampaignBody>,
) -> Result<Json<DispatchReport>, ApiError> {
    let targets = resolve_targets(&state, &body.targets)?;
    info!(
        targets = targets.len(),
        campaign = %body.name,
        "campaign dispatch requested"
    );
    let report = state
        .dispatcher
        .send_campaign(
            &targets,
            body.locale.as_deref(),
            &body.name,
            body.agent.as_deref(),
            &state.shutdown,
        )
        .await?;
    Ok(Json(report))
}
