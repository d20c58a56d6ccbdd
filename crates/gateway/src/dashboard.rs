//! Dashboard aggregate queries. Read-only SQL against the shared pool;
//! nothing here is consumed by the core flows.

use axum::{extract::State, response::Json};
use serde::Serialize;
use sqlx::Row;

use crate::{error::ApiError, state::AppState};

#[derive(Serialize)]
pub struct Metrics {
    pub active_contacts: i64,
    pub messages_today: i64,
    pub new_today: i64,
    /// Share of active contacts labeled `analista`, percent.
    pub conversion_rate: f64,
}

pub async fn metrics(State(state): State<AppState>) -> Result<Json<Metrics>, ApiError> {
    let active_contacts: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM contacts WHERE archived = 0")
            .fetch_one(&state.pool)
            .await
            .map_err(recado_store::Error::from)?;
    let messages_today: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE date(sent_at) = date('now')")
            .fetch_one(&state.pool)
            .await
            .map_err(recado_store::Error::from)?;
    let new_today: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM contacts
         WHERE label = 'nuevo' AND date(last_interaction) = date('now')",
    )
    .fetch_one(&state.pool)
    .await
    .map_err(recado_store::Error::from)?;
    let converted: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM contacts WHERE archived = 0 AND label = 'analista'",
    )
    .fetch_one(&state.pool)
    .await
    .map_err(recado_store::Error::from)?;

    let conversion_rate = if active_contacts > 0 {
        converted as f64 / active_contacts as f64 * 100.0
    } else {
        0.0
    };

    Ok(Json(Metrics {
        active_contacts,
        messages_today,
        new_today,
        conversion_rate,
    }))
}

#[derive(Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: i64,
}

pub async fn labels(State(state): State<AppState>) -> Result<Json<Vec<LabelCount>>, ApiError> {
    let rows = sqlx::query(
        "SELECT label, COUNT(*) AS count FROM contacts
         WHERE archived = 0 GROUP BY label ORDER BY count DESC",
    )
    .fetch_all(&state.pool)
    .await
    .map_err(recado_store::Error::from)?;
    Ok(Json(
        rows.iter()
            .map(|row| LabelCount {
                label: row.get("label"),
                count: row.get("count"),
            })
            .collect(),
    ))
}

#[derive(Serialize)]
pub struct ActivityDay {
    pub day: String,
    pub messages: i64,
    pub conversations: i64,
}

/// Per-day message and conversation counts over the last seven days, for
/// the dashboard chart.
pub async fn activity_weekly(
    State(state): State<AppState>,
) -> Result<Json<Vec<ActivityDay>>, ApiError> {
    let rows = sqlx::query(
        "SELECT date(sent_at) AS day,
                COUNT(*) AS messages,
                COUNT(DISTINCT address) AS conversations
         FROM messages
         WHERE sent_at >= date('now', '-6 days')
         GROUP BY date(sent_at)
         ORDER BY day ASC",
    )
    .fetch_all(&state.pool)
    .await
    .map_err(recado_store::Error::from)?;
    Ok(Json(
        rows.iter()
            .map(|row| ActivityDay {
                day: row.get("day"),
                messages: row.get("messages"),
                conversations: row.get("conversations"),
            })
            .collect(),
    ))
}

#[derive(Serialize)]
pub struct ActivityEntry {
    pub address: String,
    pub display_name: Option<String>,
    pub direction: String,
    pub body: String,
    pub sent_at: String,
}

/// Most recent messages joined with contact names.
pub async fn activity(State(state): State<AppState>) -> Result<Json<Vec<ActivityEntry>>, ApiError> {
    let rows = sqlx::query(
        "SELECT m.address, m.direction, m.body, m.sent_at, c.display_name
         FROM messages m LEFT JOIN contacts c ON c.address = m.address
         ORDER BY m.sent_at DESC, m.id DESC LIMIT 20",
    )
    .fetch_all(&state.pool)
    .await
    .map_err(recado_store::Error::from)?;
    Ok(Json(
        rows.iter()
            .map(|row| ActivityEntry {
                address: row.get("address"),
                display_name: row.get("display_name"),
                direction: row.get("direction"),
                body: row.get("body"),
                sent_at: row.get("sent_at"),
            })
            .collect(),
    ))
}
