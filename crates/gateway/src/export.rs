//! Contact export as CSV.

use axum::{
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::{error::ApiError, state::AppState};

/// All contacts as a CSV download.
pub async fn contacts_csv(State(state): State<AppState>) -> Result<Response, ApiError> {
    let contacts = state.registry.list_all().await?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    let write_err = |e: csv::Error| ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: format!("csv export failed: {e}"),
    };

    writer
        .write_record([
            "address",
            "display_name",
            "label",
            "archived",
            "note",
            "last_interaction",
        ])
        .map_err(write_err)?;
    for contact in contacts {
        writer
            .write_record([
                contact.address.as_str(),
                &contact.display_name,
                contact.label.as_str(),
                if contact.archived { "1" } else { "0" },
                &contact.note,
                &contact.last_interaction,
            ])
            .map_err(write_err)?;
    }
    let bytes = writer.into_inner().map_err(|e| ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: format!("csv export failed: {e}"),
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"contacts.csv\"",
            ),
        ],
        bytes,
    )
        .into_response())
}
