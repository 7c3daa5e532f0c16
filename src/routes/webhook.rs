use axum::{extract::State, http::StatusCode, Json};
use serde_json::Value as JsonValue;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::{
    dto::webhook_dto::{normalize_payload, payload_table, WebhookAccepted},
    error::{Error, Result},
    models::change_event::ChangeEvent,
    AppState,
};

const ATTENDANCE_TABLE: &str = "attendance";

/// Database webhook for the `attendance` table. Every payload that passes
/// the secret check is published, unrecognized shapes included, so open
/// views resynchronize instead of silently missing a change.
pub async fn handle_attendance_change(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(payload): Json<JsonValue>,
) -> Result<(StatusCode, Json<WebhookAccepted>)> {
    verify_secret(&headers, &state.config.webhook_secret)?;
    if let Some(table) = payload_table(&payload) {
        if table != ATTENDANCE_TABLE {
            return Err(Error::BadRequest(format!("unexpected table {:?}", table)));
        }
    }

    let event = normalize_payload(&payload);
    if let ChangeEvent::Unknown { reason } = &event {
        warn!(%reason, "unrecognized attendance change payload");
    }
    let operation = event.kind();
    let delivered = state.realtime.publish(event);
    info!(operation, delivered, "attendance change received");

    Ok((
        StatusCode::ACCEPTED,
        Json(WebhookAccepted {
            operation,
            delivered,
        }),
    ))
}

fn verify_secret(headers: &axum::http::HeaderMap, expected: &str) -> Result<()> {
    let Some(secret_hdr) = headers.get("x-webhook-secret") else {
        return Err(Error::Unauthorized("missing_webhook_secret".into()));
    };
    let provided = secret_hdr
        .to_str()
        .map_err(|_| Error::Unauthorized("invalid_secret_header".into()))?;
    if ConstantTimeEq::ct_eq(provided.as_bytes(), expected.as_bytes()).into() {
        Ok(())
    } else {
        Err(Error::Unauthorized("invalid_webhook_secret".into()))
    }
}
