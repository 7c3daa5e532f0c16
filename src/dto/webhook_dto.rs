use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::models::attendance::{AttendanceRecord, RecordId, RowKey};
use crate::models::change_event::ChangeEvent;

const OPERATION_KEYS: [&str; 4] = ["type", "eventType", "event", "action"];
const NEW_ROW_KEYS: [&str; 3] = ["record", "new", "new_record"];
const OLD_ROW_KEYS: [&str; 2] = ["old_record", "old"];

#[derive(Debug, Clone, Serialize)]
pub struct WebhookAccepted {
    pub operation: &'static str,
    pub delivered: usize,
}

/// Table the payload names, if any.
pub fn payload_table(payload: &JsonValue) -> Option<&str> {
    payload.get("table").and_then(JsonValue::as_str)
}

/// Turns any realtime or database-webhook payload spelling into a
/// `ChangeEvent`. Shapes that cannot be understood become
/// `ChangeEvent::Unknown` rather than an error.
pub fn normalize_payload(payload: &JsonValue) -> ChangeEvent {
    let Some(operation) = first_present(payload, &OPERATION_KEYS).and_then(JsonValue::as_str)
    else {
        return unknown("payload carries no operation");
    };
    let new_row = first_present(payload, &NEW_ROW_KEYS);
    let old_row = first_present(payload, &OLD_ROW_KEYS);

    match operation.to_ascii_lowercase().as_str() {
        "insert" => match parse_record(new_row) {
            Ok(record) => ChangeEvent::Insert { record },
            Err(reason) => unknown(&format!("insert without a usable row: {}", reason)),
        },
        "update" => match parse_record(new_row) {
            Ok(record) => ChangeEvent::Update {
                record,
                previous: old_row.and_then(parse_key),
            },
            Err(reason) => unknown(&format!("update without a usable row: {}", reason)),
        },
        "delete" => {
            let id = old_row
                .and_then(parse_id)
                .or_else(|| new_row.and_then(parse_id));
            match id {
                Some(id) => ChangeEvent::Delete {
                    id,
                    previous: old_row.and_then(parse_key),
                },
                None => unknown("delete without a row id"),
            }
        }
        other => unknown(&format!("unsupported operation {:?}", other)),
    }
}

fn first_present<'a>(payload: &'a JsonValue, keys: &[&str]) -> Option<&'a JsonValue> {
    keys.iter()
        .filter_map(|k| payload.get(*k))
        .find(|v| !v.is_null())
}

fn parse_record(row: Option<&JsonValue>) -> std::result::Result<AttendanceRecord, String> {
    let row = row.ok_or_else(|| "missing row".to_string())?;
    serde_json::from_value(row.clone()).map_err(|e| e.to_string())
}

fn parse_id(row: &JsonValue) -> Option<RecordId> {
    row.get("id")
        .and_then(|id| serde_json::from_value(id.clone()).ok())
}

fn parse_key(row: &JsonValue) -> Option<RowKey> {
    serde_json::from_value::<RowKey>(row.clone())
        .ok()
        .filter(|key| key.user_id.is_some() || key.date.is_some())
}

fn unknown(reason: &str) -> ChangeEvent {
    ChangeEvent::Unknown {
        reason: reason.to_string(),
    }
}
