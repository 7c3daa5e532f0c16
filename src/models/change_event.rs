use serde::Serialize;

use crate::models::attendance::{AttendanceRecord, RecordId, RowKey};

/// A row-level change on the `attendance` table, already normalized from
/// whatever payload shape the transport delivered.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum ChangeEvent {
    Insert {
        record: AttendanceRecord,
    },
    Update {
        record: AttendanceRecord,
        previous: Option<RowKey>,
    },
    Delete {
        id: RecordId,
        previous: Option<RowKey>,
    },
    /// Anything that could not be understood. Consumers resynchronize.
    Unknown {
        reason: String,
    },
}

impl ChangeEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::Insert { .. } => "insert",
            ChangeEvent::Update { .. } => "update",
            ChangeEvent::Delete { .. } => "delete",
            ChangeEvent::Unknown { .. } => "unknown",
        }
    }

    /// Keys a subscriber filter can be checked against. An update is
    /// relevant both where the row now lives and where it used to.
    pub fn routing_keys(&self) -> Vec<RowKey> {
        match self {
            ChangeEvent::Insert { record } => vec![record.key()],
            ChangeEvent::Update { record, previous } => {
                let mut keys = vec![record.key()];
                keys.extend(previous.iter().copied());
                keys
            }
            ChangeEvent::Delete { previous, .. } => vec![previous.unwrap_or_default()],
            ChangeEvent::Unknown { .. } => vec![RowKey::default()],
        }
    }
}
