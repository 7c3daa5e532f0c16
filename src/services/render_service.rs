use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::attendance::{AttendanceRecord, RecordId};
use crate::utils::time::{format_clock, format_display_date};

pub const DEFAULT_EMPTY_MESSAGE: &str = "No attendance records found";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisplayRow {
    Record(RecordRow),
    Placeholder { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordRow {
    pub id: RecordId,
    pub user_id: Uuid,
    pub user_name: String,
    pub date: String,
    pub check_in: String,
    pub check_out: String,
    pub duration: String,
    pub status: String,
    pub status_class: String,
}

impl From<&AttendanceRecord> for RecordRow {
    fn from(record: &AttendanceRecord) -> Self {
        Self {
            id: record.id.clone(),
            user_id: record.user_id,
            user_name: record.display_name().to_string(),
            date: format_display_date(record.date),
            check_in: format_clock(record.check_in.as_deref()),
            check_out: format_clock(record.check_out.as_deref()),
            duration: record
                .duration
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .unwrap_or("--")
                .to_string(),
            status: record.status_label().to_string(),
            status_class: status_class(record.status_label()).to_string(),
        }
    }
}

pub fn status_class(status: &str) -> &'static str {
    match status.trim().to_lowercase().as_str() {
        "present" => "success",
        "absent" | "" => "warning",
        _ => "info",
    }
}

pub fn render(records: &[AttendanceRecord], filter: &str, limit: usize) -> Vec<DisplayRow> {
    render_with_placeholder(records, filter, limit, DEFAULT_EMPTY_MESSAGE)
}

/// Rows matching `filter` against the display name, in store order and cut
/// at `limit`. Never returns an empty list.
pub fn render_with_placeholder(
    records: &[AttendanceRecord],
    filter: &str,
    limit: usize,
    empty_message: &str,
) -> Vec<DisplayRow> {
    let needle = filter.trim().to_lowercase();
    let rows: Vec<DisplayRow> = records
        .iter()
        .filter(|r| needle.is_empty() || r.display_name().to_lowercase().contains(&needle))
        .take(limit)
        .map(|r| DisplayRow::Record(RecordRow::from(r)))
        .collect();

    if rows.is_empty() {
        return vec![DisplayRow::Placeholder {
            message: empty_message.to_string(),
        }];
    }
    rows
}
