use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::utils::time::deserialize_lenient_timestamp;

/// Row identifier as issued by the remote store. PostgREST sends bigint
/// keys as numbers while webhooks may send them as strings, so both are
/// accepted and kept in string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum IntOrString {
            Int(i64),
            String(String),
        }

        match IntOrString::deserialize(deserializer)? {
            IntOrString::Int(i) => Ok(RecordId(i.to_string())),
            IntOrString::String(s) if !s.trim().is_empty() => Ok(RecordId(s.trim().to_string())),
            IntOrString::String(_) => Err(serde::de::Error::custom("empty record id")),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        RecordId(value.to_string())
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        RecordId(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        RecordId(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: RecordId,
    pub user_id: Uuid,
    pub date: NaiveDate,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub check_in: Option<String>,
    #[serde(default)]
    pub check_out: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

impl AttendanceRecord {
    pub fn is_present(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.trim().eq_ignore_ascii_case("present"))
    }

    pub fn status_label(&self) -> &str {
        match self.status.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s,
            _ => "Absent",
        }
    }

    pub fn display_name(&self) -> &str {
        match self.user_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => "Unknown",
        }
    }

    pub fn key(&self) -> RowKey {
        RowKey {
            user_id: Some(self.user_id),
            date: Some(self.date),
        }
    }
}

/// Routing columns of a row that may only be partially known, e.g. the
/// `old_record` of a delete notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowKey {
    pub user_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
}

/// Which attendance rows a view displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubjectScope {
    Day {
        date: NaiveDate,
    },
    Member {
        user_id: Uuid,
        #[serde(default)]
        start: Option<NaiveDate>,
        #[serde(default)]
        end: Option<NaiveDate>,
    },
}

impl SubjectScope {
    pub fn day(date: NaiveDate) -> Self {
        SubjectScope::Day { date }
    }

    pub fn member(user_id: Uuid) -> Self {
        SubjectScope::Member {
            user_id,
            start: None,
            end: None,
        }
    }

    pub fn contains(&self, record: &AttendanceRecord) -> bool {
        match self {
            SubjectScope::Day { date } => record.date == *date,
            SubjectScope::Member {
                user_id,
                start,
                end,
            } => {
                record.user_id == *user_id
                    && start.map_or(true, |s| record.date >= s)
                    && end.map_or(true, |e| record.date <= e)
            }
        }
    }

    /// A partially known row can only be ruled out by a column it carries.
    pub fn may_contain(&self, key: &RowKey) -> bool {
        match self {
            SubjectScope::Day { date } => key.date.map_or(true, |d| d == *date),
            SubjectScope::Member { user_id, .. } => key.user_id.map_or(true, |u| u == *user_id),
        }
    }

    pub fn empty_message(&self) -> &'static str {
        match self {
            SubjectScope::Day { .. } => "No attendance records for this date.",
            SubjectScope::Member { .. } => "No attendance records found",
        }
    }
}

impl fmt::Display for SubjectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectScope::Day { date } => write!(f, "day:{}", date),
            SubjectScope::Member {
                user_id,
                start,
                end,
            } => {
                write!(f, "member:{}", user_id)?;
                if start.is_some() || end.is_some() {
                    let fmt_bound =
                        |d: &Option<NaiveDate>| d.map(|d| d.to_string()).unwrap_or_default();
                    write!(f, "[{}..{}]", fmt_bound(start), fmt_bound(end))?;
                }
                Ok(())
            }
        }
    }
}
