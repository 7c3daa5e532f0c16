use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::{Error, Result};
use crate::models::attendance::SubjectScope;
use crate::services::render_service::DisplayRow;
use crate::services::stats_service::AttendanceStats;
use crate::services::view_session::Notice;
use crate::utils::time::{compute_duration, parse_clock};

pub const MAX_VIEW_LIMIT: usize = 500;

/// One row as sent to the remote upsert. Every column is sent, `None` as
/// `null`, so a re-mark replaces the whole row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceUpsert {
    pub user_id: Uuid,
    pub date: NaiveDate,
    pub status: String,
    pub check_in: Option<String>,
    pub check_out: Option<String>,
    pub duration: Option<String>,
}

impl AttendanceUpsert {
    /// Validates the natural key and the clock fields and derives the
    /// duration. Nothing invalid ever reaches the remote store.
    pub fn new(
        user_id: Option<Uuid>,
        date: Option<NaiveDate>,
        status: Option<&str>,
        check_in: Option<&str>,
        check_out: Option<&str>,
    ) -> Result<Self> {
        let (Some(user_id), Some(date)) = (user_id, date) else {
            return Err(Error::InvalidRecord("missing user_id/date".to_string()));
        };
        let mut row = Self {
            user_id,
            date,
            status: status
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or("absent")
                .to_string(),
            check_in: non_blank(check_in),
            check_out: non_blank(check_out),
            duration: None,
        };
        row.duration = row.derive_duration()?;
        Ok(row)
    }

    pub fn validate_row(&self) -> Result<()> {
        if self.user_id.is_nil() {
            return Err(Error::InvalidRecord("missing user_id/date".to_string()));
        }
        self.derive_duration().map(|_| ())
    }

    fn derive_duration(&self) -> Result<Option<String>> {
        let check_in = parse_optional_clock("check_in", self.check_in.as_deref())?;
        let check_out = parse_optional_clock("check_out", self.check_out.as_deref())?;
        match (check_in, check_out) {
            (Some(start), Some(end)) => compute_duration(start, end).map(Some).ok_or_else(|| {
                Error::InvalidRecord("check_out must be later than check_in".to_string())
            }),
            _ => Ok(None),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_optional_clock(field: &str, value: Option<&str>) -> Result<Option<chrono::NaiveTime>> {
    match value {
        None => Ok(None),
        Some(raw) => parse_clock(raw)
            .map(Some)
            .ok_or_else(|| Error::InvalidRecord(format!("{} is not a valid time: {:?}", field, raw))),
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MarkAttendancePayload {
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub mark_all: bool,
    pub date: Option<NaiveDate>,
    #[validate(length(min = 1, max = 32))]
    pub status: Option<String>,
    #[validate(length(max = 16))]
    pub check_in: Option<String>,
    #[validate(length(max = 16))]
    pub check_out: Option<String>,
}

impl MarkAttendancePayload {
    /// One row per target member. `default_date` fills in a missing date
    /// (the date the day view is showing).
    pub fn into_upserts(
        self,
        default_date: Option<NaiveDate>,
        members: &[Uuid],
    ) -> Result<Vec<AttendanceUpsert>> {
        let date = self.date.or(default_date);
        let targets: Vec<Option<Uuid>> = if self.mark_all {
            if members.is_empty() {
                return Err(Error::InvalidRecord("no members to mark".to_string()));
            }
            members.iter().copied().map(Some).collect()
        } else {
            vec![self.user_id]
        };

        targets
            .into_iter()
            .map(|user_id| {
                AttendanceUpsert::new(
                    user_id,
                    date,
                    self.status.as_deref(),
                    self.check_in.as_deref(),
                    self.check_out.as_deref(),
                )
            })
            .collect()
    }
}

/// Scope as requested over HTTP. Missing parts are filled from the caller's
/// token and today's date.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScopeRequest {
    Day {
        date: Option<NaiveDate>,
    },
    Member {
        user_id: Option<Uuid>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    },
}

impl ScopeRequest {
    pub fn resolve(self, caller: Option<Uuid>, today: NaiveDate) -> Result<SubjectScope> {
        match self {
            ScopeRequest::Day { date } => Ok(SubjectScope::day(date.unwrap_or(today))),
            ScopeRequest::Member {
                user_id,
                start,
                end,
            } => {
                let user_id = user_id
                    .or(caller)
                    .ok_or_else(|| Error::BadRequest("member scope needs a user_id".to_string()))?;
                if let (Some(s), Some(e)) = (start, end) {
                    if s > e {
                        return Err(Error::BadRequest("start must not be after end".to_string()));
                    }
                }
                Ok(SubjectScope::Member {
                    user_id,
                    start,
                    end,
                })
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenSessionPayload {
    pub scope: ScopeRequest,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ViewQuery {
    #[validate(length(max = 100))]
    pub search: Option<String>,
    #[validate(range(min = 1, max = 500))]
    pub limit: Option<usize>,
}

impl ViewQuery {
    pub fn search_term(&self) -> String {
        self.search.clone().unwrap_or_default()
    }

    pub fn limit_or(&self, default_limit: usize) -> usize {
        self.limit.unwrap_or(default_limit).clamp(1, MAX_VIEW_LIMIT)
    }
}

/// Everything the presentation layer needs to draw an attendance table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceView {
    pub session_id: Uuid,
    pub scope: SubjectScope,
    pub stats: AttendanceStats,
    pub rows: Vec<DisplayRow>,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionOpened {
    pub session_id: Uuid,
    pub view: AttendanceView,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttendanceSaved {
    pub saved: usize,
    pub view: AttendanceView,
}
