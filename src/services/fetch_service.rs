use tracing::{debug, warn};

use crate::error::Error;
use crate::models::attendance::{AttendanceRecord, SubjectScope};
use crate::services::repository::AttendanceRepository;

/// Result of one scoped read. A failed read still yields a (empty) record
/// list; the error travels alongside for the caller to surface.
#[derive(Debug)]
pub struct FetchOutcome {
    pub records: Vec<AttendanceRecord>,
    pub error: Option<Error>,
}

impl FetchOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Loads the rows of `scope`. Never fails; rows outside the scope are
/// dropped so a loose remote filter cannot leak other subjects in.
pub async fn fetch_scope<R: AttendanceRepository>(repo: &R, scope: &SubjectScope) -> FetchOutcome {
    match repo.fetch_attendance(scope).await {
        Ok(records) => {
            let fetched = records.len();
            let records: Vec<AttendanceRecord> =
                records.into_iter().filter(|r| scope.contains(r)).collect();
            if records.len() != fetched {
                debug!(
                    scope = %scope,
                    dropped = fetched - records.len(),
                    "fetch returned rows outside the scope"
                );
            }
            FetchOutcome {
                records,
                error: None,
            }
        }
        Err(e) => {
            warn!(scope = %scope, error = %e, transient = e.is_transient(), "attendance fetch failed");
            FetchOutcome {
                records: Vec::new(),
                error: Some(e),
            }
        }
    }
}
