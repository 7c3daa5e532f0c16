use async_trait::async_trait;
use chrono::NaiveDate;

use uuid::Uuid;

use crate::dto::attendance_dto::AttendanceUpsert;
use crate::dto::member_dto::UpdateMemberPayload;
use crate::error::Result;
use crate::models::attendance::{AttendanceRecord, RecordId, SubjectScope};
use crate::models::member::Member;

/// Attendance reads and writes against the managed store.
#[async_trait]
pub trait AttendanceRepository: Send + Sync + 'static {
    /// One scoped query, rows in recency order.
    async fn fetch_attendance(&self, scope: &SubjectScope) -> Result<Vec<AttendanceRecord>>;

    /// Insert-or-update keyed by `(user_id, date)`. Returns the number of
    /// rows sent.
    async fn upsert_attendance(&self, rows: &[AttendanceUpsert]) -> Result<usize>;

    async fn delete_attendance(&self, id: &RecordId) -> Result<()>;
}

/// Member directory and head counts for the admin dashboard.
#[async_trait]
pub trait DirectoryRepository: Send + Sync + 'static {
    async fn fetch_members(&self) -> Result<Vec<Member>>;

    async fn count_members(&self) -> Result<u64>;

    async fn count_present(&self, date: NaiveDate) -> Result<u64>;

    /// Applies the present fields of `update` to one member and returns
    /// the stored row. A missing id is `NotFound`.
    async fn update_member(&self, id: Uuid, update: &UpdateMemberPayload) -> Result<Member>;
}
