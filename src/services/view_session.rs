use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dto::attendance_dto::{AttendanceUpsert, AttendanceView};
use crate::error::{Error, Result};
use crate::models::attendance::{RecordId, SubjectScope};
use crate::models::change_event::ChangeEvent;
use crate::services::attendance_store::AttendanceStore;
use crate::services::fetch_service::fetch_scope;
use crate::services::merge_service::{apply_change, MergeOutcome};
use crate::services::realtime_service::{RealtimeHub, Subscription, SubscriptionFilter};
use crate::services::render_service::render_with_placeholder;
use crate::services::repository::AttendanceRepository;
use crate::services::stats_service::aggregate;

const MAX_NOTICES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// Short user-facing message produced by a session, drained on the next
/// view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// One attendance view: a subject scope, the local store mirroring it and
/// the realtime subscription that keeps the store current.
///
/// The subscription is always opened before the fetch that fills the store,
/// so a change committed between the two is either in the fetched rows or
/// queued on the subscription. Replaying it is harmless since inserts with a
/// known id replace the row.
pub struct ViewSession<R: AttendanceRepository> {
    id: Uuid,
    repo: Arc<R>,
    hub: RealtimeHub,
    scope: SubjectScope,
    store: AttendanceStore,
    subscription: Option<Subscription>,
    notices: VecDeque<Notice>,
}

impl<R: AttendanceRepository> ViewSession<R> {
    pub async fn open(repo: Arc<R>, hub: RealtimeHub, scope: SubjectScope) -> Self {
        let subscription = hub.subscribe(SubscriptionFilter::for_scope(&scope));
        let mut session = Self {
            id: Uuid::new_v4(),
            repo,
            hub,
            scope,
            store: AttendanceStore::new(),
            subscription: Some(subscription),
            notices: VecDeque::new(),
        };
        info!(session_id = %session.id, scope = %session.scope, "view session opened");
        session.resync().await;
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn scope(&self) -> &SubjectScope {
        &self.scope
    }

    pub fn store(&self) -> &AttendanceStore {
        &self.store
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Switches the view to another subject. The old subscription is torn
    /// down before the new one exists, so nothing addressed to the previous
    /// subject can reach the store afterwards.
    pub async fn set_scope(&mut self, scope: SubjectScope) {
        self.teardown();
        self.store.clear();
        info!(session_id = %self.id, from = %self.scope, to = %scope, "view scope changed");
        self.scope = scope;
        self.subscription = Some(self.hub.subscribe(SubscriptionFilter::for_scope(&self.scope)));
        self.resync().await;
    }

    /// Replaces the store with a fresh fetch. Returns false when the fetch
    /// failed and the view fell back to an empty list.
    pub async fn resync(&mut self) -> bool {
        let outcome = fetch_scope(self.repo.as_ref(), &self.scope).await;
        let ok = outcome.is_ok();
        self.store.replace_all(outcome.records);
        if !ok {
            self.push_notice(Notice::error("Failed to load attendance."));
        }
        debug!(session_id = %self.id, rows = self.store.len(), ok, "view resynchronized");
        ok
    }

    pub async fn apply(&mut self, event: ChangeEvent) -> MergeOutcome {
        let outcome = apply_change(&mut self.store, &self.scope, event);
        if outcome == MergeOutcome::ResyncRequired {
            self.resync().await;
        } else if outcome.changed_store() {
            self.push_notice(Notice::info("Attendance updated in real-time."));
        }
        debug!(session_id = %self.id, ?outcome, "change applied");
        outcome
    }

    /// Waits for the next change addressed to this view. Returns `None` and
    /// drops the subscription once the hub has shut down.
    pub async fn next_event(&mut self) -> Option<ChangeEvent> {
        let subscription = self.subscription.as_mut()?;
        let event = subscription.recv().await;
        if event.is_none() {
            warn!(session_id = %self.id, "realtime hub closed, view no longer live");
            self.subscription = None;
        }
        event
    }

    /// Applies every change already queued on the subscription.
    pub async fn drain_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Some(event) = self.subscription.as_mut().and_then(|s| s.try_recv()) {
            self.apply(event).await;
            applied += 1;
        }
        applied
    }

    /// Sends validated rows to the remote upsert, then refetches. Rows are
    /// checked before any remote call, so one bad row rejects the batch.
    pub async fn save(&mut self, rows: Vec<AttendanceUpsert>) -> Result<usize> {
        if rows.is_empty() {
            return Err(Error::InvalidRecord("nothing to save".to_string()));
        }
        for row in &rows {
            row.validate_row()?;
        }

        let saved = match self.repo.upsert_attendance(&rows).await {
            Ok(saved) => saved,
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "attendance save failed");
                self.push_notice(Notice::error(format!("Failed to save attendance: {}", e)));
                return Err(e);
            }
        };
        let message = if saved == 1 {
            "Attendance saved.".to_string()
        } else {
            format!("Saved attendance for {} users.", saved)
        };
        self.push_notice(Notice::success(message));
        self.resync().await;
        Ok(saved)
    }

    pub async fn delete(&mut self, id: &RecordId) -> Result<()> {
        if let Err(e) = self.repo.delete_attendance(id).await {
            warn!(session_id = %self.id, %id, error = %e, "attendance delete failed");
            self.push_notice(Notice::error(format!("Failed to delete record: {}", e)));
            return Err(e);
        }
        self.push_notice(Notice::success("Attendance record deleted."));
        self.resync().await;
        Ok(())
    }

    /// Renders the current store and hands over pending notices.
    pub fn view(&mut self, filter: &str, limit: usize) -> AttendanceView {
        let records = self.store.records();
        AttendanceView {
            session_id: self.id,
            scope: self.scope.clone(),
            stats: aggregate(records),
            rows: render_with_placeholder(records, filter, limit, self.scope.empty_message()),
            notices: self.take_notices(),
        }
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }

    fn push_notice(&mut self, notice: Notice) {
        if self.notices.back() == Some(&notice) {
            return;
        }
        if self.notices.len() == MAX_NOTICES {
            self.notices.pop_front();
        }
        self.notices.push_back(notice);
    }

    fn teardown(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            if let Err(e) = self.hub.unsubscribe(subscription) {
                warn!(session_id = %self.id, error = %e, "subscription teardown failed");
            }
        }
    }
}

impl<R: AttendanceRepository> Drop for ViewSession<R> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::models::attendance::AttendanceRecord;
    use crate::services::render_service::DisplayRow;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryRepository {
        rows: Mutex<Vec<AttendanceRecord>>,
        fetches: AtomicUsize,
        upserts: AtomicUsize,
    }

    #[async_trait]
    impl AttendanceRepository for MemoryRepository {
        async fn fetch_attendance(&self, scope: &SubjectScope) -> Result<Vec<AttendanceRecord>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let rows = self.rows.lock().unwrap();
            Ok(rows.iter().filter(|r| scope.contains(r)).cloned().collect())
        }

        async fn upsert_attendance(&self, rows: &[AttendanceUpsert]) -> Result<usize> {
            self.upserts.fetch_add(1, Ordering::SeqCst);
            Ok(rows.len())
        }

        async fn delete_attendance(&self, id: &RecordId) -> Result<()> {
            self.rows.lock().unwrap().retain(|r| &r.id != id);
            Ok(())
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    }

    fn record(id: i64, user_id: Uuid, status: &str) -> AttendanceRecord {
        AttendanceRecord {
            id: RecordId::from(id),
            user_id,
            date: day(),
            status: Some(status.into()),
            check_in: None,
            check_out: None,
            duration: None,
            created_at: None,
            user_name: Some(format!("Member {}", id)),
        }
    }

    #[tokio::test]
    async fn open_subscribes_then_loads() {
        let repo = Arc::new(MemoryRepository::default());
        repo.rows.lock().unwrap().push(record(1, Uuid::new_v4(), "present"));
        let hub = RealtimeHub::new(8);

        let session = ViewSession::open(repo.clone(), hub.clone(), SubjectScope::day(day())).await;
        assert!(session.is_subscribed());
        assert_eq!(hub.active_channels().len(), 1);
        assert_eq!(session.store().len(), 1);
        assert_eq!(repo.fetches.load(Ordering::SeqCst), 1);

        drop(session);
        assert!(hub.active_channels().is_empty());
    }

    #[tokio::test]
    async fn live_changes_raise_a_notice() {
        let repo = Arc::new(MemoryRepository::default());
        let hub = RealtimeHub::new(8);
        let mut session = ViewSession::open(repo, hub.clone(), SubjectScope::day(day())).await;

        hub.publish(ChangeEvent::Insert {
            record: record(7, Uuid::new_v4(), "present"),
        });
        assert_eq!(session.drain_pending().await, 1);

        let view = session.view("", 10);
        assert_eq!(view.stats.total, 1);
        assert_eq!(view.notices, vec![Notice::info("Attendance updated in real-time.")]);
        assert!(session.take_notices().is_empty());
    }

    #[tokio::test]
    async fn invalid_rows_never_reach_the_remote() {
        let repo = Arc::new(MemoryRepository::default());
        let mut session =
            ViewSession::open(repo.clone(), RealtimeHub::new(8), SubjectScope::day(day())).await;

        let bad = AttendanceUpsert {
            user_id: Uuid::new_v4(),
            date: day(),
            status: "present".into(),
            check_in: Some("11:00".into()),
            check_out: Some("09:00".into()),
            duration: None,
        };
        assert!(matches!(
            session.save(vec![bad]).await,
            Err(Error::InvalidRecord(_))
        ));
        assert!(matches!(
            session.save(Vec::new()).await,
            Err(Error::InvalidRecord(_))
        ));
        assert_eq!(repo.upserts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn deleting_the_last_row_leaves_the_placeholder() {
        let repo = Arc::new(MemoryRepository::default());
        repo.rows.lock().unwrap().push(record(3, Uuid::new_v4(), "present"));
        let mut session =
            ViewSession::open(repo.clone(), RealtimeHub::new(8), SubjectScope::day(day())).await;

        session.delete(&RecordId::from(3)).await.unwrap();
        let view = session.view("", 10);
        assert_eq!(
            view.rows,
            vec![DisplayRow::Placeholder {
                message: "No attendance records for this date.".into()
            }]
        );
        assert_eq!(view.stats.rate, 0);
        assert_eq!(view.notices, vec![Notice::success("Attendance record deleted.")]);
    }

    #[tokio::test]
    async fn scope_change_replaces_the_subscription() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let repo = Arc::new(MemoryRepository::default());
        let hub = RealtimeHub::new(8);
        let mut session = ViewSession::open(repo, hub.clone(), SubjectScope::member(alice)).await;

        session.set_scope(SubjectScope::member(bob)).await;
        hub.publish(ChangeEvent::Insert {
            record: record(1, alice, "present"),
        });
        assert_eq!(session.drain_pending().await, 0);
        assert!(session.store().is_empty());

        let channels = hub.active_channels();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].1, SubscriptionFilter::UserId(bob));
    }
}
