use tracing::debug;

use crate::models::attendance::{AttendanceRecord, SubjectScope};
use crate::models::change_event::ChangeEvent;
use crate::services::attendance_store::{AttendanceStore, UpdateOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Updated,
    Removed,
    /// Delete of an id the store never held.
    Unchanged,
    /// The row belongs to another subject.
    Ignored,
    ResyncRequired,
}

impl MergeOutcome {
    pub fn changed_store(self) -> bool {
        matches!(
            self,
            MergeOutcome::Inserted | MergeOutcome::Updated | MergeOutcome::Removed
        )
    }
}

/// Applies one change to the store of `scope`.
pub fn apply_change(
    store: &mut AttendanceStore,
    scope: &SubjectScope,
    event: ChangeEvent,
) -> MergeOutcome {
    let outcome = match event {
        ChangeEvent::Insert { mut record } => {
            if !scope.contains(&record) {
                MergeOutcome::Ignored
            } else {
                inherit_user_name(store, &mut record);
                store.insert(record);
                MergeOutcome::Inserted
            }
        }
        ChangeEvent::Update { mut record, .. } => {
            if !scope.contains(&record) {
                // The row may have moved out of this subject.
                match store.remove(&record.id) {
                    Some(_) => MergeOutcome::Removed,
                    None => MergeOutcome::Ignored,
                }
            } else {
                inherit_user_name(store, &mut record);
                match store.update(record) {
                    UpdateOutcome::Replaced => MergeOutcome::Updated,
                    UpdateOutcome::Inserted => MergeOutcome::Inserted,
                }
            }
        }
        ChangeEvent::Delete { id, .. } => match store.remove(&id) {
            Some(_) => MergeOutcome::Removed,
            None => MergeOutcome::Unchanged,
        },
        ChangeEvent::Unknown { reason } => {
            debug!(%reason, scope = %scope, "unrecognized change, resync required");
            MergeOutcome::ResyncRequired
        }
    };
    debug_assert!(store.is_sorted());
    outcome
}

/// Change notifications carry bare table rows, without the member name the
/// fetch joins in. Reuse a name the store already knows for that member.
fn inherit_user_name(store: &AttendanceStore, record: &mut AttendanceRecord) {
    if record.user_name.is_some() {
        return;
    }
    let known = store
        .get(&record.id)
        .and_then(|r| r.user_name.clone())
        .or_else(|| {
            store
                .records()
                .iter()
                .find(|r| r.user_id == record.user_id && r.user_name.is_some())
                .and_then(|r| r.user_name.clone())
        });
    record.user_name = known;
}
