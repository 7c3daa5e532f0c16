use crate::models::attendance::{AttendanceRecord, RecordId};

/// Attendance rows of one subject, newest date first. Rows sharing a date
/// keep arrival order with the most recent arrival in front.
#[derive(Debug, Clone, Default)]
pub struct AttendanceStore {
    records: Vec<AttendanceRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Replaced,
    Inserted,
}

impl AttendanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from rows already in recency order. Later duplicates of
    /// an id are dropped.
    pub fn from_records(records: Vec<AttendanceRecord>) -> Self {
        let mut store = Self::new();
        store.replace_all(records);
        store
    }

    pub fn replace_all(&mut self, records: Vec<AttendanceRecord>) {
        let mut unique: Vec<AttendanceRecord> = Vec::with_capacity(records.len());
        for record in records {
            if !unique.iter().any(|r| r.id == record.id) {
                unique.push(record);
            }
        }
        self.records = unique;
        self.resort();
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Prepends and re-sorts. An existing row with the same id is dropped
    /// first so ids stay unique.
    pub fn insert(&mut self, record: AttendanceRecord) {
        self.records.retain(|r| r.id != record.id);
        self.records.insert(0, record);
        self.resort();
    }

    /// Replaces the row with the same id in place, or inserts it when the id
    /// has not been seen.
    pub fn update(&mut self, record: AttendanceRecord) -> UpdateOutcome {
        match self.position(&record.id) {
            Some(idx) => {
                self.records[idx] = record;
                self.resort();
                UpdateOutcome::Replaced
            }
            None => {
                self.insert(record);
                UpdateOutcome::Inserted
            }
        }
    }

    pub fn remove(&mut self, id: &RecordId) -> Option<AttendanceRecord> {
        self.position(id).map(|idx| self.records.remove(idx))
    }

    pub fn get(&self, id: &RecordId) -> Option<&AttendanceRecord> {
        self.records.iter().find(|r| &r.id == id)
    }

    pub fn position(&self, id: &RecordId) -> Option<usize> {
        self.records.iter().position(|r| &r.id == id)
    }

    pub fn records(&self) -> &[AttendanceRecord] {
        &self.records
    }

    pub fn ids(&self) -> Vec<RecordId> {
        self.records.iter().map(|r| r.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_sorted(&self) -> bool {
        self.records.windows(2).all(|w| w[0].date >= w[1].date)
    }

    // Vec::sort_by is stable, which is what preserves arrival order on ties.
    fn resort(&mut self) {
        self.records.sort_by(|a, b| b.date.cmp(&a.date));
    }
}
