use serde::{Deserialize, Serialize};

use crate::models::attendance::AttendanceRecord;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceStats {
    pub total: usize,
    pub present: usize,
    pub absent: usize,
    /// Whole percent, half rounds up.
    pub rate: u32,
}

pub fn aggregate(records: &[AttendanceRecord]) -> AttendanceStats {
    let total = records.len();
    let present = records.iter().filter(|r| r.is_present()).count();
    let rate = if total > 0 {
        ((present * 200 + total) / (total * 2)) as u32
    } else {
        0
    };
    AttendanceStats {
        total,
        present,
        absent: total - present,
        rate,
    }
}
