use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::time::deserialize_lenient_timestamp;

/// A row of `gym_users`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Member {
    pub fn role_label(&self) -> &str {
        match self.role.as_deref().map(str::trim) {
            Some(role) if !role.is_empty() => role,
            _ => "Member",
        }
    }

    /// Name or email (case-insensitive) or phone (verbatim substring).
    pub fn matches_search(&self, term: &str) -> bool {
        let term = term.trim();
        if term.is_empty() {
            return true;
        }
        let lowered = term.to_lowercase();
        let contains_ci = |field: &Option<String>| {
            field
                .as_deref()
                .is_some_and(|v| v.to_lowercase().contains(&lowered))
        };
        contains_ci(&self.full_name)
            || contains_ci(&self.email)
            || self.phone.as_deref().is_some_and(|p| p.contains(term))
    }
}
