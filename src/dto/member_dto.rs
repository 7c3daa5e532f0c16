use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::member::Member;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemberQuery {
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub role: String,
    pub status: String,
    pub joined: Option<String>,
}

impl From<&Member> for MemberResponse {
    fn from(member: &Member) -> Self {
        Self {
            id: member.id,
            name: member.full_name.clone().unwrap_or_default(),
            email: member.email.clone().unwrap_or_default(),
            phone: member.phone.clone().unwrap_or_default(),
            role: member.role_label().to_string(),
            status: "Active".to_string(),
            joined: member
                .created_at
                .map(|ts| ts.date_naive().format("%Y-%m-%d").to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberListResponse {
    pub members: Vec<MemberResponse>,
    pub total: usize,
}

/// Edit of a directory entry. Absent fields are left as they are.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateMemberPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 120))]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(email)]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 32))]
    pub role: Option<String>,
}

impl UpdateMemberPayload {
    pub fn trimmed(self) -> Self {
        let trim = |v: Option<String>| v.map(|v| v.trim().to_string());
        Self {
            full_name: trim(self.full_name),
            email: trim(self.email),
            phone: trim(self.phone),
            role: trim(self.role),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.full_name.is_none() && self.email.is_none() && self.phone.is_none() && self.role.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberUpdated {
    pub member: MemberResponse,
    pub message: String,
}
