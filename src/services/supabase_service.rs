use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::dto::attendance_dto::AttendanceUpsert;
use crate::dto::member_dto::UpdateMemberPayload;
use crate::error::{Error, Result};
use crate::models::attendance::{AttendanceRecord, RecordId, SubjectScope};
use crate::models::member::Member;
use crate::services::repository::{AttendanceRepository, DirectoryRepository};

const ATTENDANCE_TABLE: &str = "attendance";
const MEMBERS_TABLE: &str = "gym_users";
const ATTENDANCE_SELECT: &str =
    "id,user_id,date,status,check_in,check_out,duration,created_at,gym_users(full_name)";
const MEMBER_SELECT: &str = "id,email,full_name,phone,role,created_at";
const RECENCY_ORDER: &str = "date.desc,created_at.desc";

/// Attendance row with the member name embedded by PostgREST.
#[derive(Debug, Deserialize)]
struct AttendanceRow {
    #[serde(flatten)]
    record: AttendanceRecord,
    #[serde(default)]
    gym_users: Option<EmbeddedMember>,
}

#[derive(Debug, Deserialize)]
struct EmbeddedMember {
    full_name: Option<String>,
}

impl From<AttendanceRow> for AttendanceRecord {
    fn from(row: AttendanceRow) -> Self {
        let mut record = row.record;
        if record.user_name.is_none() {
            record.user_name = row.gym_users.and_then(|m| m.full_name);
        }
        record
    }
}

#[derive(Debug, Deserialize)]
struct PostgrestError {
    message: Option<String>,
    details: Option<String>,
}

/// PostgREST client for the Supabase project.
#[derive(Clone)]
pub struct SupabaseService {
    client: Client,
    rest_url: Url,
    api_key: String,
}

impl SupabaseService {
    pub fn new(base_url: &str, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let rest_url = Url::parse(&format!("{}/rest/v1/", base_url.trim_end_matches('/')))?;
        info!("Supabase REST endpoint: {}", rest_url);
        Ok(Self {
            client,
            rest_url,
            api_key: api_key.into(),
        })
    }

    fn table_url(&self, table: &str) -> Result<Url> {
        Ok(self.rest_url.join(table)?)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
    }

    fn attendance_query(&self, scope: &SubjectScope) -> Result<Url> {
        let mut url = self.table_url(ATTENDANCE_TABLE)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("select", ATTENDANCE_SELECT);
            match scope {
                SubjectScope::Day { date } => {
                    query.append_pair("date", &format!("eq.{}", date));
                }
                SubjectScope::Member {
                    user_id,
                    start,
                    end,
                } => {
                    query.append_pair("user_id", &format!("eq.{}", user_id));
                    if let Some(start) = start {
                        query.append_pair("date", &format!("gte.{}", start));
                    }
                    if let Some(end) = end {
                        query.append_pair("date", &format!("lte.{}", end));
                    }
                }
            }
            query.append_pair("order", RECENCY_ORDER);
        }
        Ok(url)
    }

    async fn count(&self, table: &str, filters: &[(&str, String)]) -> Result<u64> {
        let mut url = self.table_url(table)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("select", "id");
            for (column, filter) in filters {
                query.append_pair(column, filter);
            }
        }
        let response = self
            .request(Method::HEAD, url)
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let response = ensure_success(response).await?;
        response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
            .ok_or_else(|| Error::Remote {
                status: response.status().as_u16(),
                message: "count response without a Content-Range total".to_string(),
            })
    }
}

#[async_trait]
impl AttendanceRepository for SupabaseService {
    #[instrument(skip(self), fields(scope = %scope))]
    async fn fetch_attendance(&self, scope: &SubjectScope) -> Result<Vec<AttendanceRecord>> {
        let url = self.attendance_query(scope)?;
        let response = self.request(Method::GET, url).send().await?;
        let rows = ensure_success(response).await?.json::<Vec<Value>>().await?;
        Ok(decode_attendance_rows(rows))
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn upsert_attendance(&self, rows: &[AttendanceUpsert]) -> Result<usize> {
        let mut url = self.table_url(ATTENDANCE_TABLE)?;
        url.query_pairs_mut().append_pair("on_conflict", "user_id,date");
        let response = self
            .request(Method::POST, url)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(rows)
            .send()
            .await?;
        ensure_success(response).await?;
        info!(rows = rows.len(), "attendance upserted");
        Ok(rows.len())
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn delete_attendance(&self, id: &RecordId) -> Result<()> {
        let mut url = self.table_url(ATTENDANCE_TABLE)?;
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{}", id));
        let response = self
            .request(Method::DELETE, url)
            .header("Prefer", "return=minimal")
            .send()
            .await?;
        ensure_success(response).await?;
        info!(%id, "attendance record deleted");
        Ok(())
    }
}

#[async_trait]
impl DirectoryRepository for SupabaseService {
    #[instrument(skip(self))]
    async fn fetch_members(&self) -> Result<Vec<Member>> {
        let mut url = self.table_url(MEMBERS_TABLE)?;
        url.query_pairs_mut()
            .append_pair("select", MEMBER_SELECT)
            .append_pair("order", "created_at.desc");
        let response = self.request(Method::GET, url).send().await?;
        let members = ensure_success(response).await?.json::<Vec<Member>>().await?;
        Ok(members)
    }

    async fn count_members(&self) -> Result<u64> {
        self.count(MEMBERS_TABLE, &[]).await
    }

    async fn count_present(&self, date: NaiveDate) -> Result<u64> {
        self.count(
            ATTENDANCE_TABLE,
            &[
                ("date", format!("eq.{}", date)),
                ("status", "eq.present".to_string()),
            ],
        )
        .await
    }

    #[instrument(skip(self, update), fields(id = %id))]
    async fn update_member(&self, id: Uuid, update: &UpdateMemberPayload) -> Result<Member> {
        let mut url = self.table_url(MEMBERS_TABLE)?;
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{}", id))
            .append_pair("select", MEMBER_SELECT);
        let response = self
            .request(Method::PATCH, url)
            .header("Prefer", "return=representation")
            .json(update)
            .send()
            .await?;
        let members = ensure_success(response).await?.json::<Vec<Member>>().await?;
        let member = members
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("Member {} not found", id)))?;
        info!(%id, "member updated");
        Ok(member)
    }
}

/// Decodes rows one by one. A row that does not decode is skipped so it
/// cannot blank the rest of the read.
fn decode_attendance_rows(rows: Vec<Value>) -> Vec<AttendanceRecord> {
    rows.into_iter()
        .filter_map(|raw| {
            let id = raw.get("id").cloned().unwrap_or(Value::Null);
            match serde_json::from_value::<AttendanceRow>(raw) {
                Ok(row) => Some(AttendanceRecord::from(row)),
                Err(e) => {
                    warn!(%id, error = %e, "skipping undecodable attendance row");
                    None
                }
            }
        })
        .collect()
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<PostgrestError>(&body) {
        Ok(PostgrestError {
            message: Some(message),
            details,
        }) => match details {
            Some(details) if !details.is_empty() => format!("{} ({})", message, details),
            _ => message,
        },
        _ if body.is_empty() => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
        _ => body,
    };
    warn!(status = status.as_u16(), %message, "Supabase request failed");
    Err(Error::Remote {
        status: status.as_u16(),
        message,
    })
}

/// `0-9/42` or `*/42` to `42`.
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}
