#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use gym_attendance::{
    config::Config, middleware::auth::Claims, services::supabase_service::SupabaseService,
    AppState,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const WEBHOOK_SECRET: &str = "whsec_test";

/// In-process stand-in for the PostgREST endpoints the service talks to.
#[derive(Clone, Default)]
pub struct FakePostgrest {
    pub attendance: Arc<Mutex<Vec<Value>>>,
    pub members: Arc<Mutex<Vec<Value>>>,
    pub fetches: Arc<AtomicUsize>,
    pub writes: Arc<AtomicUsize>,
    pub fail_reads: Arc<AtomicBool>,
    next_id: Arc<AtomicUsize>,
}

impl FakePostgrest {
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_reads.store(failing, Ordering::SeqCst);
    }

    pub fn add_member(&self, name: &str, email: &str, phone: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.members.lock().unwrap().push(json!({
            "id": id,
            "email": email,
            "full_name": name,
            "phone": phone,
            "role": null,
            "created_at": Utc::now().to_rfc3339(),
        }));
        id
    }

    /// Inserts a row directly, bypassing the upsert endpoint. Returns its id.
    pub fn seed(&self, user_id: Uuid, date: NaiveDate, status: &str) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1;
        self.attendance.lock().unwrap().push(json!({
            "id": id,
            "user_id": user_id,
            "date": date.to_string(),
            "status": status,
            "check_in": null,
            "check_out": null,
            "duration": null,
            "created_at": Utc::now().to_rfc3339(),
        }));
        id
    }

    pub fn member(&self, id: Uuid) -> Option<Value> {
        self.members
            .lock()
            .unwrap()
            .iter()
            .find(|m| m["id"] == json!(id))
            .cloned()
    }

    pub fn row(&self, user_id: Uuid, date: NaiveDate) -> Option<Value> {
        self.attendance
            .lock()
            .unwrap()
            .iter()
            .find(|r| r["user_id"] == json!(user_id) && r["date"] == json!(date.to_string()))
            .cloned()
    }

    fn member_name(&self, user_id: &Value) -> Value {
        self.members
            .lock()
            .unwrap()
            .iter()
            .find(|m| &m["id"] == user_id)
            .map(|m| m["full_name"].clone())
            .unwrap_or(Value::Null)
    }

    pub async fn spawn(self) -> SocketAddr {
        let app = Router::new()
            .route(
                "/rest/v1/attendance",
                get(list_attendance)
                    .post(upsert_attendance)
                    .delete(delete_attendance),
            )
            .route(
                "/rest/v1/gym_users",
                get(list_members).patch(update_members),
            )
            .with_state(self);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }
}

type Params = Query<Vec<(String, String)>>;

fn matches_filters(row: &Value, params: &[(String, String)]) -> bool {
    params.iter().all(|(column, filter)| {
        if matches!(column.as_str(), "select" | "order" | "on_conflict") {
            return true;
        }
        let Some(field) = row.get(column) else {
            return false;
        };
        let field = match field {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        match filter.split_once('.') {
            Some(("eq", value)) => field == value,
            Some(("gte", value)) => field.as_str() >= value,
            Some(("lte", value)) => field.as_str() <= value,
            _ => false,
        }
    })
}

fn wants_count(headers: &HeaderMap) -> bool {
    headers
        .get("prefer")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("count=exact"))
}

fn counted(total: usize) -> Response {
    let range = if total == 0 {
        "*/0".to_string()
    } else {
        format!("0-{}/{}", total - 1, total)
    };
    (StatusCode::OK, [("content-range", range)], Json(json!([]))).into_response()
}

fn unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "message": "upstream unavailable" })),
    )
        .into_response()
}

async fn list_attendance(
    State(fake): State<FakePostgrest>,
    headers: HeaderMap,
    Query(params): Params,
) -> Response {
    if fake.fail_reads.load(Ordering::SeqCst) {
        return unavailable();
    }
    let mut rows: Vec<Value> = fake
        .attendance
        .lock()
        .unwrap()
        .iter()
        .filter(|r| matches_filters(r, &params))
        .cloned()
        .collect();
    if wants_count(&headers) {
        return counted(rows.len());
    }
    fake.fetches.fetch_add(1, Ordering::SeqCst);

    rows.sort_by(|a, b| {
        b["date"]
            .as_str()
            .cmp(&a["date"].as_str())
            .then_with(|| b["created_at"].as_str().cmp(&a["created_at"].as_str()))
    });
    for row in &mut rows {
        let name = fake.member_name(&row["user_id"]);
        row["gym_users"] = json!({ "full_name": name });
    }
    Json(rows).into_response()
}

async fn upsert_attendance(
    State(fake): State<FakePostgrest>,
    Json(payload): Json<Vec<Map<String, Value>>>,
) -> Response {
    fake.writes.fetch_add(1, Ordering::SeqCst);
    let mut table = fake.attendance.lock().unwrap();
    for incoming in payload {
        if incoming.get("user_id").is_none() || incoming.get("date").is_none() {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "message": "null value in column \"user_id\"" })),
            )
                .into_response();
        }
        let existing = table
            .iter_mut()
            .find(|r| r["user_id"] == incoming["user_id"] && r["date"] == incoming["date"]);
        match existing {
            Some(row) => {
                for (key, value) in incoming {
                    row[key.as_str()] = value;
                }
            }
            None => {
                let id = fake.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1;
                let mut row = json!({
                    "id": id,
                    "status": "absent",
                    "check_in": null,
                    "check_out": null,
                    "duration": null,
                    "created_at": Utc::now().to_rfc3339(),
                });
                for (key, value) in incoming {
                    row[key.as_str()] = value;
                }
                table.push(row);
            }
        }
    }
    StatusCode::CREATED.into_response()
}

async fn delete_attendance(State(fake): State<FakePostgrest>, Query(params): Params) -> Response {
    fake.writes.fetch_add(1, Ordering::SeqCst);
    fake.attendance
        .lock()
        .unwrap()
        .retain(|r| !matches_filters(r, &params));
    StatusCode::NO_CONTENT.into_response()
}

async fn list_members(
    State(fake): State<FakePostgrest>,
    headers: HeaderMap,
    Query(params): Params,
) -> Response {
    if fake.fail_reads.load(Ordering::SeqCst) {
        return unavailable();
    }
    let rows: Vec<Value> = fake
        .members
        .lock()
        .unwrap()
        .iter()
        .filter(|r| matches_filters(r, &params))
        .cloned()
        .collect();
    if wants_count(&headers) {
        return counted(rows.len());
    }
    Json(rows).into_response()
}

async fn update_members(
    State(fake): State<FakePostgrest>,
    Query(params): Params,
    Json(changes): Json<Map<String, Value>>,
) -> Response {
    fake.writes.fetch_add(1, Ordering::SeqCst);
    let mut members = fake.members.lock().unwrap();
    let mut updated = Vec::new();
    for member in members.iter_mut().filter(|m| matches_filters(m, &params)) {
        for (key, value) in &changes {
            member[key.as_str()] = value.clone();
        }
        updated.push(member.clone());
    }
    Json(updated).into_response()
}

pub fn test_config(base_url: &str) -> Config {
    Config {
        server_address: "127.0.0.1:0".to_string(),
        supabase_url: base_url.to_string(),
        supabase_key: "service-role-key".to_string(),
        supabase_jwt_secret: JWT_SECRET.to_string(),
        webhook_secret: WEBHOOK_SECRET.to_string(),
        default_view_limit: 10,
        request_timeout_secs: 5,
        realtime_buffer: 64,
        session_idle_secs: 300,
    }
}

pub async fn fake_service() -> (FakePostgrest, SupabaseService) {
    let fake = FakePostgrest::default();
    let addr = fake.clone().spawn().await;
    let service = SupabaseService::new(
        &format!("http://{}", addr),
        "service-role-key",
        Duration::from_secs(5),
    )
    .unwrap();
    (fake, service)
}

pub async fn test_state() -> (FakePostgrest, AppState) {
    let fake = FakePostgrest::default();
    let addr = fake.clone().spawn().await;
    let state = AppState::new(test_config(&format!("http://{}", addr))).unwrap();
    (fake, state)
}

pub fn bearer_for(user_id: Uuid) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (Utc::now().timestamp() + 3600) as usize,
        role: Some("authenticated".to_string()),
        email: Some("member@example.com".to_string()),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap();
    format!("Bearer {}", token)
}

pub fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}
