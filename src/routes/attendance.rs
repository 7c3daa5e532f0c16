use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::attendance_dto::{
        AttendanceSaved, AttendanceView, MarkAttendancePayload, OpenSessionPayload, ScopeRequest,
        SessionOpened, ViewQuery,
    },
    error::{Error, Result},
    middleware::auth::Claims,
    models::attendance::{RecordId, SubjectScope},
    services::{
        repository::DirectoryRepository,
        session_service::{spawn_session, SessionHandle, ViewRequest},
    },
    utils::time::today,
    AppState,
};

fn view_request(state: &AppState, query: &ViewQuery) -> Result<ViewRequest> {
    query.validate()?;
    Ok(ViewRequest {
        search: query.search_term(),
        limit: query.limit_or(state.config.default_view_limit),
    })
}

/// Forgets a session whose task is gone so later calls get a 404.
async fn forget_if_closed<T>(state: &AppState, id: Uuid, result: Result<T>) -> Result<T> {
    if matches!(result, Err(Error::SessionClosed)) {
        state.sessions.remove(id).await;
    }
    result
}

async fn session(state: &AppState, id: Uuid) -> Result<SessionHandle> {
    state.sessions.get(id).await
}

#[instrument(skip(state, claims, payload), fields(user = %claims.sub))]
pub async fn open_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ViewQuery>,
    Json(payload): Json<OpenSessionPayload>,
) -> Result<(StatusCode, Json<SessionOpened>)> {
    let request = view_request(&state, &query)?;
    let scope = payload.scope.resolve(claims.user_id(), today())?;
    let handle = spawn_session(
        state.supabase.clone(),
        state.realtime.clone(),
        scope,
        Duration::from_secs(state.config.session_idle_secs),
    )
    .await;
    let session_id = handle.id();
    state.sessions.insert(handle.clone()).await;
    info!(%session_id, "attendance session opened");

    let view = handle.view(request).await?;
    Ok((StatusCode::CREATED, Json(SessionOpened { session_id, view })))
}

pub async fn get_view(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ViewQuery>,
) -> Result<Json<AttendanceView>> {
    let request = view_request(&state, &query)?;
    let handle = session(&state, id).await?;
    let view = forget_if_closed(&state, id, handle.view(request).await).await?;
    Ok(Json(view))
}

pub async fn set_scope(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Query(query): Query<ViewQuery>,
    Json(scope): Json<ScopeRequest>,
) -> Result<Json<AttendanceView>> {
    let request = view_request(&state, &query)?;
    let scope = scope.resolve(claims.user_id(), today())?;
    let handle = session(&state, id).await?;
    let view = forget_if_closed(&state, id, handle.set_scope(scope, request).await).await?;
    Ok(Json(view))
}

pub async fn refresh(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ViewQuery>,
) -> Result<Json<AttendanceView>> {
    let request = view_request(&state, &query)?;
    let handle = session(&state, id).await?;
    let view = forget_if_closed(&state, id, handle.refresh(request).await).await?;
    Ok(Json(view))
}

#[instrument(skip(state, payload))]
pub async fn mark_attendance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ViewQuery>,
    Json(payload): Json<MarkAttendancePayload>,
) -> Result<(StatusCode, Json<AttendanceSaved>)> {
    payload.validate()?;
    let request = view_request(&state, &query)?;
    let handle = session(&state, id).await?;

    let default_date = match handle.scope().await {
        SubjectScope::Day { date } => Some(date),
        SubjectScope::Member { .. } => None,
    };
    let members: Vec<Uuid> = if payload.mark_all {
        state
            .supabase
            .fetch_members()
            .await?
            .iter()
            .map(|m| m.id)
            .collect()
    } else {
        Vec::new()
    };
    let rows = payload.into_upserts(default_date, &members)?;

    let (saved, view) = forget_if_closed(&state, id, handle.save(rows, request).await).await?;
    Ok((StatusCode::CREATED, Json(AttendanceSaved { saved, view })))
}

pub async fn delete_record(
    State(state): State<AppState>,
    Path((id, record_id)): Path<(Uuid, String)>,
    Query(query): Query<ViewQuery>,
) -> Result<Json<AttendanceView>> {
    let request = view_request(&state, &query)?;
    let handle = session(&state, id).await?;
    let view = forget_if_closed(
        &state,
        id,
        handle.delete(RecordId::from(record_id), request).await,
    )
    .await?;
    Ok(Json(view))
}

pub async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    let handle = state
        .sessions
        .remove(id)
        .await
        .ok_or_else(|| Error::NotFound(format!("Session {} not found", id)))?;
    match handle.close().await {
        Ok(()) | Err(Error::SessionClosed) => {}
        Err(e) => return Err(e),
    }
    info!(session_id = %id, "attendance session closed");
    Ok(StatusCode::NO_CONTENT)
}
