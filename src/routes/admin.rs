use axum::{
    extract::{Path, Query, State},
    Json,
};
use tracing::{error, info};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::member_dto::{
        MemberListResponse, MemberQuery, MemberResponse, MemberUpdated, UpdateMemberPayload,
    },
    error::{Error, Result},
    services::{
        dashboard_service::{DashboardService, DashboardStats},
        repository::DirectoryRepository,
        supabase_service::SupabaseService,
    },
    AppState,
};

pub async fn list_members(
    State(state): State<AppState>,
    Query(query): Query<MemberQuery>,
) -> Result<Json<MemberListResponse>> {
    let term = query.search.unwrap_or_default();
    let members: Vec<MemberResponse> = state
        .supabase
        .fetch_members()
        .await?
        .iter()
        .filter(|m| m.matches_search(&term))
        .map(MemberResponse::from)
        .collect();
    Ok(Json(MemberListResponse {
        total: members.len(),
        members,
    }))
}

pub async fn update_member(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateMemberPayload>,
) -> Result<Json<MemberUpdated>> {
    let payload = payload.trimmed();
    payload.validate()?;
    if payload.is_empty() {
        return Err(Error::BadRequest("No member fields to update".to_string()));
    }

    let member = state
        .supabase
        .update_member(id, &payload)
        .await
        .inspect_err(|e| error!(member_id = %id, error = %e, "Failed to save user."))?;
    info!(member_id = %id, "member profile saved");

    Ok(Json(MemberUpdated {
        member: MemberResponse::from(&member),
        message: "User updated successfully!".to_string(),
    }))
}

pub async fn dashboard(State(state): State<AppState>) -> Result<Json<DashboardStats>> {
    let service: DashboardService<SupabaseService> = DashboardService::new(state.supabase.clone());
    let stats = service.stats().await?;
    Ok(Json(stats))
}
