pub mod admin;
pub mod attendance;
pub mod health;
pub mod webhook;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::middleware::{auth::require_bearer_auth, cors::console_cors};
use crate::AppState;

const BODY_LIMIT: usize = 1024 * 1024;

pub fn router(state: AppState) -> Router {
    let base_routes = Router::new()
        .route("/health", get(health::health))
        .route(
            "/api/webhook/attendance",
            post(webhook::handle_attendance_change),
        );

    let session_api = Router::new()
        .route("/api/sessions", post(attendance::open_session))
        .route("/api/sessions/:id", delete(attendance::close_session))
        .route("/api/sessions/:id/view", get(attendance::get_view))
        .route("/api/sessions/:id/scope", put(attendance::set_scope))
        .route("/api/sessions/:id/refresh", post(attendance::refresh))
        .route(
            "/api/sessions/:id/attendance",
            post(attendance::mark_attendance),
        )
        .route(
            "/api/sessions/:id/attendance/:record_id",
            delete(attendance::delete_record),
        );

    let admin_api = Router::new()
        .route("/api/admin/members", get(admin::list_members))
        .route("/api/admin/members/:id", patch(admin::update_member))
        .route("/api/admin/dashboard", get(admin::dashboard));

    let protected = session_api
        .merge(admin_api)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_bearer_auth,
        ));

    base_routes
        .merge(protected)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(console_cors())
                .layer(DefaultBodyLimit::max(BODY_LIMIT)),
        )
}
