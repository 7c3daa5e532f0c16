pub mod attendance_store;
pub mod dashboard_service;
pub mod fetch_service;
pub mod merge_service;
pub mod realtime_service;
pub mod render_service;
pub mod repository;
pub mod session_service;
pub mod stats_service;
pub mod supabase_service;
pub mod view_session;
