pub mod config;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::Result;
use crate::services::{
    realtime_service::RealtimeHub, session_service::SessionRegistry,
    supabase_service::SupabaseService,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub supabase: Arc<SupabaseService>,
    pub realtime: RealtimeHub,
    pub sessions: SessionRegistry,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let supabase = SupabaseService::new(
            &config.supabase_url,
            config.supabase_key.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )?;
        let realtime = RealtimeHub::new(config.realtime_buffer);

        Ok(Self {
            config: Arc::new(config),
            supabase: Arc::new(supabase),
            realtime,
            sessions: SessionRegistry::new(),
        })
    }
}
