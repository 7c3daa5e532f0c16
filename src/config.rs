use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub supabase_url: String,
    pub supabase_key: String,
    pub supabase_jwt_secret: String,
    pub webhook_secret: String,
    pub default_view_limit: usize,
    pub request_timeout_secs: u64,
    pub realtime_buffer: usize,
    pub session_idle_secs: u64,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            supabase_url: get_env("SUPABASE_URL")?,
            supabase_key: get_env("SUPABASE_KEY")?,
            supabase_jwt_secret: get_env("SUPABASE_JWT_SECRET")?,
            webhook_secret: get_env("WEBHOOK_SECRET")?,
            default_view_limit: get_env_parse_or("DEFAULT_VIEW_LIMIT", 10)?,
            request_timeout_secs: get_env_parse_or("REQUEST_TIMEOUT_SECS", 10)?,
            realtime_buffer: get_env_parse_or("REALTIME_BUFFER", 256)?,
            session_idle_secs: get_env_parse_or("SESSION_IDLE_SECS", 1800)?,
        })
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        _ => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}
