use std::time::Duration;

use crate::error::{SyncError, SyncResult};

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the tRPC endpoint, e.g. `http://localhost:3000/api/trpc`
    pub api_base_url: String,
    /// Upper bound for any single profile, feed or toggle request
    pub request_timeout: Duration,
    /// Posts requested per feed page
    pub page_size: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout: Duration::from_millis(default_request_timeout_ms()),
            page_size: default_page_size(),
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> SyncResult<Self> {
        Ok(SyncConfig {
            api_base_url: std::env::var("PROFILE_SYNC_API_BASE_URL")
                .unwrap_or_else(|_| default_api_base_url()),
            request_timeout: Duration::from_millis(parse_var(
                "PROFILE_SYNC_REQUEST_TIMEOUT_MS",
                default_request_timeout_ms(),
            )?),
            page_size: parse_var("PROFILE_SYNC_PAGE_SIZE", default_page_size())?,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> SyncResult<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| SyncError::Config(format!("{name}={raw}: {e}"))),
        Err(_) => Ok(default),
    }
}

fn default_api_base_url() -> String {
    "http://localhost:3000/api/trpc".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_page_size() -> u32 {
    10
}
