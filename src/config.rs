//! Environment configuration
//!
//! Values come from the process environment (after loading `.env`).

use crate::error::{OrchestrationError, Result};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:5000/api";
const DEFAULT_POOL_IDLE_SECS: u64 = 90;
const DEFAULT_POOL_MAX_IDLE: usize = 8;
const DEFAULT_BACKEND_PORT: u16 = 5000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Base URL all endpoint paths are appended to.
    pub api_base_url: String,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    /// Port the mock backend listens on.
    pub backend_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            pool_idle_timeout: Duration::from_secs(DEFAULT_POOL_IDLE_SECS),
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE,
            backend_port: DEFAULT_BACKEND_PORT,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_base_url = lookup("FINANCE_API_BASE_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.api_base_url);

        let idle_secs = parse_var(&lookup, "HTTP_POOL_IDLE_SECS")?.unwrap_or(DEFAULT_POOL_IDLE_SECS);
        let pool_max_idle_per_host =
            parse_var(&lookup, "HTTP_POOL_MAX_IDLE")?.unwrap_or(defaults.pool_max_idle_per_host);

        let backend_port = match parse_var(&lookup, "PORT")? {
            Some(port) => port,
            None => parse_var(&lookup, "MOCK_BACKEND_PORT")?.unwrap_or(defaults.backend_port),
        };

        Ok(Self {
            api_base_url,
            pool_idle_timeout: Duration::from_secs(idle_secs),
            pool_max_idle_per_host,
            backend_port,
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| OrchestrationError::Config(format!("{} has invalid value '{}'", key, raw))),
        _ => Ok(None),
    }
}
