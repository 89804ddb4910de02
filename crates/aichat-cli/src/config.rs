use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Runtime configuration, read from the environment (after `.env`).
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_url: String,
    pub db_path: PathBuf,
    pub page_size: u32,
    pub http_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_url = lookup("AICHAT_API_URL").unwrap_or_else(|| "http://localhost:1337".into());
        let db_path = lookup("AICHAT_DB_PATH").unwrap_or_else(|| "aichat.db".into());
        let page_size: u32 = parse_var(&lookup, "AICHAT_PAGE_SIZE", 20)?;
        let timeout_secs: u64 = parse_var(&lookup, "AICHAT_HTTP_TIMEOUT_SECS", 30)?;

        if page_size == 0 {
            bail!("AICHAT_PAGE_SIZE must be at least 1");
        }
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            bail!("AICHAT_API_URL must be an http(s) URL, got '{}'", api_url);
        }

        Ok(Self {
            api_url,
            db_path: PathBuf::from(db_path),
            page_size,
            http_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {}: '{}'", key, raw)),
        None => Ok(default),
    }
}
