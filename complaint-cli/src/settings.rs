use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use complaint_client::{ClientConfig, DEFAULT_BASE_URL};

const DEFAULT_STATE_DIR: &str = ".complaints";

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_url: String,
    pub state_dir: PathBuf,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub log_level: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_url = non_empty(lookup("COMPLAINTS_API_URL"))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let state_dir = non_empty(lookup("COMPLAINTS_STATE_DIR"))
            .unwrap_or_else(|| DEFAULT_STATE_DIR.to_string())
            .into();
        let connect_timeout_secs = parse_u64(
            "HTTP_CONNECT_TIMEOUT_SECS",
            lookup("HTTP_CONNECT_TIMEOUT_SECS"),
            5,
        )?;
        let request_timeout_secs = parse_u64(
            "HTTP_REQUEST_TIMEOUT_SECS",
            lookup("HTTP_REQUEST_TIMEOUT_SECS"),
            15,
        )?;
        let log_level = non_empty(lookup("LOG_LEVEL"))
            .or_else(|| non_empty(lookup("RUST_LOG")))
            .unwrap_or_else(|| "warn".to_string());

        Ok(Self {
            api_url,
            state_dir,
            connect_timeout_secs,
            request_timeout_secs,
            log_level,
        })
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.api_url.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_u64(key: &str, raw: Option<String>, default: u64) -> Result<u64> {
    let value = raw
        .unwrap_or_else(|| default.to_string())
        .trim()
        .parse::<u64>()
        .with_context(|| format!("Failed to parse {key}, expecting positive integer"))?;

    if value == 0 {
        return Err(anyhow!("{key} must be > 0"));
    }
    Ok(value)
}
