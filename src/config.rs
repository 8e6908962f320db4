use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::NaiveTime;

use crate::ingest::SyncOptions;
use crate::ingest::poll::DEFAULT_SYNC_DAYS;
use crate::ingest::webhook::DEFAULT_TRANSCRIPT_FETCH_DELAY;
use crate::llm::{AnthropicConfig, DEFAULT_MODEL};
use crate::routing::{DEFAULT_MIN_INBOUND_DURATION_SECS, LinePolicy};
use crate::telephony::{DEFAULT_BASE_URL, OpenPhoneConfig};

pub const DEFAULT_DATABASE_PATH: &str = "callgrade.db";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_SYNC_TIME: &str = "06:00";

/// Runtime configuration, read from the environment
#[derive(Debug, Clone)]
pub struct Config {
    pub openphone_api_key: String,
    pub openphone_base_url: String,
    pub main_phone_number_id: Option<String>,
    pub outbound_phone_number_id: Option<String>,
    pub anthropic_api_key: String,
    pub anthropic_model: String,
    pub database_path: PathBuf,
    /// Daily sync time, UTC
    pub sync_time: NaiveTime,
    pub sync_days: u32,
    pub bind_addr: SocketAddr,
    pub transcript_fetch_delay: Duration,
    pub min_inbound_duration_secs: u32,
}

impl Config {
    /// Load from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let openphone_api_key =
            get("OPENPHONE_API_KEY").context("OPENPHONE_API_KEY environment variable not set")?;
        let anthropic_api_key =
            get("ANTHROPIC_API_KEY").context("ANTHROPIC_API_KEY environment variable not set")?;

        let main_phone_number_id = get("MAIN_PHONE_NUMBER_ID");
        let outbound_phone_number_id = get("OUTBOUND_PHONE_NUMBER_ID");
        if main_phone_number_id.is_none() && outbound_phone_number_id.is_none() {
            bail!("at least one of MAIN_PHONE_NUMBER_ID or OUTBOUND_PHONE_NUMBER_ID must be set");
        }

        let sync_time_raw = get("SYNC_TIME").unwrap_or_else(|| DEFAULT_SYNC_TIME.to_string());
        let sync_time = NaiveTime::parse_from_str(&sync_time_raw, "%H:%M")
            .with_context(|| format!("SYNC_TIME must be HH:MM, got {sync_time_raw:?}"))?;

        let bind_raw = get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr: SocketAddr = bind_raw
            .parse()
            .with_context(|| format!("BIND_ADDR is not a socket address: {bind_raw:?}"))?;

        let sync_days = parse_number(&get, "SYNC_DAYS", DEFAULT_SYNC_DAYS)?;
        if sync_days == 0 {
            bail!("SYNC_DAYS must be at least 1");
        }

        Ok(Self {
            openphone_api_key,
            openphone_base_url: get("OPENPHONE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            main_phone_number_id,
            outbound_phone_number_id,
            anthropic_api_key,
            anthropic_model: get("ANTHROPIC_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            database_path: get("DATABASE_PATH")
                .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string())
                .into(),
            sync_time,
            sync_days,
            bind_addr,
            transcript_fetch_delay: Duration::from_secs(parse_number(
                &get,
                "TRANSCRIPT_FETCH_DELAY_SECS",
                DEFAULT_TRANSCRIPT_FETCH_DELAY.as_secs(),
            )?),
            min_inbound_duration_secs: parse_number(
                &get,
                "MIN_INBOUND_DURATION_SECS",
                DEFAULT_MIN_INBOUND_DURATION_SECS,
            )?,
        })
    }

    pub fn openphone(&self) -> OpenPhoneConfig {
        OpenPhoneConfig {
            base_url: self.openphone_base_url.clone(),
            ..OpenPhoneConfig::new(self.openphone_api_key.clone())
        }
    }

    pub fn anthropic(&self) -> AnthropicConfig {
        AnthropicConfig::new(self.anthropic_api_key.clone(), self.anthropic_model.clone())
    }

    pub fn line_policy(&self) -> LinePolicy {
        LinePolicy {
            min_inbound_duration_secs: self.min_inbound_duration_secs,
            ..LinePolicy::new(
                self.main_phone_number_id.clone(),
                self.outbound_phone_number_id.clone(),
            )
        }
    }

    /// One poll run per configured line
    pub fn sync_lines(&self) -> Vec<SyncOptions> {
        [&self.main_phone_number_id, &self.outbound_phone_number_id]
            .into_iter()
            .flatten()
            .map(|line| SyncOptions {
                days: self.sync_days,
                ..SyncOptions::new(line.clone())
            })
            .collect()
    }
}

fn parse_number<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{key} must be a non-negative integer, got {raw:?}")),
        None => Ok(default),
    }
}
