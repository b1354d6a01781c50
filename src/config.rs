//! Service configuration, read from environment variables (and `.env`).

use std::str::FromStr;
use std::time::Duration;

use crate::error::{RatesError, Result};
use crate::ingest::IngestGate;
use crate::pg_store::is_valid_table_name;

pub const DEFAULT_FEED_URL: &str = "https://www.bank.lv/vk/ecb_rss.xml";

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: String,
    pub feed_url: String,
    pub feed_timeout: Duration,
    /// Header that must carry `auth_token` on ingestion requests.
    pub auth_header: String,
    pub auth_token: String,
    pub storage: StorageConfig,
    pub ingest_gate: IngestGate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StorageConfig {
    Postgres {
        url: String,
        table: String,
        max_connections: u32,
        timeout: Duration,
    },
    Memory,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let auth_token = lookup("INGEST_AUTH_TOKEN")
            .filter(|token| !token.is_empty())
            .ok_or_else(|| RatesError::config("INGEST_AUTH_TOKEN is required"))?;

        let storage = match var("STORAGE_BACKEND", "postgres").as_str() {
            "postgres" => {
                let table = var("RATES_TABLE", "euro_rates");
                if !is_valid_table_name(&table) {
                    return Err(RatesError::config(format!("invalid RATES_TABLE {table:?}")));
                }
                StorageConfig::Postgres {
                    url: lookup("DATABASE_URL")
                        .ok_or_else(|| RatesError::config("DATABASE_URL is required"))?,
                    table,
                    max_connections: parse_var(
                        &var("DB_MAX_CONNECTIONS", "5"),
                        "DB_MAX_CONNECTIONS",
                    )?,
                    timeout: Duration::from_secs(parse_var(
                        &var("DB_TIMEOUT_SECS", "10"),
                        "DB_TIMEOUT_SECS",
                    )?),
                }
            }
            "memory" => StorageConfig::Memory,
            other => {
                return Err(RatesError::config(format!(
                    "unknown STORAGE_BACKEND {other:?}"
                )));
            }
        };

        Ok(Self {
            listen_addr: var("LISTEN_ADDR", "0.0.0.0:8084"),
            feed_url: var("FEED_URL", DEFAULT_FEED_URL),
            feed_timeout: Duration::from_secs(parse_var(
                &var("FEED_TIMEOUT_SECS", "10"),
                "FEED_TIMEOUT_SECS",
            )?),
            auth_header: var("INGEST_AUTH_HEADER", "HTTP_AUTH"),
            auth_token,
            storage,
            ingest_gate: var("INGEST_GATE", "row").parse()?,
        })
    }
}

fn parse_var<T: FromStr>(value: &str, key: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| RatesError::config(format!("invalid {key}: {value:?}")))
}
