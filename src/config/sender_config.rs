//! config/sender_config.rs
//! Configuración global del servicio y valores por defecto de campaña.
//! Se lee del entorno (ya cargado desde .env con dotenv).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Parámetros de ritmo y cuota que aplican a una campaña.
/// La request puede pisar cualquiera de ellos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignSettings {
    pub daily_limit: u32,
    pub send_delay_ms: u64,
    /// 0 = sin lotes
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub max_rate_limit_retries: u32,
    pub tracking_base_url: Option<String>,
}

impl Default for CampaignSettings {
    fn default() -> Self {
        CampaignSettings {
            daily_limit: 500,
            send_delay_ms: 1_000,
            batch_size: 0,
            batch_delay_ms: 60_000,
            max_rate_limit_retries: 1,
            tracking_base_url: None,
        }
    }
}

impl CampaignSettings {
    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub bind_addr: String,
    pub database_path: PathBuf,
    pub providers_file: Option<PathBuf>,
    pub campaign_defaults: CampaignSettings,
}

impl SenderConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = CampaignSettings::default();

        let campaign_defaults = CampaignSettings {
            daily_limit: env_or("DEFAULT_DAILY_LIMIT", defaults.daily_limit)?,
            send_delay_ms: env_or("SEND_DELAY_MS", defaults.send_delay_ms)?,
            batch_size: env_or("BATCH_SIZE", defaults.batch_size)?,
            batch_delay_ms: env_or("BATCH_DELAY_MS", defaults.batch_delay_ms)?,
            max_rate_limit_retries: env_or(
                "MAX_RATE_LIMIT_RETRIES",
                defaults.max_rate_limit_retries,
            )?,
            tracking_base_url: env::var("TRACKING_BASE_URL")
                .ok()
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
        };

        Ok(SenderConfig {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:5022".to_string()),
            database_path: env::var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data").join("bulk_sender.db")),
            providers_file: env::var("PROVIDERS_FILE").ok().map(PathBuf::from),
            campaign_defaults,
        })
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow!("Valor inválido para {}: '{}'", key, raw)),
        Err(_) => Ok(default),
    }
}
