use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

use crate::{bitget, notify};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Target spacing between the start of two scan cycles.
    pub scan_interval_secs: u64,
    /// Minimum rise across the price window, in percent.
    pub min_change_pct: f64,
    /// Latest volume must be at least this multiple of the window average.
    pub volume_mult: f64,
    /// 24h quote-currency volume floor.
    pub min_24h_volume: f64,
    pub score_threshold: u8,

    pub quote_currency: String,
    pub candle_interval: String,
    pub candle_count: usize,
    /// Upper bound on in-flight per-instrument fetches within one cycle.
    pub max_concurrency: usize,

    pub exchange_tag: String,
    pub dedup_cap: usize,
    pub price_horizon_secs: i64,
    pub volume_horizon_secs: i64,

    pub bitget_base_url: String,
    pub telegram_api_url: String,
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scan_interval_secs: 180,
            min_change_pct: 6.0,
            volume_mult: 3.0,
            min_24h_volume: 1_000_000.0,
            score_threshold: 70,
            quote_currency: "USDT".to_string(),
            candle_interval: "5min".to_string(),
            candle_count: 2,
            max_concurrency: 8,
            exchange_tag: "BITGET".to_string(),
            dedup_cap: 500,
            price_horizon_secs: 300,
            volume_horizon_secs: 3600,
            bitget_base_url: bitget::DEFAULT_BASE_URL.to_string(),
            telegram_api_url: notify::DEFAULT_API_URL.to_string(),
            telegram_token: None,
            telegram_chat_id: None,
        }
    }
}

impl Config {
    /// Defaults overlaid with whatever is set in the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` but reads from an arbitrary key lookup, so tests do
    /// not have to touch the global environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        overlay(&lookup, "SCAN_INTERVAL", &mut cfg.scan_interval_secs)?;
        overlay(&lookup, "MIN_CHANGE_PCT", &mut cfg.min_change_pct)?;
        overlay(&lookup, "VOLUME_MULT", &mut cfg.volume_mult)?;
        overlay(&lookup, "MIN_24H_VOLUME", &mut cfg.min_24h_volume)?;
        overlay(&lookup, "SCORE_THRESHOLD", &mut cfg.score_threshold)?;
        overlay(&lookup, "QUOTE_CURRENCY", &mut cfg.quote_currency)?;
        overlay(&lookup, "CANDLE_INTERVAL", &mut cfg.candle_interval)?;
        overlay(&lookup, "CANDLE_COUNT", &mut cfg.candle_count)?;
        overlay(&lookup, "MAX_CONCURRENCY", &mut cfg.max_concurrency)?;
        overlay(&lookup, "EXCHANGE_TAG", &mut cfg.exchange_tag)?;
        overlay(&lookup, "DEDUP_CAP", &mut cfg.dedup_cap)?;
        overlay(&lookup, "PRICE_HORIZON_SECS", &mut cfg.price_horizon_secs)?;
        overlay(&lookup, "VOLUME_HORIZON_SECS", &mut cfg.volume_horizon_secs)?;
        overlay(&lookup, "BITGET_BASE_URL", &mut cfg.bitget_base_url)?;
        overlay(&lookup, "TELEGRAM_API_URL", &mut cfg.telegram_api_url)?;

        cfg.telegram_token = lookup("TELEGRAM_TOKEN").filter(|v| !v.is_empty());
        cfg.telegram_chat_id = lookup("CHAT_ID").filter(|v| !v.is_empty());

        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_change_pct <= 0.0 {
            bail!("min_change_pct must be positive, got {}", self.min_change_pct);
        }
        if self.volume_mult <= 0.0 {
            bail!("volume_mult must be positive, got {}", self.volume_mult);
        }
        if self.min_24h_volume < 0.0 {
            bail!("min_24h_volume must not be negative, got {}", self.min_24h_volume);
        }
        if self.score_threshold > 100 {
            bail!("score_threshold must be within 0..=100, got {}", self.score_threshold);
        }
        if self.scan_interval_secs == 0 {
            bail!("scan_interval_secs must be at least 1");
        }
        window_span("scan_interval_secs", i64::try_from(self.scan_interval_secs).unwrap_or(i64::MAX))?;
        if self.price_horizon_secs <= 0 || self.volume_horizon_secs <= 0 {
            bail!("window horizons must be positive");
        }
        window_span("price_horizon_secs", self.price_horizon_secs)?;
        window_span("volume_horizon_secs", self.volume_horizon_secs)?;
        if self.dedup_cap == 0 {
            bail!("dedup_cap must be at least 1");
        }
        if self.max_concurrency == 0 {
            bail!("max_concurrency must be at least 1");
        }
        if self.candle_count == 0 {
            bail!("candle_count must be at least 1");
        }
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    /// Telegram credentials, only when both halves are present.
    pub fn telegram_credentials(&self) -> Option<(&str, &str)> {
        match (&self.telegram_token, &self.telegram_chat_id) {
            (Some(t), Some(c)) => Some((t.as_str(), c.as_str())),
            _ => None,
        }
    }
}

/// A seconds count as a chrono span, or an error when chrono cannot
/// represent it.
pub fn window_span(key: &str, secs: i64) -> Result<chrono::Duration> {
    chrono::Duration::try_seconds(secs).with_context(|| format!("{key} out of range: {secs}"))
}

fn overlay<F, T>(lookup: &F, key: &str, slot: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}"))?;
    }
    Ok(())
}
