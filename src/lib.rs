pub mod bitget;
pub mod config;
pub mod data;
pub mod dedup;
pub mod detector;
pub mod logger;
pub mod notify;
pub mod scanner;
pub mod scorer;
pub mod sim;
pub mod store;

use anyhow::{Context, Result};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;

use crate::bitget::BitgetClient;
use crate::config::Config;
use crate::notify::{LogNotifier, Notifier, TelegramNotifier};
use crate::scanner::{CycleReport, Scanner};
use crate::sim::{SyntheticConfig, SyntheticMarket};

/// Telegram when both credentials are configured, the log otherwise.
pub fn notifier_from_config(cfg: &Config) -> Result<Arc<dyn Notifier>> {
    match cfg.telegram_credentials() {
        Some((token, chat_id)) => {
            let n = TelegramNotifier::with_api_url(
                cfg.telegram_api_url.clone(),
                token.to_string(),
                chat_id.to_string(),
            )
            .context("building telegram notifier")?;
            Ok(Arc::new(n))
        }
        None => {
            tracing::info!("No telegram credentials configured; alerts go to the log");
            Ok(Arc::new(LogNotifier))
        }
    }
}

fn live_scanner(cfg: Config) -> Result<Scanner> {
    cfg.validate()?;
    let source = BitgetClient::with_base_url(cfg.bitget_base_url.clone()).context("building bitget client")?;
    let notifier = notifier_from_config(&cfg)?;
    Ok(Scanner::new(cfg, Arc::new(source), notifier))
}

/// Live scan loop against Bitget until `shutdown` resolves.
pub async fn run<F>(cfg: Config, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let interval = cfg.scan_interval();
    let scanner = live_scanner(cfg)?;
    scanner::run_forever(&scanner, interval, shutdown).await;
    Ok(())
}

/// A single live cycle.
pub async fn run_once(cfg: Config) -> Result<CycleReport> {
    let scanner = live_scanner(cfg)?;
    scanner.run_cycle(Utc::now()).await
}

/// Drive the scanner against a synthetic market for `cycles` back-to-back
/// cycles. The clock advances by the scan interval each cycle, so windows fill
/// as they would live.
pub async fn simulate(cfg: Config, market: SyntheticConfig, cycles: usize) -> Result<Vec<CycleReport>> {
    cfg.validate()?;
    let step = config::window_span("scan_interval_secs", cfg.scan_interval_secs as i64)?;
    let scanner = Scanner::new(cfg, Arc::new(SyntheticMarket::new(market)), Arc::new(LogNotifier));

    let mut now = Utc::now();
    let mut reports = Vec::with_capacity(cycles);
    for _ in 0..cycles {
        reports.push(scanner.run_cycle(now).await?);
        now += step;
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn simulate_runs_requested_cycles() {
        let synth = SyntheticConfig { instruments: 20, pump_probability: 0.1, ..SyntheticConfig::default() };
        let reports = simulate(Config::default(), synth, 12).await.unwrap();
        assert_eq!(reports.len(), 12);
        assert!(reports.iter().all(|r| r.listed == 20));
        // first cycle has a single observation per instrument
        assert_eq!(reports[0].signals, 0);
    }

    #[tokio::test]
    async fn simulate_rejects_invalid_config() {
        let cfg = Config { price_horizon_secs: i64::MAX, ..Config::default() };
        assert!(simulate(cfg, SyntheticConfig::default(), 1).await.is_err());
        let cfg = Config { scan_interval_secs: 0, ..Config::default() };
        assert!(simulate(cfg, SyntheticConfig::default(), 1).await.is_err());
    }

    #[test]
    fn log_notifier_without_credentials() {
        assert!(notifier_from_config(&Config::default()).is_ok());
    }
}
