use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::data::{Instrument, MarketDataSource, MarketKind};
use crate::dedup::Deduplicator;
use crate::detector::{Detector, Thresholds};
use crate::notify::Notifier;
use crate::scorer;
use crate::store::ObservationStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Skipped,
    Quiet,
    BelowThreshold,
    Suppressed,
    Alerted,
    DeliveryFailed,
}

/// Tally of one scan cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub listed: usize,
    pub skipped: usize,
    pub signals: usize,
    pub below_threshold: usize,
    pub suppressed: usize,
    pub alerted: usize,
    pub delivery_failures: usize,
    pub evicted: usize,
}

impl CycleReport {
    fn tally(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Skipped => self.skipped += 1,
            Outcome::Quiet => {}
            Outcome::BelowThreshold => {
                self.signals += 1;
                self.below_threshold += 1;
            }
            Outcome::Suppressed => {
                self.signals += 1;
                self.suppressed += 1;
            }
            Outcome::Alerted => {
                self.signals += 1;
                self.alerted += 1;
            }
            Outcome::DeliveryFailed => {
                self.signals += 1;
                self.alerted += 1;
                self.delivery_failures += 1;
            }
        }
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "listed={} skipped={} signals={} below_threshold={} alerted={} suppressed={} failed={} evicted={}",
            self.listed,
            self.skipped,
            self.signals,
            self.below_threshold,
            self.alerted,
            self.suppressed,
            self.delivery_failures,
            self.evicted
        )
    }
}

#[cfg(feature = "with-metrics")]
impl CycleReport {
    fn export(&self) {
        metrics::counter!("scanner_cycles_total").increment(1);
        metrics::counter!("scanner_skipped_total").increment(self.skipped as u64);
        metrics::counter!("scanner_signals_total").increment(self.signals as u64);
        metrics::counter!("scanner_alerts_total").increment(self.alerted as u64);
        metrics::counter!("scanner_delivery_failures_total").increment(self.delivery_failures as u64);
    }
}

/// Drives one pass over the market: candles → store → detector → scorer →
/// dedup → notifier. Owns the store and the dedup set for the process
/// lifetime.
pub struct Scanner {
    cfg: Config,
    source: Arc<dyn MarketDataSource>,
    notifier: Arc<dyn Notifier>,
    store: ObservationStore,
    detector: Detector,
    dedup: Deduplicator,
}

impl Scanner {
    pub fn new(cfg: Config, source: Arc<dyn MarketDataSource>, notifier: Arc<dyn Notifier>) -> Self {
        let store = ObservationStore::new(cfg.price_horizon_secs, cfg.volume_horizon_secs);
        let detector = Detector::new(Thresholds::from(&cfg));
        let dedup = Deduplicator::new(cfg.dedup_cap);
        Self { cfg, source, notifier, store, detector, dedup }
    }

    pub fn store(&self) -> &ObservationStore {
        &self.store
    }

    pub fn dedup(&self) -> &Deduplicator {
        &self.dedup
    }

    /// One scan over every listed instrument. Only a listing failure aborts
    /// the cycle; per-instrument failures are skipped.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        let instruments = self
            .source
            .list_instruments(&self.cfg.quote_currency, MarketKind::Spot)
            .await
            .context("listing instruments")?;

        let mut report = CycleReport {
            listed: instruments.len(),
            evicted: self.store.evict_stale(now),
            ..CycleReport::default()
        };

        let outcomes: Vec<Outcome> = stream::iter(instruments.iter())
            .map(|inst| self.process(inst, now))
            .buffer_unordered(self.cfg.max_concurrency.max(1))
            .collect()
            .await;
        for outcome in outcomes {
            report.tally(outcome);
        }

        #[cfg(feature = "with-metrics")]
        report.export();

        Ok(report)
    }

    async fn process(&self, inst: &Instrument, now: DateTime<Utc>) -> Outcome {
        let candles = match self
            .source
            .fetch_recent_candles(inst, &self.cfg.candle_interval, self.cfg.candle_count)
            .await
        {
            Ok(c) => c,
            Err(e) => {
                warn!(instrument = %inst, error = %e, "candle fetch failed; skipping");
                return Outcome::Skipped;
            }
        };
        if candles.len() < self.cfg.candle_count {
            debug!(instrument = %inst, got = candles.len(), "not enough candles; skipping");
            return Outcome::Skipped;
        }
        let Some(newest) = candles.last() else {
            return Outcome::Skipped;
        };

        let symbol = inst.symbol();
        self.store.record(&symbol, now, newest.close, newest.volume);

        let Some(metrics) = self.detector.evaluate(&self.store, self.source.as_ref(), inst, now).await else {
            return Outcome::Quiet;
        };

        let score = scorer::score(&metrics);
        if score < self.cfg.score_threshold {
            debug!(instrument = %symbol, score, change_pct = metrics.change_pct, "signal below score threshold");
            return Outcome::BelowThreshold;
        }

        if !self.dedup.admit(&self.cfg.exchange_tag, &symbol, now) {
            debug!(instrument = %symbol, score, "already alerted today");
            return Outcome::Suppressed;
        }

        info!(
            instrument = %symbol,
            score,
            change_pct = metrics.change_pct,
            volume_multiple = metrics.volume_multiple(),
            "pump alert"
        );
        match self.notifier.deliver(inst, &metrics, score).await {
            Ok(()) => Outcome::Alerted,
            Err(e) => {
                error!(instrument = %symbol, error = %format!("{e:#}"), "alert delivery failed");
                Outcome::DeliveryFailed
            }
        }
    }
}

/// Self-pacing loop: run a cycle, then sleep whatever is left of `interval`.
/// Cycles never overlap. `shutdown` is only observed between cycles, so an
/// in-flight cycle always completes.
pub async fn run_forever<F>(scanner: &Scanner, interval: Duration, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        let start = Instant::now();
        match scanner.run_cycle(Utc::now()).await {
            Ok(report) => info!(%report, "scan cycle complete"),
            Err(e) => error!(error = %format!("{e:#}"), "scan cycle aborted"),
        }

        let elapsed = start.elapsed();
        let wait = interval.saturating_sub(elapsed);
        info!("scan done in {:.1}s, sleeping {:.0}s", elapsed.as_secs_f64(), wait.as_secs_f64());

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = &mut shutdown => {
                info!("shutdown requested; stopping scan loop");
                break;
            }
        }
    }
}
