use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::config::Config;
use crate::data::{Instrument, MarketDataSource};
use crate::store::{ObservationStore, WindowSnapshot};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub min_change_pct: f64,
    pub volume_mult: f64,
    pub min_24h_volume: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { min_change_pct: 6.0, volume_mult: 3.0, min_24h_volume: 1_000_000.0 }
    }
}

impl From<&Config> for Thresholds {
    fn from(cfg: &Config) -> Self {
        Self {
            min_change_pct: cfg.min_change_pct,
            volume_mult: cfg.volume_mult,
            min_24h_volume: cfg.min_24h_volume,
        }
    }
}

/// Result of the window-only gates, before the liquidity lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub change_pct: f64,
    pub vol_now: f64,
    pub vol_avg: f64,
    pub latest_price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub change_pct: f64,
    pub vol_now: f64,
    pub vol_avg: f64,
    pub latest_price: f64,
    pub quote_volume_24h: f64,
}

impl Metrics {
    pub fn volume_multiple(&self) -> f64 {
        self.vol_now / self.vol_avg
    }
}

pub struct Detector {
    thresholds: Thresholds,
}

impl Detector {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    /// Price-change and volume-spike gates, evaluated on the retained window
    /// endpoints. Pure; no I/O.
    pub fn local_gates(&self, snap: &WindowSnapshot) -> Option<Candidate> {
        if snap.price_samples < 2 {
            return None;
        }
        let earliest = snap.earliest_price?;
        let latest = snap.latest_price?;
        if earliest == 0.0 {
            return None;
        }

        let change_pct = (latest - earliest) / earliest * 100.0;
        if !(change_pct >= self.thresholds.min_change_pct) {
            return None;
        }

        if snap.volume_samples < 2 {
            return None;
        }
        let vol_avg = snap.mean_volume?;
        let vol_now = snap.latest_volume?;
        // all-zero volume history would make the spike multiple undefined
        if !(vol_avg > 0.0) {
            return None;
        }
        if vol_now < vol_avg * self.thresholds.volume_mult {
            return None;
        }

        Some(Candidate { change_pct, vol_now, vol_avg, latest_price: latest })
    }

    /// Full evaluation: window gates first, then the 24h liquidity floor,
    /// which costs a network round-trip and only runs for survivors.
    pub async fn evaluate(
        &self,
        store: &ObservationStore,
        source: &dyn MarketDataSource,
        instrument: &Instrument,
        now: DateTime<Utc>,
    ) -> Option<Metrics> {
        let symbol = instrument.symbol();
        let snap = store.snapshot(&symbol)?;
        let Some(candidate) = self.local_gates(&snap) else {
            trace!(instrument = %symbol, %now, "window gates not met");
            return None;
        };

        let quote_volume_24h = match source.fetch_24h_quote_volume(instrument).await {
            Ok(v) => v,
            Err(e) => {
                debug!(instrument = %symbol, error = %e, "24h volume lookup failed; no signal");
                return None;
            }
        };
        if !(quote_volume_24h >= self.thresholds.min_24h_volume) {
            debug!(instrument = %symbol, quote_volume_24h, "below 24h liquidity floor");
            return None;
        }

        Some(Metrics {
            change_pct: candidate.change_pct,
            vol_now: candidate.vol_now,
            vol_avg: candidate.vol_avg,
            latest_price: candidate.latest_price,
            quote_volume_24h,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Candle, MarketKind};
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedVolume {
        volume: Option<f64>,
        calls: AtomicUsize,
    }

    impl FixedVolume {
        fn ok(v: f64) -> Self {
            Self { volume: Some(v), calls: AtomicUsize::new(0) }
        }
        fn failing() -> Self {
            Self { volume: None, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl MarketDataSource for FixedVolume {
        async fn list_instruments(&self, _q: &str, _k: MarketKind) -> Result<Vec<Instrument>> {
            Ok(vec![])
        }
        async fn fetch_recent_candles(&self, _i: &Instrument, _iv: &str, _n: usize) -> Result<Vec<Candle>> {
            Ok(vec![])
        }
        async fn fetch_24h_quote_volume(&self, _i: &Instrument) -> Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.volume.ok_or_else(|| anyhow!("ticker unavailable"))
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn snapshot(prices: (f64, f64), vol_avg: f64, vol_now: f64) -> WindowSnapshot {
        WindowSnapshot {
            price_samples: 2,
            earliest_price: Some(prices.0),
            latest_price: Some(prices.1),
            volume_samples: 4,
            latest_volume: Some(vol_now),
            mean_volume: Some(vol_avg),
        }
    }

    /// Store where the price rose from 1.00 to 1.07 and the last volume bar is
    /// well above 3x the window mean (mean 9500, latest 35000).
    fn pumped_store() -> (ObservationStore, Instrument) {
        let store = ObservationStore::default();
        let inst = Instrument::new("PUMP", "USDT");
        let sym = inst.symbol();
        store.record(&sym, at(0), 1.00, 1_000.0);
        store.record(&sym, at(60), 1.02, 1_000.0);
        store.record(&sym, at(120), 1.05, 1_000.0);
        store.record(&sym, at(180), 1.07, 35_000.0);
        (store, inst)
    }

    #[test]
    fn zero_baseline_price_never_signals() {
        let d = Detector::new(Thresholds::default());
        assert!(d.local_gates(&snapshot((0.0, 5.0), 1.0, 100.0)).is_none());
    }

    proptest! {
        #[test]
        fn zero_baseline_price_never_signals_for_any_window(
            latest in -1e6f64..1e9,
            vol_avg in 0.0f64..1e9,
            vol_now in 0.0f64..1e10,
            price_samples in 0usize..500,
            volume_samples in 0usize..500,
        ) {
            let d = Detector::new(Thresholds::default());
            let snap = WindowSnapshot {
                price_samples,
                earliest_price: Some(0.0),
                latest_price: Some(latest),
                volume_samples,
                latest_volume: Some(vol_now),
                mean_volume: Some(vol_avg),
            };
            prop_assert!(d.local_gates(&snap).is_none());
        }
    }

    #[test]
    fn change_and_spike_exactly_at_thresholds_pass() {
        let d = Detector::new(Thresholds::default());
        let c = d.local_gates(&snapshot((100.0, 106.0), 10.0, 30.0)).unwrap();
        assert_eq!(c.change_pct, 6.0);
        assert_eq!(c.vol_now, 30.0);
        assert_eq!(c.vol_avg, 10.0);
    }

    #[test]
    fn needs_two_price_samples() {
        let d = Detector::new(Thresholds::default());
        let mut snap = snapshot((1.0, 2.0), 1.0, 100.0);
        snap.price_samples = 1;
        assert!(d.local_gates(&snap).is_none());
    }

    #[test]
    fn needs_two_volume_samples() {
        let d = Detector::new(Thresholds::default());
        let mut snap = snapshot((1.0, 2.0), 1.0, 100.0);
        snap.volume_samples = 1;
        assert!(d.local_gates(&snap).is_none());
    }

    #[test]
    fn change_below_threshold_is_rejected() {
        let d = Detector::new(Thresholds::default());
        assert!(d.local_gates(&snapshot((1.00, 1.05), 10.0, 100.0)).is_none());
    }

    #[test]
    fn volume_spike_below_multiple_is_rejected() {
        let d = Detector::new(Thresholds::default());
        assert!(d.local_gates(&snapshot((1.00, 1.07), 10_000.0, 29_999.0)).is_none());
    }

    #[test]
    fn zero_average_volume_is_rejected() {
        let d = Detector::new(Thresholds::default());
        assert!(d.local_gates(&snapshot((1.00, 1.07), 0.0, 0.0)).is_none());
    }

    #[test]
    fn passing_window_yields_candidate() {
        let d = Detector::new(Thresholds::default());
        let c = d.local_gates(&snapshot((1.00, 1.07), 10_000.0, 35_000.0)).unwrap();
        assert!((c.change_pct - 7.0).abs() < 1e-9);
        assert_eq!(c.vol_now, 35_000.0);
        assert_eq!(c.vol_avg, 10_000.0);
        assert_eq!(c.latest_price, 1.07);
    }

    #[tokio::test]
    async fn liquidity_floor_is_checked_last() {
        let d = Detector::new(Thresholds::default());
        let store = ObservationStore::default();
        let inst = Instrument::new("FLAT", "USDT");
        store.record(&inst.symbol(), at(0), 1.0, 10.0);
        store.record(&inst.symbol(), at(60), 1.0, 10.0);

        let source = FixedVolume::ok(5_000_000.0);
        assert!(d.evaluate(&store, &source, &inst, at(60)).await.is_none());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0, "no network call for flat prices");
    }

    #[tokio::test]
    async fn evaluates_full_signal() {
        let d = Detector::new(Thresholds::default());
        let (store, inst) = pumped_store();

        let source = FixedVolume::ok(2_000_000.0);
        let m = d.evaluate(&store, &source, &inst, at(180)).await.unwrap();
        assert!((m.change_pct - 7.0).abs() < 1e-9);
        assert_eq!(m.vol_now, 35_000.0);
        assert_eq!(m.latest_price, 1.07);
        assert_eq!(m.quote_volume_24h, 2_000_000.0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn liquidity_exactly_at_floor_passes() {
        let d = Detector::new(Thresholds::default());
        let (store, inst) = pumped_store();
        let source = FixedVolume::ok(1_000_000.0);
        let m = d.evaluate(&store, &source, &inst, at(180)).await.unwrap();
        assert_eq!(m.quote_volume_24h, 1_000_000.0);
    }

    #[tokio::test]
    async fn thin_24h_volume_blocks_signal() {
        let d = Detector::new(Thresholds::default());
        let (store, inst) = pumped_store();
        let source = FixedVolume::ok(999_999.0);
        assert!(d.evaluate(&store, &source, &inst, at(180)).await.is_none());
    }

    #[tokio::test]
    async fn ticker_failure_means_no_signal() {
        let d = Detector::new(Thresholds::default());
        let (store, inst) = pumped_store();
        let source = FixedVolume::failing();
        assert!(d.evaluate(&store, &source, &inst, at(180)).await.is_none());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_instrument_has_no_signal() {
        let d = Detector::new(Thresholds::default());
        let store = ObservationStore::default();
        let source = FixedVolume::ok(5_000_000.0);
        let inst = Instrument::new("NONE", "USDT");
        assert!(d.evaluate(&store, &source, &inst, at(0)).await.is_none());
    }
}
