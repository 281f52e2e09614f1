use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

pub const PRICE_HORIZON_SECS: i64 = 300;
pub const VOLUME_HORIZON_SECS: i64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub ts: DateTime<Utc>,
    pub value: f64,
}

/// Insertion-ordered samples, oldest first. After `prune(now)` every member
/// satisfies `now - ts < horizon`.
#[derive(Debug, Clone)]
pub struct TimedWindow {
    samples: VecDeque<Sample>,
    horizon: Duration,
}

impl TimedWindow {
    pub fn new(horizon: Duration) -> Self {
        Self { samples: VecDeque::new(), horizon }
    }

    pub fn push(&mut self, ts: DateTime<Utc>, value: f64) {
        self.samples.push_back(Sample { ts, value });
    }

    /// Drop every sample whose age at `now` has reached the horizon.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let horizon = self.horizon;
        self.samples.retain(|s| now - s.ts < horizon);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first(&self) -> Option<&Sample> {
        self.samples.front()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let total: f64 = self.samples.iter().map(|s| s.value).sum();
        Some(total / self.samples.len() as f64)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }
}

#[derive(Debug)]
struct InstrumentWindows {
    price: TimedWindow,
    volume: TimedWindow,
}

/// Read-only view of one instrument's windows, taken under its lock.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowSnapshot {
    pub price_samples: usize,
    pub earliest_price: Option<f64>,
    pub latest_price: Option<f64>,
    pub volume_samples: usize,
    pub latest_volume: Option<f64>,
    pub mean_volume: Option<f64>,
}

impl InstrumentWindows {
    fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            price_samples: self.price.len(),
            earliest_price: self.price.first().map(|s| s.value),
            latest_price: self.price.last().map(|s| s.value),
            volume_samples: self.volume.len(),
            latest_volume: self.volume.last().map(|s| s.value),
            mean_volume: self.volume.mean(),
        }
    }
}

/// Per-instrument price and volume history.
///
/// The outer map lock is only held to find or create an instrument's entry;
/// each instrument's windows sit behind their own mutex, so concurrent
/// records for different instruments do not contend.
pub struct ObservationStore {
    windows: RwLock<HashMap<String, Arc<Mutex<InstrumentWindows>>>>,
    price_horizon: Duration,
    volume_horizon: Duration,
}

impl Default for ObservationStore {
    fn default() -> Self {
        Self::new(PRICE_HORIZON_SECS, VOLUME_HORIZON_SECS)
    }
}

impl ObservationStore {
    pub fn new(price_horizon_secs: i64, volume_horizon_secs: i64) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            price_horizon: span(price_horizon_secs),
            volume_horizon: span(volume_horizon_secs),
        }
    }

    fn entry(&self, instrument: &str) -> Arc<Mutex<InstrumentWindows>> {
        if let Some(existing) = self.windows.read().get(instrument) {
            return existing.clone();
        }
        let mut map = self.windows.write();
        map.entry(instrument.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(InstrumentWindows {
                    price: TimedWindow::new(self.price_horizon),
                    volume: TimedWindow::new(self.volume_horizon),
                }))
            })
            .clone()
    }

    /// Append one price and one volume sample, then prune both windows
    /// relative to `ts`.
    pub fn record(&self, instrument: &str, ts: DateTime<Utc>, price: f64, volume: f64) {
        let entry = self.entry(instrument);
        let mut w = entry.lock();
        w.volume.push(ts, volume);
        w.volume.prune(ts);
        w.price.push(ts, price);
        w.price.prune(ts);
    }

    pub fn snapshot(&self, instrument: &str) -> Option<WindowSnapshot> {
        let entry = self.windows.read().get(instrument)?.clone();
        let snap = entry.lock().snapshot();
        Some(snap)
    }

    pub fn price_samples(&self, instrument: &str) -> Vec<Sample> {
        self.samples_of(instrument, |w| &w.price)
    }

    pub fn volume_samples(&self, instrument: &str) -> Vec<Sample> {
        self.samples_of(instrument, |w| &w.volume)
    }

    fn samples_of<F>(&self, instrument: &str, pick: F) -> Vec<Sample>
    where
        F: Fn(&InstrumentWindows) -> &TimedWindow,
    {
        let Some(entry) = self.windows.read().get(instrument).cloned() else {
            return Vec::new();
        };
        let w = entry.lock();
        pick(&*w).iter().copied().collect()
    }

    /// Prune every instrument at `now` and forget the ones left with no
    /// samples at all. Returns how many were dropped.
    pub fn evict_stale(&self, now: DateTime<Utc>) -> usize {
        let mut map = self.windows.write();
        let before = map.len();
        map.retain(|_, entry| {
            let mut w = entry.lock();
            w.price.prune(now);
            w.volume.prune(now);
            !(w.price.is_empty() && w.volume.is_empty())
        });
        before - map.len()
    }

    pub fn len(&self) -> usize {
        self.windows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.read().is_empty()
    }
}

// Out-of-range horizons saturate instead of panicking; `Config::validate`
// rejects them before a live store is built.
fn span(secs: i64) -> Duration {
    Duration::try_seconds(secs).unwrap_or(Duration::MAX)
}
