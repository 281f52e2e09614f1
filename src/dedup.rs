use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;

pub const DEFAULT_CAP: usize = 500;

/// Stable identity of "this instrument alerted on this exchange on this UTC
/// day": blake3 over `tag + symbol + YYYYMMDD`, hex encoded.
pub fn alert_key(exchange_tag: &str, instrument: &str, now: DateTime<Utc>) -> String {
    let material = format!("{}{}{}", exchange_tag, instrument, now.format("%Y%m%d"));
    blake3::hash(material.as_bytes()).to_hex().to_string()
}

/// Remembers which alert keys have already fired.
///
/// Memory is bounded by a coarse reset: once the set grows past `cap` it is
/// cleared in full. Keys admitted before the reset can fire again the same
/// day.
pub struct Deduplicator {
    alerted: Mutex<HashSet<String>>,
    cap: usize,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_CAP)
    }
}

impl Deduplicator {
    pub fn new(cap: usize) -> Self {
        Self { alerted: Mutex::new(HashSet::new()), cap }
    }

    /// Returns true the first time a key is seen (and records it), false for
    /// repeats. A repeat leaves the set untouched.
    pub fn admit(&self, exchange_tag: &str, instrument: &str, now: DateTime<Utc>) -> bool {
        let key = alert_key(exchange_tag, instrument, now);
        let mut alerted = self.alerted.lock();
        if !alerted.insert(key) {
            return false;
        }
        if alerted.len() > self.cap {
            tracing::debug!(cap = self.cap, "alerted set over cap; clearing");
            alerted.clear();
        }
        true
    }

    pub fn len(&self) -> usize {
        self.alerted.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerted.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, h, 0, 0).unwrap()
    }

    #[test]
    fn key_is_stable_within_a_day() {
        let a = alert_key("BITGET", "PEPE/USDT", day(5, 0));
        let b = alert_key("BITGET", "PEPE/USDT", day(5, 23));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, alert_key("BITGET", "PEPE/USDT", day(6, 0)));
        assert_ne!(a, alert_key("BITGET", "WIF/USDT", day(5, 0)));
        assert_ne!(a, alert_key("MEXC", "PEPE/USDT", day(5, 0)));
    }

    #[test]
    fn second_admit_same_day_is_suppressed() {
        let d = Deduplicator::default();
        assert!(d.admit("BITGET", "PEPE/USDT", day(5, 1)));
        assert!(!d.admit("BITGET", "PEPE/USDT", day(5, 22)));
        assert_eq!(d.len(), 1);
        // next day is a fresh key
        assert!(d.admit("BITGET", "PEPE/USDT", day(6, 1)));
    }

    #[test]
    fn clears_after_exceeding_cap() {
        let d = Deduplicator::default();
        let now = day(5, 12);
        for i in 0..500 {
            assert!(d.admit("BITGET", &format!("T{i}/USDT"), now));
        }
        assert_eq!(d.len(), 500);
        assert!(!d.admit("BITGET", "T0/USDT", now));

        // 501st distinct key pushes the set over the cap
        assert!(d.admit("BITGET", "T500/USDT", now));
        assert!(d.is_empty());

        assert!(d.admit("BITGET", "BRAND/USDT", now));
        // remembered before the reset, forgotten after it
        assert!(d.admit("BITGET", "T0/USDT", now));
    }

    #[test]
    fn concurrent_admits_fire_once() {
        use std::sync::Arc;
        let d = Arc::new(Deduplicator::default());
        let now = day(5, 12);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let d = d.clone();
                std::thread::spawn(move || d.admit("BITGET", "PEPE/USDT", now))
            })
            .collect();
        let admitted = handles.into_iter().map(|h| h.join().unwrap()).filter(|a| *a).count();
        assert_eq!(admitted, 1);
    }
}
