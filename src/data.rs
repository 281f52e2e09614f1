use anyhow::Result;
use async_trait::async_trait;
use std::fmt;

/// A tradable base/quote pair, e.g. `PEPE/USDT`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Instrument {
    pub base: String,
    pub quote: String,
}

impl Instrument {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self { base: base.into(), quote: quote.into() }
    }

    /// Parse the `BASE/QUOTE` form. Both halves must be non-empty.
    pub fn parse(symbol: &str) -> Option<Self> {
        let (base, quote) = symbol.split_once('/')?;
        if base.is_empty() || quote.is_empty() || quote.contains('/') {
            return None;
        }
        Some(Self::new(base, quote))
    }

    /// Identifier used as the store key and in alert keys.
    pub fn symbol(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }

    /// Concatenated form most exchange REST APIs expect (`PEPEUSDT`).
    pub fn exchange_symbol(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketKind {
    Spot,
    Futures,
}

/// One OHLCV bar. `volume` is denominated in the quote currency.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub ts_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Market data the scanner needs from an exchange. Every call may fail; the
/// scanner treats failures as "skip this instrument" (or "skip this cycle"
/// for the listing).
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Tradable instruments quoted in `quote` on the given market type.
    async fn list_instruments(&self, quote: &str, kind: MarketKind) -> Result<Vec<Instrument>>;

    /// Most recent `count` candles of `interval`, ordered oldest-first.
    async fn fetch_recent_candles(
        &self,
        instrument: &Instrument,
        interval: &str,
        count: usize,
    ) -> Result<Vec<Candle>>;

    /// Rolling 24h traded volume in the quote currency.
    async fn fetch_24h_quote_volume(&self, instrument: &Instrument) -> Result<f64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pair_symbol() {
        let i = Instrument::parse("PEPE/USDT").unwrap();
        assert_eq!(i.base, "PEPE");
        assert_eq!(i.quote, "USDT");
        assert_eq!(i.symbol(), "PEPE/USDT");
        assert_eq!(i.exchange_symbol(), "PEPEUSDT");
        assert_eq!(i.to_string(), "PEPE/USDT");
    }

    #[test]
    fn rejects_malformed_symbols() {
        assert!(Instrument::parse("PEPEUSDT").is_none());
        assert!(Instrument::parse("/USDT").is_none());
        assert!(Instrument::parse("PEPE/").is_none());
        assert!(Instrument::parse("A/B/C").is_none());
    }
}
