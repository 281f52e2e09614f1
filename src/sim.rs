use anyhow::{Result, anyhow};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, VecDeque};

use crate::data::{Candle, Instrument, MarketDataSource, MarketKind};

const BAR_MS: i64 = 5 * 60 * 1000;
const HISTORY: usize = 16;

/// Knobs for the synthetic market used by `simulate` and in tests.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub instruments: usize,
    pub quote: String,
    /// Chance per bar that an instrument pumps.
    pub pump_probability: f64,
    /// Chance per candle fetch that the call fails.
    pub failure_rate: f64,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            instruments: 40,
            quote: "USDT".to_string(),
            pump_probability: 0.02,
            failure_rate: 0.01,
            seed: 7,
        }
    }
}

#[derive(Debug)]
struct Tape {
    price: f64,
    base_volume: f64,
    quote_volume_24h: f64,
    bars: VecDeque<Candle>,
}

struct State {
    rng: StdRng,
    tapes: HashMap<Instrument, Tape>,
    clock_ms: i64,
}

/// Random-walk market. Every candle fetch advances that instrument by one
/// bar; occasionally a bar pumps price and volume together.
pub struct SyntheticMarket {
    cfg: SyntheticConfig,
    instruments: Vec<Instrument>,
    state: Mutex<State>,
}

impl SyntheticMarket {
    pub fn new(cfg: SyntheticConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let mut tapes = HashMap::new();
        let instruments: Vec<Instrument> = (0..cfg.instruments)
            .map(|i| Instrument::new(format!("SYN{i}"), cfg.quote.clone()))
            .collect();
        let clock_ms = 1_700_000_000_000;
        for inst in &instruments {
            let price = rng.gen_range(0.001..50.0);
            let base_volume = rng.gen_range(5_000.0..200_000.0);
            let mut bars = VecDeque::with_capacity(HISTORY);
            // one settled bar so the first fetch already returns a pair
            bars.push_back(Candle {
                ts_ms: clock_ms,
                open: price,
                high: price,
                low: price,
                close: price,
                volume: base_volume * price,
            });
            let tape = Tape {
                price,
                base_volume,
                quote_volume_24h: rng.gen_range(200_000.0..12_000_000.0),
                bars,
            };
            tapes.insert(inst.clone(), tape);
        }
        Self { cfg, instruments, state: Mutex::new(State { rng, tapes, clock_ms }) }
    }

    fn step(&self, instrument: &Instrument) -> Result<Vec<Candle>> {
        let mut guard = self.state.lock();
        let State { rng, tapes, clock_ms } = &mut *guard;

        if rng.gen_bool(self.cfg.failure_rate.clamp(0.0, 1.0)) {
            return Err(anyhow!("synthetic fetch failure for {instrument}"));
        }
        let tape = tapes
            .get_mut(instrument)
            .ok_or_else(|| anyhow!("unknown instrument {instrument}"))?;

        let pump = rng.gen_bool(self.cfg.pump_probability.clamp(0.0, 1.0));
        let (drift, volume_mult) = if pump {
            (rng.gen_range(0.08..0.25), rng.gen_range(5.0..12.0))
        } else {
            (rng.gen_range(-0.01..0.01), rng.gen_range(0.6..1.4))
        };

        let open = tape.price;
        let close = (open * (1.0 + drift)).max(1e-9);
        tape.price = close;
        *clock_ms += BAR_MS;

        let candle = Candle {
            ts_ms: *clock_ms,
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume: tape.base_volume * volume_mult * close,
        };
        if tape.bars.len() == HISTORY {
            tape.bars.pop_front();
        }
        tape.bars.push_back(candle);
        Ok(tape.bars.iter().cloned().collect())
    }
}

#[async_trait]
impl MarketDataSource for SyntheticMarket {
    async fn list_instruments(&self, quote: &str, kind: MarketKind) -> Result<Vec<Instrument>> {
        if kind != MarketKind::Spot {
            return Ok(Vec::new());
        }
        Ok(self.instruments.iter().filter(|i| i.quote == quote).cloned().collect())
    }

    async fn fetch_recent_candles(
        &self,
        instrument: &Instrument,
        _interval: &str,
        count: usize,
    ) -> Result<Vec<Candle>> {
        let mut bars = self.step(instrument)?;
        if bars.len() > count {
            bars.drain(..bars.len() - count);
        }
        Ok(bars)
    }

    async fn fetch_24h_quote_volume(&self, instrument: &Instrument) -> Result<f64> {
        let state = self.state.lock();
        state
            .tapes
            .get(instrument)
            .map(|t| t.quote_volume_24h)
            .ok_or_else(|| anyhow!("unknown instrument {instrument}"))
    }
}
