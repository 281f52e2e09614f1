//! Public (keyless) Bitget spot REST adapter.

pub mod types;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::data::{Candle, Instrument, MarketDataSource, MarketKind};
use types::{Envelope, RawCandle, SUCCESS_CODE, SymbolInfo, Ticker};

pub const DEFAULT_BASE_URL: &str = "https://api.bitget.com";

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("bitget api error {code}: {msg}")]
    Api { code: String, msg: String },

    #[error("invalid response from bitget: {0}")]
    InvalidResponse(String),

    #[error("numeric parse error: {0}")]
    ParseFloat(#[from] std::num::ParseFloatError),

    #[error("market type not supported: {0:?}")]
    Unsupported(MarketKind),
}

#[derive(Clone)]
pub struct BitgetClient {
    http: Client,
    base_url: String,
}

impl BitgetClient {
    pub fn with_base_url(base_url: String) -> Result<Self, ExchangeError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_string() })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ExchangeError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.http.get(&url).query(query).send().await?.error_for_status()?;
        let envelope: Envelope<T> = resp.json().await?;
        if envelope.code != SUCCESS_CODE {
            return Err(ExchangeError::Api { code: envelope.code, msg: envelope.msg });
        }
        envelope
            .data
            .ok_or_else(|| ExchangeError::InvalidResponse(format!("{path}: missing data")))
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn spot_symbols(&self, quote: &str) -> Result<Vec<Instrument>, ExchangeError> {
        let symbols: Vec<SymbolInfo> = self.get("/api/v2/spot/public/symbols", &[]).await?;
        let total = symbols.len();
        let mut out: Vec<Instrument> = symbols
            .into_iter()
            .filter(|s| s.is_online() && s.quote_coin.eq_ignore_ascii_case(quote))
            .map(|s| Instrument::new(s.base_coin, s.quote_coin))
            .collect();
        out.sort();

        debug!(total, matched = out.len(), "bitget symbols listed");
        Ok(out)
    }

    #[instrument(skip(self), fields(instrument = %instrument), level = "debug")]
    pub async fn candles(
        &self,
        instrument: &Instrument,
        granularity: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let rows: Vec<RawCandle> = self
            .get(
                "/api/v2/spot/market/candles",
                &[
                    ("symbol", instrument.exchange_symbol()),
                    ("granularity", granularity.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        let mut candles = rows.iter().map(parse_candle).collect::<Result<Vec<_>, _>>()?;
        candles.sort_by_key(|c| c.ts_ms);
        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }
        Ok(candles)
    }

    #[instrument(skip(self), fields(instrument = %instrument), level = "debug")]
    pub async fn quote_volume_24h(&self, instrument: &Instrument) -> Result<f64, ExchangeError> {
        let tickers: Vec<Ticker> = self
            .get("/api/v2/spot/market/tickers", &[("symbol", instrument.exchange_symbol())])
            .await?;
        let wanted = instrument.exchange_symbol();
        let ticker = tickers
            .into_iter()
            .find(|t| t.symbol == wanted)
            .ok_or_else(|| ExchangeError::InvalidResponse(format!("no ticker for {wanted}")))?;
        let raw = ticker
            .quote_volume
            .or(ticker.usdt_volume)
            .ok_or_else(|| ExchangeError::InvalidResponse(format!("{wanted}: ticker has no quote volume")))?;
        Ok(raw.parse()?)
    }
}

fn parse_candle(row: &RawCandle) -> Result<Candle, ExchangeError> {
    if row.len() < 7 {
        return Err(ExchangeError::InvalidResponse(format!("candle row has {} fields", row.len())));
    }
    let ts_ms = row[0]
        .parse::<i64>()
        .map_err(|e| ExchangeError::InvalidResponse(format!("candle timestamp: {e}")))?;
    // quote volume sits at index 7; older payloads stop at the usdt column
    let volume = row.get(7).unwrap_or(&row[6]);
    Ok(Candle {
        ts_ms,
        open: row[1].parse()?,
        high: row[2].parse()?,
        low: row[3].parse()?,
        close: row[4].parse()?,
        volume: volume.parse()?,
    })
}

#[async_trait]
impl MarketDataSource for BitgetClient {
    async fn list_instruments(&self, quote: &str, kind: MarketKind) -> Result<Vec<Instrument>> {
        match kind {
            MarketKind::Spot => Ok(self.spot_symbols(quote).await?),
            other => Err(ExchangeError::Unsupported(other).into()),
        }
    }

    async fn fetch_recent_candles(
        &self,
        instrument: &Instrument,
        interval: &str,
        count: usize,
    ) -> Result<Vec<Candle>> {
        Ok(self.candles(instrument, interval, count).await?)
    }

    async fn fetch_24h_quote_volume(&self, instrument: &Instrument) -> Result<f64> {
        Ok(self.quote_volume_24h(instrument).await?)
    }
}
