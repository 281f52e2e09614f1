use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::data::Instrument;
use crate::detector::Metrics;

/// Alert sink. Delivery failures are reported to the caller, which logs them;
/// they never roll back deduplication.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, instrument: &Instrument, metrics: &Metrics, score: u8) -> Result<()>;
}

/// Bitget spot trading page for an instrument. Leveraged-token suffixes are
/// stripped so the link lands on the underlying market.
pub fn trade_url(instrument: &Instrument) -> String {
    let base = instrument.base.replace("3S", "").replace("3L", "");
    format!("https://www.bitget.com/spot/{}{}_SPBL", base, instrument.quote)
}

/// Telegram (legacy Markdown) body for an alert.
pub fn format_alert(instrument: &Instrument, m: &Metrics, score: u8) -> String {
    format!(
        "*BITGET SCALP CANDIDATE*\n\
         `{symbol}`\n\
         Change (5m): *+{change:.2}%*\n\
         Vol now: *${vol_now:.2}M*\n\
         Vol avg (1h): *${vol_avg:.2}M* (x{mult:.1})\n\
         Price: *${price:.6}*\n\
         Score: *{score}/100*",
        symbol = instrument.symbol(),
        change = m.change_pct,
        vol_now = m.vol_now / 1e6,
        vol_avg = m.vol_avg / 1e6,
        mult = m.volume_multiple(),
        price = m.latest_price,
        score = score,
    )
}

/// Writes alerts to the log. Used when no Telegram credentials are set.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, instrument: &Instrument, metrics: &Metrics, score: u8) -> Result<()> {
        tracing::info!(
            instrument = %instrument,
            change_pct = format_args!("{:.2}", metrics.change_pct),
            volume_multiple = format_args!("{:.1}", metrics.volume_multiple()),
            quote_volume_24h = metrics.quote_volume_24h,
            price = metrics.latest_price,
            score,
            url = %trade_url(instrument),
            "pump alert"
        );
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Sends alerts through the Telegram Bot API `sendMessage` call, with an
/// inline button that opens the market on the exchange.
pub struct TelegramNotifier {
    client: Client,
    api_url: String,
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    /// `api_url` is the Bot API host, normally [`DEFAULT_API_URL`].
    pub fn with_api_url(api_url: String, token: String, chat_id: String) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { client, api_url: api_url.trim_end_matches('/').to_string(), token, chat_id })
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_url, self.token)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn deliver(&self, instrument: &Instrument, metrics: &Metrics, score: u8) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": format_alert(instrument, metrics, score),
            "parse_mode": "Markdown",
            "disable_web_page_preview": true,
            "reply_markup": {
                "inline_keyboard": [[
                    { "text": "Open on Bitget", "url": trade_url(instrument) }
                ]]
            }
        });

        let resp = self
            .client
            .post(self.send_message_url())
            .json(&body)
            .send()
            .await
            .context("telegram sendMessage request failed")?;
        let status = resp.status();
        let parsed: TelegramResponse = resp
            .json()
            .await
            .with_context(|| format!("invalid telegram response (status {status})"))?;
        if !parsed.ok {
            bail!(
                "telegram rejected message (status {status}): {}",
                parsed.description.unwrap_or_default()
            );
        }
        Ok(())
    }
}
