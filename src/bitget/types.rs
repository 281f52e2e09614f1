use serde::Deserialize;

/// Every Bitget v2 REST response is wrapped in this envelope; `code` is
/// `"00000"` on success.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub code: String,
    #[serde(default)]
    pub msg: String,
    pub data: Option<T>,
}

pub const SUCCESS_CODE: &str = "00000";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub symbol: String,
    pub base_coin: String,
    pub quote_coin: String,
    #[serde(default)]
    pub status: String,
}

impl SymbolInfo {
    pub fn is_online(&self) -> bool {
        self.status.eq_ignore_ascii_case("online")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker {
    pub symbol: String,
    #[serde(default)]
    pub quote_volume: Option<String>,
    #[serde(default)]
    pub usdt_volume: Option<String>,
}

/// `[ts, open, high, low, close, baseVolume, usdtVolume, quoteVolume]`, all
/// as decimal strings.
pub type RawCandle = Vec<String>;
