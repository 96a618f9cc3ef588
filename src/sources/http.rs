use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use super::{FeedError, HistoryPoint, HistorySource, PriceSample, PriceSource};
use crate::parse::{parse_f64_lossy, parse_u64_lossy};

pub const DEFAULT_COINGECKO_BASE_URL: &str = "https://api.coingecko.com/api/v3";
pub const DEFAULT_BINANCE_REST_URL: &str = "https://api.binance.com";

#[derive(Debug, Clone)]
pub struct HttpJsonClient {
    client: reqwest::Client,
}

impl HttpJsonClient {
    pub fn new(timeout_ms: u64) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|err| FeedError::Internal(format!("failed to build reqwest client: {err}")))?;

        Ok(Self { client })
    }

    pub async fn get_json(&self, url: &str) -> Result<Value, FeedError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| FeedError::Request(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| FeedError::Request(err.to_string()))?;

        if status != StatusCode::OK {
            return Err(FeedError::Status {
                status,
                body: truncate(&body, 240),
            });
        }

        serde_json::from_str::<Value>(&body)
            .map_err(|err| FeedError::Data(format!("{err}; body={}", truncate(&body, 240))))
    }
}

/// `/simple/price` with the 24h change column enabled.
pub struct CoinGeckoPriceSource {
    http: HttpJsonClient,
    base_url: String,
    coin_id: String,
    vs_currency: String,
}

impl CoinGeckoPriceSource {
    pub fn new(http: HttpJsonClient, base_url: &str, coin_id: &str, vs_currency: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            coin_id: coin_id.trim().to_ascii_lowercase(),
            vs_currency: vs_currency.trim().to_ascii_lowercase(),
        }
    }
}

#[async_trait]
impl PriceSource for CoinGeckoPriceSource {
    async fn fetch_price(&self) -> Result<PriceSample, FeedError> {
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies={}&include_24hr_change=true",
            self.base_url, self.coin_id, self.vs_currency
        );
        let body = self.http.get_json(&url).await?;
        parse_coingecko_price(&body, &self.coin_id, &self.vs_currency)
    }
}

pub fn parse_coingecko_price(
    body: &Value,
    coin_id: &str,
    vs_currency: &str,
) -> Result<PriceSample, FeedError> {
    let entry = body
        .get(coin_id)
        .ok_or_else(|| FeedError::Data(format!("missing `{coin_id}` in price response")))?;

    let last_price = entry
        .get(vs_currency)
        .and_then(parse_f64_lossy)
        .filter(|price| price.is_finite())
        .ok_or_else(|| FeedError::Data(format!("missing `{coin_id}.{vs_currency}` price")))?;

    let change_24h_percent = entry
        .get(format!("{vs_currency}_24h_change"))
        .and_then(parse_f64_lossy)
        .filter(|change| change.is_finite())
        .ok_or_else(|| {
            FeedError::Data(format!("missing `{coin_id}.{vs_currency}_24h_change` in price response"))
        })?;

    Ok(PriceSample {
        last_price,
        change_24h_percent,
    })
}

/// `/api/v3/ticker/24hr`, which reports numbers as strings.
pub struct BinanceTickerPriceSource {
    http: HttpJsonClient,
    base_url: String,
    market_symbol: String,
}

impl BinanceTickerPriceSource {
    pub fn new(http: HttpJsonClient, base_url: &str, market_symbol: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            market_symbol: market_symbol.to_ascii_uppercase(),
        }
    }
}

#[async_trait]
impl PriceSource for BinanceTickerPriceSource {
    async fn fetch_price(&self) -> Result<PriceSample, FeedError> {
        let url = format!(
            "{}/api/v3/ticker/24hr?symbol={}",
            self.base_url, self.market_symbol
        );
        let body = self.http.get_json(&url).await?;
        parse_binance_ticker(&body)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceTicker24h {
    last_price: Value,
    price_change_percent: Value,
}

pub fn parse_binance_ticker(body: &Value) -> Result<PriceSample, FeedError> {
    let ticker = BinanceTicker24h::deserialize(body)
        .map_err(|err| FeedError::Data(format!("invalid ticker response: {err}")))?;

    let last_price = parse_f64_lossy(&ticker.last_price)
        .filter(|price| price.is_finite())
        .ok_or_else(|| FeedError::Data("invalid `lastPrice` in ticker response".to_string()))?;
    let change_24h_percent = parse_f64_lossy(&ticker.price_change_percent)
        .filter(|change| change.is_finite())
        .ok_or_else(|| {
            FeedError::Data("invalid `priceChangePercent` in ticker response".to_string())
        })?;

    Ok(PriceSample {
        last_price,
        change_24h_percent,
    })
}

/// `/coins/<id>/market_chart`, close prices only.
pub struct CoinGeckoHistorySource {
    http: HttpJsonClient,
    base_url: String,
    coin_id: String,
    vs_currency: String,
}

impl CoinGeckoHistorySource {
    pub fn new(http: HttpJsonClient, base_url: &str, coin_id: &str, vs_currency: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            coin_id: coin_id.trim().to_ascii_lowercase(),
            vs_currency: vs_currency.trim().to_ascii_lowercase(),
        }
    }
}

#[async_trait]
impl HistorySource for CoinGeckoHistorySource {
    async fn fetch_history(&self, lookback_days: u32) -> Result<Vec<HistoryPoint>, FeedError> {
        let url = format!(
            "{}/coins/{}/market_chart?vs_currency={}&days={}",
            self.base_url, self.coin_id, self.vs_currency, lookback_days
        );
        let body = self.http.get_json(&url).await?;
        parse_market_chart(&body)
    }
}

pub fn parse_market_chart(body: &Value) -> Result<Vec<HistoryPoint>, FeedError> {
    let rows = body
        .get("prices")
        .and_then(Value::as_array)
        .ok_or_else(|| FeedError::Data("missing `prices` in market chart response".to_string()))?;

    let mut points = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(row) = row.as_array() else {
            continue;
        };
        let Some(timestamp_ms) = row.first().and_then(parse_u64_lossy) else {
            continue;
        };
        let Some(price) = row.get(1).and_then(parse_f64_lossy) else {
            continue;
        };
        points.push(HistoryPoint {
            timestamp_ms,
            price,
        });
    }

    Ok(points)
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }

    let mut output = value.chars().take(max_chars).collect::<String>();
    output.push_str("...");
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_nested_coingecko_fields() {
        let body = json!({ "bitcoin": { "usd": 64250.5, "usd_24h_change": -1.75 } });
        let sample = parse_coingecko_price(&body, "bitcoin", "usd").expect("price should parse");
        assert_eq!(sample.last_price, 64250.5);
        assert_eq!(sample.change_24h_percent, -1.75);
    }

    #[test]
    fn missing_coingecko_change_is_a_data_error() {
        let body = json!({ "bitcoin": { "usd": 10 } });
        let err = parse_coingecko_price(&body, "bitcoin", "usd").expect_err("should fail");
        assert!(matches!(err, FeedError::Data(message) if message.contains("usd_24h_change")));
    }

    #[test]
    fn missing_coingecko_price_is_a_data_error() {
        let body = json!({ "bitcoin": { "eur": 1.0 } });
        let err = parse_coingecko_price(&body, "bitcoin", "usd").expect_err("should fail");
        assert!(matches!(err, FeedError::Data(_)));

        let err = parse_coingecko_price(&json!({}), "bitcoin", "usd").expect_err("should fail");
        assert!(matches!(err, FeedError::Data(_)));
    }

    #[test]
    fn parses_binance_ticker_strings() {
        let body = json!({ "symbol": "BTCUSDT", "lastPrice": "64000.10", "priceChangePercent": "2.500" });
        let sample = parse_binance_ticker(&body).expect("ticker should parse");
        assert_eq!(sample.last_price, 64000.10);
        assert_eq!(sample.change_24h_percent, 2.5);

        let bad_price = json!({ "lastPrice": "n/a", "priceChangePercent": "1.0" });
        assert!(matches!(parse_binance_ticker(&bad_price), Err(FeedError::Data(_))));
        let no_change = json!({ "lastPrice": "64000.10" });
        assert!(matches!(parse_binance_ticker(&no_change), Err(FeedError::Data(_))));
    }

    #[test]
    fn parses_market_chart_and_skips_bad_rows() {
        let body = json!({
            "prices": [[1700000000000u64, 100.0], ["bad", 1.0], [1700000060000u64, "101.5"], 3]
        });
        let points = parse_market_chart(&body).expect("chart should parse");
        assert_eq!(
            points,
            vec![
                HistoryPoint { timestamp_ms: 1700000000000, price: 100.0 },
                HistoryPoint { timestamp_ms: 1700000060000, price: 101.5 },
            ]
        );

        assert!(parse_market_chart(&json!({ "market_caps": [] })).is_err());
    }

    #[test]
    fn truncates_long_bodies() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}
