//! Network capabilities the supervisors depend on.
//!
//! Supervisors only see these traits; the websocket and REST implementations
//! live in the submodules and tests substitute their own.

pub mod binance_ws;
pub mod http;

use async_trait::async_trait;
use reqwest::StatusCode;

pub use binance_ws::BinanceDepthConnector;
pub use http::{BinanceTickerPriceSource, CoinGeckoHistorySource, CoinGeckoPriceSource, HttpJsonClient};

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("response invalid: {0}")]
    Data(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[async_trait]
pub trait BookStreamConnector: Send + Sync {
    fn endpoint(&self) -> &str;

    async fn connect(&self) -> Result<Box<dyn BookStreamConnection>, FeedError>;
}

#[async_trait]
pub trait BookStreamConnection: Send {
    /// Next text payload. `Ok(None)` means the peer closed the stream.
    async fn next_payload(&mut self) -> Result<Option<String>, FeedError>;

    async fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceSample {
    pub last_price: f64,
    pub change_24h_percent: f64,
}

#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_price(&self) -> Result<PriceSample, FeedError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryPoint {
    pub timestamp_ms: u64,
    pub price: f64,
}

#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn fetch_history(&self, lookback_days: u32) -> Result<Vec<HistoryPoint>, FeedError>;
}
