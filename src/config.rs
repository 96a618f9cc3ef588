use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::{
    depth::{DEFAULT_DEPTH_FLOOR, DEFAULT_DEPTH_LIMIT, MAX_DEPTH_LIMIT},
    history::DEFAULT_HISTORY_DAYS,
    poll::{PollConfig, DEFAULT_POLL_INTERVAL_MS, DEFAULT_SIGNIFICANT_MOVE_THRESHOLD},
    sources::{
        binance_ws::DEFAULT_BINANCE_SPOT_WS_URL,
        http::{DEFAULT_BINANCE_REST_URL, DEFAULT_COINGECKO_BASE_URL},
    },
    stream::{StreamConfig, DEFAULT_RECONNECT_DELAY_MS},
};

pub const DEFAULT_SYMBOL: &str = "BTCUSDT";
pub const DEFAULT_COIN_ID: &str = "bitcoin";
pub const DEFAULT_VS_CURRENCY: &str = "usd";
pub const DEFAULT_RENDER_MS: u64 = 250;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_CHART_HEIGHT: usize = 12;
pub const DEFAULT_DEPTH_CHART_WIDTH: usize = 60;
pub const DEFAULT_DEPTH_CHART_HEIGHT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceApi {
    CoinGecko,
    Binance,
}

impl PriceApi {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "coingecko" | "gecko" => Some(Self::CoinGecko),
            "binance" => Some(Self::Binance),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CoinGecko => "coingecko",
            Self::Binance => "binance",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewConfig {
    pub symbol: String,
    pub coin_id: String,
    pub vs_currency: String,
    pub price_api: PriceApi,
    pub ws_url: String,
    pub coingecko_base_url: String,
    pub binance_rest_url: String,
    pub depth_limit: usize,
    pub depth_floor: f64,
    pub reconnect_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub significant_move_threshold: f64,
    pub history_days: u32,
    pub render_ms: u64,
    pub request_timeout_ms: u64,
    pub chart_height: usize,
    pub depth_chart_width: usize,
    pub depth_chart_height: usize,
    pub bell: bool,
    pub duration_secs: Option<u64>,
    pub iterations: Option<u64>,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            symbol: DEFAULT_SYMBOL.to_string(),
            coin_id: DEFAULT_COIN_ID.to_string(),
            vs_currency: DEFAULT_VS_CURRENCY.to_string(),
            price_api: PriceApi::CoinGecko,
            ws_url: DEFAULT_BINANCE_SPOT_WS_URL.to_string(),
            coingecko_base_url: DEFAULT_COINGECKO_BASE_URL.to_string(),
            binance_rest_url: DEFAULT_BINANCE_REST_URL.to_string(),
            depth_limit: DEFAULT_DEPTH_LIMIT,
            depth_floor: DEFAULT_DEPTH_FLOOR,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            significant_move_threshold: DEFAULT_SIGNIFICANT_MOVE_THRESHOLD,
            history_days: DEFAULT_HISTORY_DAYS,
            render_ms: DEFAULT_RENDER_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            chart_height: DEFAULT_CHART_HEIGHT,
            depth_chart_width: DEFAULT_DEPTH_CHART_WIDTH,
            depth_chart_height: DEFAULT_DEPTH_CHART_HEIGHT,
            bell: false,
            duration_secs: None,
            iterations: None,
        }
    }
}

impl ViewConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Applies `DEPTH_VIEW_*` overrides from `lookup` on top of the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("DEPTH_VIEW_SYMBOL") {
            config.symbol = value.trim().to_string();
        }
        if let Some(value) = lookup("DEPTH_VIEW_COIN_ID") {
            config.coin_id = value.trim().to_ascii_lowercase();
        }
        if let Some(value) = lookup("DEPTH_VIEW_VS_CURRENCY") {
            config.vs_currency = value.trim().to_ascii_lowercase();
        }
        if let Some(value) = lookup("DEPTH_VIEW_PRICE_API") {
            config.price_api = PriceApi::parse(&value)
                .ok_or_else(|| anyhow!("invalid DEPTH_VIEW_PRICE_API value: {value}"))?;
        }
        if let Some(value) = lookup("DEPTH_VIEW_WS_URL") {
            config.ws_url = trim_url(&value);
        }
        if let Some(value) = lookup("DEPTH_VIEW_COINGECKO_URL") {
            config.coingecko_base_url = trim_url(&value);
        }
        if let Some(value) = lookup("DEPTH_VIEW_BINANCE_REST_URL") {
            config.binance_rest_url = trim_url(&value);
        }
        if let Some(value) = lookup("DEPTH_VIEW_DEPTH_LIMIT") {
            config.depth_limit = value
                .trim()
                .parse::<usize>()
                .with_context(|| format!("invalid DEPTH_VIEW_DEPTH_LIMIT value: {value}"))?;
        }
        if let Some(value) = lookup("DEPTH_VIEW_DEPTH_FLOOR") {
            config.depth_floor = value
                .trim()
                .parse::<f64>()
                .with_context(|| format!("invalid DEPTH_VIEW_DEPTH_FLOOR value: {value}"))?;
        }
        if let Some(value) = lookup("DEPTH_VIEW_RECONNECT_DELAY_MS") {
            config.reconnect_delay_ms = value
                .trim()
                .parse::<u64>()
                .with_context(|| format!("invalid DEPTH_VIEW_RECONNECT_DELAY_MS value: {value}"))?;
        }
        if let Some(value) = lookup("DEPTH_VIEW_POLL_INTERVAL_MS") {
            config.poll_interval_ms = value
                .trim()
                .parse::<u64>()
                .with_context(|| format!("invalid DEPTH_VIEW_POLL_INTERVAL_MS value: {value}"))?;
        }
        if let Some(value) = lookup("DEPTH_VIEW_MOVE_THRESHOLD") {
            config.significant_move_threshold = value
                .trim()
                .parse::<f64>()
                .with_context(|| format!("invalid DEPTH_VIEW_MOVE_THRESHOLD value: {value}"))?;
        }
        if let Some(value) = lookup("DEPTH_VIEW_HISTORY_DAYS") {
            config.history_days = value
                .trim()
                .parse::<u32>()
                .with_context(|| format!("invalid DEPTH_VIEW_HISTORY_DAYS value: {value}"))?;
        }
        if let Some(value) = lookup("DEPTH_VIEW_RENDER_MS") {
            config.render_ms = value
                .trim()
                .parse::<u64>()
                .with_context(|| format!("invalid DEPTH_VIEW_RENDER_MS value: {value}"))?;
        }
        if let Some(value) = lookup("DEPTH_VIEW_REQUEST_TIMEOUT_MS") {
            config.request_timeout_ms = value
                .trim()
                .parse::<u64>()
                .with_context(|| format!("invalid DEPTH_VIEW_REQUEST_TIMEOUT_MS value: {value}"))?;
        }
        if let Some(value) = lookup("DEPTH_VIEW_BELL") {
            config.bell = parse_bool(&value)
                .ok_or_else(|| anyhow!("invalid DEPTH_VIEW_BELL value: {value}"))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Clamps the depth limit into the range the stream supports and rejects
    /// values that would stall a loop or divide by zero.
    pub fn validate(&mut self) -> Result<()> {
        self.depth_limit = self.depth_limit.clamp(1, MAX_DEPTH_LIMIT);

        if self.symbol.trim().is_empty() {
            return Err(anyhow!("symbol cannot be empty"));
        }
        if self.coin_id.trim().is_empty() || self.vs_currency.trim().is_empty() {
            return Err(anyhow!("coin id and vs currency cannot be empty"));
        }
        if !self.depth_floor.is_finite() || self.depth_floor < 0.0 {
            return Err(anyhow!("depth floor must be a non-negative number"));
        }
        if !self.significant_move_threshold.is_finite() || self.significant_move_threshold < 0.0 {
            return Err(anyhow!("move threshold must be a non-negative number"));
        }
        if self.poll_interval_ms == 0 || self.render_ms == 0 || self.request_timeout_ms == 0 {
            return Err(anyhow!("poll, render and request intervals must be greater than 0"));
        }
        if self.reconnect_delay_ms == 0 {
            return Err(anyhow!("reconnect delay must be greater than 0"));
        }

        Ok(())
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
        }
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(self.poll_interval_ms),
            significant_move_threshold: self.significant_move_threshold,
        }
    }
}

fn trim_url(value: &str) -> String {
    value.trim().trim_end_matches('/').to_string()
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}
