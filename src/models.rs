use std::time::Duration;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceLevel {
    pub price: f64,
    pub quantity: f64,
}

impl PriceLevel {
    pub fn new(price: f64, quantity: f64) -> Self {
        Self { price, quantity }
    }
}

/// Full replacement view of the book. Bids are best (highest) first, asks are
/// best (lowest) first, and each side holds at most one level per price.
#[derive(Debug, Clone, PartialEq)]
pub struct BookSnapshot {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub received_at: DateTime<Utc>,
    pub last_update_id: Option<u64>,
}

impl BookSnapshot {
    pub fn empty() -> Self {
        Self {
            bids: Vec::new(),
            asks: Vec::new(),
            received_at: Utc::now(),
            last_update_id: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|level| level.price)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|level| level.price)
    }

    pub fn mid_price(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
            _ => None,
        }
    }

    /// `None` for a one-sided or crossed book.
    pub fn spread(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) if ask >= bid => Some(ask - bid),
            _ => None,
        }
    }

    pub fn spread_bps(&self) -> Option<f64> {
        match (self.spread(), self.mid_price()) {
            (Some(spread), Some(mid)) if mid > 0.0 => Some((spread / mid) * 10_000.0),
            _ => None,
        }
    }

    pub fn is_crossed(&self) -> bool {
        matches!((self.best_bid(), self.best_ask()), (Some(bid), Some(ask)) if bid > ask)
    }
}

impl Default for BookSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthPoint {
    pub offset_index: usize,
    pub cumulative_quantity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DepthProfile {
    pub bid_points: Vec<DepthPoint>,
    pub ask_points: Vec<DepthPoint>,
    pub max_quantity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceQuote {
    pub last_price: f64,
    pub change_24h_percent: f64,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum PriceStat {
    #[default]
    Pending,
    Live(PriceQuote),
    Unavailable {
        reason: String,
        fetched_at: DateTime<Utc>,
    },
}

impl PriceStat {
    pub fn last_price(&self) -> Option<f64> {
        match self {
            Self::Live(quote) => Some(quote.last_price),
            _ => None,
        }
    }

    pub fn change_24h_percent(&self) -> Option<f64> {
        match self {
            Self::Live(quote) => Some(quote.change_24h_percent),
            _ => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

impl MoveDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceAlert {
    pub previous: f64,
    pub current: f64,
    pub change_ratio: f64,
    pub direction: MoveDirection,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    pub timestamp_ms: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub attempt: u64,
    pub retry_in: Option<Duration>,
}

impl ConnectionStatus {
    pub fn initial() -> Self {
        Self {
            state: ConnectionState::Connecting,
            attempt: 0,
            retry_in: None,
        }
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::initial()
    }
}
