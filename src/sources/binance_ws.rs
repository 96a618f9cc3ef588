use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::{BookStreamConnection, BookStreamConnector, FeedError};

pub const DEFAULT_BINANCE_SPOT_WS_URL: &str = "wss://stream.binance.com:9443/ws";

const BINANCE_QUOTES: &[&str] = &["USDT", "USDC", "BUSD", "FDUSD", "BTC", "ETH"];

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Partial book depth stream (`<symbol>@depth<N>@100ms`). Every frame is a
/// full top-N snapshot, so no local book merge is needed.
#[derive(Debug, Clone)]
pub struct BinanceDepthConnector {
    ws_endpoint: String,
}

impl BinanceDepthConnector {
    pub fn new(base_url: &str, symbol: &str, depth_limit: usize) -> Result<Self, FeedError> {
        let market_symbol = normalize_market_symbol(symbol)?;
        let ws_endpoint = format!(
            "{}/{}@depth{}@100ms",
            base_url.trim().trim_end_matches('/'),
            market_symbol.to_ascii_lowercase(),
            to_binance_ws_depth_levels(depth_limit),
        );

        Ok(Self { ws_endpoint })
    }
}

#[async_trait]
impl BookStreamConnector for BinanceDepthConnector {
    fn endpoint(&self) -> &str {
        &self.ws_endpoint
    }

    async fn connect(&self) -> Result<Box<dyn BookStreamConnection>, FeedError> {
        let (stream, _response) = connect_async(self.ws_endpoint.as_str())
            .await
            .map_err(|err| FeedError::Connect(format!("{}: {err}", self.ws_endpoint)))?;

        Ok(Box::new(WsBookConnection { stream }))
    }
}

struct WsBookConnection {
    stream: WsStream,
}

#[async_trait]
impl BookStreamConnection for WsBookConnection {
    async fn next_payload(&mut self) -> Result<Option<String>, FeedError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_str().to_owned())),
                Some(Ok(Message::Binary(binary))) => {
                    // non-utf8 binary still counts as a (malformed) message
                    return Ok(Some(String::from_utf8_lossy(&binary).into_owned()));
                }
                Some(Ok(Message::Ping(payload))) => {
                    self.stream
                        .send(Message::Pong(payload))
                        .await
                        .map_err(|err| FeedError::Transport(format!("failed to reply to ping: {err}")))?;
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Err(err)) => return Err(FeedError::Transport(err.to_string())),
                Some(Ok(_)) => {}
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

pub fn to_binance_ws_depth_levels(levels: usize) -> usize {
    if levels <= 5 {
        5
    } else if levels <= 10 {
        10
    } else {
        20
    }
}

/// Accepts `BTCUSDT`, `btcusdt`, `BTC/USDT` and `BTC/USDT:USDT`.
pub fn normalize_market_symbol(symbol: &str) -> Result<String, FeedError> {
    let trimmed = symbol.trim();
    if trimmed.is_empty() {
        return Err(FeedError::Internal("`symbol` cannot be empty".to_string()));
    }

    let core = trimmed.split(':').next().unwrap_or_default().trim();
    if core.contains('/') {
        let mut parts = core.split('/');
        let base = sanitize_asset(parts.next().unwrap_or_default());
        let quote = sanitize_asset(parts.next().unwrap_or_default());
        if base.is_empty() || quote.is_empty() || parts.next().is_some() {
            return Err(FeedError::Internal(format!("invalid Binance symbol `{symbol}`")));
        }
        return Ok(format!("{base}{quote}"));
    }

    let collapsed = sanitize_asset(core);
    let has_quote = BINANCE_QUOTES
        .iter()
        .any(|quote| collapsed.len() > quote.len() && collapsed.ends_with(quote));
    if !has_quote {
        return Err(FeedError::Internal(format!("invalid Binance symbol `{symbol}`")));
    }

    Ok(collapsed)
}

fn sanitize_asset(value: &str) -> String {
    value
        .trim()
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_uppercase()
}
