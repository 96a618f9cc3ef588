use std::sync::Arc;

use tokio::{sync::watch, task::JoinHandle};

use crate::{
    models::Candle,
    sources::{FeedError, HistoryPoint, HistorySource},
    state::{wait_for_shutdown, ActiveFlag, Publisher},
};

pub const DEFAULT_HISTORY_DAYS: u32 = 90;
pub const SYNTHETIC_WICK_RATIO: f64 = 0.002;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum HistoryState {
    #[default]
    Loading,
    Loaded(Arc<Vec<Candle>>),
    Unavailable(String),
}

pub async fn load_history(
    source: &dyn HistorySource,
    lookback_days: u32,
) -> Result<Vec<Candle>, FeedError> {
    let points = source.fetch_history(lookback_days).await?;
    Ok(to_synthetic_candles(&points))
}

/// Builds candles from a close-only series. Each candle opens at the
/// previous close and its wicks sit `SYNTHETIC_WICK_RATIO` beyond the body.
pub fn to_synthetic_candles(points: &[HistoryPoint]) -> Vec<Candle> {
    let mut usable = points
        .iter()
        .filter(|point| point.price.is_finite() && point.price > 0.0)
        .copied()
        .collect::<Vec<_>>();
    usable.sort_by_key(|point| point.timestamp_ms);

    let mut candles = Vec::with_capacity(usable.len());
    let mut previous_close: Option<f64> = None;
    for point in usable {
        let open = previous_close.unwrap_or(point.price);
        let close = point.price;
        candles.push(Candle {
            timestamp_ms: point.timestamp_ms,
            open,
            high: open.max(close) * (1.0 + SYNTHETIC_WICK_RATIO),
            low: open.min(close) * (1.0 - SYNTHETIC_WICK_RATIO),
            close,
        });
        previous_close = Some(close);
    }

    candles
}

/// Merges consecutive candles so the series fits in `max_columns`.
pub fn resample_candles(candles: &[Candle], max_columns: usize) -> Vec<Candle> {
    if max_columns == 0 {
        return Vec::new();
    }
    if candles.len() <= max_columns {
        return candles.to_vec();
    }

    let bucket = candles.len().div_ceil(max_columns);
    candles
        .chunks(bucket)
        .filter_map(|chunk| {
            let first = chunk.first()?;
            let last = chunk.last()?;
            Some(Candle {
                timestamp_ms: first.timestamp_ms,
                open: first.open,
                high: chunk.iter().map(|candle| candle.high).fold(f64::MIN, f64::max),
                low: chunk.iter().map(|candle| candle.low).fold(f64::MAX, f64::min),
                close: last.close,
            })
        })
        .collect()
}

/// One-shot startup fetch. Failures are published once and not retried.
pub struct HistoryLoader {
    shutdown: watch::Sender<bool>,
    active: ActiveFlag,
    task: JoinHandle<()>,
}

impl HistoryLoader {
    pub fn start(
        source: Arc<dyn HistorySource>,
        history: Publisher<HistoryState>,
        lookback_days: u32,
    ) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let active = history.active_flag();

        let task = tokio::spawn(async move {
            let loaded = tokio::select! {
                _ = wait_for_shutdown(&mut shutdown_rx) => return,
                loaded = load_history(source.as_ref(), lookback_days) => loaded,
            };

            match loaded {
                Ok(candles) => {
                    tracing::info!(candles = candles.len(), lookback_days, "loaded price history");
                    history.publish(HistoryState::Loaded(Arc::new(candles)));
                }
                Err(err) => {
                    tracing::warn!(error = %err, "failed to load price history");
                    history.publish(HistoryState::Unavailable(err.to_string()));
                }
            }
        });

        Self {
            shutdown,
            active,
            task,
        }
    }

    pub fn stop(&self) {
        self.active.deactivate();
        self.shutdown.send_replace(true);
    }

    pub async fn join(self) {
        self.stop();
        if let Err(err) = self.task.await {
            tracing::warn!(error = %err, "history task ended abnormally");
        }
    }
}
