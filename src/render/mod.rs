//! Fixed-cadence view over the shared cells.
//!
//! The sink only ever reads: it holds receivers for every cell and builds a
//! text frame from whatever is current when a tick fires.

pub mod canvas;
pub mod frame;
pub mod terminal;

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, watch},
    time::{interval, Instant, MissedTickBehavior},
};

use crate::{
    history::HistoryState,
    models::{BookSnapshot, ConnectionStatus, PriceAlert, PriceStat},
    state::wait_for_shutdown,
};

use self::frame::{build_frame, FrameInputs, FrameLayout};

pub use self::terminal::TerminalRenderer;

pub const DEFAULT_RENDER_INTERVAL_MS: u64 = 250;
pub const DEFAULT_ALERT_TICKS: u64 = 12;

pub trait FrameSink {
    fn present(&mut self, frame: &str) -> anyhow::Result<()>;

    fn bell(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    pub symbol: String,
    pub interval: Duration,
    pub layout: FrameLayout,
    /// Ticks an alert stays on screen.
    pub alert_ticks: u64,
    pub bell: bool,
    pub max_frames: Option<u64>,
    pub max_duration: Option<Duration>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            symbol: String::new(),
            interval: Duration::from_millis(DEFAULT_RENDER_INTERVAL_MS),
            layout: FrameLayout::default(),
            alert_ticks: DEFAULT_ALERT_TICKS,
            bell: false,
            max_frames: None,
            max_duration: None,
        }
    }
}

pub struct ViewReceivers {
    pub book: watch::Receiver<Arc<BookSnapshot>>,
    pub price: watch::Receiver<PriceStat>,
    pub connection: watch::Receiver<ConnectionStatus>,
    pub history: watch::Receiver<HistoryState>,
    pub alerts: mpsc::UnboundedReceiver<PriceAlert>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    FrameLimit,
    Duration,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Shutdown => "shutdown requested",
            Self::FrameLimit => "frame limit reached",
            Self::Duration => "duration elapsed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOutcome {
    pub reason: StopReason,
    pub frames: u64,
}

pub fn should_stop(started_at: Instant, frames: u64, config: &RenderConfig) -> Option<StopReason> {
    if let Some(max_frames) = config.max_frames {
        if frames >= max_frames {
            return Some(StopReason::FrameLimit);
        }
    }

    if let Some(max_duration) = config.max_duration {
        if started_at.elapsed() >= max_duration {
            return Some(StopReason::Duration);
        }
    }

    None
}

enum Wake {
    Tick,
    Price,
    Alert(PriceAlert),
}

pub struct RenderSink<S> {
    sink: S,
    config: RenderConfig,
}

impl<S: FrameSink> RenderSink<S> {
    pub fn new(sink: S, config: RenderConfig) -> Self {
        Self { sink, config }
    }

    /// Paints until `stop` fires or a frame/duration limit is hit. Only
    /// errors from the sink itself end the loop early.
    pub async fn run(
        &mut self,
        mut views: ViewReceivers,
        mut stop: watch::Receiver<bool>,
    ) -> anyhow::Result<RenderOutcome> {
        let started_at = Instant::now();
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut frames = 0_u64;
        let mut price_open = true;
        let mut alerts_open = true;
        let mut alert: Option<(PriceAlert, u64)> = None;

        loop {
            let wake = tokio::select! {
                _ = wait_for_shutdown(&mut stop) => {
                    return Ok(RenderOutcome { reason: StopReason::Shutdown, frames });
                }
                _ = ticker.tick() => Wake::Tick,
                changed = views.price.changed(), if price_open => {
                    if changed.is_err() {
                        price_open = false;
                        continue;
                    }
                    Wake::Price
                }
                received = views.alerts.recv(), if alerts_open => match received {
                    Some(received) => Wake::Alert(received),
                    None => {
                        alerts_open = false;
                        continue;
                    }
                },
            };

            match wake {
                Wake::Tick => {
                    if let Some((_, remaining)) = alert.as_mut() {
                        *remaining = remaining.saturating_sub(1);
                    }
                    if matches!(alert, Some((_, 0))) {
                        alert = None;
                    }
                }
                Wake::Price => {}
                Wake::Alert(received) => {
                    alert = Some((received, self.config.alert_ticks.max(1)));
                    if self.config.bell {
                        self.sink.bell()?;
                    }
                }
            }

            let book = views.book.borrow_and_update().clone();
            let price = views.price.borrow_and_update().clone();
            let connection = *views.connection.borrow_and_update();
            let history = views.history.borrow_and_update().clone();

            let frame = build_frame(
                &FrameInputs {
                    symbol: &self.config.symbol,
                    price: &price,
                    connection: &connection,
                    book: &book,
                    history: &history,
                    alert: alert.as_ref().map(|(active, _)| active),
                    frame_index: frames,
                    elapsed: started_at.elapsed(),
                },
                &self.config.layout,
            );
            self.sink.present(&frame)?;
            frames += 1;

            if let Some(reason) = should_stop(started_at, frames, &self.config) {
                return Ok(RenderOutcome { reason, frames });
            }
        }
    }
}
