use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::Utc;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

use crate::{
    models::{MoveDirection, PriceAlert, PriceQuote, PriceStat},
    sources::PriceSource,
    state::{wait_for_shutdown, ActiveFlag, Publisher},
};

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 8_000;
pub const DEFAULT_SIGNIFICANT_MOVE_THRESHOLD: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollConfig {
    pub interval: Duration,
    /// Relative change between consecutive successful fetches that raises an
    /// alert. Compared with `>`, so a move of exactly this size is quiet.
    pub significant_move_threshold: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            significant_move_threshold: DEFAULT_SIGNIFICANT_MOVE_THRESHOLD,
        }
    }
}

#[derive(Debug, Default)]
pub struct PollStats {
    fetches: AtomicU64,
    failures: AtomicU64,
    alerts: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollStatsSnapshot {
    pub fetches: u64,
    pub failures: u64,
    pub alerts: u64,
}

impl PollStats {
    pub fn snapshot(&self) -> PollStatsSnapshot {
        PollStatsSnapshot {
            fetches: self.fetches.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            alerts: self.alerts.load(Ordering::Relaxed),
        }
    }
}

pub struct PollSupervisor {
    shutdown: watch::Sender<bool>,
    active: ActiveFlag,
    stats: Arc<PollStats>,
    task: JoinHandle<()>,
}

impl PollSupervisor {
    /// Fetches immediately, then once per `config.interval`.
    pub fn start(
        source: Arc<dyn PriceSource>,
        price: Publisher<PriceStat>,
        alerts: mpsc::UnboundedSender<PriceAlert>,
        config: PollConfig,
    ) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(PollStats::default());
        let active = price.active_flag();

        let task = tokio::spawn(poll_loop(
            source,
            price,
            alerts,
            config,
            stats.clone(),
            shutdown_rx,
        ));

        Self {
            shutdown,
            active,
            stats,
            task,
        }
    }

    pub fn stop(&self) {
        self.active.deactivate();
        self.shutdown.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        !self.active.is_active()
    }

    pub fn stats(&self) -> PollStatsSnapshot {
        self.stats.snapshot()
    }

    pub async fn join(self) {
        self.stop();
        if let Err(err) = self.task.await {
            tracing::warn!(error = %err, "price poll task ended abnormally");
        }
    }
}

async fn poll_loop(
    source: Arc<dyn PriceSource>,
    price: Publisher<PriceStat>,
    alerts: mpsc::UnboundedSender<PriceAlert>,
    config: PollConfig,
    stats: Arc<PollStats>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // last successful observation; failures leave it alone
    let mut previous: Option<f64> = None;

    loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => return,
            _ = ticker.tick() => {}
        }

        let fetched = tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => return,
            fetched = source.fetch_price() => fetched,
        };

        if !price.is_active() {
            return;
        }
        stats.fetches.fetch_add(1, Ordering::Relaxed);

        match fetched {
            Ok(sample) => {
                let alert = classify_move(
                    previous,
                    sample.last_price,
                    config.significant_move_threshold,
                );
                previous = Some(sample.last_price);

                price.publish(PriceStat::Live(PriceQuote {
                    last_price: sample.last_price,
                    change_24h_percent: sample.change_24h_percent,
                    fetched_at: Utc::now(),
                }));

                if let Some(alert) = alert {
                    stats.alerts.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(
                        previous = alert.previous,
                        current = alert.current,
                        direction = alert.direction.as_str(),
                        "significant price move"
                    );
                    let _ = alerts.send(alert);
                }
            }
            Err(err) => {
                stats.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %err, "price fetch failed");
                price.publish(PriceStat::Unavailable {
                    reason: err.to_string(),
                    fetched_at: Utc::now(),
                });
            }
        }
    }
}

/// Compares two consecutive successful observations.
///
/// Returns `None` without a previous price, for a zero previous price, and for
/// non-finite inputs.
pub fn classify_move(previous: Option<f64>, current: f64, threshold: f64) -> Option<PriceAlert> {
    let previous = previous?;
    if previous == 0.0 || !previous.is_finite() || !current.is_finite() {
        return None;
    }

    let change_ratio = (current - previous).abs() / previous.abs();
    if change_ratio <= threshold {
        return None;
    }

    let direction = if current > previous {
        MoveDirection::Up
    } else {
        MoveDirection::Down
    };

    Some(PriceAlert {
        previous,
        current,
        change_ratio,
        direction,
        observed_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use async_trait::async_trait;
    use tokio::time::{sleep, timeout};

    use super::*;
    use crate::{
        sources::{FeedError, PriceSample},
        state::cell,
    };

    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<f64, String>>>,
        delay: Duration,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<f64, String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl PriceSource for ScriptedSource {
        async fn fetch_price(&self) -> Result<PriceSample, FeedError> {
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }

            let next = self
                .responses
                .lock()
                .expect("responses lock")
                .pop_front()
                .unwrap_or_else(|| Err("script exhausted".to_string()));

            next.map(|last_price| PriceSample {
                last_price,
                change_24h_percent: 1.25,
            })
            .map_err(FeedError::Data)
        }
    }

    #[test]
    fn two_percent_move_is_significant() {
        let alert = classify_move(Some(100.0), 102.0, DEFAULT_SIGNIFICANT_MOVE_THRESHOLD)
            .expect("2% move should alert");
        assert_eq!(alert.direction, MoveDirection::Up);
        assert!((alert.change_ratio - 0.02).abs() < 1e-12);

        let down = classify_move(Some(100.0), 97.0, DEFAULT_SIGNIFICANT_MOVE_THRESHOLD)
            .expect("3% drop should alert");
        assert_eq!(down.direction, MoveDirection::Down);
    }

    #[test]
    fn small_and_boundary_moves_are_quiet() {
        assert!(classify_move(Some(100.0), 100.5, DEFAULT_SIGNIFICANT_MOVE_THRESHOLD).is_none());
        assert!(classify_move(Some(100.0), 101.0, DEFAULT_SIGNIFICANT_MOVE_THRESHOLD).is_none());
    }

    #[test]
    fn missing_or_zero_previous_never_classifies() {
        assert!(classify_move(None, 500.0, DEFAULT_SIGNIFICANT_MOVE_THRESHOLD).is_none());
        assert!(classify_move(Some(0.0), 500.0, DEFAULT_SIGNIFICANT_MOVE_THRESHOLD).is_none());
        assert!(classify_move(Some(100.0), f64::NAN, DEFAULT_SIGNIFICANT_MOVE_THRESHOLD).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn alerts_once_for_a_significant_move_between_polls() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(100.0), Ok(102.0), Ok(102.5)]));
        let (price, price_rx) = cell(PriceStat::Pending);
        let (alert_tx, mut alert_rx) = mpsc::unbounded_channel();

        let supervisor = PollSupervisor::start(source, price, alert_tx, PollConfig::default());
        sleep(Duration::from_millis(10)).await;
        assert_eq!(price_rx.borrow().last_price(), Some(100.0));
        assert!(alert_rx.try_recv().is_err());

        sleep(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)).await;
        assert_eq!(price_rx.borrow().last_price(), Some(102.0));
        let alert = alert_rx.try_recv().expect("alert should be sent");
        assert_eq!(alert.previous, 100.0);
        assert_eq!(alert.current, 102.0);

        sleep(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)).await;
        assert_eq!(price_rx.borrow().last_price(), Some(102.5));
        assert!(alert_rx.try_recv().is_err());

        let stats = supervisor.stats();
        assert_eq!(stats.fetches, 3);
        assert_eq!(stats.alerts, 1);
        supervisor.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_is_unavailable_and_next_success_is_live() {
        let source = Arc::new(ScriptedSource::new(vec![
            Err("expected value at line 1 column 1".to_string()),
            Ok(64_000.0),
        ]));
        let (price, price_rx) = cell(PriceStat::Pending);
        let (alert_tx, _alert_rx) = mpsc::unbounded_channel();

        let supervisor = PollSupervisor::start(source, price, alert_tx, PollConfig::default());
        sleep(Duration::from_millis(10)).await;
        assert!(price_rx.borrow().is_unavailable());
        assert_eq!(price_rx.borrow().last_price(), None);

        sleep(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)).await;
        let current = price_rx.borrow().clone();
        assert_eq!(current.last_price(), Some(64_000.0));
        assert_eq!(current.change_24h_percent(), Some(1.25));

        assert_eq!(supervisor.stats().failures, 1);
        supervisor.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failure_between_observations_keeps_the_previous_price() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(100.0),
            Err("503".to_string()),
            Ok(103.0),
        ]));
        let (price, _price_rx) = cell(PriceStat::Pending);
        let (alert_tx, mut alert_rx) = mpsc::unbounded_channel();

        let supervisor = PollSupervisor::start(source, price, alert_tx, PollConfig::default());
        sleep(Duration::from_millis(2 * DEFAULT_POLL_INTERVAL_MS + 10)).await;

        let alert = alert_rx.try_recv().expect("alert should compare against 100");
        assert_eq!(alert.previous, 100.0);
        assert_eq!(alert.current, 103.0);
        supervisor.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_resolving_after_stop_never_mutates_the_cell() {
        let source = Arc::new(ScriptedSource {
            responses: Mutex::new(vec![Ok(100.0)].into()),
            delay: Duration::from_secs(5),
        });
        let (price, price_rx) = cell(PriceStat::Pending);
        let (alert_tx, _alert_rx) = mpsc::unbounded_channel();

        let supervisor = PollSupervisor::start(source, price, alert_tx, PollConfig::default());
        sleep(Duration::from_secs(1)).await;

        supervisor.stop();
        supervisor.stop();
        sleep(Duration::from_secs(30)).await;

        assert_eq!(*price_rx.borrow(), PriceStat::Pending);
        assert_eq!(supervisor.stats().fetches, 0);
        assert!(supervisor.is_stopped());
        timeout(Duration::from_secs(1), supervisor.join())
            .await
            .expect("poll task should exit after stop");
    }
}
