use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{sync::watch, task::JoinHandle, time::sleep};

use crate::{
    models::{BookSnapshot, ConnectionState, ConnectionStatus},
    parse::parse_depth_message,
    sources::BookStreamConnector,
    state::{cell, wait_for_shutdown, ActiveFlag, Publisher},
};

pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Fixed wait between a close and the next connect attempt.
    pub reconnect_delay: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
        }
    }
}

#[derive(Debug, Default)]
pub struct StreamStats {
    connections_opened: AtomicU64,
    reconnects_scheduled: AtomicU64,
    snapshots_published: AtomicU64,
    dropped_messages: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamStatsSnapshot {
    pub connections_opened: u64,
    pub reconnects_scheduled: u64,
    pub snapshots_published: u64,
    pub dropped_messages: u64,
}

impl StreamStats {
    pub fn snapshot(&self) -> StreamStatsSnapshot {
        StreamStatsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            reconnects_scheduled: self.reconnects_scheduled.load(Ordering::Relaxed),
            snapshots_published: self.snapshots_published.load(Ordering::Relaxed),
            dropped_messages: self.dropped_messages.load(Ordering::Relaxed),
        }
    }
}

/// Handle to the task that keeps the book stream alive.
///
/// The task owns the only writer of the book cell. Dropping the handle
/// without calling `stop` also ends the task, since the shutdown sender goes
/// with it.
pub struct StreamSupervisor {
    endpoint: String,
    shutdown: watch::Sender<bool>,
    book_active: ActiveFlag,
    status_active: ActiveFlag,
    status: watch::Receiver<ConnectionStatus>,
    stats: Arc<StreamStats>,
    task: JoinHandle<()>,
}

struct StreamContext {
    connector: Arc<dyn BookStreamConnector>,
    book: Publisher<Arc<BookSnapshot>>,
    status: Publisher<ConnectionStatus>,
    stats: Arc<StreamStats>,
    config: StreamConfig,
}

enum ConnectionOutcome {
    Stop,
    Reconnect,
}

impl StreamSupervisor {
    pub fn connect(
        connector: Arc<dyn BookStreamConnector>,
        book: Publisher<Arc<BookSnapshot>>,
        config: StreamConfig,
    ) -> Self {
        let endpoint = connector.endpoint().to_string();
        let (status_publisher, status) = cell(ConnectionStatus::initial());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(StreamStats::default());

        let book_active = book.active_flag();
        let status_active = status_publisher.active_flag();

        let context = StreamContext {
            connector,
            book,
            status: status_publisher,
            stats: stats.clone(),
            config,
        };
        let task = tokio::spawn(supervise(context, shutdown_rx));

        Self {
            endpoint,
            shutdown,
            book_active,
            status_active,
            status,
            stats,
            task,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Safe to call from any state, any number of times. Once this returns
    /// the book cell no longer changes.
    pub fn stop(&self) {
        self.book_active.deactivate();
        self.status_active.deactivate();
        self.shutdown.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        !self.book_active.is_active()
    }

    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    pub fn stats(&self) -> StreamStatsSnapshot {
        self.stats.snapshot()
    }

    pub async fn join(self) {
        self.stop();
        if let Err(err) = self.task.await {
            tracing::warn!(endpoint = %self.endpoint, error = %err, "book stream task ended abnormally");
        }
    }
}

async fn supervise(context: StreamContext, mut shutdown: watch::Receiver<bool>) {
    let mut attempt = 0_u64;

    loop {
        if *shutdown.borrow() {
            return;
        }

        attempt += 1;
        context.status.publish(ConnectionStatus {
            state: ConnectionState::Connecting,
            attempt,
            retry_in: None,
        });

        match run_single_connection(&context, attempt, &mut shutdown).await {
            ConnectionOutcome::Stop => return,
            ConnectionOutcome::Reconnect => {
                let delay = context.config.reconnect_delay;
                context.stats.reconnects_scheduled.fetch_add(1, Ordering::Relaxed);
                context.status.publish(ConnectionStatus {
                    state: ConnectionState::Closed,
                    attempt,
                    retry_in: Some(delay),
                });

                tokio::select! {
                    _ = wait_for_shutdown(&mut shutdown) => return,
                    _ = sleep(delay) => {}
                }
            }
        }
    }
}

async fn run_single_connection(
    context: &StreamContext,
    attempt: u64,
    shutdown: &mut watch::Receiver<bool>,
) -> ConnectionOutcome {
    let endpoint = context.connector.endpoint();

    let connected = tokio::select! {
        _ = wait_for_shutdown(shutdown) => return ConnectionOutcome::Stop,
        connected = context.connector.connect() => connected,
    };

    let mut connection = match connected {
        Ok(connection) => connection,
        Err(err) => {
            tracing::warn!(endpoint = %endpoint, attempt, error = %err, "failed to connect book stream");
            return ConnectionOutcome::Reconnect;
        }
    };

    context.stats.connections_opened.fetch_add(1, Ordering::Relaxed);
    context.status.publish(ConnectionStatus {
        state: ConnectionState::Open,
        attempt,
        retry_in: None,
    });
    tracing::info!(endpoint = %endpoint, attempt, "connected book stream");

    loop {
        tokio::select! {
            _ = wait_for_shutdown(shutdown) => {
                connection.close().await;
                return ConnectionOutcome::Stop;
            }
            payload = connection.next_payload() => {
                match payload {
                    Ok(Some(text)) => handle_payload(context, &text),
                    Ok(None) => {
                        tracing::info!(endpoint = %endpoint, "book stream closed by peer");
                        return ConnectionOutcome::Reconnect;
                    }
                    Err(err) => {
                        tracing::warn!(endpoint = %endpoint, error = %err, "book stream transport error");
                        return ConnectionOutcome::Reconnect;
                    }
                }
            }
        }
    }
}

fn handle_payload(context: &StreamContext, text: &str) {
    match parse_depth_message(text) {
        Some(snapshot) => {
            if context.book.publish(Arc::new(snapshot)) {
                context.stats.snapshots_published.fetch_add(1, Ordering::Relaxed);
            }
        }
        None => {
            context.stats.dropped_messages.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(payload_len = text.len(), "dropped malformed book frame");
        }
    }
}
