use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::watch;

/// Write half of a shared cell. Each cell has exactly one publisher, owned by
/// the supervisor that produces its values; readers hold `watch::Receiver`s.
///
/// Once deactivated, `publish` is a no-op, so a late network response cannot
/// touch a view that has been torn down.
#[derive(Debug)]
pub struct Publisher<T> {
    sender: watch::Sender<T>,
    active: Arc<AtomicBool>,
}

pub fn cell<T>(initial: T) -> (Publisher<T>, watch::Receiver<T>) {
    let (sender, receiver) = watch::channel(initial);
    (
        Publisher {
            sender,
            active: Arc::new(AtomicBool::new(true)),
        },
        receiver,
    )
}

impl<T> Publisher<T> {
    /// Replaces the current value wholesale. Returns `false` when the
    /// publisher has been deactivated and the value was discarded.
    pub fn publish(&self, value: T) -> bool {
        if !self.is_active() {
            return false;
        }

        self.sender.send_replace(value);
        true
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn active_flag(&self) -> ActiveFlag {
        ActiveFlag(self.active.clone())
    }
}

#[derive(Debug, Clone)]
pub struct ActiveFlag(Arc<AtomicBool>);

impl ActiveFlag {
    pub fn deactivate(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Resolves once `true` has been sent or the sender is gone.
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use tokio::time::timeout;

    #[test]
    fn publish_replaces_value_and_bumps_version() {
        let (publisher, mut receiver) = cell(1u32);
        assert!(!receiver.has_changed().expect("sender alive"));

        assert!(publisher.publish(2));
        assert!(receiver.has_changed().expect("sender alive"));
        assert_eq!(*receiver.borrow_and_update(), 2);
    }

    #[test]
    fn deactivated_publisher_discards_values() {
        let (publisher, receiver) = cell("initial");
        let flag = publisher.active_flag();
        flag.deactivate();
        flag.deactivate();

        assert!(!publisher.publish("late"));
        assert_eq!(*receiver.borrow(), "initial");
        assert!(!receiver.has_changed().expect("sender alive"));
    }

    #[tokio::test]
    async fn wait_for_shutdown_returns_on_signal_or_drop() {
        let (sender, mut receiver) = watch::channel(false);
        let waiter = tokio::spawn(async move {
            wait_for_shutdown(&mut receiver).await;
        });
        sender.send_replace(true);
        timeout(Duration::from_millis(200), waiter)
            .await
            .expect("waiter should finish after signal")
            .expect("waiter should not panic");

        let (sender, mut receiver) = watch::channel(false);
        drop(sender);
        timeout(Duration::from_millis(200), wait_for_shutdown(&mut receiver))
            .await
            .expect("waiter should finish after sender drop");
    }
}
