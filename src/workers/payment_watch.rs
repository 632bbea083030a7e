use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::chains::symbol::{
    errors::SymbolError,
    matcher::TransferSource,
    types::{ObservedTransfer, PaymentFingerprint},
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Outcome of one check, delivered to whoever owns the watch.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// Terminal. The watch stops after sending it.
    Matched(ObservedTransfer),
    NoMatch,
    /// The check failed; polling continues on the next tick.
    CheckFailed(SymbolError),
}

/// Per-subscription polling loop that drives a [`TransferSource`] until a
/// matching transfer shows up or the owner stops it.
pub struct PaymentWatch {
    source: Arc<dyn TransferSource>,
    poll_interval: Duration,
}

/// Owning side of a running watch. Dropping it cancels the watch.
#[derive(Debug)]
pub struct PaymentWatchHandle {
    cancel_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl PaymentWatchHandle {
    pub fn stop(&self) {
        let _ = self.cancel_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stops the watch and waits for its task to exit.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PaymentWatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl PaymentWatch {
    pub fn new(source: Arc<dyn TransferSource>, poll_interval: Duration) -> Self {
        Self {
            source,
            poll_interval,
        }
    }

    /// Spawns the watch. The first check runs immediately; later checks run
    /// every `poll_interval` and never overlap.
    pub fn start(
        self,
        payment_id: impl Into<String>,
        fingerprint: PaymentFingerprint,
    ) -> (PaymentWatchHandle, mpsc::Receiver<WatchEvent>) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (event_tx, event_rx) = mpsc::channel(8);
        let task = tokio::spawn(self.run(payment_id.into(), fingerprint, cancel_rx, event_tx));

        (
            PaymentWatchHandle {
                cancel_tx,
                task: Some(task),
            },
            event_rx,
        )
    }

    async fn run(
        self,
        payment_id: String,
        fingerprint: PaymentFingerprint,
        mut cancel_rx: watch::Receiver<bool>,
        event_tx: mpsc::Sender<WatchEvent>,
    ) {
        debug!(
            payment_id = %payment_id,
            poll_interval_secs = self.poll_interval.as_secs(),
            "payment watch started"
        );

        let mut not_before = fingerprint.not_before;
        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut first = true;

        loop {
            if !first {
                tokio::select! {
                    _ = cancel_rx.changed() => break,
                    _ = ticker.tick() => {}
                }
            }
            first = false;

            if *cancel_rx.borrow() {
                break;
            }

            let checked_at = Utc::now();
            let check = fingerprint.clone().with_not_before(not_before);
            let outcome = tokio::select! {
                _ = cancel_rx.changed() => break,
                outcome = self.source.find_match(&check) => outcome,
            };

            // a stop issued while the check was in flight wins over its result
            if *cancel_rx.borrow() {
                break;
            }

            let (event, terminal) = classify(&payment_id, outcome, &mut not_before, checked_at);
            tokio::select! {
                _ = cancel_rx.changed() => break,
                sent = event_tx.send(event) => {
                    if sent.is_err() || terminal {
                        break;
                    }
                }
            }
        }

        debug!(payment_id = %payment_id, "payment watch stopped");
    }
}

fn classify(
    payment_id: &str,
    outcome: Result<Option<ObservedTransfer>, SymbolError>,
    not_before: &mut Option<DateTime<Utc>>,
    checked_at: DateTime<Utc>,
) -> (WatchEvent, bool) {
    match outcome {
        Ok(Some(transfer)) => {
            info!(
                payment_id = %payment_id,
                transaction_id = %transfer.transaction_id,
                "payment watch matched transfer"
            );
            (WatchEvent::Matched(transfer), true)
        }
        Ok(None) => {
            // Only a completed scan rules transactions out.
            *not_before = Some(checked_at);
            debug!(payment_id = %payment_id, "payment watch found no match");
            (WatchEvent::NoMatch, false)
        }
        Err(e) => {
            warn!(payment_id = %payment_id, error = %e, "payment watch check failed");
            (WatchEvent::CheckFailed(e), false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::symbol::errors::SymbolResult;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const ADDR: &str = "TBRQRUEHXI3OLJD47R3IKMX5TTVV3N6SQ7KY5UA";

    /// Replays scripted outcomes and remembers each fingerprint it saw.
    struct ScriptedSource {
        outcomes: Mutex<VecDeque<SymbolResult<Option<ObservedTransfer>>>>,
        seen: Mutex<Vec<PaymentFingerprint>>,
    }

    impl ScriptedSource {
        fn new(outcomes: Vec<SymbolResult<Option<ObservedTransfer>>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TransferSource for ScriptedSource {
        async fn find_match(
            &self,
            fingerprint: &PaymentFingerprint,
        ) -> SymbolResult<Option<ObservedTransfer>> {
            self.seen.lock().unwrap().push(fingerprint.clone());
            self.outcomes.lock().unwrap().pop_front().unwrap_or(Ok(None))
        }
    }

    fn transfer() -> ObservedTransfer {
        ObservedTransfer {
            transaction_id: "TX1".to_string(),
            sender_address: "SENDER".to_string(),
            recipient_address: ADDR.to_string(),
            amount_micro: 2_000_000,
            message: "ABCD1234".to_string(),
            timestamp: Utc::now(),
            block_height: 10,
        }
    }

    fn fingerprint() -> PaymentFingerprint {
        PaymentFingerprint::new(ADDR, "ABCD1234", 2_000_000, None).unwrap()
    }

    #[tokio::test]
    async fn immediate_match_finishes_without_waiting() {
        let source = ScriptedSource::new(vec![Ok(Some(transfer()))]);
        let watch = PaymentWatch::new(source.clone(), Duration::from_secs(3600));
        let (handle, mut events) = watch.start("p1", fingerprint());

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap();
        assert!(matches!(event, Some(WatchEvent::Matched(t)) if t.transaction_id == "TX1"));
        assert!(events.recv().await.is_none());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn failures_are_not_terminal_and_not_before_advances() {
        let source = ScriptedSource::new(vec![
            Ok(None),
            Err(SymbolError::all_nodes_unavailable("down")),
            Ok(Some(transfer())),
        ]);
        let watch = PaymentWatch::new(source.clone(), Duration::from_millis(30));
        let (_handle, mut events) = watch.start("p1", fingerprint());

        assert!(matches!(events.recv().await, Some(WatchEvent::NoMatch)));
        assert!(matches!(events.recv().await, Some(WatchEvent::CheckFailed(_))));
        assert!(matches!(events.recv().await, Some(WatchEvent::Matched(_))));
        assert!(events.recv().await.is_none());

        let seen = source.seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen[0].not_before.is_none());
        assert!(seen[1].not_before.is_some());
        // the failed check ruled nothing out
        assert_eq!(seen[2].not_before, seen[1].not_before);
    }

    #[tokio::test]
    async fn stopped_watch_never_fires_again() {
        let source = ScriptedSource::new(vec![Ok(None)]);
        let watch = PaymentWatch::new(source.clone(), Duration::from_millis(20));
        let (handle, mut events) = watch.start("p1", fingerprint());

        assert!(matches!(events.recv().await, Some(WatchEvent::NoMatch)));
        handle.shutdown().await;
        while events.recv().await.is_some() {}
        let checks = source.seen.lock().unwrap().len();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(source.seen.lock().unwrap().len(), checks);
    }

    #[tokio::test]
    async fn dropping_the_handle_cancels() {
        let source = ScriptedSource::new(Vec::new());
        let watch = PaymentWatch::new(source.clone(), Duration::from_millis(20));
        let (handle, mut events) = watch.start("p1", fingerprint());
        assert!(matches!(events.recv().await, Some(WatchEvent::NoMatch)));

        drop(handle);
        let closed = tokio::time::timeout(Duration::from_secs(1), async {
            while events.recv().await.is_some() {}
        })
        .await;
        assert!(closed.is_ok());
    }
}
