//! Live payment status feed.
//!
//! One [`PaymentStatusStream`] runs per connected client. It pushes a
//! snapshot, keeps a [`PaymentWatch`] polling the chain and closes after
//! exactly one terminal message (`confirmed`, `expired` or a fatal `error`).

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::api::AppState;
use crate::chains::symbol::matcher::TransferSource;
use crate::chains::symbol::types::ObservedTransfer;
use crate::database::payment_repository::{Confirmation, Payment, PaymentStatus, PaymentStore};
use crate::workers::payment_watch::{PaymentWatch, WatchEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedStatus {
    Pending,
    Confirmed,
    Expired,
    Error,
    Monitoring,
}

impl FeedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedStatus::Pending => "pending",
            FeedStatus::Confirmed => "confirmed",
            FeedStatus::Expired => "expired",
            FeedStatus::Error => "error",
            FeedStatus::Monitoring => "monitoring",
        }
    }
}

/// One message on the status feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    pub status: FeedStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl StatusMessage {
    fn new(status: FeedStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            transaction_id: None,
            confirmed_at: None,
        }
    }

    pub fn pending() -> Self {
        Self::new(FeedStatus::Pending, "Waiting for payment")
    }

    pub fn monitoring() -> Self {
        Self::new(FeedStatus::Monitoring, "Still watching the Symbol network")
    }

    pub fn expired() -> Self {
        Self::new(FeedStatus::Expired, "Payment window has expired")
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(FeedStatus::Error, message)
    }

    pub fn confirmed(transaction_id: impl Into<String>, confirmed_at: DateTime<Utc>) -> Self {
        Self {
            status: FeedStatus::Confirmed,
            message: "Payment confirmed".to_string(),
            transaction_id: Some(transaction_id.into()),
            confirmed_at: Some(confirmed_at),
        }
    }
}

/// Drives the feed for one connection.
pub struct PaymentStatusStream {
    payment_id: String,
    store: Arc<dyn PaymentStore>,
    source: Arc<dyn TransferSource>,
    poll_interval: Duration,
    shutdown: Option<watch::Receiver<bool>>,
}

impl PaymentStatusStream {
    pub fn new(
        payment_id: impl Into<String>,
        store: Arc<dyn PaymentStore>,
        source: Arc<dyn TransferSource>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            payment_id: payment_id.into(),
            store,
            source,
            poll_interval,
            shutdown: None,
        }
    }

    /// Ends the feed without a terminal message once `shutdown` flips to true.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Runs until a terminal message is sent or the receiver goes away.
    pub async fn run(mut self, tx: mpsc::Sender<StatusMessage>) {
        let mut shutdown = self.shutdown.take();

        let payment = match self.store.find_payment(&self.payment_id).await {
            Ok(Some(payment)) => payment,
            Ok(None) => {
                let _ = tx.send(StatusMessage::error("Payment not found")).await;
                return;
            }
            Err(e) => {
                error!(payment_id = %self.payment_id, error = %e, "Failed to load payment");
                let _ = tx.send(StatusMessage::error("Unable to load payment")).await;
                return;
            }
        };

        match payment.status {
            PaymentStatus::Confirmed => {
                let _ = tx.send(confirmed_snapshot(&payment)).await;
                return;
            }
            PaymentStatus::Cancelled => {
                let _ = tx.send(StatusMessage::error("Payment was cancelled")).await;
                return;
            }
            PaymentStatus::Expired => {
                self.last_chance(&payment, &tx, &mut shutdown).await;
                return;
            }
            PaymentStatus::Pending => {}
        }

        if payment.is_past_expiry(Utc::now()) {
            self.last_chance(&payment, &tx, &mut shutdown).await;
            return;
        }

        if tx.send(StatusMessage::pending()).await.is_err() {
            return;
        }

        let fingerprint = match payment.fingerprint(None) {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                error!(payment_id = %self.payment_id, error = %e, "Payment cannot be matched");
                let _ = tx.send(StatusMessage::error("Payment details are invalid")).await;
                return;
            }
        };

        let watch = PaymentWatch::new(self.source.clone(), self.poll_interval);
        let (handle, mut events) = watch.start(self.payment_id.clone(), fingerprint);

        let until_expiry = (payment.expire_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let expiry = tokio::time::sleep(until_expiry);
        tokio::pin!(expiry);

        info!(
            payment_id = %self.payment_id,
            expires_in_secs = until_expiry.as_secs(),
            "Payment status stream opened"
        );

        loop {
            // A match already queued wins over a deadline that elapsed in
            // the same instant.
            tokio::select! {
                biased;

                _ = shutdown_requested(&mut shutdown) => {
                    debug!(payment_id = %self.payment_id, "Status stream closed for shutdown");
                    break;
                }
                _ = tx.closed() => {
                    debug!(payment_id = %self.payment_id, "Status subscriber disconnected");
                    break;
                }
                event = events.recv() => match event {
                    Some(WatchEvent::Matched(transfer)) => {
                        handle.stop();
                        self.confirm(&transfer, &tx, &mut shutdown).await;
                        break;
                    }
                    Some(WatchEvent::NoMatch) => {
                        if tx.send(StatusMessage::monitoring()).await.is_err() {
                            break;
                        }
                    }
                    Some(WatchEvent::CheckFailed(e)) => {
                        let message = if e.is_connectivity() {
                            "Symbol network unreachable, retrying".to_string()
                        } else {
                            format!("Payment check failed: {}", e)
                        };
                        if tx.send(StatusMessage::error(message)).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        warn!(payment_id = %self.payment_id, "Payment watch ended unexpectedly");
                        break;
                    }
                },
                _ = &mut expiry => {
                    handle.stop();
                    self.expire(&tx).await;
                    break;
                }
            }
        }

        handle.shutdown().await;
    }

    /// Persists the match, then pushes the outcome.
    ///
    /// `confirmed` goes out only once the record says so. While the store
    /// rejects the write the client hears a non-terminal `error` and the
    /// write is retried every poll interval. The watch is already stopped,
    /// so this loop is the only retry for the found transfer.
    async fn confirm(
        &self,
        transfer: &ObservedTransfer,
        tx: &mpsc::Sender<StatusMessage>,
        shutdown: &mut Option<watch::Receiver<bool>>,
    ) {
        let confirmation = Confirmation::from(transfer);
        let mut attempt = 1u32;

        loop {
            match self.try_confirm(transfer, &confirmation).await {
                Ok(message) => {
                    let _ = tx.send(message).await;
                    return;
                }
                Err(reason) => {
                    error!(
                        payment_id = %self.payment_id,
                        transaction_id = %transfer.transaction_id,
                        attempt,
                        error = %reason,
                        "Failed to persist payment confirmation, will retry"
                    );
                    let notice = StatusMessage::error("Payment found, saving confirmation");
                    if tx.send(notice).await.is_err() {
                        return;
                    }
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = tx.closed() => return,
                _ = shutdown_requested(shutdown) => return,
            }
            attempt += 1;
        }
    }

    /// One confirmation write. `Err` means the outcome is still unknown.
    async fn try_confirm(
        &self,
        transfer: &ObservedTransfer,
        confirmation: &Confirmation,
    ) -> Result<StatusMessage, String> {
        match self.store.mark_confirmed(&self.payment_id, confirmation).await {
            Ok(true) => {
                info!(
                    payment_id = %self.payment_id,
                    transaction_id = %transfer.transaction_id,
                    "Payment confirmed"
                );
                Ok(StatusMessage::confirmed(&transfer.transaction_id, transfer.timestamp))
            }
            // someone else already settled the record
            Ok(false) => match self.store.find_payment(&self.payment_id).await {
                Ok(Some(payment)) => match payment.status {
                    PaymentStatus::Confirmed => Ok(confirmed_snapshot(&payment)),
                    PaymentStatus::Cancelled => Ok(StatusMessage::error("Payment was cancelled")),
                    other => Err(format!("record still {} after confirm", other.as_str())),
                },
                Ok(None) => Ok(StatusMessage::error("Payment not found")),
                Err(e) => Err(e.to_string()),
            },
            Err(e) => Err(e.to_string()),
        }
    }

    /// Local deadline reached while watching.
    async fn expire(&self, tx: &mpsc::Sender<StatusMessage>) {
        let message = match self.store.mark_expired(&self.payment_id).await {
            Ok(true) => {
                info!(payment_id = %self.payment_id, "Payment expired");
                StatusMessage::expired()
            }
            Ok(false) => match self.store.find_payment(&self.payment_id).await {
                Ok(Some(payment)) if payment.status == PaymentStatus::Confirmed => {
                    confirmed_snapshot(&payment)
                }
                _ => StatusMessage::expired(),
            },
            Err(e) => {
                error!(payment_id = %self.payment_id, error = %e, "Failed to mark payment expired");
                StatusMessage::expired()
            }
        };
        let _ = tx.send(message).await;
    }

    /// One final scan for a payment whose window has already closed. A
    /// transfer that landed after the deadline still confirms the order.
    async fn last_chance(
        &self,
        payment: &Payment,
        tx: &mpsc::Sender<StatusMessage>,
        shutdown: &mut Option<watch::Receiver<bool>>,
    ) {
        let found = match payment.fingerprint(None) {
            Ok(fingerprint) => match self.source.find_match(&fingerprint).await {
                Ok(found) => found,
                Err(e) => {
                    warn!(payment_id = %self.payment_id, error = %e, "Last-chance check failed");
                    None
                }
            },
            Err(e) => {
                warn!(payment_id = %self.payment_id, error = %e, "Last-chance check skipped");
                None
            }
        };

        match found {
            Some(transfer) => {
                info!(
                    payment_id = %self.payment_id,
                    transaction_id = %transfer.transaction_id,
                    "Late payment found after expiry"
                );
                self.confirm(&transfer, tx, shutdown).await;
            }
            None => {
                if payment.status == PaymentStatus::Pending {
                    if let Err(e) = self.store.mark_expired(&self.payment_id).await {
                        error!(payment_id = %self.payment_id, error = %e, "Failed to mark payment expired");
                    }
                }
                let _ = tx.send(StatusMessage::expired()).await;
            }
        }
    }
}

async fn shutdown_requested(shutdown: &mut Option<watch::Receiver<bool>>) {
    if let Some(rx) = shutdown {
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
        if *rx.borrow() {
            return;
        }
    }
    std::future::pending::<()>().await
}

fn confirmed_snapshot(payment: &Payment) -> StatusMessage {
    StatusMessage::confirmed(
        payment.transaction_id.clone().unwrap_or_default(),
        payment.confirmed_at.unwrap_or(payment.created_at),
    )
}

/// `GET /api/payments/{id}/events`
pub async fn payment_events(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let (tx, rx) = mpsc::channel::<StatusMessage>(16);

    let stream = PaymentStatusStream::new(
        payment_id,
        state.store.clone(),
        state.source.clone(),
        state.payments.poll_interval,
    )
    .with_shutdown(state.shutdown.clone());
    tokio::spawn(stream.run(tx));

    let events = ReceiverStream::new(rx).map(|message| {
        Event::default()
            .event(message.status.as_str())
            .json_data(&message)
    });

    Sse::new(events).keep_alive(KeepAlive::new().interval(state.payments.keepalive))
}
