//! Integration tests for the payment status feed

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{payment, transfer, FlakyStore, ScriptedSource};
use std::sync::Arc;
use std::time::Duration;
use symbol_payment_gateway::api::payment_status::{FeedStatus, PaymentStatusStream, StatusMessage};
use symbol_payment_gateway::chains::symbol::errors::SymbolError;
use symbol_payment_gateway::database::payment_repository::{
    InMemoryPaymentStore, PaymentStatus, PaymentStore,
};
use tokio::sync::{mpsc, watch};

const POLL: Duration = Duration::from_millis(40);

async fn collect(
    store: Arc<InMemoryPaymentStore>,
    source: Arc<ScriptedSource>,
    payment_id: &str,
) -> Vec<StatusMessage> {
    let (tx, mut rx) = mpsc::channel(64);
    let stream = PaymentStatusStream::new(payment_id, store, source, POLL);
    let task = tokio::spawn(stream.run(tx));

    let mut messages = Vec::new();
    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(message) = rx.recv().await {
            messages.push(message);
        }
    })
    .await;
    assert!(drained.is_ok(), "stream did not close: {:?}", messages);
    task.await.unwrap();
    messages
}

fn terminal_count(messages: &[StatusMessage]) -> usize {
    messages
        .iter()
        .filter(|m| matches!(m.status, FeedStatus::Confirmed | FeedStatus::Expired))
        .count()
}

#[tokio::test]
async fn test_transfer_arriving_later_confirms_payment() {
    let store = Arc::new(InMemoryPaymentStore::new());
    let expire_at = Utc::now() + ChronoDuration::minutes(5);
    store.insert(payment("p-confirm", PaymentStatus::Pending, expire_at)).await;

    let landed_at = Utc::now() + ChronoDuration::minutes(1);
    let source = ScriptedSource::new(vec![Ok(None), Ok(Some(transfer("TXCONFIRM", landed_at)))]);

    let messages = collect(store.clone(), source.clone(), "p-confirm").await;

    assert_eq!(messages.first().unwrap().status, FeedStatus::Pending);
    assert!(messages.iter().any(|m| m.status == FeedStatus::Monitoring));
    let last = messages.last().unwrap();
    assert_eq!(last.status, FeedStatus::Confirmed);
    assert_eq!(last.transaction_id.as_deref(), Some("TXCONFIRM"));
    assert_eq!(last.confirmed_at, Some(landed_at));
    assert_eq!(terminal_count(&messages), 1);
    assert_eq!(source.calls(), 2);

    let stored = store.find_payment("p-confirm").await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Confirmed);
    assert_eq!(stored.transaction_id.as_deref(), Some("TXCONFIRM"));
    assert_eq!(stored.sender_address.as_deref(), Some("TSENDERADDRESS"));
}

#[tokio::test]
async fn test_no_transfer_expires_exactly_once() {
    let store = Arc::new(InMemoryPaymentStore::new());
    let expire_at = Utc::now() + ChronoDuration::milliseconds(250);
    store.insert(payment("p-expire", PaymentStatus::Pending, expire_at)).await;
    let source = ScriptedSource::new(Vec::new());

    let messages = collect(store.clone(), source.clone(), "p-expire").await;

    assert_eq!(messages.first().unwrap().status, FeedStatus::Pending);
    assert_eq!(messages.last().unwrap().status, FeedStatus::Expired);
    assert_eq!(terminal_count(&messages), 1);

    let stored = store.find_payment("p-expire").await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Expired);

    // the watch is gone once the stream closed
    let calls = source.calls();
    tokio::time::sleep(POLL * 3).await;
    assert_eq!(source.calls(), calls);
}

#[tokio::test]
async fn test_late_transfer_on_expired_payment_confirms_once() {
    let store = Arc::new(InMemoryPaymentStore::new());
    let expire_at = Utc::now() - ChronoDuration::minutes(1);
    store.insert(payment("p-late", PaymentStatus::Expired, expire_at)).await;

    let landed_at = expire_at + ChronoDuration::seconds(20);
    let source = ScriptedSource::new(vec![Ok(Some(transfer("TXLATE", landed_at)))]);

    let messages = collect(store.clone(), source.clone(), "p-late").await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].status, FeedStatus::Confirmed);
    assert_eq!(messages[0].transaction_id.as_deref(), Some("TXLATE"));
    assert_eq!(source.calls(), 1);

    let stored = store.find_payment("p-late").await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Confirmed);

    // reopening reports the stored confirmation without another scan
    let messages = collect(store.clone(), source.clone(), "p-late").await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].status, FeedStatus::Confirmed);
    assert_eq!(messages[0].transaction_id.as_deref(), Some("TXLATE"));
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn test_past_deadline_without_transfer_reports_expired() {
    let store = Arc::new(InMemoryPaymentStore::new());
    let expire_at = Utc::now() - ChronoDuration::seconds(5);
    store.insert(payment("p-overdue", PaymentStatus::Pending, expire_at)).await;
    let source = ScriptedSource::new(vec![Err(SymbolError::all_nodes_unavailable("down"))]);

    let messages = collect(store.clone(), source.clone(), "p-overdue").await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].status, FeedStatus::Expired);
    assert_eq!(source.calls(), 1);

    let stored = store.find_payment("p-overdue").await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Expired);
}

#[tokio::test]
async fn test_node_outage_is_reported_but_not_terminal() {
    let store = Arc::new(InMemoryPaymentStore::new());
    let expire_at = Utc::now() + ChronoDuration::minutes(5);
    store.insert(payment("p-outage", PaymentStatus::Pending, expire_at)).await;
    let source = ScriptedSource::new(vec![
        Err(SymbolError::all_nodes_unavailable("timeout")),
        Ok(Some(transfer("TXAFTER", Utc::now()))),
    ]);

    let messages = collect(store, source, "p-outage").await;
    let statuses: Vec<FeedStatus> = messages.iter().map(|m| m.status).collect();
    assert_eq!(
        statuses,
        vec![FeedStatus::Pending, FeedStatus::Error, FeedStatus::Confirmed]
    );
}

#[tokio::test]
async fn test_unknown_and_cancelled_payments_report_error() {
    let store = Arc::new(InMemoryPaymentStore::new());
    let source = ScriptedSource::new(Vec::new());

    let messages = collect(store.clone(), source.clone(), "missing").await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].status, FeedStatus::Error);

    let expire_at = Utc::now() + ChronoDuration::minutes(5);
    store.insert(payment("p-cancel", PaymentStatus::Cancelled, expire_at)).await;
    let messages = collect(store, source.clone(), "p-cancel").await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].status, FeedStatus::Error);
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn test_disconnect_stops_polling() {
    let store = Arc::new(InMemoryPaymentStore::new());
    let expire_at = Utc::now() + ChronoDuration::minutes(5);
    store.insert(payment("p-gone", PaymentStatus::Pending, expire_at)).await;
    let source = ScriptedSource::new(Vec::new());

    let (tx, mut rx) = mpsc::channel(64);
    let stream = PaymentStatusStream::new("p-gone", store.clone(), source.clone(), POLL);
    let task = tokio::spawn(stream.run(tx));

    assert_eq!(rx.recv().await.unwrap().status, FeedStatus::Pending);
    drop(rx);

    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("stream should stop after disconnect")
        .unwrap();
    let calls = source.calls();
    tokio::time::sleep(POLL * 3).await;
    assert_eq!(source.calls(), calls);

    let stored = store.find_payment("p-gone").await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_shutdown_closes_open_streams() {
    let store = Arc::new(InMemoryPaymentStore::new());
    let expire_at = Utc::now() + ChronoDuration::minutes(5);
    store.insert(payment("p-shutdown", PaymentStatus::Pending, expire_at)).await;
    let source = ScriptedSource::new(Vec::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (tx, mut rx) = mpsc::channel(64);
    let stream = PaymentStatusStream::new("p-shutdown", store, source, POLL)
        .with_shutdown(shutdown_rx);
    let task = tokio::spawn(stream.run(tx));

    assert_eq!(rx.recv().await.unwrap().status, FeedStatus::Pending);
    shutdown_tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("stream should stop on shutdown")
        .unwrap();
    while let Some(message) = rx.recv().await {
        assert!(!matches!(message.status, FeedStatus::Confirmed | FeedStatus::Expired));
    }
}

#[tokio::test]
async fn test_failed_confirmation_write_is_retried_before_confirming() {
    let expire_at = Utc::now() + ChronoDuration::minutes(5);
    let store = FlakyStore::with_payment(payment("p-flaky", PaymentStatus::Pending, expire_at), 2).await;
    let source = ScriptedSource::new(vec![Ok(Some(transfer("TXSAVED", Utc::now())))]);

    let (tx, mut rx) = mpsc::channel(64);
    let stream = PaymentStatusStream::new("p-flaky", store.clone(), source.clone(), POLL);
    let task = tokio::spawn(stream.run(tx));

    let mut messages = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(message) = rx.recv().await {
            messages.push(message);
        }
    })
    .await
    .expect("stream should close once the write lands");
    task.await.unwrap();

    let statuses: Vec<FeedStatus> = messages.iter().map(|m| m.status).collect();
    assert_eq!(
        statuses,
        vec![
            FeedStatus::Pending,
            FeedStatus::Error,
            FeedStatus::Error,
            FeedStatus::Confirmed
        ]
    );
    assert_eq!(messages[3].transaction_id.as_deref(), Some("TXSAVED"));
    assert_eq!(store.confirm_attempts(), 3);
    // the retry reuses the found transfer instead of rescanning
    assert_eq!(source.calls(), 1);

    let stored = store.find_payment("p-flaky").await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Confirmed);
    assert_eq!(stored.transaction_id.as_deref(), Some("TXSAVED"));
}

#[tokio::test]
async fn test_unsaved_confirmation_is_never_reported_as_confirmed() {
    let expire_at = Utc::now() + ChronoDuration::minutes(5);
    let store =
        FlakyStore::with_payment(payment("p-down", PaymentStatus::Pending, expire_at), usize::MAX).await;
    let source = ScriptedSource::new(vec![Ok(Some(transfer("TXLOST", Utc::now())))]);

    let (tx, mut rx) = mpsc::channel(64);
    let stream = PaymentStatusStream::new("p-down", store.clone(), source, POLL);
    let task = tokio::spawn(stream.run(tx));

    tokio::time::sleep(POLL * 5).await;
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    assert!(store.confirm_attempts() >= 3);
    assert!(messages.iter().all(|m| m.status != FeedStatus::Confirmed));
    assert!(messages.iter().skip(1).all(|m| m.status == FeedStatus::Error));

    drop(rx);
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("stream should stop after disconnect")
        .unwrap();
    let stored = store.find_payment("p-down").await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_match_queued_at_the_deadline_wins_over_expiry() {
    let store = Arc::new(InMemoryPaymentStore::new());
    let expire_at = Utc::now() + ChronoDuration::milliseconds(150);
    store.insert(payment("p-edge", PaymentStatus::Pending, expire_at)).await;
    let source = ScriptedSource::new(vec![
        Ok(None),
        Ok(Some(transfer("TXEDGE", Utc::now()))),
    ]);

    // Room for the snapshot only: the stream blocks pushing `monitoring`
    // while the match queues up and the deadline passes, so both are
    // ready when it next selects.
    let (tx, mut rx) = mpsc::channel(1);
    let stream = PaymentStatusStream::new("p-edge", store.clone(), source.clone(), Duration::from_millis(20));
    let task = tokio::spawn(stream.run(tx));

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(source.calls(), 2);

    let mut messages = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(message) = rx.recv().await {
            messages.push(message);
        }
    })
    .await
    .expect("stream should close");
    task.await.unwrap();

    let statuses: Vec<FeedStatus> = messages.iter().map(|m| m.status).collect();
    assert_eq!(
        statuses,
        vec![FeedStatus::Pending, FeedStatus::Monitoring, FeedStatus::Confirmed]
    );
    let stored = store.find_payment("p-edge").await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Confirmed);
}
