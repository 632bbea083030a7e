#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use symbol_payment_gateway::chains::symbol::errors::SymbolResult;
use symbol_payment_gateway::chains::symbol::matcher::TransferSource;
use symbol_payment_gateway::chains::symbol::types::{ObservedTransfer, PaymentFingerprint};
use symbol_payment_gateway::database::error::{DatabaseError, DatabaseErrorKind};
use symbol_payment_gateway::database::payment_repository::{
    Confirmation, InMemoryPaymentStore, NewPayment, Payment, PaymentStatus, PaymentStore,
};

pub const ADDR: &str = "TBRQRUEHXI3OLJD47R3IKMX5TTVV3N6SQ7KY5UA";
pub const REFERENCE: &str = "ABCD1234";
pub const AMOUNT: u64 = 2_000_000;

/// Transfer source that replays scripted answers, then keeps answering
/// "no match".
pub struct ScriptedSource {
    outcomes: Mutex<VecDeque<SymbolResult<Option<ObservedTransfer>>>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(outcomes: Vec<SymbolResult<Option<ObservedTransfer>>>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransferSource for ScriptedSource {
    async fn find_match(
        &self,
        _fingerprint: &PaymentFingerprint,
    ) -> SymbolResult<Option<ObservedTransfer>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcomes.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }
}

pub fn transfer(transaction_id: &str, timestamp: DateTime<Utc>) -> ObservedTransfer {
    ObservedTransfer {
        transaction_id: transaction_id.to_string(),
        sender_address: "TSENDERADDRESS".to_string(),
        recipient_address: ADDR.to_string(),
        amount_micro: AMOUNT,
        message: REFERENCE.to_string(),
        timestamp,
        block_height: 42,
    }
}

pub fn payment(payment_id: &str, status: PaymentStatus, expire_at: DateTime<Utc>) -> Payment {
    Payment {
        payment_id: payment_id.to_string(),
        status,
        recipient_address: ADDR.to_string(),
        amount_micro: AMOUNT,
        message: REFERENCE.to_string(),
        expire_at,
        created_at: Utc::now() - Duration::minutes(10),
        transaction_id: None,
        sender_address: None,
        confirmed_at: None,
    }
}

/// In-memory store whose first `failures` confirmation writes error out.
pub struct FlakyStore {
    inner: InMemoryPaymentStore,
    failures: AtomicUsize,
    confirm_attempts: AtomicUsize,
}

impl FlakyStore {
    pub async fn with_payment(payment: Payment, failures: usize) -> Arc<Self> {
        let inner = InMemoryPaymentStore::new();
        inner.insert(payment).await;
        Arc::new(Self {
            inner,
            failures: AtomicUsize::new(failures),
            confirm_attempts: AtomicUsize::new(0),
        })
    }

    pub fn confirm_attempts(&self) -> usize {
        self.confirm_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentStore for FlakyStore {
    async fn create_payment(&self, new_payment: NewPayment) -> Result<Payment, DatabaseError> {
        self.inner.create_payment(new_payment).await
    }

    async fn find_payment(&self, payment_id: &str) -> Result<Option<Payment>, DatabaseError> {
        self.inner.find_payment(payment_id).await
    }

    async fn mark_confirmed(
        &self,
        payment_id: &str,
        confirmation: &Confirmation,
    ) -> Result<bool, DatabaseError> {
        self.confirm_attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DatabaseError::new(DatabaseErrorKind::ConnectionFailed {
                message: "connection reset".to_string(),
            }));
        }
        self.inner.mark_confirmed(payment_id, confirmation).await
    }

    async fn mark_expired(&self, payment_id: &str) -> Result<bool, DatabaseError> {
        self.inner.mark_expired(payment_id).await
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        self.inner.ping().await
    }
}
