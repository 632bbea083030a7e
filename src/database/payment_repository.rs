use crate::chains::symbol::errors::SymbolResult;
use crate::chains::symbol::types::{ObservedTransfer, PaymentFingerprint};
use crate::database::error::{DatabaseError, DatabaseErrorKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Confirmed,
    Expired,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::Expired => "expired",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "confirmed" => Ok(PaymentStatus::Confirmed),
            "expired" => Ok(PaymentStatus::Expired),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            other => Err(DatabaseError::new(DatabaseErrorKind::Unknown {
                message: format!("unknown payment status: {}", other),
            })),
        }
    }
}

/// Payment entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub payment_id: String,
    pub status: PaymentStatus,
    pub recipient_address: String,
    pub amount_micro: u64,
    /// Reference the payer is asked to attach to the transfer.
    pub message: String,
    pub expire_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub transaction_id: Option<String>,
    pub sender_address: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn fingerprint(
        &self,
        not_before: Option<DateTime<Utc>>,
    ) -> SymbolResult<PaymentFingerprint> {
        PaymentFingerprint::new(
            &self.recipient_address,
            &self.message,
            self.amount_micro,
            not_before,
        )
    }

    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        now >= self.expire_at
    }
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub recipient_address: String,
    pub amount_micro: u64,
    pub message: String,
    pub expire_at: DateTime<Utc>,
}

/// Fields transcribed from an observed transfer when a payment confirms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub transaction_id: String,
    pub sender_address: String,
    pub message: String,
    pub confirmed_at: DateTime<Utc>,
}

impl From<&ObservedTransfer> for Confirmation {
    fn from(transfer: &ObservedTransfer) -> Self {
        Self {
            transaction_id: transfer.transaction_id.clone(),
            sender_address: transfer.sender_address.clone(),
            message: transfer.message.clone(),
            confirmed_at: transfer.timestamp,
        }
    }
}

/// Durable payment records.
///
/// `mark_confirmed` and `mark_expired` return whether the call changed the
/// record. Repeating a call for an outcome that already happened is a no-op
/// returning `Ok(false)`.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn create_payment(&self, new_payment: NewPayment) -> Result<Payment, DatabaseError>;

    async fn find_payment(&self, payment_id: &str) -> Result<Option<Payment>, DatabaseError>;

    /// Moves a `pending` or `expired` payment to `confirmed`. A transfer
    /// that lands after the deadline still settles the order.
    async fn mark_confirmed(
        &self,
        payment_id: &str,
        confirmation: &Confirmation,
    ) -> Result<bool, DatabaseError>;

    /// Moves a `pending` payment to `expired`.
    async fn mark_expired(&self, payment_id: &str) -> Result<bool, DatabaseError>;

    async fn ping(&self) -> Result<(), DatabaseError>;
}

/// Process-local store used when no database is configured.
#[derive(Debug, Default)]
pub struct InMemoryPaymentStore {
    payments: RwLock<HashMap<String, Payment>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, payment: Payment) {
        self.payments
            .write()
            .await
            .insert(payment.payment_id.clone(), payment);
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn create_payment(&self, new_payment: NewPayment) -> Result<Payment, DatabaseError> {
        let payment = Payment {
            payment_id: Uuid::new_v4().to_string(),
            status: PaymentStatus::Pending,
            recipient_address: new_payment.recipient_address,
            amount_micro: new_payment.amount_micro,
            message: new_payment.message,
            expire_at: new_payment.expire_at,
            created_at: Utc::now(),
            transaction_id: None,
            sender_address: None,
            confirmed_at: None,
        };
        self.insert(payment.clone()).await;
        Ok(payment)
    }

    async fn find_payment(&self, payment_id: &str) -> Result<Option<Payment>, DatabaseError> {
        Ok(self.payments.read().await.get(payment_id).cloned())
    }

    async fn mark_confirmed(
        &self,
        payment_id: &str,
        confirmation: &Confirmation,
    ) -> Result<bool, DatabaseError> {
        let mut payments = self.payments.write().await;
        let payment = payments
            .get_mut(payment_id)
            .ok_or_else(|| DatabaseError::not_found("payment", payment_id))?;

        if !matches!(payment.status, PaymentStatus::Pending | PaymentStatus::Expired) {
            return Ok(false);
        }
        payment.status = PaymentStatus::Confirmed;
        payment.transaction_id = Some(confirmation.transaction_id.clone());
        payment.sender_address = Some(confirmation.sender_address.clone());
        payment.confirmed_at = Some(confirmation.confirmed_at);
        Ok(true)
    }

    async fn mark_expired(&self, payment_id: &str) -> Result<bool, DatabaseError> {
        let mut payments = self.payments.write().await;
        let payment = payments
            .get_mut(payment_id)
            .ok_or_else(|| DatabaseError::not_found("payment", payment_id))?;

        if payment.status != PaymentStatus::Pending {
            return Ok(false);
        }
        payment.status = PaymentStatus::Expired;
        Ok(true)
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

#[cfg(feature = "database")]
pub use self::postgres::PgPaymentRepository;

#[cfg(feature = "database")]
mod postgres {
    use super::*;
    use sqlx::{FromRow, PgPool};

    #[derive(Debug, Clone, FromRow)]
    struct PaymentRow {
        payment_id: String,
        status: String,
        recipient_address: String,
        amount_micro: i64,
        message: String,
        expire_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
        transaction_id: Option<String>,
        sender_address: Option<String>,
        confirmed_at: Option<DateTime<Utc>>,
    }

    impl TryFrom<PaymentRow> for Payment {
        type Error = DatabaseError;

        fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
            let amount_micro = u64::try_from(row.amount_micro).map_err(|_| {
                DatabaseError::new(DatabaseErrorKind::Unknown {
                    message: format!("negative amount for payment {}", row.payment_id),
                })
            })?;
            Ok(Payment {
                status: row.status.parse()?,
                payment_id: row.payment_id,
                recipient_address: row.recipient_address,
                amount_micro,
                message: row.message,
                expire_at: row.expire_at,
                created_at: row.created_at,
                transaction_id: row.transaction_id,
                sender_address: row.sender_address,
                confirmed_at: row.confirmed_at,
            })
        }
    }

    const PAYMENT_COLUMNS: &str = "payment_id, status, recipient_address, amount_micro, message, \
         expire_at, created_at, transaction_id, sender_address, confirmed_at";

    /// Repository for payment records
    pub struct PgPaymentRepository {
        pool: PgPool,
    }

    impl PgPaymentRepository {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }
    }

    #[async_trait]
    impl PaymentStore for PgPaymentRepository {
        async fn create_payment(
            &self,
            new_payment: NewPayment,
        ) -> Result<Payment, DatabaseError> {
            let amount = i64::try_from(new_payment.amount_micro).map_err(|_| {
                DatabaseError::new(DatabaseErrorKind::Unknown {
                    message: "amount exceeds storage range".to_string(),
                })
            })?;

            let row = sqlx::query_as::<_, PaymentRow>(&format!(
                "INSERT INTO payments
                 (payment_id, status, recipient_address, amount_micro, message, expire_at)
                 VALUES ($1, 'pending', $2, $3, $4, $5)
                 RETURNING {}",
                PAYMENT_COLUMNS
            ))
            .bind(Uuid::new_v4().to_string())
            .bind(&new_payment.recipient_address)
            .bind(amount)
            .bind(&new_payment.message)
            .bind(new_payment.expire_at)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

            Payment::try_from(row)
        }

        async fn find_payment(&self, payment_id: &str) -> Result<Option<Payment>, DatabaseError> {
            let row = sqlx::query_as::<_, PaymentRow>(&format!(
                "SELECT {} FROM payments WHERE payment_id = $1",
                PAYMENT_COLUMNS
            ))
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

            row.map(Payment::try_from).transpose()
        }

        async fn mark_confirmed(
            &self,
            payment_id: &str,
            confirmation: &Confirmation,
        ) -> Result<bool, DatabaseError> {
            let result = sqlx::query(
                "UPDATE payments
                 SET status = 'confirmed',
                     transaction_id = $2,
                     sender_address = $3,
                     confirmed_message = $4,
                     confirmed_at = $5,
                     updated_at = NOW()
                 WHERE payment_id = $1 AND status IN ('pending', 'expired')",
            )
            .bind(payment_id)
            .bind(&confirmation.transaction_id)
            .bind(&confirmation.sender_address)
            .bind(&confirmation.message)
            .bind(confirmation.confirmed_at)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

            Ok(result.rows_affected() > 0)
        }

        async fn mark_expired(&self, payment_id: &str) -> Result<bool, DatabaseError> {
            let result = sqlx::query(
                "UPDATE payments
                 SET status = 'expired', updated_at = NOW()
                 WHERE payment_id = $1 AND status = 'pending'",
            )
            .bind(payment_id)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

            Ok(result.rows_affected() > 0)
        }

        async fn ping(&self) -> Result<(), DatabaseError> {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map(|_| ())
                .map_err(DatabaseError::from_sqlx)
        }
    }
}
