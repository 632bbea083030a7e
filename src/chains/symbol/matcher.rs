use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::chains::symbol::{
    errors::{SymbolError, SymbolResult},
    failover::FailoverExecutor,
    types::{
        decode_message, network_time_to_utc, ObservedTransfer, PaymentFingerprint, SymbolAddress,
        TransactionEnvelope, TransactionMeta, TransferBody, TRANSFER_TRANSACTION_TYPE,
    },
};

/// Anything that can answer "has this payment landed on chain yet?".
#[async_trait]
pub trait TransferSource: Send + Sync {
    async fn find_match(
        &self,
        fingerprint: &PaymentFingerprint,
    ) -> SymbolResult<Option<ObservedTransfer>>;
}

/// Scans the newest page of confirmed transfers to an address for one
/// that satisfies a payment fingerprint.
#[derive(Debug, Clone)]
pub struct TransactionMatcher {
    executor: FailoverExecutor,
    rules: MatchRules,
}

/// Chain parameters needed to interpret a transfer.
#[derive(Debug, Clone)]
pub struct MatchRules {
    currency_mosaic_ids: HashSet<String>,
    epoch_adjustment: i64,
    page_size: usize,
}

impl MatchRules {
    pub fn new(currency_mosaic_ids: &[String], epoch_adjustment: i64, page_size: usize) -> Self {
        Self {
            currency_mosaic_ids: currency_mosaic_ids
                .iter()
                .map(|id| id.trim().to_uppercase())
                .collect(),
            epoch_adjustment,
            page_size,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// First transfer in `page` that satisfies `fingerprint`.
    ///
    /// A malformed entry is logged and skipped; it never aborts the scan.
    pub fn first_match(
        &self,
        page: &[TransactionEnvelope],
        fingerprint: &PaymentFingerprint,
    ) -> Option<ObservedTransfer> {
        for envelope in page {
            match self.evaluate(envelope, fingerprint) {
                Ok(Some(transfer)) => return Some(transfer),
                Ok(None) => {}
                Err(e) => debug!(error = %e, "Transaction skipped during scan"),
            }
        }
        None
    }

    fn evaluate(
        &self,
        envelope: &TransactionEnvelope,
        fingerprint: &PaymentFingerprint,
    ) -> SymbolResult<Option<ObservedTransfer>> {
        let tx_type = envelope
            .transaction
            .get("type")
            .and_then(JsonValue::as_u64)
            .unwrap_or(0);
        if tx_type != TRANSFER_TRANSACTION_TYPE as u64 {
            return Ok(None);
        }

        let label = envelope.id.clone().unwrap_or_else(|| "unknown".to_string());
        let meta: TransactionMeta = serde_json::from_value(envelope.meta.clone())
            .map_err(|e| SymbolError::match_scan(&label, format!("bad meta: {}", e)))?;
        let body: TransferBody = serde_json::from_value(envelope.transaction.clone())
            .map_err(|e| SymbolError::match_scan(&meta.hash, format!("bad body: {}", e)))?;

        let recipient = SymbolAddress::parse(&body.recipient_address)
            .map_err(|e| SymbolError::match_scan(&meta.hash, e.to_string()))?;
        if recipient != fingerprint.recipient_address {
            return Ok(None);
        }

        let amount = self.currency_amount(&body, &meta.hash)?;
        if amount != fingerprint.expected_amount_micro {
            return Ok(None);
        }

        let message = decode_message(body.message.as_deref().unwrap_or_default());
        let message = message.trim();
        if !message.is_empty() && message != fingerprint.expected_message {
            return Ok(None);
        }

        let network_ms: u64 = meta
            .timestamp
            .parse()
            .map_err(|_| SymbolError::match_scan(&meta.hash, "bad timestamp"))?;
        let timestamp = network_time_to_utc(network_ms, self.epoch_adjustment)
            .ok_or_else(|| SymbolError::match_scan(&meta.hash, "timestamp out of range"))?;
        if let Some(not_before) = fingerprint.not_before {
            if timestamp <= not_before {
                return Ok(None);
            }
        }

        let block_height: u64 = meta
            .height
            .parse()
            .map_err(|_| SymbolError::match_scan(&meta.hash, "bad height"))?;

        let sender_address = body
            .signer_address
            .as_deref()
            .and_then(|a| SymbolAddress::parse(a).ok())
            .map(|a| a.canonical())
            .or(body.signer_public_key.clone())
            .unwrap_or_default();

        Ok(Some(ObservedTransfer {
            transaction_id: meta.hash,
            sender_address,
            recipient_address: recipient.canonical(),
            amount_micro: amount,
            message: message.to_string(),
            timestamp,
            block_height,
        }))
    }

    fn currency_amount(&self, body: &TransferBody, hash: &str) -> SymbolResult<u64> {
        body.mosaics
            .iter()
            .filter(|m| self.currency_mosaic_ids.contains(&m.id.trim().to_uppercase()))
            .try_fold(0u64, |total, m| {
                let amount: u64 = m
                    .amount
                    .trim()
                    .parse()
                    .map_err(|_| SymbolError::match_scan(hash, format!("bad amount {}", m.amount)))?;
                total
                    .checked_add(amount)
                    .ok_or_else(|| SymbolError::match_scan(hash, "amount overflow"))
            })
    }
}

impl TransactionMatcher {
    pub fn new(executor: FailoverExecutor, rules: MatchRules) -> Self {
        Self { executor, rules }
    }

    pub fn executor(&self) -> &FailoverExecutor {
        &self.executor
    }
}

#[async_trait]
impl TransferSource for TransactionMatcher {
    async fn find_match(
        &self,
        fingerprint: &PaymentFingerprint,
    ) -> SymbolResult<Option<ObservedTransfer>> {
        let page_size = self.rules.page_size();
        let recipient = fingerprint.recipient_address;

        let page = self
            .executor
            .execute(move |client| async move {
                client.confirmed_transfers(&recipient, page_size).await
            })
            .await?;

        let found = self.rules.first_match(&page.data, fingerprint);
        if let Some(transfer) = &found {
            info!(
                transaction_id = %transfer.transaction_id,
                recipient = %transfer.recipient_address,
                amount = transfer.amount_micro,
                height = transfer.block_height,
                "Matching transfer found"
            );
        }
        Ok(found)
    }
}
