//! Payment creation and snapshot endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::AppState;
use crate::chains::symbol::types::SymbolAddress;
use crate::database::payment_repository::{NewPayment, Payment};
use crate::error::{AppError, AppResult};
use crate::payments::request::{generate_reference, payment_request_uri, validate_reference};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub recipient_address: Option<String>,
    pub amount_micro: u64,
    pub message: Option<String>,
    pub expires_in_minutes: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentResponse {
    pub payment: Payment,
    pub payment_uri: String,
}

/// `POST /api/payments`
pub async fn create_payment(
    State(state): State<AppState>,
    Json(request): Json<CreatePaymentRequest>,
) -> AppResult<impl IntoResponse> {
    let new_payment = build_new_payment(&state, request)?;
    let payment = state.store.create_payment(new_payment).await?;
    let payment_uri = payment_request_uri(&payment, &state.currency_mosaic_id)?;

    info!(
        payment_id = %payment.payment_id,
        recipient = %payment.recipient_address,
        amount = payment.amount_micro,
        expire_at = %payment.expire_at,
        "Payment created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreatePaymentResponse {
            payment,
            payment_uri,
        }),
    ))
}

/// `GET /api/payments/{id}`
pub async fn get_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
) -> AppResult<Json<Payment>> {
    state
        .store
        .find_payment(&payment_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(payment_id))
}

fn build_new_payment(state: &AppState, request: CreatePaymentRequest) -> AppResult<NewPayment> {
    let raw_address = request
        .recipient_address
        .or_else(|| state.payments.recipient_address.clone())
        .ok_or_else(|| AppError::validation("recipientAddress", "no recipient configured"))?;
    let recipient = SymbolAddress::parse(&raw_address)?;

    if request.amount_micro == 0 {
        return Err(AppError::validation("amountMicro", "must be greater than 0"));
    }
    if i64::try_from(request.amount_micro).is_err() {
        return Err(AppError::validation("amountMicro", "is too large"));
    }

    let message = match request.message {
        Some(message) => {
            validate_reference(&message)
                .map_err(|e| AppError::validation("message", e.to_string()))?;
            message
        }
        None => generate_reference(),
    };

    let expiry = match request.expires_in_minutes {
        Some(minutes) if minutes <= 0 => {
            return Err(AppError::validation("expiresInMinutes", "must be greater than 0"))
        }
        Some(minutes) => chrono::Duration::try_minutes(minutes)
            .ok_or_else(|| AppError::validation("expiresInMinutes", "is too large"))?,
        None => state.payments.expiry,
    };
    let expire_at = Utc::now()
        .checked_add_signed(expiry)
        .ok_or_else(|| AppError::validation("expiresInMinutes", "is too large"))?;

    Ok(NewPayment {
        recipient_address: recipient.canonical(),
        amount_micro: request.amount_micro,
        message,
        expire_at,
    })
}
