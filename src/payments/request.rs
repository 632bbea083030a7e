//! Helpers for building payment requests handed to payers.

use rand::Rng;
use regex::Regex;
use reqwest::Url;

use crate::chains::symbol::errors::{SymbolError, SymbolResult};
use crate::database::payment_repository::Payment;

pub const REFERENCE_LEN: usize = 8;
const REFERENCE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const MESSAGE_PATTERN: &str = r"^[\x20-\x7E]{1,64}$";
const REQUEST_URI_BASE: &str = "web+symbol://transaction";

/// Random uppercase payment reference. Ambiguous glyphs (0/O, 1/I) are left
/// out so it can be typed from a screen.
pub fn generate_reference() -> String {
    let mut rng = rand::thread_rng();
    (0..REFERENCE_LEN)
        .map(|_| REFERENCE_ALPHABET[rng.gen_range(0..REFERENCE_ALPHABET.len())] as char)
        .collect()
}

/// A reference must be printable ASCII, 1 to 64 characters, with no
/// surrounding whitespace.
pub fn validate_reference(message: &str) -> SymbolResult<()> {
    let pattern = Regex::new(MESSAGE_PATTERN)
        .map_err(|e| SymbolError::validation(format!("reference pattern: {}", e)))?;
    if message.trim() != message || !pattern.is_match(message) {
        return Err(SymbolError::validation(
            "payment reference must be 1-64 printable ASCII characters",
        ));
    }
    Ok(())
}

/// URI a wallet can open (or a QR code can carry) to prefill the transfer.
pub fn payment_request_uri(payment: &Payment, currency_mosaic_id: &str) -> SymbolResult<String> {
    let amount = payment.amount_micro.to_string();
    let url = Url::parse_with_params(
        REQUEST_URI_BASE,
        &[
            ("recipientAddress", payment.recipient_address.as_str()),
            ("mosaicId", currency_mosaic_id),
            ("amount", amount.as_str()),
            ("message", payment.message.as_str()),
        ],
    )
    .map_err(|e| SymbolError::validation(format!("cannot build payment uri: {}", e)))?;
    Ok(url.to_string())
}
