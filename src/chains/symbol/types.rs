use crate::chains::symbol::errors::{SymbolError, SymbolResult};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Entity type of a transfer transaction (0x4154).
pub const TRANSFER_TRANSACTION_TYPE: u16 = 16724;

/// Raw address length: network byte, 20-byte key hash, 3-byte checksum.
pub const ADDRESS_RAW_LEN: usize = 24;
pub const ADDRESS_ENCODED_LEN: usize = 39;
const ADDRESS_HEX_LEN: usize = ADDRESS_RAW_LEN * 2;

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

const BASE32_DECODE: [u8; 128] = {
    let mut table = [0xFFu8; 128];
    let mut i = 0;
    while i < 32 {
        table[BASE32_ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    table
};

fn encode_base32(bytes: &[u8]) -> String {
    let mut result = String::with_capacity((bytes.len() * 8).div_ceil(5));
    let mut buffer: u64 = 0;
    let mut bits_in_buffer = 0;

    for &byte in bytes {
        buffer = (buffer << 8) | byte as u64;
        bits_in_buffer += 8;
        while bits_in_buffer >= 5 {
            bits_in_buffer -= 5;
            let idx = ((buffer >> bits_in_buffer) & 0x1F) as usize;
            result.push(BASE32_ALPHABET[idx] as char);
        }
    }
    if bits_in_buffer > 0 {
        let idx = ((buffer << (5 - bits_in_buffer)) & 0x1F) as usize;
        result.push(BASE32_ALPHABET[idx] as char);
    }

    result
}

fn decode_base32_fixed<const N: usize>(s: &str) -> Option<[u8; N]> {
    let mut buffer: u64 = 0;
    let mut bits_in_buffer = 0;
    let mut result = [0u8; N];
    let mut pos = 0;

    for c in s.bytes() {
        if c >= 128 {
            return None;
        }
        let val = BASE32_DECODE[c as usize];
        if val == 0xFF {
            return None;
        }
        buffer = (buffer << 5) | val as u64;
        bits_in_buffer += 5;
        if bits_in_buffer >= 8 {
            bits_in_buffer -= 8;
            if pos < N {
                result[pos] = (buffer >> bits_in_buffer) as u8;
                pos += 1;
            }
        }
    }

    if pos < N {
        return None;
    }
    Some(result)
}

/// A Symbol account address.
///
/// Nodes report addresses either as the 39-character base32 form
/// (`TBXU...`, optionally dash-separated) or as 48 hex characters of the
/// same raw bytes. Both parse to the same value, so comparisons never
/// depend on which representation a node chose.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolAddress([u8; ADDRESS_RAW_LEN]);

impl SymbolAddress {
    pub fn parse(input: &str) -> SymbolResult<Self> {
        let cleaned: String = input
            .chars()
            .filter(|c| *c != '-' && !c.is_whitespace())
            .collect::<String>()
            .to_uppercase();

        let raw = match cleaned.len() {
            ADDRESS_ENCODED_LEN => decode_base32_fixed::<ADDRESS_RAW_LEN>(&cleaned),
            ADDRESS_HEX_LEN => hex::decode(&cleaned)
                .ok()
                .and_then(|bytes| <[u8; ADDRESS_RAW_LEN]>::try_from(bytes.as_slice()).ok()),
            _ => None,
        };

        raw.map(SymbolAddress)
            .ok_or_else(|| SymbolError::invalid_address(input))
    }

    /// Canonical (base32, upper-case, no dashes) representation.
    pub fn canonical(&self) -> String {
        let mut encoded = encode_base32(&self.0);
        encoded.truncate(ADDRESS_ENCODED_LEN);
        encoded
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_RAW_LEN] {
        &self.0
    }
}

impl fmt::Display for SymbolAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl fmt::Debug for SymbolAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolAddress({})", self.canonical())
    }
}

impl std::str::FromStr for SymbolAddress {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SymbolAddress::parse(s)
    }
}

/// Decodes a transfer message payload into text.
///
/// REST gateways hand out the message as hex, prefixed with a `00` byte for
/// plain messages; some sources pass plain text straight through. Hex input
/// is decoded when it yields printable UTF-8, otherwise the payload is
/// returned unchanged.
pub fn decode_message(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.len() % 2 != 0 || !trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
        return trimmed.to_string();
    }

    let bytes = match hex::decode(trimmed) {
        Ok(bytes) => bytes,
        Err(_) => return trimmed.to_string(),
    };
    let body = match bytes.split_first() {
        Some((0x00, rest)) => rest,
        _ => bytes.as_slice(),
    };

    match std::str::from_utf8(body) {
        Ok(text) if is_printable(text) => text.to_string(),
        _ => trimmed.to_string(),
    }
}

fn is_printable(text: &str) -> bool {
    text.chars().all(|c| !c.is_control() || c.is_whitespace())
}

/// Converts a chain timestamp (milliseconds since nemesis) to wall-clock time.
pub fn network_time_to_utc(network_ms: u64, epoch_adjustment: i64) -> Option<DateTime<Utc>> {
    let millis = epoch_adjustment
        .checked_mul(1_000)?
        .checked_add(i64::try_from(network_ms).ok()?)?;
    Utc.timestamp_millis_opt(millis).single()
}

/// What identifies the transfer that settles one payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentFingerprint {
    pub recipient_address: SymbolAddress,
    pub expected_message: String,
    pub expected_amount_micro: u64,
    /// Transfers at or before this instant are never returned.
    pub not_before: Option<DateTime<Utc>>,
}

impl PaymentFingerprint {
    pub fn new(
        recipient_address: &str,
        expected_message: &str,
        expected_amount_micro: u64,
        not_before: Option<DateTime<Utc>>,
    ) -> SymbolResult<Self> {
        let recipient_address = SymbolAddress::parse(recipient_address)
            .map_err(|_| SymbolError::validation(format!("bad recipient address: {}", recipient_address)))?;
        if expected_amount_micro == 0 {
            return Err(SymbolError::validation("expected amount must be positive"));
        }

        Ok(Self {
            recipient_address,
            expected_message: expected_message.trim().to_string(),
            expected_amount_micro,
            not_before,
        })
    }

    pub fn with_not_before(mut self, not_before: Option<DateTime<Utc>>) -> Self {
        self.not_before = not_before;
        self
    }
}

/// A confirmed transfer that satisfied a fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedTransfer {
    pub transaction_id: String,
    /// Signer address when the node reports one, otherwise the signer public key.
    pub sender_address: String,
    pub recipient_address: String,
    pub amount_micro: u64,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub block_height: u64,
}

// ---------------------------------------------------------------------------
// REST DTOs
// ---------------------------------------------------------------------------

/// `GET /network`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// `GET /transactions/confirmed`
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionPage {
    #[serde(default)]
    pub data: Vec<TransactionEnvelope>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionEnvelope {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub meta: JsonValue,
    /// Left untyped so one odd entry cannot fail the whole page.
    #[serde(default)]
    pub transaction: JsonValue,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMeta {
    pub hash: String,
    pub height: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferBody {
    #[serde(rename = "type")]
    pub tx_type: u16,
    pub recipient_address: String,
    #[serde(default)]
    pub mosaics: Vec<MosaicAmount>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub signer_public_key: Option<String>,
    #[serde(default)]
    pub signer_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MosaicAmount {
    pub id: String,
    pub amount: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN: &str = "TBRQRUEHXI3OLJD47R3IKMX5TTVV3N6SQ7KY5UA";

    #[test]
    fn address_round_trips_between_representations() {
        let addr = SymbolAddress::parse(PLAIN).unwrap();
        assert_eq!(addr.canonical(), PLAIN);

        let from_hex = SymbolAddress::parse(&addr.to_hex()).unwrap();
        assert_eq!(from_hex, addr);
        assert_eq!(from_hex.canonical(), PLAIN);
    }

    #[test]
    fn address_accepts_dashes_and_lowercase() {
        let dashed = "tbrqru-ehxi3o-ljd47r-3ikmx5-ttvv3n-6sq7ky-5ua";
        assert_eq!(SymbolAddress::parse(dashed).unwrap().canonical(), PLAIN);
    }

    #[test]
    fn address_rejects_garbage() {
        assert!(SymbolAddress::parse("").is_err());
        assert!(SymbolAddress::parse("NOT-AN-ADDRESS").is_err());
        assert!(SymbolAddress::parse(&"Z".repeat(48)).is_err());
        assert!(SymbolAddress::parse("TBRQRUEHXI3OLJD47R3IKMX5TTVV3N6SQ7KY5U1").is_err());
    }

    #[test]
    fn message_decoding() {
        // "00" marker + "ABCD1234"
        assert_eq!(decode_message("004142434431323334"), "ABCD1234");
        // hex without the marker
        assert_eq!(decode_message("4142434431323334"), "ABCD1234");
        // plain text passes through, including text that happens to be hex
        assert_eq!(decode_message("ABCD1234"), "ABCD1234");
        assert_eq!(decode_message("order 42"), "order 42");
        assert_eq!(decode_message("   "), "");
        assert_eq!(decode_message("00"), "");
    }

    #[test]
    fn message_decoding_keeps_raw_when_output_is_unprintable() {
        // 0x01 0x02 decodes to control characters
        assert_eq!(decode_message("0102"), "0102");
        // invalid utf-8
        assert_eq!(decode_message("FFFE"), "FFFE");
    }

    #[test]
    fn network_time_conversion() {
        let t = network_time_to_utc(1_000, 1_615_853_185).unwrap();
        assert_eq!(t.timestamp_millis(), 1_615_853_186_000);
    }

    #[test]
    fn fingerprint_validation() {
        assert!(PaymentFingerprint::new(PLAIN, "ABC", 0, None).is_err());
        assert!(PaymentFingerprint::new("bogus", "ABC", 10, None).is_err());
        let fp = PaymentFingerprint::new(PLAIN, "  ABC ", 10, None).unwrap();
        assert_eq!(fp.expected_message, "ABC");
    }
}
