//! # Message Codec
//!
//! Wire layout of a message body:
//!
//! ```text
//! ┌─────────┬──────┬──────────────────────────────┐
//! │ version │ kind │ payload (bincode, fixed LE)  │
//! │   u8    │  u8  │ layout depends on kind       │
//! └─────────┴──────┴──────────────────────────────┘
//! ```
//!
//! | Kind                | Payload layout                                          |
//! |---------------------|---------------------------------------------------------|
//! | deposit             | empty                                                   |
//! | depositAck          | `deposit_id[32] assets:u64 shares:u64 rate:u64 marker:u64` |
//! | withdrawalRequest   | `shares:u64` (`u64::MAX` = all)                         |
//! | withdrawalConfirmed | `request_id[32] shares_redeemed:u64`                    |
//! | syncAssetsPerShare  | `rate:u64 marker:u64`                                   |
//!
//! Decoding is strict: trailing bytes, short payloads and unknown kinds
//! are all rejected.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::error::CodecError;
use super::{
    DepositAck, MessageKind, Payload, RateSync, WithdrawalAmount, WithdrawalConfirmation,
};
use crate::config::{MAX_MESSAGE_BYTES, WIRE_VERSION};
use crate::types::MessageId;

const HEADER_LEN: usize = 2;

#[derive(Serialize, Deserialize)]
struct DepositAckWire {
    deposit_id: [u8; 32],
    assets: u64,
    shares_minted: u64,
    assets_per_share: u64,
    marker: u64,
}

#[derive(Serialize, Deserialize)]
struct WithdrawalRequestWire {
    shares: u64,
}

#[derive(Serialize, Deserialize)]
struct WithdrawalConfirmedWire {
    request_id: [u8; 32],
    shares_redeemed: u64,
}

#[derive(Serialize, Deserialize)]
struct RateSyncWire {
    assets_per_share: u64,
    marker: u64,
}

fn malformed(kind: MessageKind, reason: impl ToString) -> CodecError {
    CodecError::MalformedPayload {
        kind: kind.name(),
        reason: reason.to_string(),
    }
}

fn to_bytes<T: Serialize>(kind: MessageKind, value: &T) -> Result<Vec<u8>, CodecError> {
    bincode::serialize(value).map_err(|e| malformed(kind, e))
}

fn from_bytes<T: Serialize + DeserializeOwned>(
    kind: MessageKind,
    bytes: &[u8],
) -> Result<T, CodecError> {
    let value: T = bincode::deserialize(bytes).map_err(|e| malformed(kind, e))?;
    let expected = bincode::serialized_size(&value).map_err(|e| malformed(kind, e))?;
    if expected as usize != bytes.len() {
        return Err(malformed(
            kind,
            format!("expected {} bytes, got {}", expected, bytes.len()),
        ));
    }
    Ok(value)
}

/// Serializes only the kind-specific payload (no header).
///
/// This is the `payload` reported in `MessageSent` events.
pub fn payload_bytes(payload: &Payload) -> Result<Vec<u8>, CodecError> {
    let kind = payload.kind();
    match payload {
        Payload::Deposit => Ok(Vec::new()),
        Payload::DepositAck(ack) => to_bytes(
            kind,
            &DepositAckWire {
                deposit_id: ack.deposit_id.0,
                assets: ack.assets,
                shares_minted: ack.shares_minted,
                assets_per_share: ack.assets_per_share,
                marker: ack.marker,
            },
        ),
        Payload::WithdrawalRequest(amount) => to_bytes(
            kind,
            &WithdrawalRequestWire {
                shares: amount.to_wire(),
            },
        ),
        Payload::WithdrawalConfirmed(conf) => to_bytes(
            kind,
            &WithdrawalConfirmedWire {
                request_id: conf.request_id.0,
                shares_redeemed: conf.shares_redeemed,
            },
        ),
        Payload::SyncAssetsPerShare(sync) => to_bytes(
            kind,
            &RateSyncWire {
                assets_per_share: sync.assets_per_share,
                marker: sync.marker,
            },
        ),
    }
}

/// Encodes a full message body: header plus payload.
pub fn encode_body(payload: &Payload) -> Result<Vec<u8>, CodecError> {
    let body = payload_bytes(payload)?;
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.push(WIRE_VERSION);
    out.push(payload.kind().as_byte());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decodes a message body produced by [`encode_body`].
pub fn decode_body(bytes: &[u8]) -> Result<Payload, CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::Truncated(bytes.len()));
    }
    if bytes.len() > MAX_MESSAGE_BYTES {
        return Err(CodecError::TooLarge {
            size: bytes.len(),
            max: MAX_MESSAGE_BYTES,
        });
    }
    if bytes[0] != WIRE_VERSION {
        return Err(CodecError::UnsupportedVersion(bytes[0]));
    }

    let kind = MessageKind::from_byte(bytes[1])?;
    let rest = &bytes[HEADER_LEN..];

    let payload = match kind {
        MessageKind::Deposit => {
            if !rest.is_empty() {
                return Err(malformed(kind, "deposit payload must be empty"));
            }
            Payload::Deposit
        }
        MessageKind::DepositAck => {
            let w: DepositAckWire = from_bytes(kind, rest)?;
            Payload::DepositAck(DepositAck {
                deposit_id: MessageId(w.deposit_id),
                assets: w.assets,
                shares_minted: w.shares_minted,
                assets_per_share: w.assets_per_share,
                marker: w.marker,
            })
        }
        MessageKind::WithdrawalRequest => {
            let w: WithdrawalRequestWire = from_bytes(kind, rest)?;
            Payload::WithdrawalRequest(WithdrawalAmount::from_wire(w.shares))
        }
        MessageKind::WithdrawalConfirmed => {
            let w: WithdrawalConfirmedWire = from_bytes(kind, rest)?;
            Payload::WithdrawalConfirmed(WithdrawalConfirmation {
                request_id: MessageId(w.request_id),
                shares_redeemed: w.shares_redeemed,
            })
        }
        MessageKind::SyncAssetsPerShare => {
            let w: RateSyncWire = from_bytes(kind, rest)?;
            Payload::SyncAssetsPerShare(RateSync {
                assets_per_share: w.assets_per_share,
                marker: w.marker,
            })
        }
    };

    Ok(payload)
}
