//! # Cross-Ledger Messages
//!
//! The five message kinds exchanged between the source and destination
//! ledgers, and their typed payloads.
//!
//! ```text
//!   Source                                  Destination
//!     │  deposit (assets ride along)             │
//!     ├─────────────────────────────────────────►│
//!     │  depositAck (shares minted, rate)        │
//!     │◄─────────────────────────────────────────┤
//!     │  withdrawalRequest (Exact(n) | All)      │
//!     ├─────────────────────────────────────────►│
//!     │  withdrawalConfirmed (assets ride along) │
//!     │◄─────────────────────────────────────────┤
//!     │  syncAssetsPerShare (rate, marker)       │
//!     │◄─────────────────────────────────────────┤
//! ```
//!
//! Replies carry the id of the request they answer inside their payload.
//! Message ids themselves are assigned by the transport.

pub mod codec;
pub mod error;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Address, ChainSelector, MessageId};

pub use codec::{decode_body, encode_body, payload_bytes};
pub use error::CodecError;

// ---------------------------------------------------------------------------
// MessageKind
// ---------------------------------------------------------------------------

/// Discriminant carried in the second byte of every message body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageKind {
    /// Source → destination, carries assets.
    Deposit = 1,
    /// Destination → source, accounting only.
    DepositAck = 2,
    /// Source → destination, accounting only.
    WithdrawalRequest = 3,
    /// Destination → source, carries assets.
    WithdrawalConfirmed = 4,
    /// Destination → source, accounting only.
    SyncAssetsPerShare = 5,
}

impl MessageKind {
    /// Every valid kind, in discriminant order.
    pub const ALL: [MessageKind; 5] = [
        MessageKind::Deposit,
        MessageKind::DepositAck,
        MessageKind::WithdrawalRequest,
        MessageKind::WithdrawalConfirmed,
        MessageKind::SyncAssetsPerShare,
    ];

    /// Parses a kind byte. `0` (unknown) and anything above 5 are rejected.
    pub fn from_byte(byte: u8) -> Result<Self, CodecError> {
        match byte {
            1 => Ok(MessageKind::Deposit),
            2 => Ok(MessageKind::DepositAck),
            3 => Ok(MessageKind::WithdrawalRequest),
            4 => Ok(MessageKind::WithdrawalConfirmed),
            5 => Ok(MessageKind::SyncAssetsPerShare),
            other => Err(CodecError::UnknownKind(other)),
        }
    }

    /// Wire discriminant.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Camel-case name used in events, logs and metric labels.
    pub fn name(self) -> &'static str {
        match self {
            MessageKind::Deposit => "deposit",
            MessageKind::DepositAck => "depositAck",
            MessageKind::WithdrawalRequest => "withdrawalRequest",
            MessageKind::WithdrawalConfirmed => "withdrawalConfirmed",
            MessageKind::SyncAssetsPerShare => "syncAssetsPerShare",
        }
    }

    /// Whether messages of this kind move settlement assets.
    pub fn carries_assets(self) -> bool {
        matches!(self, MessageKind::Deposit | MessageKind::WithdrawalConfirmed)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Share amount of a withdrawal request.
///
/// `All` is resolved by the destination at execution time to its whole
/// vault position; the source never precomputes it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WithdrawalAmount {
    /// A fixed number of shares.
    Exact(u64),
    /// Everything the destination holds when the request executes.
    All,
}

impl WithdrawalAmount {
    /// On-wire sentinel for [`WithdrawalAmount::All`].
    pub const ALL_SENTINEL: u64 = u64::MAX;

    /// Wire form: the share count, or the sentinel.
    pub fn to_wire(self) -> u64 {
        match self {
            WithdrawalAmount::Exact(n) => n,
            WithdrawalAmount::All => Self::ALL_SENTINEL,
        }
    }

    /// Inverse of [`to_wire`](Self::to_wire).
    pub fn from_wire(raw: u64) -> Self {
        if raw == Self::ALL_SENTINEL {
            WithdrawalAmount::All
        } else {
            WithdrawalAmount::Exact(raw)
        }
    }

    /// The fixed share count, if any.
    pub fn exact(self) -> Option<u64> {
        match self {
            WithdrawalAmount::Exact(n) => Some(n),
            WithdrawalAmount::All => None,
        }
    }
}

/// Destination's answer to a deposit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositAck {
    /// Id of the deposit message being acknowledged.
    pub deposit_id: MessageId,
    /// Assets the deposit carried.
    pub assets: u64,
    /// Shares the vault minted for them.
    pub shares_minted: u64,
    /// Vault rate read right after the deposit.
    pub assets_per_share: u64,
    /// Destination ordering marker the rate was read at.
    pub marker: u64,
}

/// Destination's answer to a withdrawal request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalConfirmation {
    /// Id of the withdrawal request being settled.
    pub request_id: MessageId,
    /// Shares actually redeemed from the vault.
    pub shares_redeemed: u64,
}

/// A fresh reading of the vault's exchange rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSync {
    /// Raw fixed-point assets-per-share.
    pub assets_per_share: u64,
    /// Destination ordering marker the rate was read at.
    pub marker: u64,
}

/// Typed payload of a message; the variant fixes the kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// Deposits carry no payload, only assets.
    Deposit,
    /// See [`DepositAck`].
    DepositAck(DepositAck),
    /// See [`WithdrawalAmount`].
    WithdrawalRequest(WithdrawalAmount),
    /// See [`WithdrawalConfirmation`].
    WithdrawalConfirmed(WithdrawalConfirmation),
    /// See [`RateSync`].
    SyncAssetsPerShare(RateSync),
}

impl Payload {
    /// Kind implied by the variant.
    pub fn kind(&self) -> MessageKind {
        match self {
            Payload::Deposit => MessageKind::Deposit,
            Payload::DepositAck(_) => MessageKind::DepositAck,
            Payload::WithdrawalRequest(_) => MessageKind::WithdrawalRequest,
            Payload::WithdrawalConfirmed(_) => MessageKind::WithdrawalConfirmed,
            Payload::SyncAssetsPerShare(_) => MessageKind::SyncAssetsPerShare,
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A decoded inbound message, as handed to a ledger's handlers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Transport-assigned id.
    pub id: MessageId,
    /// Chain the message was sent from.
    pub source_chain: ChainSelector,
    /// Ledger that sent it.
    pub sender: Address,
    /// Settlement assets delivered with the message (0 for accounting-only kinds).
    pub amount: u64,
    /// Decoded payload.
    pub payload: Payload,
}

impl Message {
    /// Kind of this message.
    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }

    /// For replies, the id of the request they answer.
    pub fn correlation_id(&self) -> Option<MessageId> {
        match self.payload {
            Payload::DepositAck(ack) => Some(ack.deposit_id),
            Payload::WithdrawalConfirmed(conf) => Some(conf.request_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_bytes_match_reference_numbering() {
        let bytes: Vec<u8> = MessageKind::ALL.iter().map(|k| k.as_byte()).collect();
        assert_eq!(bytes, vec![1, 2, 3, 4, 5]);
        for kind in MessageKind::ALL {
            assert_eq!(MessageKind::from_byte(kind.as_byte()), Ok(kind));
        }
    }

    #[test]
    fn unknown_kind_rejected() {
        assert_eq!(MessageKind::from_byte(0), Err(CodecError::UnknownKind(0)));
        assert_eq!(MessageKind::from_byte(6), Err(CodecError::UnknownKind(6)));
    }

    #[test]
    fn only_deposit_and_confirmation_carry_assets() {
        let carrying: Vec<_> = MessageKind::ALL
            .into_iter()
            .filter(|k| k.carries_assets())
            .collect();
        assert_eq!(
            carrying,
            vec![MessageKind::Deposit, MessageKind::WithdrawalConfirmed]
        );
    }

    #[test]
    fn withdrawal_sentinel() {
        assert_eq!(WithdrawalAmount::All.to_wire(), u64::MAX);
        assert_eq!(WithdrawalAmount::from_wire(u64::MAX), WithdrawalAmount::All);
        assert_eq!(WithdrawalAmount::from_wire(80), WithdrawalAmount::Exact(80));
        assert_eq!(WithdrawalAmount::All.exact(), None);
    }

    #[test]
    fn replies_expose_correlation_id() {
        let request_id = MessageId([3u8; 32]);
        let msg = Message {
            id: MessageId([9u8; 32]),
            source_chain: 1,
            sender: Address::ZERO,
            amount: 500,
            payload: Payload::WithdrawalConfirmed(WithdrawalConfirmation {
                request_id,
                shares_redeemed: 400,
            }),
        };
        assert_eq!(msg.kind(), MessageKind::WithdrawalConfirmed);
        assert_eq!(msg.correlation_id(), Some(request_id));
    }
}
