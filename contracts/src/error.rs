//! # Ledger Errors
//!
//! One error type for both ledgers. Every variant belongs to exactly one
//! [`ErrorClass`], which is what callers (the devnet driver, the HTTP API)
//! branch on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use xvault_protocol::config::ConfigError;
use xvault_protocol::message::{CodecError, MessageKind};
use xvault_protocol::token::TokenError;
use xvault_protocol::transport::TransportError;
use xvault_protocol::types::{Address, ChainSelector, MessageId};
use xvault_protocol::vault::VaultError;

/// Coarse classification of a [`LedgerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Rejected up front: bad input, bad caller, nothing changed.
    Precondition,
    /// The vault refused; the message stays pending until redelivered.
    RemoteExecution,
    /// A message (or its correlated record) was already consumed.
    Replay,
    /// The transport refused to accept or release a message.
    Transport,
    /// An inbound body could not be decoded or did not fit its kind.
    Decode,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::Precondition => write!(f, "precondition"),
            ErrorClass::RemoteExecution => write!(f, "remote-execution"),
            ErrorClass::Replay => write!(f, "replay"),
            ErrorClass::Transport => write!(f, "transport"),
            ErrorClass::Decode => write!(f, "decode"),
        }
    }
}

/// Errors raised by the settlement ledgers.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Deposits and fee withdrawals must move a positive amount.
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// An exact withdrawal asks for more shares than are free.
    #[error("insufficient shares: available {available}, requested {requested}")]
    InsufficientShares {
        /// Settled shares not reserved by in-flight withdrawals.
        available: u64,
        /// Shares requested.
        requested: u64,
    },

    /// An acknowledgment for a deposit this ledger has no record of.
    #[error("no pending deposit {0}")]
    UnknownDeposit(MessageId),

    /// An acknowledgment whose echoed amount disagrees with the record.
    #[error("deposit {id} recorded {recorded} assets, acknowledgment claims {acknowledged}")]
    DepositAmountMismatch {
        /// Deposit id.
        id: MessageId,
        /// Amount recorded when the deposit was sent.
        recorded: u64,
        /// Amount echoed by the destination.
        acknowledged: u64,
    },

    /// A confirmation for a withdrawal this ledger has no record of.
    #[error("no pending withdrawal {0}")]
    UnknownWithdrawal(MessageId),

    /// A confirmation redeeming more shares than the ledger accounts for.
    #[error("confirmation redeems {redeemed} shares but only {total} are accounted")]
    ShareUnderflow {
        /// Settled shares.
        total: u64,
        /// Shares the destination reports redeemed.
        redeemed: u64,
    },

    /// Inbound entry point invoked by someone other than the router.
    #[error("caller {0} is not the configured router")]
    Unauthorized(Address),

    /// Envelope sent by someone other than the paired ledger.
    #[error("message from unknown peer {sender} on chain {chain}")]
    UnknownPeer {
        /// Claimed source chain.
        chain: ChainSelector,
        /// Claimed sender.
        sender: Address,
    },

    /// Envelope addressed to another ledger or chain.
    #[error("message for {receiver} on chain {chain} delivered to the wrong ledger")]
    Misrouted {
        /// Destination chain on the envelope.
        chain: ChainSelector,
        /// Receiver on the envelope.
        receiver: Address,
    },

    /// A kind this ledger never receives.
    #[error("ledger does not handle {0} messages")]
    UnexpectedMessage(MessageKind),

    /// An accounting-only kind that arrived carrying assets.
    #[error("{kind} message must not carry assets, got {amount}")]
    UnexpectedAmount {
        /// Message kind.
        kind: MessageKind,
        /// Assets attached.
        amount: u64,
    },

    /// Gas limit of zero.
    #[error("gas limit must be greater than zero")]
    ZeroGasLimit,

    /// Accounting overflow.
    #[error("amount overflow: operation would exceed allowed limits")]
    AmountOverflow,

    #[error("vault call failed: {0}")]
    Vault(#[from] VaultError),

    #[error("token transfer failed: {0}")]
    Token(#[from] TokenError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("malformed message: {0}")]
    Codec(#[from] CodecError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl LedgerError {
    /// Classification used for retry and status-code decisions.
    pub fn class(&self) -> ErrorClass {
        match self {
            // Redelivery cannot conjure shares the position no longer holds.
            LedgerError::Vault(VaultError::InsufficientShares { .. }) => ErrorClass::Precondition,
            LedgerError::Vault(_) => ErrorClass::RemoteExecution,
            LedgerError::UnknownDeposit(_) | LedgerError::UnknownWithdrawal(_) => {
                ErrorClass::Replay
            }
            LedgerError::Transport(TransportError::AlreadyDelivered(_)) => ErrorClass::Replay,
            LedgerError::Transport(_) => ErrorClass::Transport,
            LedgerError::Codec(_)
            | LedgerError::UnexpectedMessage(_)
            | LedgerError::UnexpectedAmount { .. }
            | LedgerError::DepositAmountMismatch { .. } => ErrorClass::Decode,
            LedgerError::ZeroAmount
            | LedgerError::InsufficientShares { .. }
            | LedgerError::ShareUnderflow { .. }
            | LedgerError::Unauthorized(_)
            | LedgerError::UnknownPeer { .. }
            | LedgerError::Misrouted { .. }
            | LedgerError::ZeroGasLimit
            | LedgerError::AmountOverflow
            | LedgerError::Token(_)
            | LedgerError::Config(_) => ErrorClass::Precondition,
        }
    }

    /// Whether redelivering the same message later may succeed.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::RemoteExecution
    }
}
