//! # Ledger Events
//!
//! Append-only log of what each ledger did. Events are recorded on the
//! same scratch state as the operation that produced them, so a failed
//! operation leaves no trace here either.

use serde::{Deserialize, Serialize};

use xvault_protocol::message::{MessageKind, WithdrawalAmount};
use xvault_protocol::types::{Address, MessageId};

/// Something observable a ledger did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    /// A message left this ledger.
    MessageSent {
        id: MessageId,
        kind: MessageKind,
        amount: u64,
        /// Kind-specific payload bytes, without the header.
        payload: Vec<u8>,
    },

    /// A deposit was turned into vault shares (destination) or its
    /// acknowledgment was applied (source).
    DepositConfirmed {
        deposit_id: MessageId,
        assets: u64,
        shares: u64,
    },

    /// Source recorded an outbound withdrawal request.
    WithdrawalRequested {
        request_id: MessageId,
        recipient: Address,
        amount: WithdrawalAmount,
    },

    /// Destination redeemed shares for a request.
    WithdrawalExecuted {
        request_id: MessageId,
        shares: u64,
        assets: u64,
    },

    /// Source paid out a confirmed withdrawal.
    WithdrawalSettled {
        request_id: MessageId,
        recipient: Address,
        shares: u64,
        assets: u64,
        memo: Vec<u8>,
    },

    /// Destination published a fresh rate.
    AssetsPerShareSynced { assets_per_share: u64, marker: u64 },

    /// Source accepted a newer rate.
    AssetsPerShareUpdated {
        marker: u64,
        assets_per_share: u64,
        previous: u64,
    },

    /// Source dropped a rate reading that was not newer than its own.
    StaleSyncIgnored { marker: u64, update_epoch: u64 },

    GasLimitChanged { previous: u64, current: u64 },

    FeeTokenWithdrawn { to: Address, amount: u64 },
}

impl LedgerEvent {
    /// Short name, as used in logs and the API.
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::MessageSent { .. } => "MessageSent",
            LedgerEvent::DepositConfirmed { .. } => "DepositConfirmed",
            LedgerEvent::WithdrawalRequested { .. } => "WithdrawalRequested",
            LedgerEvent::WithdrawalExecuted { .. } => "WithdrawalExecuted",
            LedgerEvent::WithdrawalSettled { .. } => "WithdrawalSettled",
            LedgerEvent::AssetsPerShareSynced { .. } => "AssetsPerShareSynced",
            LedgerEvent::AssetsPerShareUpdated { .. } => "AssetsPerShareUpdated",
            LedgerEvent::StaleSyncIgnored { .. } => "StaleSyncIgnored",
            LedgerEvent::GasLimitChanged { .. } => "GasLimitChanged",
            LedgerEvent::FeeTokenWithdrawn { .. } => "FeeTokenWithdrawn",
        }
    }
}
