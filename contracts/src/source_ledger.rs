//! # Source Ledger
//!
//! The side depositors talk to. It never holds the vault position itself;
//! it mirrors it from the messages the destination sends back.
//!
//! ## Accounting
//!
//! ```text
//! total_assets = pending_deposits + shares_to_assets(total_shares, assets_per_share)
//! ```
//!
//! - `pending_deposits` grows when a deposit is sent and shrinks when its
//!   acknowledgment arrives. Nothing else touches it.
//! - `total_shares` grows on acknowledgment and shrinks on withdrawal
//!   confirmation, never at request time: the settled amount of a
//!   withdrawal (especially an "all" request) is only known once the
//!   destination has executed it.
//! - `assets_per_share` only moves when a reading with a strictly newer
//!   destination marker arrives.
//!
//! ## Lifecycles
//!
//! ```text
//! deposit:     Idle ──initiate_deposit──► PendingRemote ──depositAck──► Settled
//! withdrawal:  Idle ──initiate_withdrawal──► RequestedRemote ──withdrawalConfirmed──► Settled
//! ```
//!
//! Each pending record is created once and consumed once; a second
//! acknowledgment or confirmation for the same id fails its lookup.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use xvault_protocol::chain::ChainEnv;
use xvault_protocol::config::LedgerConfig;
use xvault_protocol::message::{
    DepositAck, Message, MessageKind, Payload, RateSync, WithdrawalAmount, WithdrawalConfirmation,
};
use xvault_protocol::rate::{shares_to_assets, AssetsPerShare};
use xvault_protocol::transport::Transport;
use xvault_protocol::types::{Address, MessageId};

use crate::dispatcher::{atomically, send_message, MessageReceiver};
use crate::error::LedgerError;
use crate::events::LedgerEvent;

/// An in-flight withdrawal request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWithdrawal {
    /// Who receives the assets on confirmation.
    pub recipient: Address,
    /// Shares requested, as sent.
    pub amount: WithdrawalAmount,
    /// Opaque caller reference, echoed in the settlement event.
    pub memo: Vec<u8>,
}

/// The fields of a source ledger that must survive a restart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceState {
    /// Assets sent to the destination and not yet acknowledged.
    pub pending_deposits: u64,
    /// Vault shares confirmed as held by the mirrored position.
    pub total_shares: u64,
    /// Last accepted rate.
    pub assets_per_share: AssetsPerShare,
    /// Destination marker of the last accepted rate.
    pub update_epoch: u64,
    /// In-flight withdrawal requests by request id.
    pub pending_withdrawals: BTreeMap<MessageId, PendingWithdrawal>,
    /// In-flight deposits by deposit id, with the assets each carried.
    pub pending_deposit_records: BTreeMap<MessageId, u64>,
    /// Shares claimed by in-flight exact withdrawals.
    pub reserved_shares: u64,
}

/// Mirrored accounting of the vault position, on the depositors' chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLedger {
    config: LedgerConfig,
    state: SourceState,
    /// Not persisted; drained by whoever drives the ledger.
    #[serde(skip)]
    events: Vec<LedgerEvent>,
}

impl SourceLedger {
    /// Creates a ledger with empty accounting.
    pub fn new(config: LedgerConfig) -> Result<Self, LedgerError> {
        config.validate()?;
        let state = SourceState {
            assets_per_share: AssetsPerShare::zero(config.share_decimals),
            ..SourceState::default()
        };
        Ok(Self {
            config,
            state,
            events: Vec::new(),
        })
    }

    /// Rebuilds a ledger from persisted state.
    pub fn restore(config: LedgerConfig, state: SourceState) -> Result<Self, LedgerError> {
        config.validate()?;
        Ok(Self {
            config,
            state,
            events: Vec::new(),
        })
    }

    // -- Views --------------------------------------------------------------

    /// Persisted fields.
    pub fn state(&self) -> &SourceState {
        &self.state
    }

    /// This ledger's address.
    pub fn address(&self) -> Address {
        self.config.address
    }

    /// Address of the destination ledger.
    pub fn peer_address(&self) -> Address {
        self.config.peer_address
    }

    pub fn total_pending_deposits(&self) -> u64 {
        self.state.pending_deposits
    }

    pub fn total_shares(&self) -> u64 {
        self.state.total_shares
    }

    pub fn assets_per_share(&self) -> AssetsPerShare {
        self.state.assets_per_share
    }

    pub fn update_epoch(&self) -> u64 {
        self.state.update_epoch
    }

    /// The in-flight withdrawal recorded under `id`, if any.
    pub fn pending_withdrawal(&self, id: &MessageId) -> Option<&PendingWithdrawal> {
        self.state.pending_withdrawals.get(id)
    }

    pub fn pending_withdrawal_count(&self) -> usize {
        self.state.pending_withdrawals.len()
    }

    /// Assets recorded for the in-flight deposit `id`, if any.
    pub fn pending_deposit(&self, id: &MessageId) -> Option<u64> {
        self.state.pending_deposit_records.get(id).copied()
    }

    /// Settled shares not claimed by an in-flight withdrawal. An in-flight
    /// `All` request claims the whole position.
    pub fn available_shares(&self) -> u64 {
        if self.withdraw_all_pending() {
            return 0;
        }
        self.state
            .total_shares
            .saturating_sub(self.state.reserved_shares)
    }

    /// Whether a withdraw-all request is waiting for its confirmation.
    pub fn withdraw_all_pending(&self) -> bool {
        self.state
            .pending_withdrawals
            .values()
            .any(|p| p.amount == WithdrawalAmount::All)
    }

    /// `pending_deposits + shares_to_assets(total_shares, assets_per_share)`.
    pub fn total_assets(&self) -> u64 {
        self.state
            .pending_deposits
            .saturating_add(shares_to_assets(
                self.state.total_shares,
                self.state.assets_per_share,
            ))
    }

    /// Everything this ledger has done since the last [`take_events`](Self::take_events).
    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    /// Drains the event log.
    pub fn take_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    // -- User operations ----------------------------------------------------

    /// Pulls `amount` of the settlement asset from `depositor` and sends it
    /// to the destination as a deposit.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ZeroAmount`] for a zero deposit, a token error
    /// if the depositor cannot cover it, or a transport error if the message
    /// cannot be sent. Nothing changes on error.
    pub fn initiate_deposit<T: Transport>(
        &mut self,
        env: &mut ChainEnv,
        transport: &mut T,
        depositor: Address,
        amount: u64,
    ) -> Result<MessageId, LedgerError> {
        atomically(self, env, |ledger, env| {
            if amount == 0 {
                return Err(LedgerError::ZeroAmount);
            }
            let pending = ledger
                .state
                .pending_deposits
                .checked_add(amount)
                .ok_or(LedgerError::AmountOverflow)?;

            env.asset.transfer(depositor, ledger.config.address, amount)?;
            let (id, sent) =
                send_message(&ledger.config, env, transport, &Payload::Deposit, amount)?;

            ledger.state.pending_deposits = pending;
            ledger.state.pending_deposit_records.insert(id, amount);
            ledger.events.push(sent);
            tracing::info!(id = %id.short(), %depositor, amount, pending, "deposit initiated");
            Ok(id)
        })
    }

    /// Asks the destination to redeem `amount` shares and pay the proceeds
    /// to `recipient`.
    ///
    /// `WithdrawalAmount::All` skips the balance check; the destination
    /// resolves it to its whole position when it executes the request.
    /// Until it is confirmed no exact request is accepted, since the
    /// destination would run it against an empty position.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientShares`] if an exact amount exceeds
    /// the shares not already claimed by in-flight requests.
    pub fn initiate_withdrawal<T: Transport>(
        &mut self,
        env: &mut ChainEnv,
        transport: &mut T,
        amount: WithdrawalAmount,
        recipient: Address,
        memo: Vec<u8>,
    ) -> Result<MessageId, LedgerError> {
        atomically(self, env, |ledger, env| {
            let reserved = match amount {
                WithdrawalAmount::Exact(n) => {
                    let available = ledger.available_shares();
                    if n > available {
                        return Err(LedgerError::InsufficientShares {
                            available,
                            requested: n,
                        });
                    }
                    ledger
                        .state
                        .reserved_shares
                        .checked_add(n)
                        .ok_or(LedgerError::AmountOverflow)?
                }
                WithdrawalAmount::All => ledger.state.reserved_shares,
            };

            let (id, sent) = send_message(
                &ledger.config,
                env,
                transport,
                &Payload::WithdrawalRequest(amount),
                0,
            )?;

            ledger.state.reserved_shares = reserved;
            ledger.state.pending_withdrawals.insert(
                id,
                PendingWithdrawal {
                    recipient,
                    amount,
                    memo,
                },
            );
            ledger.events.push(sent);
            ledger.events.push(LedgerEvent::WithdrawalRequested {
                request_id: id,
                recipient,
                amount,
            });
            tracing::info!(id = %id.short(), %recipient, ?amount, "withdrawal requested");
            Ok(id)
        })
    }

    // -- Message handlers ---------------------------------------------------

    /// Settles the deposit `ack` refers to.
    ///
    /// Every check runs before the first mutation, so an error leaves the
    /// ledger as it was.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownDeposit`] if no deposit is pending under the
    /// echoed id (including a second delivery of the same ack), and
    /// [`LedgerError::DepositAmountMismatch`] if the echoed asset amount
    /// differs from the one recorded.
    pub fn handle_deposit_ack(&mut self, ack: &DepositAck) -> Result<(), LedgerError> {
        let recorded = self
            .state
            .pending_deposit_records
            .get(&ack.deposit_id)
            .copied()
            .ok_or(LedgerError::UnknownDeposit(ack.deposit_id))?;
        if recorded != ack.assets {
            return Err(LedgerError::DepositAmountMismatch {
                id: ack.deposit_id,
                recorded,
                acknowledged: ack.assets,
            });
        }
        let pending = self
            .state
            .pending_deposits
            .checked_sub(recorded)
            .ok_or(LedgerError::AmountOverflow)?;
        let shares = self
            .state
            .total_shares
            .checked_add(ack.shares_minted)
            .ok_or(LedgerError::AmountOverflow)?;

        self.state.pending_deposit_records.remove(&ack.deposit_id);
        self.state.pending_deposits = pending;
        self.state.total_shares = shares;
        self.events.push(LedgerEvent::DepositConfirmed {
            deposit_id: ack.deposit_id,
            assets: recorded,
            shares: ack.shares_minted,
        });
        tracing::info!(
            id = %ack.deposit_id.short(),
            assets = recorded,
            shares = ack.shares_minted,
            total_shares = shares,
            "deposit settled"
        );

        self.apply_rate(ack.assets_per_share, ack.marker);
        Ok(())
    }

    /// Settles the withdrawal `confirmation` refers to and pays the
    /// recipient the `assets` that arrived with it.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownWithdrawal`] if no request is pending under the
    /// echoed id. A second confirmation for the same id always lands here,
    /// so the recipient can never be paid twice.
    pub fn handle_withdrawal_confirmed(
        &mut self,
        env: &mut ChainEnv,
        confirmation: &WithdrawalConfirmation,
        assets: u64,
    ) -> Result<(), LedgerError> {
        atomically(self, env, |ledger, env| {
            let request_id = confirmation.request_id;
            let record = ledger
                .state
                .pending_withdrawals
                .get(&request_id)
                .cloned()
                .ok_or(LedgerError::UnknownWithdrawal(request_id))?;
            let shares = ledger
                .state
                .total_shares
                .checked_sub(confirmation.shares_redeemed)
                .ok_or(LedgerError::ShareUnderflow {
                    total: ledger.state.total_shares,
                    redeemed: confirmation.shares_redeemed,
                })?;
            let reserved = match record.amount {
                WithdrawalAmount::Exact(n) => ledger.state.reserved_shares.saturating_sub(n),
                WithdrawalAmount::All => ledger.state.reserved_shares,
            };

            env.asset
                .transfer(ledger.config.address, record.recipient, assets)?;

            ledger.state.pending_withdrawals.remove(&request_id);
            ledger.state.total_shares = shares;
            ledger.state.reserved_shares = reserved.min(shares);
            ledger.events.push(LedgerEvent::WithdrawalSettled {
                request_id,
                recipient: record.recipient,
                shares: confirmation.shares_redeemed,
                assets,
                memo: record.memo,
            });
            tracing::info!(
                id = %request_id.short(),
                recipient = %record.recipient,
                shares = confirmation.shares_redeemed,
                assets,
                total_shares = shares,
                "withdrawal settled"
            );
            Ok(())
        })
    }

    /// Applies a rate reading if it is newer than the stored one.
    ///
    /// A stale reading is not an error; it is dropped and logged.
    pub fn handle_assets_per_share_updated(&mut self, sync: &RateSync) {
        self.apply_rate(sync.assets_per_share, sync.marker);
    }

    fn apply_rate(&mut self, raw: u64, marker: u64) {
        let epoch = self.state.update_epoch;
        if marker <= epoch {
            tracing::warn!(marker, update_epoch = epoch, "stale assets-per-share ignored");
            self.events.push(LedgerEvent::StaleSyncIgnored {
                marker,
                update_epoch: epoch,
            });
            return;
        }
        let previous = self.state.assets_per_share.raw;
        self.state.assets_per_share = AssetsPerShare::new(raw, self.config.share_decimals);
        self.state.update_epoch = marker;
        self.events.push(LedgerEvent::AssetsPerShareUpdated {
            marker,
            assets_per_share: raw,
            previous,
        });
        tracing::info!(marker, assets_per_share = raw, previous, "assets-per-share updated");
    }

    // -- Administration -----------------------------------------------------

    /// Changes the gas limit attached to outbound messages.
    pub fn set_gas_limit(&mut self, gas_limit: u64) -> Result<(), LedgerError> {
        if gas_limit == 0 {
            return Err(LedgerError::ZeroGasLimit);
        }
        let previous = std::mem::replace(&mut self.config.gas_limit, gas_limit);
        self.events.push(LedgerEvent::GasLimitChanged {
            previous,
            current: gas_limit,
        });
        Ok(())
    }

    /// Sends `amount` of this ledger's fee token to `to`.
    pub fn withdraw_fee_token(
        &mut self,
        env: &mut ChainEnv,
        to: Address,
        amount: u64,
    ) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        env.fee_token.transfer(self.config.address, to, amount)?;
        self.events.push(LedgerEvent::FeeTokenWithdrawn { to, amount });
        Ok(())
    }

    /// Current gas limit.
    pub fn gas_limit(&self) -> u64 {
        self.config.gas_limit
    }
}

impl MessageReceiver for SourceLedger {
    fn config(&self) -> &LedgerConfig {
        &self.config
    }

    fn accepts(&self, kind: MessageKind) -> bool {
        matches!(
            kind,
            MessageKind::DepositAck
                | MessageKind::WithdrawalConfirmed
                | MessageKind::SyncAssetsPerShare
        )
    }

    fn receive<T: Transport>(
        &mut self,
        env: &mut ChainEnv,
        _transport: &mut T,
        message: Message,
    ) -> Result<(), LedgerError> {
        match message.payload {
            Payload::DepositAck(ack) => self.handle_deposit_ack(&ack),
            Payload::WithdrawalConfirmed(confirmation) => {
                self.handle_withdrawal_confirmed(env, &confirmation, message.amount)
            }
            Payload::SyncAssetsPerShare(sync) => {
                self.handle_assets_per_share_updated(&sync);
                Ok(())
            }
            other => Err(LedgerError::UnexpectedMessage(other.kind())),
        }
    }
}
