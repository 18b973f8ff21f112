//! # Destination Ledger
//!
//! Holds the real position in the yield vault. It keeps no accounting of
//! its own: the vault is the source of truth for shares and rate, and
//! every answer this ledger sends back is read from it at execution time.
//!
//! - **deposit** → deposit the carried assets, reply with `depositAck`
//!   (shares minted, rate right after, marker).
//! - **withdrawalRequest** → resolve `All` to the current vault balance,
//!   redeem, reply with `withdrawalConfirmed` carrying the assets back.
//! - **sync** (operator call) → reply-less `syncAssetsPerShare` with the
//!   current rate and marker.
//!
//! The marker is the chain's block number when the rate was read.
//!
//! A vault failure aborts the handler before anything is sent; the
//! inbound message stays undelivered and can be retried.

use serde::{Deserialize, Serialize};

use xvault_protocol::chain::ChainEnv;
use xvault_protocol::config::LedgerConfig;
use xvault_protocol::message::{
    DepositAck, Message, MessageKind, Payload, RateSync, WithdrawalAmount, WithdrawalConfirmation,
};
use xvault_protocol::transport::Transport;
use xvault_protocol::types::{Address, MessageId};
use xvault_protocol::vault::YieldVault;

use crate::dispatcher::{atomically, send_message, MessageReceiver};
use crate::error::LedgerError;
use crate::events::LedgerEvent;

/// The vault-holding side of the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationLedger<V> {
    config: LedgerConfig,
    vault: V,
    #[serde(skip)]
    events: Vec<LedgerEvent>,
}

impl<V: YieldVault + Clone> DestinationLedger<V> {
    /// Creates a ledger holding its position in `vault`.
    pub fn new(config: LedgerConfig, vault: V) -> Result<Self, LedgerError> {
        config.validate()?;
        Ok(Self {
            config,
            vault,
            events: Vec::new(),
        })
    }

    /// This ledger's address.
    pub fn address(&self) -> Address {
        self.config.address
    }

    /// Address of the source ledger.
    pub fn peer_address(&self) -> Address {
        self.config.peer_address
    }

    /// The underlying vault.
    pub fn vault(&self) -> &V {
        &self.vault
    }

    /// Mutable access to the vault, for yield and loss injection.
    pub fn vault_mut(&mut self) -> &mut V {
        &mut self.vault
    }

    /// Shares this ledger holds in the vault.
    pub fn vault_shares(&self) -> u64 {
        self.vault.balance_of(&self.config.address)
    }

    /// Vault rate right now.
    pub fn assets_per_share(&self) -> u64 {
        self.vault.assets_per_share()
    }

    pub fn gas_limit(&self) -> u64 {
        self.config.gas_limit
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    // -- Message handlers ---------------------------------------------------

    /// Deposits the assets `message` carried and acknowledges them.
    ///
    /// # Errors
    ///
    /// A vault error (e.g. [`VaultError::Paused`](xvault_protocol::vault::VaultError::Paused))
    /// aborts with nothing deposited and nothing sent.
    pub fn handle_deposit<T: Transport>(
        &mut self,
        env: &mut ChainEnv,
        transport: &mut T,
        message: &Message,
    ) -> Result<MessageId, LedgerError> {
        atomically(self, env, |ledger, env| {
            let address = ledger.config.address;
            let shares = ledger.vault.deposit(&mut env.asset, address, message.amount)?;
            let ack = DepositAck {
                deposit_id: message.id,
                assets: message.amount,
                shares_minted: shares,
                assets_per_share: ledger.vault.assets_per_share(),
                marker: env.block_number,
            };
            let (id, sent) =
                send_message(&ledger.config, env, transport, &Payload::DepositAck(ack), 0)?;

            ledger.events.push(LedgerEvent::DepositConfirmed {
                deposit_id: message.id,
                assets: message.amount,
                shares,
            });
            ledger.events.push(sent);
            tracing::info!(
                deposit = %message.id.short(),
                assets = message.amount,
                shares,
                assets_per_share = ack.assets_per_share,
                "deposit executed"
            );
            Ok(id)
        })
    }

    /// Redeems the requested shares and sends the proceeds back.
    ///
    /// `All` resolves to this ledger's whole vault balance at this moment.
    /// Redeeming zero shares is fine and confirms zero assets.
    pub fn handle_withdrawal_request<T: Transport>(
        &mut self,
        env: &mut ChainEnv,
        transport: &mut T,
        request_id: MessageId,
        amount: WithdrawalAmount,
    ) -> Result<MessageId, LedgerError> {
        atomically(self, env, |ledger, env| {
            let address = ledger.config.address;
            let shares = match amount {
                WithdrawalAmount::Exact(n) => n,
                WithdrawalAmount::All => ledger.vault.balance_of(&address),
            };
            let assets = ledger.vault.redeem(&mut env.asset, address, shares)?;
            let confirmation = WithdrawalConfirmation {
                request_id,
                shares_redeemed: shares,
            };
            let (id, sent) = send_message(
                &ledger.config,
                env,
                transport,
                &Payload::WithdrawalConfirmed(confirmation),
                assets,
            )?;

            ledger.events.push(LedgerEvent::WithdrawalExecuted {
                request_id,
                shares,
                assets,
            });
            ledger.events.push(sent);
            tracing::info!(request = %request_id.short(), shares, assets, "withdrawal executed");
            Ok(id)
        })
    }

    // -- Operator calls -----------------------------------------------------

    /// Publishes the vault's current rate to the source ledger.
    pub fn sync_assets_per_share<T: Transport>(
        &mut self,
        env: &mut ChainEnv,
        transport: &mut T,
    ) -> Result<MessageId, LedgerError> {
        atomically(self, env, |ledger, env| {
            let sync = RateSync {
                assets_per_share: ledger.vault.assets_per_share(),
                marker: env.block_number,
            };
            let (id, sent) = send_message(
                &ledger.config,
                env,
                transport,
                &Payload::SyncAssetsPerShare(sync),
                0,
            )?;
            ledger.events.push(LedgerEvent::AssetsPerShareSynced {
                assets_per_share: sync.assets_per_share,
                marker: sync.marker,
            });
            ledger.events.push(sent);
            tracing::info!(
                assets_per_share = sync.assets_per_share,
                marker = sync.marker,
                "assets-per-share synced"
            );
            Ok(id)
        })
    }

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
}

impl<V: YieldVault + Clone> MessageReceiver for DestinationLedger<V> {
    fn config(&self) -> &LedgerConfig {
        &self.config
    }

    fn accepts(&self, kind: MessageKind) -> bool {
        matches!(kind, MessageKind::Deposit | MessageKind::WithdrawalRequest)
    }

    fn receive<T: Transport>(
        &mut self,
        env: &mut ChainEnv,
        transport: &mut T,
        message: Message,
    ) -> Result<(), LedgerError> {
        match message.payload {
            Payload::Deposit => self.handle_deposit(env, transport, &message).map(|_| ()),
            Payload::WithdrawalRequest(amount) => self
                .handle_withdrawal_request(env, transport, message.id, amount)
                .map(|_| ()),
            other => Err(LedgerError::UnexpectedMessage(other.kind())),
        }
    }
}
