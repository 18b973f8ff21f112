//! # Devnet
//!
//! A complete two-chain deployment in one process: both chain
//! environments, both ledgers, an in-memory vault and a single
//! [`AsyncRouter`] carrying messages in both directions.
//!
//! Messages sit in the router until [`Devnet::dispatch_next`] (or
//! [`Devnet::dispatch_id`] for out-of-order delivery) hands them to the
//! receiving ledger's entry point. A delivery that fails goes back to the
//! head of the queue, so a retryable failure (a paused vault) simply
//! blocks the channel until it clears.
//!
//! Every transaction mines one block on the chain it runs on, so
//! destination markers strictly increase between rate readings.

use serde::{Deserialize, Serialize};

use xvault_protocol::chain::ChainEnv;
use xvault_protocol::config::{
    LedgerConfig, DEFAULT_FEE_PER_MESSAGE, DEFAULT_GAS_LIMIT, DEFAULT_SHARE_DECIMALS,
    DEVNET_DESTINATION_CHAIN_SELECTOR, DEVNET_SOURCE_CHAIN_SELECTOR,
};
use xvault_protocol::message::{MessageKind, WithdrawalAmount};
use xvault_protocol::storage::{DbResult, LedgerDB};
use xvault_protocol::token::TokenLedger;
use xvault_protocol::transport::{AsyncRouter, Envelope};
use xvault_protocol::types::{Address, ChainSelector, MessageId};
use xvault_protocol::vault::{InMemoryVault, YieldVault};

use crate::destination_ledger::DestinationLedger;
use crate::dispatcher::deliver;
use crate::error::LedgerError;
use crate::events::LedgerEvent;
use crate::source_ledger::SourceLedger;

/// Snapshot name of the whole devnet in [`LedgerDB`].
pub const DEVNET_SNAPSHOT: &str = "devnet";

/// Snapshot name of the source ledger's persisted fields.
pub const SOURCE_STATE_SNAPSHOT: &str = "source_state";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Parameters of a devnet deployment. Loadable from JSON; every field has
/// a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevnetConfig {
    pub source_chain_selector: ChainSelector,
    pub destination_chain_selector: ChainSelector,
    pub share_decimals: u8,
    pub gas_limit: u64,
    pub fee_per_message: u64,
    pub asset_symbol: String,
    pub asset_decimals: u8,
    pub fee_symbol: String,
    pub fee_decimals: u8,
    /// Settlement asset minted to the devnet depositor.
    pub depositor_balance: u64,
    /// Fee token minted to each ledger.
    pub ledger_fee_balance: u64,
    /// Assets the vault already holds from other depositors.
    pub vault_seed_assets: u64,
    /// Shares outstanding against those assets.
    pub vault_seed_shares: u64,
}

impl Default for DevnetConfig {
    /// A 6-decimal stablecoin vault holding 1 250 assets for 1 000 shares.
    fn default() -> Self {
        Self {
            source_chain_selector: DEVNET_SOURCE_CHAIN_SELECTOR,
            destination_chain_selector: DEVNET_DESTINATION_CHAIN_SELECTOR,
            share_decimals: DEFAULT_SHARE_DECIMALS,
            gas_limit: DEFAULT_GAS_LIMIT,
            fee_per_message: DEFAULT_FEE_PER_MESSAGE,
            asset_symbol: "USDC".to_string(),
            asset_decimals: 6,
            fee_symbol: "LINK".to_string(),
            fee_decimals: 18,
            depositor_balance: 10_000_000_000,
            ledger_fee_balance: 100 * DEFAULT_FEE_PER_MESSAGE,
            vault_seed_assets: 1_250_000_000,
            vault_seed_shares: 1_000_000_000,
        }
    }
}

impl DevnetConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Pretty-printed JSON.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

// ---------------------------------------------------------------------------
// Delivery reports
// ---------------------------------------------------------------------------

/// Which ledger a message was delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Source,
    Destination,
}

/// Outcome of one successful delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub id: MessageId,
    pub kind: MessageKind,
    pub to: Side,
    pub amount: u64,
}

/// Point-in-time summary of both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevnetStatus {
    pub source_block: u64,
    pub destination_block: u64,
    pub pending_deposits: u64,
    pub total_shares: u64,
    pub assets_per_share: u64,
    pub update_epoch: u64,
    pub total_assets: u64,
    pub pending_withdrawals: usize,
    pub destination_vault_shares: u64,
    pub vault_assets_per_share: u64,
    pub vault_total_assets: u64,
    pub vault_paused: bool,
    pub queued_messages: usize,
    pub messages_sent: u64,
}

// ---------------------------------------------------------------------------
// Devnet
// ---------------------------------------------------------------------------

/// A paired source/destination deployment over one router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Devnet {
    config: DevnetConfig,
    depositor: Address,
    pub source_env: ChainEnv,
    pub destination_env: ChainEnv,
    pub source: SourceLedger,
    pub destination: DestinationLedger<InMemoryVault>,
    pub router: AsyncRouter,
}

impl Devnet {
    /// Deploys and funds both sides.
    pub fn new(config: DevnetConfig) -> Result<Self, LedgerError> {
        let router = AsyncRouter::new(Address::from_label("ccip-router"), config.fee_per_message);
        let depositor = Address::from_label("devnet-depositor");

        let source_config = LedgerConfig {
            address: Address::from_label("source-ledger"),
            chain_selector: config.source_chain_selector,
            peer_address: Address::from_label("destination-ledger"),
            peer_chain_selector: config.destination_chain_selector,
            router: router.address(),
            gas_limit: config.gas_limit,
            share_decimals: config.share_decimals,
        };
        let destination_config = source_config.mirrored();

        let mut source_env = ChainEnv::new(
            config.source_chain_selector,
            TokenLedger::new(config.asset_symbol.clone(), config.asset_decimals),
            TokenLedger::new(config.fee_symbol.clone(), config.fee_decimals),
        );
        let mut destination_env = ChainEnv::new(
            config.destination_chain_selector,
            TokenLedger::new(config.asset_symbol.clone(), config.asset_decimals),
            TokenLedger::new(config.fee_symbol.clone(), config.fee_decimals),
        );

        source_env.asset.mint(depositor, config.depositor_balance)?;
        source_env
            .fee_token
            .mint(source_config.address, config.ledger_fee_balance)?;
        destination_env
            .fee_token
            .mint(destination_config.address, config.ledger_fee_balance)?;

        let mut vault =
            InMemoryVault::new(Address::from_label("yield-vault"), config.share_decimals);
        vault.seed(
            &mut destination_env.asset,
            Address::from_label("vault-seed"),
            config.vault_seed_assets,
            config.vault_seed_shares,
        )?;

        let source = SourceLedger::new(source_config)?;
        let destination = DestinationLedger::new(destination_config, vault)?;
        tracing::info!(
            source = %source.address(),
            destination = %destination.address(),
            router = %router.address(),
            "devnet deployed"
        );

        Ok(Self {
            config,
            depositor,
            source_env,
            destination_env,
            source,
            destination,
            router,
        })
    }

    pub fn config(&self) -> &DevnetConfig {
        &self.config
    }

    /// The pre-funded depositor account on the source chain.
    pub fn depositor(&self) -> Address {
        self.depositor
    }

    // -- Source-side transactions -------------------------------------------

    /// Deposits `amount` from the devnet depositor.
    pub fn deposit(&mut self, amount: u64) -> Result<MessageId, LedgerError> {
        let depositor = self.depositor;
        self.deposit_from(depositor, amount)
    }

    /// Deposits `amount` from `depositor`.
    pub fn deposit_from(
        &mut self,
        depositor: Address,
        amount: u64,
    ) -> Result<MessageId, LedgerError> {
        self.source_env.advance_block();
        self.source
            .initiate_deposit(&mut self.source_env, &mut self.router, depositor, amount)
    }

    /// Requests a withdrawal paid to `recipient`.
    pub fn withdraw(
        &mut self,
        amount: WithdrawalAmount,
        recipient: Address,
        memo: Vec<u8>,
    ) -> Result<MessageId, LedgerError> {
        self.source_env.advance_block();
        self.source.initiate_withdrawal(
            &mut self.source_env,
            &mut self.router,
            amount,
            recipient,
            memo,
        )
    }

    // -- Destination-side transactions --------------------------------------

    /// Publishes the vault rate from the destination.
    pub fn sync(&mut self) -> Result<MessageId, LedgerError> {
        self.destination_env.advance_block();
        self.destination
            .sync_assets_per_share(&mut self.destination_env, &mut self.router)
    }

    /// Adds yield to the vault.
    pub fn accrue_yield(&mut self, amount: u64) -> Result<(), LedgerError> {
        self.destination_env.advance_block();
        let vault = self.destination.vault_mut();
        vault.accrue(&mut self.destination_env.asset, amount)?;
        Ok(())
    }

    /// Writes off vault assets.
    pub fn realize_loss(&mut self, amount: u64) -> Result<(), LedgerError> {
        self.destination_env.advance_block();
        let vault = self.destination.vault_mut();
        vault.realize_loss(&mut self.destination_env.asset, amount)?;
        Ok(())
    }

    /// Pauses or resumes the vault.
    pub fn set_vault_paused(&mut self, paused: bool) {
        self.destination.vault_mut().set_paused(paused);
    }

    // -- Delivery -----------------------------------------------------------

    /// Delivers the oldest queued message. `Ok(None)` when the queue is empty.
    pub fn dispatch_next(&mut self) -> Result<Option<Delivery>, LedgerError> {
        match self.router.pop_next() {
            Some(envelope) => self.dispatch(envelope).map(Some),
            None => Ok(None),
        }
    }

    /// Delivers the queued message `id`, ahead of anything older.
    pub fn dispatch_id(&mut self, id: &MessageId) -> Result<Option<Delivery>, LedgerError> {
        match self.router.take(id) {
            Some(envelope) => self.dispatch(envelope).map(Some),
            None => Ok(None),
        }
    }

    /// Delivers until the queue is empty or a delivery fails. Returns the
    /// successful deliveries.
    pub fn dispatch_all(&mut self) -> Result<Vec<Delivery>, LedgerError> {
        let mut delivered = Vec::new();
        while let Some(delivery) = self.dispatch_next()? {
            delivered.push(delivery);
        }
        Ok(delivered)
    }

    /// Hands `envelope` to the ledger on its destination chain, as the
    /// router. A failed envelope returns to its place in send order, so an
    /// out-of-order attempt never jumps it ahead of older messages.
    fn dispatch(&mut self, envelope: Envelope) -> Result<Delivery, LedgerError> {
        let caller = self.router.address();
        let result = if envelope.dest_chain == self.source_env.selector {
            self.source_env.advance_block();
            deliver(
                &mut self.source,
                &mut self.source_env,
                &mut self.router,
                caller,
                &envelope,
            )
            .map(|m| (m, Side::Source))
        } else {
            self.destination_env.advance_block();
            deliver(
                &mut self.destination,
                &mut self.destination_env,
                &mut self.router,
                caller,
                &envelope,
            )
            .map(|m| (m, Side::Destination))
        };

        match result {
            Ok((message, to)) => Ok(Delivery {
                id: message.id,
                kind: message.kind(),
                to,
                amount: message.amount,
            }),
            Err(err) => {
                tracing::warn!(
                    id = %envelope.id.short(),
                    error = %err,
                    class = %err.class(),
                    "delivery failed, message requeued"
                );
                self.router.requeue(envelope);
                Err(err)
            }
        }
    }

    /// Re-submits an envelope that was already delivered. Always fails:
    /// the router refuses to release it twice.
    pub fn replay(&mut self, envelope: &Envelope) -> Result<Delivery, LedgerError> {
        let caller = self.router.address();
        let (message, to) = if envelope.dest_chain == self.source_env.selector {
            let m = deliver(
                &mut self.source,
                &mut self.source_env,
                &mut self.router,
                caller,
                envelope,
            )?;
            (m, Side::Source)
        } else {
            let m = deliver(
                &mut self.destination,
                &mut self.destination_env,
                &mut self.router,
                caller,
                envelope,
            )?;
            (m, Side::Destination)
        };
        Ok(Delivery {
            id: message.id,
            kind: message.kind(),
            to,
            amount: message.amount,
        })
    }

    // -- Views --------------------------------------------------------------

    pub fn status(&self) -> DevnetStatus {
        let vault = self.destination.vault();
        DevnetStatus {
            source_block: self.source_env.block_number,
            destination_block: self.destination_env.block_number,
            pending_deposits: self.source.total_pending_deposits(),
            total_shares: self.source.total_shares(),
            assets_per_share: self.source.assets_per_share().raw,
            update_epoch: self.source.update_epoch(),
            total_assets: self.source.total_assets(),
            pending_withdrawals: self.source.pending_withdrawal_count(),
            destination_vault_shares: self.destination.vault_shares(),
            vault_assets_per_share: vault.assets_per_share(),
            vault_total_assets: vault.total_assets(),
            vault_paused: vault.is_paused(),
            queued_messages: self.router.pending(),
            messages_sent: self.router.sent_count(),
        }
    }

    /// Drains both ledgers' event logs, source first.
    pub fn drain_events(&mut self) -> Vec<(Side, LedgerEvent)> {
        let source = self.source.take_events().into_iter().map(|e| (Side::Source, e));
        let destination = self
            .destination
            .take_events()
            .into_iter()
            .map(|e| (Side::Destination, e));
        source.chain(destination).collect()
    }

    // -- Persistence --------------------------------------------------------

    /// Writes the whole devnet, plus the source ledger's persisted fields
    /// on their own. Undrained events are not part of the snapshot.
    pub fn save(&self, db: &LedgerDB) -> DbResult<()> {
        db.put_snapshot(SOURCE_STATE_SNAPSHOT, self.source.state())?;
        db.put_snapshot(DEVNET_SNAPSHOT, self)
    }

    /// Loads a previously saved devnet, if there is one.
    pub fn load(db: &LedgerDB) -> DbResult<Option<Self>> {
        db.get_snapshot(DEVNET_SNAPSHOT)
    }
}
