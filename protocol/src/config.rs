//! # Protocol Configuration & Constants
//!
//! Every magic number in xvault lives here, next to [`LedgerConfig`], the
//! per-deployment pairing record each ledger is created with.
//!
//! A ledger's configuration is fixed at setup. Only the gas limit can be
//! changed afterwards, through the administrative path.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Address, ChainSelector};

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Crate-level protocol version string.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Version byte that prefixes every encoded message body. Decoders reject
/// anything else, so a format change is a hard cut-over between peers.
pub const WIRE_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// Chains
// ---------------------------------------------------------------------------

/// Devnet selector of the chain hosting the source ledger.
pub const DEVNET_SOURCE_CHAIN_SELECTOR: ChainSelector = 4_949_039_107_694_359_620;

/// Devnet selector of the chain hosting the destination ledger and vault.
/// Matches the selector hardcoded in the reference mock router (Sepolia).
pub const DEVNET_DESTINATION_CHAIN_SELECTOR: ChainSelector = 16_015_286_601_757_825_753;

// ---------------------------------------------------------------------------
// Messaging
// ---------------------------------------------------------------------------

/// Gas limit requested for execution of every outbound message.
pub const DEFAULT_GAS_LIMIT: u64 = 999_999;

/// Flat fee, in fee-token units, the devnet router charges per message.
pub const DEFAULT_FEE_PER_MESSAGE: u64 = 10_000_000_000_000_000; // 0.01 with 18 decimals

/// Upper bound on an encoded message body. Every payload this protocol
/// produces is well under 200 bytes.
pub const MAX_MESSAGE_BYTES: usize = 1_024;

// ---------------------------------------------------------------------------
// Shares
// ---------------------------------------------------------------------------

/// Share decimals of the reference vault (a 6-decimal stablecoin vault).
pub const DEFAULT_SHARE_DECIMALS: u8 = 6;

/// Largest supported decimals value. `10^18` still fits in a `u64`.
pub const MAX_SHARE_DECIMALS: u8 = 18;

// ---------------------------------------------------------------------------
// LedgerConfig
// ---------------------------------------------------------------------------

/// Errors raised by configuration validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The gas limit must be non-zero.
    #[error("gas limit must be greater than zero")]
    ZeroGasLimit,

    /// Share decimals above [`MAX_SHARE_DECIMALS`].
    #[error("share decimals {0} exceed the maximum of {MAX_SHARE_DECIMALS}")]
    DecimalsTooLarge(u8),

    /// A ledger cannot be paired with itself.
    #[error("peer address equals own address {0}")]
    SelfPeer(Address),

    /// Both ledgers claim the same chain.
    #[error("peer chain selector equals own chain selector {0}")]
    SameChain(ChainSelector),
}

/// Pairing record for one side of the protocol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// This ledger's own address on its chain.
    pub address: Address,
    /// Chain this ledger lives on.
    pub chain_selector: ChainSelector,
    /// Address of the paired ledger on the other chain.
    pub peer_address: Address,
    /// Chain the paired ledger lives on.
    pub peer_chain_selector: ChainSelector,
    /// The only principal allowed to invoke the inbound entry point.
    pub router: Address,
    /// Gas limit attached to outbound messages.
    pub gas_limit: u64,
    /// Decimals of the vault share (and of the assets-per-share rate).
    pub share_decimals: u8,
}

impl LedgerConfig {
    /// Checks the invariants every deployment must satisfy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gas_limit == 0 {
            return Err(ConfigError::ZeroGasLimit);
        }
        if self.share_decimals > MAX_SHARE_DECIMALS {
            return Err(ConfigError::DecimalsTooLarge(self.share_decimals));
        }
        if self.peer_address == self.address {
            return Err(ConfigError::SelfPeer(self.address));
        }
        if self.peer_chain_selector == self.chain_selector {
            return Err(ConfigError::SameChain(self.chain_selector));
        }
        Ok(())
    }

    /// Returns the mirror-image config for the peer side.
    pub fn mirrored(&self) -> Self {
        Self {
            address: self.peer_address,
            chain_selector: self.peer_chain_selector,
            peer_address: self.address,
            peer_chain_selector: self.chain_selector,
            router: self.router,
            gas_limit: self.gas_limit,
            share_decimals: self.share_decimals,
        }
    }
}
