// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # xvault Protocol: Core Library
//!
//! Primitives of the cross-ledger vault settlement protocol: a yield vault
//! lives on a *destination* chain, depositors live on a *source* chain, and
//! the two sides only ever talk through delayed one-way messages.
//!
//! This crate holds everything the settlement state machines (in
//! `xvault-contracts`) stand on:
//!
//! - **types**: addresses, message ids, chain selectors.
//! - **rate**: floor-rounding conversion between assets and shares.
//! - **message**: the five message kinds and their wire codec.
//! - **token**: fungible balance books (settlement asset, fee token).
//! - **vault**: the yield-vault interface and an in-memory ERC-4626 vault.
//! - **chain**: per-chain execution environment and ordering marker.
//! - **transport**: the cross-chain transport interface and an in-memory
//!   router that queues messages until told to deliver them.
//! - **storage**: sled-backed snapshot persistence.
//! - **config**: protocol constants and per-ledger pairing config.
//!
//! ## Design Rules
//!
//! 1. Integer math only, always rounding toward the protocol.
//! 2. Every balance mutation is checked; overflow is an error, not a wrap.
//! 3. Everything that holds state is `Clone`, so callers can run an
//!    operation on a copy and commit it only if every step succeeded.

pub mod chain;
pub mod config;
pub mod message;
pub mod rate;
pub mod storage;
pub mod token;
pub mod transport;
pub mod types;
pub mod vault;

pub use chain::ChainEnv;
pub use config::LedgerConfig;
pub use message::{Message, MessageKind, Payload, WithdrawalAmount};
pub use rate::AssetsPerShare;
pub use token::TokenLedger;
pub use transport::{AsyncRouter, Envelope, OutboundMessage, Transport};
pub use types::{Address, ChainSelector, MessageId};
pub use vault::{InMemoryVault, YieldVault};
