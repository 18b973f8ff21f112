//! # xvault Settlement Ledgers
//!
//! The two state machines of the cross-ledger vault protocol and the
//! plumbing that connects them:
//!
//! - **Source Ledger**: mirrors the vault position for depositors:
//!   pending deposits, settled shares, last synced rate, in-flight
//!   withdrawals.
//! - **Destination Ledger**: holds the real vault position, executes
//!   deposits and withdrawals against it and publishes its rate.
//! - **Dispatcher**: the authenticated inbound entry point of both.
//! - **Devnet**: both ledgers wired to one in-memory router.
//!
//! ## Design Principles
//!
//! 1. All monetary operations are checked (`checked_add`, `checked_sub`).
//! 2. Every operation runs on a copy of ledger and chain state and commits
//!    only once its outbound message has been accepted by the transport.
//!    There is no window where state changed but the message is missing.
//! 3. Pending records are keyed by message id and consumed exactly once.
//! 4. Every public type is serializable (serde) for the API and for
//!    persistent storage.

pub mod destination_ledger;
pub mod devnet;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod source_ledger;

pub use destination_ledger::DestinationLedger;
pub use devnet::{Devnet, DevnetConfig, DevnetStatus};
pub use dispatcher::{deliver, MessageReceiver};
pub use error::{ErrorClass, LedgerError};
pub use events::LedgerEvent;
pub use source_ledger::{PendingWithdrawal, SourceLedger, SourceState};
