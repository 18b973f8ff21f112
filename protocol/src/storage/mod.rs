//! # Storage Module
//!
//! Persistence for ledger state. Bincode on disk, JSON only at the API
//! boundary.

pub mod db;

pub use db::{DbError, DbResult, LedgerDB};
