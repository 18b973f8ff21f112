//! # Token Ledger
//!
//! A plain fungible balance book. Each [`ChainEnv`](crate::chain::ChainEnv)
//! carries two of them: the settlement asset that deposits and withdrawals
//! move, and the fee token that pays for outbound messages.
//!
//! Balances never go negative and total supply never wraps; both are
//! enforced with checked arithmetic on every mutation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Address;

/// Errors raised by balance mutations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Attempted to move or burn more than an account holds.
    #[error(
        "insufficient {symbol} balance for {account}: available {available}, requested {requested}"
    )]
    InsufficientBalance {
        /// Token symbol.
        symbol: String,
        /// Account being debited.
        account: Address,
        /// Its current balance.
        available: u64,
        /// Amount requested.
        requested: u64,
    },

    /// A credit would overflow the account balance or the total supply.
    #[error("{symbol} supply overflow crediting {amount}")]
    Overflow {
        /// Token symbol.
        symbol: String,
        /// Amount that could not be credited.
        amount: u64,
    },
}

/// Balances of one fungible token on one chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenLedger {
    symbol: String,
    decimals: u8,
    total_supply: u64,
    balances: BTreeMap<Address, u64>,
}

impl TokenLedger {
    /// Creates an empty ledger.
    pub fn new(symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            symbol: symbol.into(),
            decimals,
            total_supply: 0,
            balances: BTreeMap::new(),
        }
    }

    /// Token symbol.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Token decimals.
    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// Sum of all balances.
    pub fn total_supply(&self) -> u64 {
        self.total_supply
    }

    /// Balance of `account`, zero if never seen.
    pub fn balance_of(&self, account: &Address) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Creates `amount` new units in `to`.
    pub fn mint(&mut self, to: Address, amount: u64) -> Result<(), TokenError> {
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or_else(|| self.overflow(amount))?;
        self.credit(to, amount)?;
        self.total_supply = supply;
        Ok(())
    }

    /// Destroys `amount` units held by `from`.
    pub fn burn(&mut self, from: Address, amount: u64) -> Result<(), TokenError> {
        self.debit(from, amount)?;
        // Supply is the sum of balances, so it cannot underflow here.
        self.total_supply -= amount;
        Ok(())
    }

    /// Moves `amount` from `from` to `to`.
    pub fn transfer(&mut self, from: Address, to: Address, amount: u64) -> Result<(), TokenError> {
        if from == to {
            return self.ensure_available(&from, amount);
        }
        self.ensure_available(&from, amount)?;
        self.credit(to, amount)?;
        self.debit(from, amount)
    }

    fn ensure_available(&self, account: &Address, amount: u64) -> Result<(), TokenError> {
        let available = self.balance_of(account);
        if available < amount {
            return Err(TokenError::InsufficientBalance {
                symbol: self.symbol.clone(),
                account: *account,
                available,
                requested: amount,
            });
        }
        Ok(())
    }

    fn credit(&mut self, to: Address, amount: u64) -> Result<(), TokenError> {
        let current = self.balance_of(&to);
        let next = current
            .checked_add(amount)
            .ok_or_else(|| self.overflow(amount))?;
        self.balances.insert(to, next);
        Ok(())
    }

    fn debit(&mut self, from: Address, amount: u64) -> Result<(), TokenError> {
        self.ensure_available(&from, amount)?;
        let next = self.balance_of(&from) - amount;
        if next == 0 {
            self.balances.remove(&from);
        } else {
            self.balances.insert(from, next);
        }
        Ok(())
    }

    fn overflow(&self, amount: u64) -> TokenError {
        TokenError::Overflow {
            symbol: self.symbol.clone(),
            amount,
        }
    }
}
