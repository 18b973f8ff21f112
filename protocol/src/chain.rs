//! # Chain Environment
//!
//! Everything a ledger can observe or touch on its own chain that is not
//! ledger state: the chain selector, the current block number and the two
//! token ledgers.
//!
//! The block number is the ordering marker attached to rate readings. It
//! only moves forward.
//!
//! `ChainEnv` is `Clone` on purpose: handlers execute against a scratch
//! copy, and the copy replaces the original only once every step succeeded.

use serde::{Deserialize, Serialize};

use crate::token::TokenLedger;
use crate::types::ChainSelector;

/// Execution environment of one chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEnv {
    /// Selector of this chain.
    pub selector: ChainSelector,
    /// Current block number.
    pub block_number: u64,
    /// Settlement asset (deposits, withdrawals).
    pub asset: TokenLedger,
    /// Token that pays messaging fees.
    pub fee_token: TokenLedger,
}

impl ChainEnv {
    /// A chain at block 1 with empty token ledgers.
    pub fn new(selector: ChainSelector, asset: TokenLedger, fee_token: TokenLedger) -> Self {
        Self {
            selector,
            block_number: 1,
            asset,
            fee_token,
        }
    }

    /// Mines one block and returns the new height.
    pub fn advance_block(&mut self) -> u64 {
        self.block_number = self.block_number.saturating_add(1);
        self.block_number
    }

    /// Mines `n` blocks and returns the new height.
    pub fn advance_blocks(&mut self, n: u64) -> u64 {
        self.block_number = self.block_number.saturating_add(n);
        self.block_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_only_move_forward() {
        let mut env = ChainEnv::new(7, TokenLedger::new("USDC", 6), TokenLedger::new("LINK", 18));
        assert_eq!(env.block_number, 1);
        assert_eq!(env.advance_block(), 2);
        assert_eq!(env.advance_blocks(10), 12);
        env.block_number = u64::MAX;
        assert_eq!(env.advance_block(), u64::MAX);
    }
}
