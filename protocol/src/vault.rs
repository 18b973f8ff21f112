//! # Yield Vault
//!
//! The destination side keeps its whole position in an ERC-4626-style
//! vault. The settlement core only sees the [`YieldVault`] trait; the
//! devnet and the tests use [`InMemoryVault`].
//!
//! ## Share math
//!
//! [`InMemoryVault`] uses the virtual-offset conversion of production
//! tokenized vaults (one virtual share, one virtual asset):
//!
//! ```text
//! shares_for(assets) = assets * (total_supply + 1) / (total_assets + 1)
//! assets_for(shares) = shares * (total_assets + 1) / (total_supply + 1)
//! ```
//!
//! Both floor. A vault holding 1 250 assets against 1 000 shares (six
//! decimals) therefore reports `convert_to_assets(1e6) == 1_249_999`, and a
//! 100-asset deposit mints exactly 80 shares.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::token::{TokenError, TokenLedger};
use crate::types::Address;

/// Errors raised by vault operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VaultError {
    /// Deposits and redemptions are suspended.
    #[error("vault is paused")]
    Paused,

    /// Owner tried to redeem more shares than it holds.
    #[error("insufficient shares for {owner}: held {held}, requested {requested}")]
    InsufficientShares {
        /// Redeeming account.
        owner: Address,
        /// Shares it holds.
        held: u64,
        /// Shares requested.
        requested: u64,
    },

    /// A realized loss larger than the vault's assets.
    #[error("loss of {loss} exceeds vault assets {total_assets}")]
    LossExceedsAssets {
        /// Requested loss.
        loss: u64,
        /// Assets under management.
        total_assets: u64,
    },

    /// Share or asset totals would overflow.
    #[error("vault accounting overflow")]
    Overflow,

    /// Moving the underlying asset failed.
    #[error("asset transfer failed: {0}")]
    Asset(#[from] TokenError),
}

/// Interface of the underlying yield vault, as seen by the destination ledger.
///
/// `asset` is the settlement-asset ledger of the vault's chain; the vault
/// pulls deposits from it and pays redemptions into it.
pub trait YieldVault {
    /// Address the vault custodies assets under.
    fn address(&self) -> Address;

    /// Decimals of the vault share.
    fn decimals(&self) -> u8;

    /// Pulls `assets` from `owner` and mints shares to it. Returns shares minted.
    fn deposit(
        &mut self,
        asset: &mut TokenLedger,
        owner: Address,
        assets: u64,
    ) -> Result<u64, VaultError>;

    /// Burns `shares` held by `owner` and pays the assets to it. Returns assets paid.
    fn redeem(
        &mut self,
        asset: &mut TokenLedger,
        owner: Address,
        shares: u64,
    ) -> Result<u64, VaultError>;

    /// Read-only conversion at the current rate.
    fn convert_to_assets(&self, shares: u64) -> u64;

    /// Shares held by `owner`.
    fn balance_of(&self, owner: &Address) -> u64;

    /// Assets backing one whole share (`10^decimals` units), floored.
    fn assets_per_share(&self) -> u64 {
        self.convert_to_assets(10u64.pow(u32::from(self.decimals())))
    }
}

/// Single-asset in-memory vault with yield and loss controls.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InMemoryVault {
    address: Address,
    decimals: u8,
    total_assets: u64,
    total_supply: u64,
    shares: BTreeMap<Address, u64>,
    paused: bool,
}

fn mul_div_floor(a: u64, b: u128, d: u128) -> u64 {
    u64::try_from(u128::from(a) * b / d).unwrap_or(u64::MAX)
}

impl InMemoryVault {
    /// Creates an empty vault.
    pub fn new(address: Address, decimals: u8) -> Self {
        Self {
            address,
            decimals,
            total_assets: 0,
            total_supply: 0,
            shares: BTreeMap::new(),
            paused: false,
        }
    }

    /// Gives the vault pre-existing liquidity: `assets` minted into custody
    /// and `shares` credited to `holder`.
    pub fn seed(
        &mut self,
        asset: &mut TokenLedger,
        holder: Address,
        assets: u64,
        shares: u64,
    ) -> Result<(), VaultError> {
        let total_assets = self.total_assets.checked_add(assets).ok_or(VaultError::Overflow)?;
        let total_supply = self.total_supply.checked_add(shares).ok_or(VaultError::Overflow)?;
        asset.mint(self.address, assets)?;
        *self.shares.entry(holder).or_insert(0) += shares;
        self.total_assets = total_assets;
        self.total_supply = total_supply;
        Ok(())
    }

    /// Assets under management.
    pub fn total_assets(&self) -> u64 {
        self.total_assets
    }

    /// Shares outstanding.
    pub fn total_supply(&self) -> u64 {
        self.total_supply
    }

    /// Whether deposits and redemptions are suspended.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Suspends or resumes deposits and redemptions.
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Adds `amount` of yield. Raises the rate for every holder.
    pub fn accrue(&mut self, asset: &mut TokenLedger, amount: u64) -> Result<(), VaultError> {
        let total_assets = self.total_assets.checked_add(amount).ok_or(VaultError::Overflow)?;
        asset.mint(self.address, amount)?;
        self.total_assets = total_assets;
        Ok(())
    }

    /// Writes off `amount` of assets. Lowers the rate for every holder.
    pub fn realize_loss(&mut self, asset: &mut TokenLedger, amount: u64) -> Result<(), VaultError> {
        let total_assets =
            self.total_assets
                .checked_sub(amount)
                .ok_or(VaultError::LossExceedsAssets {
                    loss: amount,
                    total_assets: self.total_assets,
                })?;
        asset.burn(self.address, amount)?;
        self.total_assets = total_assets;
        Ok(())
    }

    /// Shares a deposit of `assets` would mint right now.
    pub fn preview_deposit(&self, assets: u64) -> u64 {
        mul_div_floor(
            assets,
            u128::from(self.total_supply) + 1,
            u128::from(self.total_assets) + 1,
        )
    }

    fn ensure_active(&self) -> Result<(), VaultError> {
        if self.paused {
            return Err(VaultError::Paused);
        }
        Ok(())
    }
}

impl YieldVault for InMemoryVault {
    fn address(&self) -> Address {
        self.address
    }

    fn decimals(&self) -> u8 {
        self.decimals
    }

    fn deposit(
        &mut self,
        asset: &mut TokenLedger,
        owner: Address,
        assets: u64,
    ) -> Result<u64, VaultError> {
        self.ensure_active()?;
        let minted = self.preview_deposit(assets);
        let total_assets = self.total_assets.checked_add(assets).ok_or(VaultError::Overflow)?;
        let total_supply = self.total_supply.checked_add(minted).ok_or(VaultError::Overflow)?;

        asset.transfer(owner, self.address, assets)?;
        *self.shares.entry(owner).or_insert(0) += minted;
        self.total_assets = total_assets;
        self.total_supply = total_supply;

        tracing::debug!(%owner, assets, minted, "vault deposit");
        Ok(minted)
    }

    fn redeem(
        &mut self,
        asset: &mut TokenLedger,
        owner: Address,
        shares: u64,
    ) -> Result<u64, VaultError> {
        self.ensure_active()?;
        let held = self.balance_of(&owner);
        if held < shares {
            return Err(VaultError::InsufficientShares {
                owner,
                held,
                requested: shares,
            });
        }
        let assets = self.convert_to_assets(shares).min(self.total_assets);

        asset.transfer(self.address, owner, assets)?;
        let remaining = held - shares;
        if remaining == 0 {
            self.shares.remove(&owner);
        } else {
            self.shares.insert(owner, remaining);
        }
        self.total_supply -= shares;
        self.total_assets -= assets;

        tracing::debug!(%owner, shares, assets, "vault redeem");
        Ok(assets)
    }

    fn convert_to_assets(&self, shares: u64) -> u64 {
        mul_div_floor(
            shares,
            u128::from(self.total_assets) + 1,
            u128::from(self.total_supply) + 1,
        )
    }

    fn balance_of(&self, owner: &Address) -> u64 {
        self.shares.get(owner).copied().unwrap_or(0)
    }
}
