//! # Rate Converter
//!
//! Integer conversion between settlement-asset amounts and vault shares
//! at a fixed-point assets-per-share rate.
//!
//! Both directions round **down**. Every conversion step can only drop a
//! sub-unit remainder into the protocol; no caller ever receives value
//! that a later conversion cannot account for. A rate of zero is the
//! state before the first sync and converts everything to zero instead of
//! failing.
//!
//! Intermediate products are computed in `u128`, so `shares * rate` never
//! overflows for any pair of `u64` inputs. A quotient that does not fit in
//! `u64` saturates; no balance in the system can hold such an amount.

use serde::{Deserialize, Serialize};

use crate::config::MAX_SHARE_DECIMALS;

/// Fixed-point exchange rate: assets per `10^decimals` shares.
///
/// With 6 decimals, a vault holding 1 250 assets for 1 000 shares reports
/// a raw value of `1_249_999` (the vault floors its own conversion).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetsPerShare {
    /// Raw fixed-point value.
    pub raw: u64,
    /// Number of decimals the raw value is scaled by.
    pub decimals: u8,
}

impl AssetsPerShare {
    /// Creates a rate from a raw fixed-point value.
    pub fn new(raw: u64, decimals: u8) -> Self {
        debug_assert!(decimals <= MAX_SHARE_DECIMALS);
        Self { raw, decimals }
    }

    /// The unsynced rate.
    pub fn zero(decimals: u8) -> Self {
        Self::new(0, decimals)
    }

    /// `10^decimals`.
    pub fn scale(&self) -> u64 {
        10u64.pow(u32::from(self.decimals))
    }

    /// Returns `true` before the first sync.
    pub fn is_zero(&self) -> bool {
        self.raw == 0
    }
}

/// `floor(a * b / d)` with a `u128` intermediate. `d` must be non-zero.
fn mul_div_floor(a: u64, b: u64, d: u64) -> u64 {
    let wide = u128::from(a) * u128::from(b) / u128::from(d);
    u64::try_from(wide).unwrap_or(u64::MAX)
}

/// Converts a share amount to assets, rounding down.
pub fn shares_to_assets(shares: u64, rate: AssetsPerShare) -> u64 {
    if rate.is_zero() {
        return 0;
    }
    mul_div_floor(shares, rate.raw, rate.scale())
}

/// Converts an asset amount to shares, rounding down.
pub fn assets_to_shares(assets: u64, rate: AssetsPerShare) -> u64 {
    if rate.is_zero() {
        return 0;
    }
    mul_div_floor(assets, rate.scale(), rate.raw)
}
