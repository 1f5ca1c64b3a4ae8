//! Priority fee extraction for EIP-1559 transactions.

const WEI_PER_GWEI: f64 = 1e9;

/// Priority fee actually paid per gas, in gwei:
/// `min(max_priority_fee, max_fee - base_fee)`.
///
/// Inputs are in wei. Returns `None` for legacy transactions (missing fee
/// caps), blocks without a base fee, or a fee cap below the base fee.
pub fn effective_priority_fee(
    max_priority_fee: Option<u128>,
    max_fee: Option<u128>,
    base_fee: Option<u128>,
) -> Option<f64> {
    let headroom = max_fee?.checked_sub(base_fee?)?;
    let paid = max_priority_fee?.min(headroom);
    // Split to keep precision for values above 2^53 wei
    let gwei = (paid / 1_000_000_000) as f64 + (paid % 1_000_000_000) as f64 / WEI_PER_GWEI;
    Some(gwei)
}
