//! Funding aggregation.
//!
//! Funding is binary and recomputed from the full unspent set every tick.
//! Callers are responsible for passing only outputs of the order's address.

use crate::types::Utxo;

/// Sum of `value` across `utxos`. Saturates rather than overflowing.
pub fn total_value(utxos: &[Utxo]) -> u64 {
    utxos.iter().fold(0u64, |acc, u| acc.saturating_add(u.value))
}

/// Whether `utxos` together carry at least `required`. Inclusive.
pub fn funding_sufficient(utxos: &[Utxo], required: u64) -> bool {
    total_value(utxos) >= required
}
