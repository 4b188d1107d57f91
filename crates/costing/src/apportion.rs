//! Proportional split of an amount by the largest-remainder method.

use ironbooks_core::{DomainError, DomainResult};

/// Split `total` across `basis` proportionally.
///
/// Each share is floored first; the leftover minor units go one at a time to the
/// largest fractional remainders (earlier index wins ties). The shares always sum
/// to exactly `total`.
pub fn apportion(total: i64, basis: &[u64]) -> DomainResult<Vec<i64>> {
    if total < 0 {
        return Err(DomainError::validation("amount to apportion cannot be negative"));
    }
    if basis.is_empty() {
        return Err(DomainError::validation("nothing to apportion across"));
    }
    let denominator: u128 = basis.iter().map(|b| *b as u128).sum();
    if denominator == 0 {
        return Err(DomainError::validation("allocation basis is zero for every line"));
    }

    let total_u = total as u128;
    let mut shares = Vec::with_capacity(basis.len());
    let mut remainders = Vec::with_capacity(basis.len());
    let mut assigned: u128 = 0;
    for (idx, weight) in basis.iter().enumerate() {
        let exact = total_u * (*weight as u128);
        let share = exact / denominator;
        assigned += share;
        shares.push(share as i64);
        remainders.push((exact % denominator, idx));
    }

    let leftover = (total_u - assigned) as usize;
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for (_, idx) in remainders.into_iter().take(leftover) {
        shares[idx] += 1;
    }

    Ok(shares)
}
