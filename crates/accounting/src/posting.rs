//! Fixed per-document posting templates.
//!
//! Each function returns a balanced set of journal lines, or nothing when the
//! document has no monetary effect. Lines with a zero amount are never emitted.

use std::collections::BTreeMap;

use ironbooks_core::{DomainError, DomainResult, money};

use crate::chart::{self, account};
use crate::ledger::JournalEntryLine;

/// Reject empty, non-positive or unbalanced line sets.
pub fn ensure_balanced(lines: &[JournalEntryLine]) -> DomainResult<()> {
    if lines.is_empty() {
        return Err(DomainError::validation("journal entry must have lines"));
    }

    let mut debit_total: i128 = 0;
    let mut credit_total: i128 = 0;
    for line in lines {
        if line.amount <= 0 {
            return Err(DomainError::validation("amount must be positive"));
        }
        if line.is_debit {
            debit_total += line.amount as i128;
        } else {
            credit_total += line.amount as i128;
        }
    }

    if debit_total != credit_total {
        return Err(DomainError::invariant("debits must equal credits"));
    }
    Ok(())
}

/// Bill approval: debit each expense account (grouped by code) and input tax,
/// credit accounts payable for the bill total.
pub fn bill_approval<'a, I>(expenses: I, tax_total: i64) -> DomainResult<Vec<JournalEntryLine>>
where
    I: IntoIterator<Item = (&'a str, i64)>,
{
    let mut by_account: BTreeMap<&str, i64> = BTreeMap::new();
    for (code, amount) in expenses {
        let slot = by_account.entry(code).or_default();
        *slot = slot
            .checked_add(amount)
            .ok_or_else(|| DomainError::validation("amount overflow"))?;
    }

    let mut lines: Vec<JournalEntryLine> = by_account
        .into_iter()
        .filter(|(_, amount)| *amount != 0)
        .map(|(code, amount)| JournalEntryLine::debit(account(code), amount))
        .collect();
    if tax_total > 0 {
        lines.push(JournalEntryLine::debit(account(chart::INPUT_TAX), tax_total));
    }

    let total = money::checked_sum(lines.iter().map(|l| l.amount))?;
    if total == 0 {
        return Ok(Vec::new());
    }
    lines.push(JournalEntryLine::credit(account(chart::ACCOUNTS_PAYABLE), total));
    Ok(lines)
}

/// Vendor payment: the applied part clears payables, any remainder is an advance.
pub fn vendor_payment(applied: i64, unapplied: i64) -> DomainResult<Vec<JournalEntryLine>> {
    let total = money::checked_sum([applied, unapplied])?;
    if total <= 0 {
        return Ok(Vec::new());
    }

    let mut lines = Vec::with_capacity(3);
    if applied > 0 {
        lines.push(JournalEntryLine::debit(account(chart::ACCOUNTS_PAYABLE), applied));
    }
    if unapplied > 0 {
        lines.push(JournalEntryLine::debit(account(chart::VENDOR_ADVANCES), unapplied));
    }
    lines.push(JournalEntryLine::credit(account(chart::CASH), total));
    Ok(lines)
}

/// Inventory revaluation by `delta` (positive = write-up).
pub fn revaluation(
    delta: i64,
    inventory_account: &str,
    adjustment_account: &str,
) -> Vec<JournalEntryLine> {
    let amount = delta.unsigned_abs() as i64;
    if delta > 0 {
        vec![
            JournalEntryLine::debit(account(inventory_account), amount),
            JournalEntryLine::credit(account(adjustment_account), amount),
        ]
    } else if delta < 0 {
        vec![
            JournalEntryLine::debit(account(adjustment_account), amount),
            JournalEntryLine::credit(account(inventory_account), amount),
        ]
    } else {
        Vec::new()
    }
}

/// Capitalize landed charges into inventory against an accrual.
pub fn landed_cost(total_charges: i64) -> Vec<JournalEntryLine> {
    if total_charges <= 0 {
        return Vec::new();
    }
    vec![
        JournalEntryLine::debit(account(chart::INVENTORY), total_charges),
        JournalEntryLine::credit(account(chart::ACCRUED_LANDED_COSTS), total_charges),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn bill_approval_groups_expenses_and_credits_payables() {
        let lines = bill_approval([("5000", 1_000), ("6100", 500), ("5000", 250)], 140).unwrap();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].account.code, "5000");
        assert_eq!(lines[0].amount, 1_250);
        assert_eq!(lines[2].account.code, chart::INPUT_TAX);
        let ap = lines.last().unwrap();
        assert_eq!(ap.account.code, chart::ACCOUNTS_PAYABLE);
        assert!(!ap.is_debit);
        assert_eq!(ap.amount, 1_890);
        ensure_balanced(&lines).unwrap();
    }

    #[test]
    fn payment_splits_applied_and_advance() {
        let lines = vendor_payment(700, 300).unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2].amount, 1_000);
        ensure_balanced(&lines).unwrap();

        assert_eq!(vendor_payment(500, 0).unwrap().len(), 2);
    }

    #[test]
    fn revaluation_direction_follows_delta() {
        let up = revaluation(900, chart::INVENTORY, chart::INVENTORY_REVALUATION);
        assert!(up[0].is_debit && up[0].account.code == chart::INVENTORY);

        let down = revaluation(-900, chart::INVENTORY, chart::INVENTORY_REVALUATION);
        assert!(down[0].is_debit && down[0].account.code == chart::INVENTORY_REVALUATION);
        assert_eq!(down[1].amount, 900);

        assert!(revaluation(0, chart::INVENTORY, chart::INVENTORY_REVALUATION).is_empty());
    }

    proptest! {
        #[test]
        fn bill_postings_always_balance(
            expenses in prop::collection::vec((prop::sample::select(vec!["5000", "6100", "6200"]), 1i64..10_000_000), 1..12),
            tax in 0i64..1_000_000,
        ) {
            let lines = bill_approval(expenses.iter().map(|(c, a)| (*c, *a)), tax).unwrap();
            prop_assert!(ensure_balanced(&lines).is_ok());
        }
    }
}
