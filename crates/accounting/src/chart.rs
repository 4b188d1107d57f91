//! Default chart of accounts.

use serde::{Deserialize, Serialize};

/// Determines which side increases the account's balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountKind {
    /// Assets and expenses carry debit balances.
    pub fn is_debit_normal(self) -> bool {
        matches!(self, AccountKind::Asset | AccountKind::Expense)
    }

    /// Classification by leading digit of the account code.
    pub fn from_code(code: &str) -> Self {
        match code.as_bytes().first() {
            Some(b'1') => AccountKind::Asset,
            Some(b'2') => AccountKind::Liability,
            Some(b'3') => AccountKind::Equity,
            Some(b'4') => AccountKind::Revenue,
            _ => AccountKind::Expense,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    pub code: String,
    pub name: String,
    pub kind: AccountKind,
}

impl Account {
    fn fixed(code: &str, name: &str, kind: AccountKind) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            kind,
        }
    }
}

pub const CASH: &str = "1000";
pub const INVENTORY: &str = "1200";
pub const VENDOR_ADVANCES: &str = "1300";
pub const INPUT_TAX: &str = "1400";
pub const ACCOUNTS_PAYABLE: &str = "2000";
pub const ACCRUED_LANDED_COSTS: &str = "2100";
pub const GENERAL_EXPENSE: &str = "5000";
pub const INVENTORY_REVALUATION: &str = "5200";

const DEFAULTS: &[(&str, &str, AccountKind)] = &[
    (CASH, "Cash", AccountKind::Asset),
    (INVENTORY, "Inventory", AccountKind::Asset),
    (VENDOR_ADVANCES, "Vendor Advances", AccountKind::Asset),
    (INPUT_TAX, "Input Tax Receivable", AccountKind::Asset),
    (ACCOUNTS_PAYABLE, "Accounts Payable", AccountKind::Liability),
    (ACCRUED_LANDED_COSTS, "Accrued Landed Costs", AccountKind::Liability),
    (GENERAL_EXPENSE, "General Expense", AccountKind::Expense),
    (INVENTORY_REVALUATION, "Inventory Revaluation", AccountKind::Expense),
];

/// Resolve an account code. Codes outside the default chart are accepted and
/// classified by their leading digit.
pub fn account(code: &str) -> Account {
    DEFAULTS
        .iter()
        .find(|(c, _, _)| *c == code)
        .map(|(c, name, kind)| Account::fixed(c, name, *kind))
        .unwrap_or_else(|| Account {
            code: code.to_string(),
            name: format!("Account {code}"),
            kind: AccountKind::from_code(code),
        })
}

/// Codes are 4–6 ASCII digits.
pub fn is_valid_code(code: &str) -> bool {
    (4..=6).contains(&code.len()) && code.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_codes_resolve() {
        assert_eq!(account(ACCOUNTS_PAYABLE).kind, AccountKind::Liability);
        assert_eq!(account(ACCOUNTS_PAYABLE).name, "Accounts Payable");

        let custom = account("6150");
        assert_eq!(custom.kind, AccountKind::Expense);
        assert_eq!(custom.name, "Account 6150");

        assert!(is_valid_code("5000"));
        assert!(!is_valid_code("50"));
        assert!(!is_valid_code("50a0"));
    }
}
