use core::fmt;
use core::str::FromStr;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use ironbooks_core::{DomainError, DomainResult};

/// Longest supported credit period.
pub const MAX_TERM_DAYS: u32 = 365;

/// Payment terms as a day offset from the bill date (`net30`, `due_on_receipt`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PaymentTerms {
    days: u32,
}

impl PaymentTerms {
    pub const DUE_ON_RECEIPT: PaymentTerms = PaymentTerms { days: 0 };

    pub fn net(days: u32) -> DomainResult<Self> {
        if days > MAX_TERM_DAYS {
            return Err(DomainError::validation(format!(
                "payment terms cannot exceed {MAX_TERM_DAYS} days"
            )));
        }
        Ok(Self { days })
    }

    pub fn days(&self) -> u32 {
        self.days
    }

    pub fn due_date(&self, bill_date: NaiveDate) -> DomainResult<NaiveDate> {
        bill_date
            .checked_add_days(Days::new(self.days as u64))
            .ok_or_else(|| DomainError::validation("due date out of range"))
    }
}

impl Default for PaymentTerms {
    fn default() -> Self {
        Self { days: 30 }
    }
}

impl FromStr for PaymentTerms {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        if normalized == "due_on_receipt" || normalized == "due on receipt" {
            return Ok(Self::DUE_ON_RECEIPT);
        }
        let digits = normalized
            .strip_prefix("net")
            .map(str::trim)
            .ok_or_else(|| DomainError::validation(format!("unrecognised payment terms '{s}'")))?;
        let days = digits
            .parse::<u32>()
            .map_err(|_| DomainError::validation(format!("unrecognised payment terms '{s}'")))?;
        Self::net(days)
    }
}

impl TryFrom<String> for PaymentTerms {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PaymentTerms> for String {
    fn from(value: PaymentTerms) -> Self {
        value.to_string()
    }
}

impl fmt::Display for PaymentTerms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.days == 0 {
            f.write_str("due_on_receipt")
        } else {
            write!(f, "net{}", self.days)
        }
    }
}
