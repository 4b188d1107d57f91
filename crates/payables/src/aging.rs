//! Accounts-payable aging by days past due.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgingBucket {
    Current,
    Days1To30,
    Days31To60,
    Days61To90,
    Over90,
}

impl AgingBucket {
    pub fn for_days_past_due(days: i64) -> Self {
        match days {
            i64::MIN..=0 => AgingBucket::Current,
            1..=30 => AgingBucket::Days1To30,
            31..=60 => AgingBucket::Days31To60,
            61..=90 => AgingBucket::Days61To90,
            _ => AgingBucket::Over90,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgingReport {
    pub as_of: Option<NaiveDate>,
    pub current: i64,
    pub days_1_30: i64,
    pub days_31_60: i64,
    pub days_61_90: i64,
    pub over_90: i64,
    pub total: i64,
    pub bill_count: usize,
}

impl AgingReport {
    fn add(&mut self, bucket: AgingBucket, amount: i64) {
        let slot = match bucket {
            AgingBucket::Current => &mut self.current,
            AgingBucket::Days1To30 => &mut self.days_1_30,
            AgingBucket::Days31To60 => &mut self.days_31_60,
            AgingBucket::Days61To90 => &mut self.days_61_90,
            AgingBucket::Over90 => &mut self.over_90,
        };
        *slot += amount;
        self.total += amount;
        self.bill_count += 1;
    }
}

/// Bucket `(due_date, outstanding)` pairs. Zero balances are skipped.
pub fn age_outstanding<I>(bills: I, as_of: NaiveDate) -> AgingReport
where
    I: IntoIterator<Item = (NaiveDate, i64)>,
{
    let mut report = AgingReport {
        as_of: Some(as_of),
        ..AgingReport::default()
    };
    for (due_date, outstanding) in bills {
        if outstanding <= 0 {
            continue;
        }
        let days = (as_of - due_date).num_days();
        report.add(AgingBucket::for_days_past_due(days), outstanding);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, day).unwrap()
    }

    #[test]
    fn buckets_by_days_past_due() {
        let as_of = d(6, 30);
        let report = age_outstanding(
            [
                (d(7, 15), 100), // not yet due
                (d(6, 30), 50),  // due today
                (d(6, 1), 200),  // 29 days
                (d(5, 1), 300),  // 60 days
                (d(4, 1), 400),  // 90 days
                (d(1, 1), 500),  // way over
                (d(1, 1), 0),    // settled
            ],
            as_of,
        );

        assert_eq!(report.current, 150);
        assert_eq!(report.days_1_30, 200);
        assert_eq!(report.days_31_60, 300);
        assert_eq!(report.days_61_90, 400);
        assert_eq!(report.over_90, 500);
        assert_eq!(report.total, 1_550);
        assert_eq!(report.bill_count, 6);
    }
}
