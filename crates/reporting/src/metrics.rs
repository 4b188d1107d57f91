//! Dashboard metrics.
//!
//! Values are plain sums and counts over one tenant's read models. Whatever
//! holds those read models implements [`MetricSource`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    ApOutstanding,
    ApOverdue,
    BillsAwaitingApproval,
    OpenNcrs,
    OpenCapas,
    OverdueCapas,
    UnfavorableVarianceTotal,
    LandedCostsPending,
    RevaluationNet,
    ActiveDiscounts,
}

impl Metric {
    pub const ALL: [Metric; 10] = [
        Metric::ApOutstanding,
        Metric::ApOverdue,
        Metric::BillsAwaitingApproval,
        Metric::OpenNcrs,
        Metric::OpenCapas,
        Metric::OverdueCapas,
        Metric::UnfavorableVarianceTotal,
        Metric::LandedCostsPending,
        Metric::RevaluationNet,
        Metric::ActiveDiscounts,
    ];

    pub fn unit(self) -> MetricUnit {
        match self {
            Metric::ApOutstanding
            | Metric::ApOverdue
            | Metric::UnfavorableVarianceTotal
            | Metric::RevaluationNet => MetricUnit::Money,
            Metric::BillsAwaitingApproval
            | Metric::OpenNcrs
            | Metric::OpenCapas
            | Metric::OverdueCapas
            | Metric::LandedCostsPending
            | Metric::ActiveDiscounts => MetricUnit::Count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricUnit {
    /// Minor currency units.
    Money,
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricValue {
    pub metric: Metric,
    pub unit: MetricUnit,
    pub value: i64,
}

/// Read access to the figures dashboards aggregate.
pub trait MetricSource {
    /// Outstanding amounts of approved, unpaid bills.
    fn payable_balances(&self) -> Vec<(NaiveDate, i64)>;

    fn draft_bill_count(&self) -> usize;

    fn open_ncr_count(&self) -> usize;

    /// Due dates of CAPAs that are not closed or cancelled.
    fn active_capa_due_dates(&self) -> Vec<NaiveDate>;

    /// Total variances of recorded cost variances.
    fn variance_totals(&self) -> Vec<i64>;

    fn unposted_landed_cost_count(&self) -> usize;

    /// Deltas of posted revaluations, with their effective dates.
    fn posted_revaluation_deltas(&self) -> Vec<(NaiveDate, i64)>;

    fn discount_count_active_on(&self, on: NaiveDate) -> usize;
}

pub fn evaluate<S: MetricSource + ?Sized>(
    metric: Metric,
    source: &S,
    as_of: NaiveDate,
) -> MetricValue {
    let value = match metric {
        Metric::ApOutstanding => {
            saturating_sum(source.payable_balances().into_iter().map(|(_, v)| v))
        }
        Metric::ApOverdue => saturating_sum(
            source
                .payable_balances()
                .into_iter()
                .filter(|(due, _)| *due < as_of)
                .map(|(_, v)| v),
        ),
        Metric::BillsAwaitingApproval => count(source.draft_bill_count()),
        Metric::OpenNcrs => count(source.open_ncr_count()),
        Metric::OpenCapas => count(source.active_capa_due_dates().len()),
        Metric::OverdueCapas => count(
            source
                .active_capa_due_dates()
                .into_iter()
                .filter(|due| *due < as_of)
                .count(),
        ),
        Metric::UnfavorableVarianceTotal => {
            saturating_sum(source.variance_totals().into_iter().filter(|v| *v > 0))
        }
        Metric::LandedCostsPending => count(source.unposted_landed_cost_count()),
        Metric::RevaluationNet => saturating_sum(
            source
                .posted_revaluation_deltas()
                .into_iter()
                .filter(|(effective, _)| *effective <= as_of)
                .map(|(_, delta)| delta),
        ),
        Metric::ActiveDiscounts => count(source.discount_count_active_on(as_of)),
    };

    MetricValue {
        metric,
        unit: metric.unit(),
        value,
    }
}

fn saturating_sum(values: impl Iterator<Item = i64>) -> i64 {
    values.fold(0i64, i64::saturating_add)
}

fn count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
