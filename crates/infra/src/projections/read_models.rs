//! All read models of the application behind one routing entry point.

use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use tracing::warn;

use ironbooks_core::TenantId;
use ironbooks_costing::{LandedCostStatus, RevaluationStatus};
use ironbooks_events::EventEnvelope;
use ironbooks_payables::BillStatus;
use ironbooks_reporting::MetricSource;

use super::costing::{
    LandedCostsProjection, RevaluationsProjection, StandardCostsProjection, VarianceFilter,
    VariancesProjection,
};
use super::ledger::LedgerProjection;
use super::organizations::OrganizationDirectory;
use super::payables::{BillsProjection, PaymentsProjection, VendorsProjection};
use super::planning::{DiscountsProjection, ForecastsProjection};
use super::quality::{CapasProjection, NcrsProjection};
use super::reporting::DashboardsProjection;
use super::{Projection, ProjectionError};

#[derive(Debug, Default)]
pub struct ReadModels {
    pub organizations: OrganizationDirectory,
    pub vendors: VendorsProjection,
    pub bills: BillsProjection,
    pub payments: PaymentsProjection,
    pub ledger: LedgerProjection,
    pub standard_costs: StandardCostsProjection,
    pub revaluations: RevaluationsProjection,
    pub variances: VariancesProjection,
    pub landed_costs: LandedCostsProjection,
    pub ncrs: NcrsProjection,
    pub capas: CapasProjection,
    pub dashboards: DashboardsProjection,
    pub discounts: DiscountsProjection,
    pub forecasts: ForecastsProjection,
}

impl ReadModels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route one envelope to the projection owning its aggregate type.
    ///
    /// Unknown aggregate types are ignored.
    pub fn try_apply(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        match envelope.aggregate_type() {
            OrganizationDirectory::AGGREGATE_TYPE => self.organizations.apply_envelope(envelope),
            VendorsProjection::AGGREGATE_TYPE => self.vendors.apply_envelope(envelope),
            BillsProjection::AGGREGATE_TYPE => self.bills.apply_envelope(envelope),
            PaymentsProjection::AGGREGATE_TYPE => self.payments.apply_envelope(envelope),
            LedgerProjection::AGGREGATE_TYPE => self.ledger.apply_envelope(envelope),
            StandardCostsProjection::AGGREGATE_TYPE => self.standard_costs.apply_envelope(envelope),
            RevaluationsProjection::AGGREGATE_TYPE => self.revaluations.apply_envelope(envelope),
            VariancesProjection::AGGREGATE_TYPE => self.variances.apply_envelope(envelope),
            LandedCostsProjection::AGGREGATE_TYPE => self.landed_costs.apply_envelope(envelope),
            NcrsProjection::AGGREGATE_TYPE => self.ncrs.apply_envelope(envelope),
            CapasProjection::AGGREGATE_TYPE => self.capas.apply_envelope(envelope),
            DashboardsProjection::AGGREGATE_TYPE => self.dashboards.apply_envelope(envelope),
            DiscountsProjection::AGGREGATE_TYPE => self.discounts.apply_envelope(envelope),
            ForecastsProjection::AGGREGATE_TYPE => self.forecasts.apply_envelope(envelope),
            _ => Ok(()),
        }
    }

    /// Like [`try_apply`](Self::try_apply) but logs failures instead of returning them.
    /// Returns `true` when the envelope was applied cleanly.
    pub fn apply(&self, envelope: &EventEnvelope<JsonValue>) -> bool {
        match self.try_apply(envelope) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    tenant_id = %envelope.tenant_id(),
                    aggregate_id = %envelope.aggregate_id(),
                    aggregate_type = envelope.aggregate_type(),
                    sequence_number = envelope.sequence_number(),
                    error = %err,
                    "projection failed to apply event"
                );
                false
            }
        }
    }

    /// Rebuild every read model from a full event log.
    pub fn rebuild_all(&self, envelopes: &[EventEnvelope<JsonValue>]) -> Result<(), ProjectionError> {
        let all = || envelopes.iter().cloned();
        self.organizations.rebuild_from_scratch(all())?;
        self.vendors.rebuild_from_scratch(all())?;
        self.bills.rebuild_from_scratch(all())?;
        self.payments.rebuild_from_scratch(all())?;
        self.ledger.rebuild_from_scratch(all())?;
        self.standard_costs.rebuild_from_scratch(all())?;
        self.revaluations.rebuild_from_scratch(all())?;
        self.variances.rebuild_from_scratch(all())?;
        self.landed_costs.rebuild_from_scratch(all())?;
        self.ncrs.rebuild_from_scratch(all())?;
        self.capas.rebuild_from_scratch(all())?;
        self.dashboards.rebuild_from_scratch(all())?;
        self.discounts.rebuild_from_scratch(all())?;
        self.forecasts.rebuild_from_scratch(all())?;
        Ok(())
    }

    pub fn metrics(&self, tenant_id: TenantId) -> TenantMetrics<'_> {
        TenantMetrics {
            models: self,
            tenant_id,
        }
    }
}

/// One tenant's slice of the read models, as seen by dashboard metrics.
#[derive(Debug, Clone, Copy)]
pub struct TenantMetrics<'a> {
    models: &'a ReadModels,
    tenant_id: TenantId,
}

impl MetricSource for TenantMetrics<'_> {
    fn payable_balances(&self) -> Vec<(NaiveDate, i64)> {
        self.models
            .bills
            .list(self.tenant_id)
            .into_iter()
            .filter(|b| b.status.is_payable())
            .map(|b| (b.due_date, b.outstanding))
            .collect()
    }

    fn draft_bill_count(&self) -> usize {
        self.models
            .bills
            .list(self.tenant_id)
            .iter()
            .filter(|b| b.status == BillStatus::Draft)
            .count()
    }

    fn open_ncr_count(&self) -> usize {
        self.models
            .ncrs
            .list(self.tenant_id)
            .iter()
            .filter(|n| !n.status.is_terminal())
            .count()
    }

    fn active_capa_due_dates(&self) -> Vec<NaiveDate> {
        self.models
            .capas
            .list(self.tenant_id)
            .into_iter()
            .filter(|c| !c.status.is_terminal())
            .map(|c| c.due_date)
            .collect()
    }

    fn variance_totals(&self) -> Vec<i64> {
        self.models
            .variances
            .list(self.tenant_id, &VarianceFilter::default())
            .into_iter()
            .map(|v| v.analysis.total_variance)
            .collect()
    }

    fn unposted_landed_cost_count(&self) -> usize {
        self.models
            .landed_costs
            .list(self.tenant_id)
            .iter()
            .filter(|l| matches!(l.status, LandedCostStatus::Draft | LandedCostStatus::Allocated))
            .count()
    }

    fn posted_revaluation_deltas(&self) -> Vec<(NaiveDate, i64)> {
        self.models
            .revaluations
            .list(self.tenant_id)
            .into_iter()
            .filter(|r| r.status == RevaluationStatus::Posted)
            .filter_map(|r| r.delta.map(|d| (r.effective_date, d)))
            .collect()
    }

    fn discount_count_active_on(&self, on: NaiveDate) -> usize {
        self.models
            .discounts
            .list(self.tenant_id)
            .iter()
            .filter(|d| d.is_active_on(on))
            .count()
    }
}
