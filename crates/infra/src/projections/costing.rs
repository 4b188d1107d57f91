//! Costing read models: standard costs, revaluations, variances, landed costs.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use ironbooks_core::{TenantId, UserId};
use ironbooks_costing::{
    AllocationMethod, CostHistoryEntry, CostVarianceEvent, CostVarianceId, LandedCharge,
    LandedCostEvent, LandedCostId, LandedCostLine, LandedCostStatus, LineAllocation,
    RevaluationEvent, RevaluationId, RevaluationStatus, StandardCostEvent, StandardCostId,
    VarianceAnalysis, VarianceDirection, VarianceInputs, VarianceSource, VarianceStatus,
};
use ironbooks_events::EventEnvelope;

use super::{Projection, ProjectionError, StreamCursors};
use crate::read_model::{InMemoryTenantStore, TenantStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StandardCostView {
    pub standard_cost_id: StandardCostId,
    pub sku: String,
    pub description: String,
    pub unit_cost: i64,
    pub effective_from: NaiveDate,
    pub history: Vec<CostHistoryEntry>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct StandardCostsProjection {
    store: InMemoryTenantStore<StandardCostId, StandardCostView>,
    cursors: StreamCursors,
}

impl StandardCostsProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant_id: TenantId, id: StandardCostId) -> Option<StandardCostView> {
        self.store.get(tenant_id, &id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<StandardCostView> {
        self.store.list(tenant_id)
    }

    pub fn find_by_sku(&self, tenant_id: TenantId, sku: &str) -> Option<StandardCostView> {
        self.store
            .list(tenant_id)
            .into_iter()
            .find(|c| c.sku == sku.trim())
    }
}

impl Projection for StandardCostsProjection {
    type Event = StandardCostEvent;

    const NAME: &'static str = "costing.standard_costs";
    const AGGREGATE_TYPE: &'static str = "costing.standard_cost";

    fn cursors(&self) -> &StreamCursors {
        &self.cursors
    }

    fn project(
        &self,
        envelope: &EventEnvelope<JsonValue>,
        event: StandardCostEvent,
    ) -> Result<(), ProjectionError> {
        let tenant_id = envelope.tenant_id();
        let id = StandardCostId::from(envelope.aggregate_id());

        match event {
            StandardCostEvent::Established(e) => self.store.upsert(
                tenant_id,
                id,
                StandardCostView {
                    standard_cost_id: id,
                    sku: e.sku,
                    description: e.description,
                    unit_cost: e.unit_cost,
                    effective_from: e.effective_from,
                    history: vec![CostHistoryEntry {
                        effective_from: e.effective_from,
                        unit_cost: e.unit_cost,
                        revaluation_id: None,
                    }],
                    updated_at: e.occurred_at,
                },
            ),
            StandardCostEvent::DescriptionUpdated(e) => {
                self.store.update(tenant_id, &id, &mut |c| {
                    c.description = e.description.clone();
                    c.updated_at = e.occurred_at;
                });
            }
            StandardCostEvent::Revalued(e) => {
                self.store.update(tenant_id, &id, &mut |c| {
                    c.unit_cost = e.unit_cost;
                    c.effective_from = e.effective_from;
                    c.history.push(CostHistoryEntry {
                        effective_from: e.effective_from,
                        unit_cost: e.unit_cost,
                        revaluation_id: Some(e.revaluation_id),
                    });
                    c.updated_at = e.occurred_at;
                });
            }
            StandardCostEvent::Reverted(e) => {
                self.store.update(tenant_id, &id, &mut |c| {
                    c.history.pop();
                    if let Some(last) = c.history.last() {
                        c.effective_from = last.effective_from;
                    }
                    c.unit_cost = e.unit_cost;
                    c.updated_at = e.occurred_at;
                });
            }
        }
        Ok(())
    }

    fn clear_rows(&self, tenant_id: TenantId) {
        self.store.clear_tenant(tenant_id);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevaluationView {
    pub revaluation_id: RevaluationId,
    pub standard_cost_id: StandardCostId,
    pub sku: String,
    pub current_unit_cost: i64,
    pub new_unit_cost: i64,
    pub on_hand_quantity: i64,
    pub effective_date: NaiveDate,
    pub reason: String,
    pub inventory_account: String,
    pub adjustment_account: String,
    pub status: RevaluationStatus,
    /// Set once posted.
    pub delta: Option<i64>,
    pub posted_by: Option<UserId>,
    pub cancel_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct RevaluationsProjection {
    store: InMemoryTenantStore<RevaluationId, RevaluationView>,
    cursors: StreamCursors,
}

impl RevaluationsProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant_id: TenantId, id: RevaluationId) -> Option<RevaluationView> {
        self.store.get(tenant_id, &id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<RevaluationView> {
        self.store.list(tenant_id)
    }
}

impl Projection for RevaluationsProjection {
    type Event = RevaluationEvent;

    const NAME: &'static str = "costing.revaluations";
    const AGGREGATE_TYPE: &'static str = "costing.revaluation";

    fn cursors(&self) -> &StreamCursors {
        &self.cursors
    }

    fn project(
        &self,
        envelope: &EventEnvelope<JsonValue>,
        event: RevaluationEvent,
    ) -> Result<(), ProjectionError> {
        let tenant_id = envelope.tenant_id();
        let id = RevaluationId::from(envelope.aggregate_id());

        match event {
            RevaluationEvent::Drafted(e) => self.store.upsert(
                tenant_id,
                id,
                RevaluationView {
                    revaluation_id: id,
                    standard_cost_id: e.standard_cost_id,
                    sku: e.sku,
                    current_unit_cost: e.current_unit_cost,
                    new_unit_cost: e.new_unit_cost,
                    on_hand_quantity: e.on_hand_quantity,
                    effective_date: e.effective_date,
                    reason: e.reason,
                    inventory_account: e.inventory_account,
                    adjustment_account: e.adjustment_account,
                    status: RevaluationStatus::Draft,
                    delta: None,
                    posted_by: None,
                    cancel_reason: None,
                    updated_at: e.occurred_at,
                },
            ),
            RevaluationEvent::Posted(e) => {
                self.store.update(tenant_id, &id, &mut |r| {
                    r.status = RevaluationStatus::Posted;
                    r.delta = Some(e.delta);
                    r.posted_by = Some(e.posted_by);
                    r.updated_at = e.occurred_at;
                });
            }
            RevaluationEvent::Cancelled(e) => {
                self.store.update(tenant_id, &id, &mut |r| {
                    r.status = RevaluationStatus::Cancelled;
                    r.cancel_reason = e.reason.clone();
                    r.updated_at = e.occurred_at;
                });
            }
        }
        Ok(())
    }

    fn clear_rows(&self, tenant_id: TenantId) {
        self.store.clear_tenant(tenant_id);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VarianceView {
    pub variance_id: CostVarianceId,
    pub sku: String,
    pub source: VarianceSource,
    pub inputs: VarianceInputs,
    #[serde(flatten)]
    pub analysis: VarianceAnalysis,
    pub status: VarianceStatus,
    pub acknowledgement: Option<String>,
    pub acknowledged_by: Option<UserId>,
    pub recorded_at: DateTime<Utc>,
}

/// List filter for variances; `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct VarianceFilter {
    pub direction: Option<VarianceDirection>,
    pub significant: Option<bool>,
    pub sku: Option<String>,
}

impl VarianceFilter {
    fn matches(&self, v: &VarianceView) -> bool {
        self.direction.is_none_or(|d| v.analysis.direction == d)
            && self.significant.is_none_or(|s| v.analysis.significant == s)
            && self.sku.as_deref().is_none_or(|sku| v.sku == sku)
    }
}

#[derive(Debug, Default)]
pub struct VariancesProjection {
    store: InMemoryTenantStore<CostVarianceId, VarianceView>,
    cursors: StreamCursors,
}

impl VariancesProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant_id: TenantId, id: CostVarianceId) -> Option<VarianceView> {
        self.store.get(tenant_id, &id)
    }

    pub fn list(&self, tenant_id: TenantId, filter: &VarianceFilter) -> Vec<VarianceView> {
        self.store
            .list(tenant_id)
            .into_iter()
            .filter(|v| filter.matches(v))
            .collect()
    }
}

impl Projection for VariancesProjection {
    type Event = CostVarianceEvent;

    const NAME: &'static str = "costing.variances";
    const AGGREGATE_TYPE: &'static str = "costing.variance";

    fn cursors(&self) -> &StreamCursors {
        &self.cursors
    }

    fn project(
        &self,
        envelope: &EventEnvelope<JsonValue>,
        event: CostVarianceEvent,
    ) -> Result<(), ProjectionError> {
        let tenant_id = envelope.tenant_id();
        let id = CostVarianceId::from(envelope.aggregate_id());

        match event {
            CostVarianceEvent::Recorded(e) => self.store.upsert(
                tenant_id,
                id,
                VarianceView {
                    variance_id: id,
                    sku: e.sku,
                    source: e.source,
                    inputs: e.inputs,
                    analysis: e.analysis,
                    status: VarianceStatus::Open,
                    acknowledgement: None,
                    acknowledged_by: None,
                    recorded_at: e.occurred_at,
                },
            ),
            CostVarianceEvent::Acknowledged(e) => {
                self.store.update(tenant_id, &id, &mut |v| {
                    v.status = VarianceStatus::Acknowledged;
                    v.acknowledgement = Some(e.note.clone());
                    v.acknowledged_by = Some(e.acknowledged_by);
                });
            }
        }
        Ok(())
    }

    fn clear_rows(&self, tenant_id: TenantId) {
        self.store.clear_tenant(tenant_id);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LandedCostView {
    pub landed_cost_id: LandedCostId,
    pub reference: String,
    pub method: AllocationMethod,
    pub lines: Vec<LandedCostLine>,
    pub charges: Vec<LandedCharge>,
    pub total_charges: i64,
    pub allocations: Vec<LineAllocation>,
    pub status: LandedCostStatus,
    pub posted_by: Option<UserId>,
    pub cancel_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct LandedCostsProjection {
    store: InMemoryTenantStore<LandedCostId, LandedCostView>,
    cursors: StreamCursors,
}

impl LandedCostsProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant_id: TenantId, id: LandedCostId) -> Option<LandedCostView> {
        self.store.get(tenant_id, &id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<LandedCostView> {
        self.store.list(tenant_id)
    }
}

impl Projection for LandedCostsProjection {
    type Event = LandedCostEvent;

    const NAME: &'static str = "costing.landed_costs";
    const AGGREGATE_TYPE: &'static str = "costing.landed_cost";

    fn cursors(&self) -> &StreamCursors {
        &self.cursors
    }

    fn project(
        &self,
        envelope: &EventEnvelope<JsonValue>,
        event: LandedCostEvent,
    ) -> Result<(), ProjectionError> {
        let tenant_id = envelope.tenant_id();
        let id = LandedCostId::from(envelope.aggregate_id());

        match event {
            LandedCostEvent::Created(e) => {
                let total_charges = e.charges.iter().map(|c| c.amount).sum();
                self.store.upsert(
                    tenant_id,
                    id,
                    LandedCostView {
                        landed_cost_id: id,
                        reference: e.reference,
                        method: e.method,
                        lines: e.lines,
                        charges: e.charges,
                        total_charges,
                        allocations: Vec::new(),
                        status: LandedCostStatus::Draft,
                        posted_by: None,
                        cancel_reason: None,
                        updated_at: e.occurred_at,
                    },
                );
            }
            LandedCostEvent::ChargeAdded(e) => {
                self.store.update(tenant_id, &id, &mut |l| {
                    l.total_charges += e.charge.amount;
                    l.charges.push(e.charge.clone());
                    l.updated_at = e.occurred_at;
                });
            }
            LandedCostEvent::Allocated(e) => {
                self.store.update(tenant_id, &id, &mut |l| {
                    l.total_charges = e.total_charges;
                    l.allocations = e.allocations.clone();
                    l.status = LandedCostStatus::Allocated;
                    l.updated_at = e.occurred_at;
                });
            }
            LandedCostEvent::Posted(e) => {
                self.store.update(tenant_id, &id, &mut |l| {
                    l.status = LandedCostStatus::Posted;
                    l.posted_by = Some(e.posted_by);
                    l.updated_at = e.occurred_at;
                });
            }
            LandedCostEvent::Cancelled(e) => {
                self.store.update(tenant_id, &id, &mut |l| {
                    l.status = LandedCostStatus::Cancelled;
                    l.cancel_reason = e.reason.clone();
                    l.updated_at = e.occurred_at;
                });
            }
        }
        Ok(())
    }

    fn clear_rows(&self, tenant_id: TenantId) {
        self.store.clear_tenant(tenant_id);
    }
}
