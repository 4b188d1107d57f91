//! Discount and forecast read models.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use ironbooks_core::TenantId;
use ironbooks_events::EventEnvelope;
use ironbooks_planning::{
    DiscountEvent, DiscountId, DiscountKind, DiscountStatus, ForecastEvent, ForecastId,
    ForecastMethod, ForecastPoint, YearMonth,
};

use super::{Projection, ProjectionError, StreamCursors};
use crate::read_model::{InMemoryTenantStore, TenantStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscountView {
    pub discount_id: DiscountId,
    pub code: String,
    pub description: String,
    pub kind: DiscountKind,
    pub valid_from: NaiveDate,
    pub valid_until: Option<NaiveDate>,
    pub min_purchase: i64,
    pub status: DiscountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DiscountView {
    pub fn is_active_on(&self, on: NaiveDate) -> bool {
        self.status == DiscountStatus::Active
            && self.valid_from <= on
            && self.valid_until.is_none_or(|until| on <= until)
    }
}

#[derive(Debug, Default)]
pub struct DiscountsProjection {
    store: InMemoryTenantStore<DiscountId, DiscountView>,
    cursors: StreamCursors,
}

impl DiscountsProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant_id: TenantId, id: DiscountId) -> Option<DiscountView> {
        self.store.get(tenant_id, &id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<DiscountView> {
        self.store.list(tenant_id)
    }

    /// Codes are stored upper-cased.
    pub fn find_by_code(&self, tenant_id: TenantId, code: &str) -> Option<DiscountView> {
        let code = code.trim().to_ascii_uppercase();
        self.store.list(tenant_id).into_iter().find(|d| d.code == code)
    }
}

impl Projection for DiscountsProjection {
    type Event = DiscountEvent;

    const NAME: &'static str = "planning.discounts";
    const AGGREGATE_TYPE: &'static str = "planning.discount";

    fn cursors(&self) -> &StreamCursors {
        &self.cursors
    }

    fn project(
        &self,
        envelope: &EventEnvelope<JsonValue>,
        event: DiscountEvent,
    ) -> Result<(), ProjectionError> {
        let tenant_id = envelope.tenant_id();
        let id = DiscountId::from(envelope.aggregate_id());

        match event {
            DiscountEvent::Created(e) => self.store.upsert(
                tenant_id,
                id,
                DiscountView {
                    discount_id: id,
                    code: e.code,
                    description: e.description,
                    kind: e.kind,
                    valid_from: e.valid_from,
                    valid_until: e.valid_until,
                    min_purchase: e.min_purchase,
                    status: DiscountStatus::Active,
                    created_at: e.occurred_at,
                    updated_at: e.occurred_at,
                },
            ),
            DiscountEvent::Deactivated(e) => {
                self.store.update(tenant_id, &id, &mut |d| {
                    d.status = DiscountStatus::Inactive;
                    d.updated_at = e.occurred_at;
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
pub struct ForecastView {
    pub forecast_id: ForecastId,
    pub sku: String,
    pub method: ForecastMethod,
    pub horizon: u32,
    pub actuals: BTreeMap<YearMonth, i64>,
    pub projections: Vec<ForecastPoint>,
    pub generated_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ForecastsProjection {
    store: InMemoryTenantStore<ForecastId, ForecastView>,
    cursors: StreamCursors,
}

impl ForecastsProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant_id: TenantId, id: ForecastId) -> Option<ForecastView> {
        self.store.get(tenant_id, &id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<ForecastView> {
        self.store.list(tenant_id)
    }
}

impl Projection for ForecastsProjection {
    type Event = ForecastEvent;

    const NAME: &'static str = "planning.forecasts";
    const AGGREGATE_TYPE: &'static str = "planning.forecast";

    fn cursors(&self) -> &StreamCursors {
        &self.cursors
    }

    fn project(
        &self,
        envelope: &EventEnvelope<JsonValue>,
        event: ForecastEvent,
    ) -> Result<(), ProjectionError> {
        let tenant_id = envelope.tenant_id();
        let id = ForecastId::from(envelope.aggregate_id());

        match event {
            ForecastEvent::Created(e) => self.store.upsert(
                tenant_id,
                id,
                ForecastView {
                    forecast_id: id,
                    sku: e.sku,
                    method: e.method,
                    horizon: e.horizon,
                    actuals: BTreeMap::new(),
                    projections: Vec::new(),
                    generated_at: None,
                    updated_at: e.occurred_at,
                },
            ),
            ForecastEvent::ActualRecorded(e) => {
                self.store.update(tenant_id, &id, &mut |f| {
                    f.actuals.insert(e.period, e.quantity);
                    f.updated_at = e.occurred_at;
                });
            }
            ForecastEvent::Generated(e) => {
                self.store.update(tenant_id, &id, &mut |f| {
                    f.projections = e.projections.clone();
                    f.generated_at = Some(e.occurred_at);
                    f.updated_at = e.occurred_at;
                });
            }
        }
        Ok(())
    }

    fn clear_rows(&self, tenant_id: TenantId) {
        self.store.clear_tenant(tenant_id);
    }
}
