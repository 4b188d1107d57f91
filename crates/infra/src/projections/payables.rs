//! Vendor, bill and payment read models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use ironbooks_core::money::Currency;
use ironbooks_core::{TenantId, UserId};
use ironbooks_events::EventEnvelope;
use ironbooks_payables::{
    AgingReport, Allocation, AllocationStatus, BillEvent, BillId, BillItem, BillStatus, Contact,
    PaymentEvent, PaymentId, PaymentMethod, PaymentTerms, TaxLine, VendorEvent, VendorId,
    VendorStatus, age_outstanding,
};

use super::{Projection, ProjectionError, StreamCursors};
use crate::read_model::{InMemoryTenantStore, TenantStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VendorView {
    pub vendor_id: VendorId,
    pub code: String,
    pub name: String,
    pub contact: Contact,
    pub default_terms: PaymentTerms,
    pub currency: Currency,
    pub status: VendorStatus,
    pub deactivation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct VendorsProjection {
    store: InMemoryTenantStore<VendorId, VendorView>,
    cursors: StreamCursors,
}

impl VendorsProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant_id: TenantId, id: VendorId) -> Option<VendorView> {
        self.store.get(tenant_id, &id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<VendorView> {
        self.store.list(tenant_id)
    }

    pub fn find_by_code(&self, tenant_id: TenantId, code: &str) -> Option<VendorView> {
        self.store
            .list(tenant_id)
            .into_iter()
            .find(|v| v.code.eq_ignore_ascii_case(code.trim()))
    }
}

impl Projection for VendorsProjection {
    type Event = VendorEvent;

    const NAME: &'static str = "payables.vendors";
    const AGGREGATE_TYPE: &'static str = "payables.vendor";

    fn cursors(&self) -> &StreamCursors {
        &self.cursors
    }

    fn project(
        &self,
        envelope: &EventEnvelope<JsonValue>,
        event: VendorEvent,
    ) -> Result<(), ProjectionError> {
        let tenant_id = envelope.tenant_id();
        let id = VendorId::from(envelope.aggregate_id());

        match event {
            VendorEvent::Registered(e) => self.store.upsert(
                tenant_id,
                id,
                VendorView {
                    vendor_id: id,
                    code: e.code,
                    name: e.name,
                    contact: e.contact,
                    default_terms: e.default_terms,
                    currency: e.currency,
                    status: VendorStatus::Active,
                    deactivation_reason: None,
                    created_at: e.occurred_at,
                    updated_at: e.occurred_at,
                },
            ),
            VendorEvent::Updated(e) => {
                self.store.update(tenant_id, &id, &mut |v| {
                    v.name = e.name.clone();
                    v.contact = e.contact.clone();
                    v.default_terms = e.default_terms;
                    v.updated_at = e.occurred_at;
                });
            }
            VendorEvent::Deactivated(e) => {
                self.store.update(tenant_id, &id, &mut |v| {
                    v.status = VendorStatus::Inactive;
                    v.deactivation_reason = e.reason.clone();
                    v.updated_at = e.occurred_at;
                });
            }
            VendorEvent::Reactivated(e) => {
                self.store.update(tenant_id, &id, &mut |v| {
                    v.status = VendorStatus::Active;
                    v.deactivation_reason = None;
                    v.updated_at = e.occurred_at;
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
pub struct BillPaymentView {
    pub payment_id: PaymentId,
    pub amount: i64,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillView {
    pub bill_id: BillId,
    pub vendor_id: VendorId,
    pub bill_number: String,
    pub bill_date: NaiveDate,
    pub due_date: NaiveDate,
    pub terms: PaymentTerms,
    pub currency: Currency,
    pub items: Vec<BillItem>,
    pub tax_lines: Vec<TaxLine>,
    pub subtotal: i64,
    pub tax_total: i64,
    pub total: i64,
    pub paid: i64,
    pub outstanding: i64,
    pub status: BillStatus,
    pub memo: Option<String>,
    pub approved_by: Option<UserId>,
    pub void_reason: Option<String>,
    pub payments: Vec<BillPaymentView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BillView {
    pub fn is_overdue(&self, as_of: NaiveDate) -> bool {
        self.status.is_payable() && self.due_date < as_of
    }
}

#[derive(Debug, Default)]
pub struct BillsProjection {
    store: InMemoryTenantStore<BillId, BillView>,
    cursors: StreamCursors,
}

impl BillsProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant_id: TenantId, id: BillId) -> Option<BillView> {
        self.store.get(tenant_id, &id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<BillView> {
        self.store.list(tenant_id)
    }

    pub fn find_by_number(
        &self,
        tenant_id: TenantId,
        vendor_id: VendorId,
        bill_number: &str,
    ) -> Option<BillView> {
        self.store
            .list(tenant_id)
            .into_iter()
            .find(|b| b.vendor_id == vendor_id && b.bill_number == bill_number.trim())
    }

    pub fn aging(&self, tenant_id: TenantId, as_of: NaiveDate) -> AgingReport {
        age_outstanding(
            self.store
                .list(tenant_id)
                .into_iter()
                .filter(|b| b.status.is_payable())
                .map(|b| (b.due_date, b.outstanding)),
            as_of,
        )
    }
}

impl Projection for BillsProjection {
    type Event = BillEvent;

    const NAME: &'static str = "payables.bills";
    const AGGREGATE_TYPE: &'static str = "payables.bill";

    fn cursors(&self) -> &StreamCursors {
        &self.cursors
    }

    fn project(
        &self,
        envelope: &EventEnvelope<JsonValue>,
        event: BillEvent,
    ) -> Result<(), ProjectionError> {
        let tenant_id = envelope.tenant_id();
        let id = BillId::from(envelope.aggregate_id());

        match event {
            BillEvent::Created(e) => self.store.upsert(
                tenant_id,
                id,
                BillView {
                    bill_id: id,
                    vendor_id: e.vendor_id,
                    bill_number: e.bill_number,
                    bill_date: e.bill_date,
                    due_date: e.due_date,
                    terms: e.terms,
                    currency: e.currency,
                    items: e.items,
                    tax_lines: e.tax_lines,
                    subtotal: e.totals.subtotal,
                    tax_total: e.totals.tax_total,
                    total: e.totals.total,
                    paid: 0,
                    outstanding: e.totals.total,
                    status: BillStatus::Draft,
                    memo: e.memo,
                    approved_by: None,
                    void_reason: None,
                    payments: Vec::new(),
                    created_at: e.occurred_at,
                    updated_at: e.occurred_at,
                },
            ),
            BillEvent::Revised(e) => {
                self.store.update(tenant_id, &id, &mut |b| {
                    b.bill_date = e.bill_date;
                    b.due_date = e.due_date;
                    b.terms = e.terms;
                    b.items = e.items.clone();
                    b.tax_lines = e.tax_lines.clone();
                    b.subtotal = e.totals.subtotal;
                    b.tax_total = e.totals.tax_total;
                    b.total = e.totals.total;
                    b.outstanding = e.totals.total - b.paid;
                    b.memo = e.memo.clone();
                    b.updated_at = e.occurred_at;
                });
            }
            BillEvent::Approved(e) => {
                self.store.update(tenant_id, &id, &mut |b| {
                    b.status = BillStatus::Open;
                    b.approved_by = Some(e.approved_by);
                    b.updated_at = e.occurred_at;
                });
            }
            BillEvent::PaymentApplied(e) => {
                self.store.update(tenant_id, &id, &mut |b| {
                    b.paid = e.paid_total;
                    b.outstanding = e.outstanding;
                    b.status = if e.outstanding == 0 {
                        BillStatus::Paid
                    } else {
                        BillStatus::PartiallyPaid
                    };
                    b.payments.push(BillPaymentView {
                        payment_id: e.payment_id,
                        amount: e.amount,
                        applied_at: e.occurred_at,
                    });
                    b.updated_at = e.occurred_at;
                });
            }
            BillEvent::Voided(e) => {
                self.store.update(tenant_id, &id, &mut |b| {
                    b.status = BillStatus::Void;
                    b.outstanding = 0;
                    b.void_reason = e.reason.clone();
                    b.updated_at = e.occurred_at;
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
pub struct PaymentView {
    pub payment_id: PaymentId,
    pub vendor_id: VendorId,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub amount: i64,
    pub currency: Currency,
    pub allocations: Vec<Allocation>,
    pub applied: i64,
    pub unapplied: i64,
    pub recorded_by: UserId,
    pub recorded_at: DateTime<Utc>,
}

impl PaymentView {
    fn recompute(&mut self) {
        self.applied = self
            .allocations
            .iter()
            .filter(|a| a.status == AllocationStatus::Accepted)
            .map(|a| a.amount)
            .sum();
        self.unapplied = self.amount - self.applied;
    }
}

#[derive(Debug, Default)]
pub struct PaymentsProjection {
    store: InMemoryTenantStore<PaymentId, PaymentView>,
    cursors: StreamCursors,
}

impl PaymentsProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant_id: TenantId, id: PaymentId) -> Option<PaymentView> {
        self.store.get(tenant_id, &id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<PaymentView> {
        self.store.list(tenant_id)
    }
}

impl Projection for PaymentsProjection {
    type Event = PaymentEvent;

    const NAME: &'static str = "payables.payments";
    const AGGREGATE_TYPE: &'static str = "payables.payment";

    fn cursors(&self) -> &StreamCursors {
        &self.cursors
    }

    fn project(
        &self,
        envelope: &EventEnvelope<JsonValue>,
        event: PaymentEvent,
    ) -> Result<(), ProjectionError> {
        let tenant_id = envelope.tenant_id();
        let id = PaymentId::from(envelope.aggregate_id());

        match event {
            PaymentEvent::Recorded(e) => {
                let mut view = PaymentView {
                    payment_id: id,
                    vendor_id: e.vendor_id,
                    payment_date: e.payment_date,
                    method: e.method,
                    reference: e.reference,
                    amount: e.amount,
                    currency: e.currency,
                    allocations: e.allocations,
                    applied: 0,
                    unapplied: 0,
                    recorded_by: e.recorded_by,
                    recorded_at: e.occurred_at,
                };
                view.recompute();
                self.store.upsert(tenant_id, id, view);
            }
            PaymentEvent::AllocationRejected(e) => {
                self.store.update(tenant_id, &id, &mut |p| {
                    if let Some(a) = p.allocations.iter_mut().find(|a| a.bill_id == e.bill_id) {
                        a.status = AllocationStatus::Rejected;
                        a.rejection_reason = Some(e.reason.clone());
                    }
                    p.recompute();
                });
            }
        }
        Ok(())
    }

    fn clear_rows(&self, tenant_id: TenantId) {
        self.store.clear_tenant(tenant_id);
    }
}
