//! NCR and CAPA read models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use ironbooks_core::{AggregateId, TenantId, UserId};
use ironbooks_events::EventEnvelope;
use ironbooks_quality::{
    CapaAction, CapaEvent, CapaId, CapaKind, CapaStatus, Disposition, NcrEvent, NcrId, NcrSource,
    NcrStatus, Severity, Verification,
};

use super::{Projection, ProjectionError, StreamCursors};
use crate::read_model::{InMemoryTenantStore, TenantStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NcrView {
    pub ncr_id: NcrId,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub source: NcrSource,
    pub sku: Option<String>,
    pub vendor_id: Option<AggregateId>,
    pub quantity_affected: i64,
    pub raised_by: UserId,
    pub assignee: Option<UserId>,
    pub disposition: Option<Disposition>,
    pub disposition_notes: Option<String>,
    pub linked_capas: Vec<CapaId>,
    pub status: NcrStatus,
    pub cancel_reason: Option<String>,
    pub raised_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct NcrsProjection {
    store: InMemoryTenantStore<NcrId, NcrView>,
    cursors: StreamCursors,
}

impl NcrsProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant_id: TenantId, id: NcrId) -> Option<NcrView> {
        self.store.get(tenant_id, &id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<NcrView> {
        self.store.list(tenant_id)
    }
}

impl Projection for NcrsProjection {
    type Event = NcrEvent;

    const NAME: &'static str = "quality.ncrs";
    const AGGREGATE_TYPE: &'static str = "quality.ncr";

    fn cursors(&self) -> &StreamCursors {
        &self.cursors
    }

    fn project(
        &self,
        envelope: &EventEnvelope<JsonValue>,
        event: NcrEvent,
    ) -> Result<(), ProjectionError> {
        let tenant_id = envelope.tenant_id();
        let id = NcrId::from(envelope.aggregate_id());

        match event {
            NcrEvent::Raised(e) => self.store.upsert(
                tenant_id,
                id,
                NcrView {
                    ncr_id: id,
                    title: e.title,
                    description: e.description,
                    severity: e.severity,
                    source: e.source,
                    sku: e.sku,
                    vendor_id: e.vendor_id,
                    quantity_affected: e.quantity_affected,
                    raised_by: e.raised_by,
                    assignee: None,
                    disposition: None,
                    disposition_notes: None,
                    linked_capas: Vec::new(),
                    status: NcrStatus::Open,
                    cancel_reason: None,
                    raised_at: e.occurred_at,
                    updated_at: e.occurred_at,
                },
            ),
            NcrEvent::InvestigationStarted(e) => {
                self.store.update(tenant_id, &id, &mut |n| {
                    n.status = NcrStatus::UnderInvestigation;
                    n.assignee = Some(e.assignee);
                    n.updated_at = e.occurred_at;
                });
            }
            NcrEvent::DispositionRecorded(e) => {
                self.store.update(tenant_id, &id, &mut |n| {
                    n.status = NcrStatus::Dispositioned;
                    n.disposition = Some(e.disposition);
                    n.disposition_notes = e.notes.clone();
                    n.updated_at = e.occurred_at;
                });
            }
            NcrEvent::Closed(e) => {
                self.store.update(tenant_id, &id, &mut |n| {
                    n.status = NcrStatus::Closed;
                    n.updated_at = e.occurred_at;
                });
            }
            NcrEvent::Cancelled(e) => {
                self.store.update(tenant_id, &id, &mut |n| {
                    n.status = NcrStatus::Cancelled;
                    n.cancel_reason = Some(e.reason.clone());
                    n.updated_at = e.occurred_at;
                });
            }
            NcrEvent::CapaLinked(e) => {
                self.store.update(tenant_id, &id, &mut |n| {
                    if !n.linked_capas.contains(&e.capa_id) {
                        n.linked_capas.push(e.capa_id);
                    }
                    n.updated_at = e.occurred_at;
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
pub struct CapaView {
    pub capa_id: CapaId,
    pub title: String,
    pub kind: CapaKind,
    pub description: String,
    pub ncr_id: Option<NcrId>,
    pub owner: UserId,
    pub due_date: NaiveDate,
    pub root_cause: Option<String>,
    pub actions: Vec<CapaAction>,
    pub verifications: Vec<Verification>,
    pub status: CapaStatus,
    pub cancel_reason: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CapaView {
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.status.is_terminal() && self.due_date < today
    }
}

#[derive(Debug, Default)]
pub struct CapasProjection {
    store: InMemoryTenantStore<CapaId, CapaView>,
    cursors: StreamCursors,
}

impl CapasProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant_id: TenantId, id: CapaId) -> Option<CapaView> {
        self.store.get(tenant_id, &id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<CapaView> {
        self.store.list(tenant_id)
    }
}

impl Projection for CapasProjection {
    type Event = CapaEvent;

    const NAME: &'static str = "quality.capas";
    const AGGREGATE_TYPE: &'static str = "quality.capa";

    fn cursors(&self) -> &StreamCursors {
        &self.cursors
    }

    fn project(
        &self,
        envelope: &EventEnvelope<JsonValue>,
        event: CapaEvent,
    ) -> Result<(), ProjectionError> {
        let tenant_id = envelope.tenant_id();
        let id = CapaId::from(envelope.aggregate_id());

        match event {
            CapaEvent::Opened(e) => self.store.upsert(
                tenant_id,
                id,
                CapaView {
                    capa_id: id,
                    title: e.title,
                    kind: e.kind,
                    description: e.description,
                    ncr_id: e.ncr_id,
                    owner: e.owner,
                    due_date: e.due_date,
                    root_cause: None,
                    actions: Vec::new(),
                    verifications: Vec::new(),
                    status: CapaStatus::Open,
                    cancel_reason: None,
                    opened_at: e.occurred_at,
                    updated_at: e.occurred_at,
                },
            ),
            CapaEvent::RootCauseRecorded(e) => {
                self.store.update(tenant_id, &id, &mut |c| {
                    c.root_cause = Some(e.root_cause.clone());
                    c.updated_at = e.occurred_at;
                });
            }
            CapaEvent::ActionAdded(e) => {
                self.store.update(tenant_id, &id, &mut |c| {
                    c.actions.push(e.action.clone());
                    if c.status == CapaStatus::Open {
                        c.status = CapaStatus::InProgress;
                    }
                    c.updated_at = e.occurred_at;
                });
            }
            CapaEvent::ActionCompleted(e) => {
                self.store.update(tenant_id, &id, &mut |c| {
                    if let Some(a) = c.actions.iter_mut().find(|a| a.action_no == e.action_no) {
                        a.completed_at = Some(e.occurred_at);
                    }
                    c.updated_at = e.occurred_at;
                });
            }
            CapaEvent::Implemented(e) => {
                self.store.update(tenant_id, &id, &mut |c| {
                    c.status = CapaStatus::Implemented;
                    c.updated_at = e.occurred_at;
                });
            }
            CapaEvent::EffectivenessVerified(e) => {
                self.store.update(tenant_id, &id, &mut |c| {
                    c.verifications.push(Verification {
                        effective: e.effective,
                        notes: e.notes.clone(),
                        verified_by: e.verified_by,
                        verified_at: e.occurred_at,
                    });
                    c.status = if e.effective {
                        CapaStatus::Verified
                    } else {
                        CapaStatus::InProgress
                    };
                    c.updated_at = e.occurred_at;
                });
            }
            CapaEvent::Closed(e) => {
                self.store.update(tenant_id, &id, &mut |c| {
                    c.status = CapaStatus::Closed;
                    c.updated_at = e.occurred_at;
                });
            }
            CapaEvent::Cancelled(e) => {
                self.store.update(tenant_id, &id, &mut |c| {
                    c.status = CapaStatus::Cancelled;
                    c.cancel_reason = Some(e.reason.clone());
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
