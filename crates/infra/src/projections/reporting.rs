//! Dashboard read model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use ironbooks_core::{TenantId, UserId};
use ironbooks_events::EventEnvelope;
use ironbooks_reporting::{DashboardEvent, DashboardId, DashboardStatus, Widget};

use super::{Projection, ProjectionError, StreamCursors};
use crate::read_model::{InMemoryTenantStore, TenantStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardView {
    pub dashboard_id: DashboardId,
    pub name: String,
    pub description: Option<String>,
    pub owner: UserId,
    pub widgets: Vec<Widget>,
    pub status: DashboardStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct DashboardsProjection {
    store: InMemoryTenantStore<DashboardId, DashboardView>,
    cursors: StreamCursors,
}

impl DashboardsProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant_id: TenantId, id: DashboardId) -> Option<DashboardView> {
        self.store.get(tenant_id, &id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<DashboardView> {
        self.store.list(tenant_id)
    }
}

impl Projection for DashboardsProjection {
    type Event = DashboardEvent;

    const NAME: &'static str = "reporting.dashboards";
    const AGGREGATE_TYPE: &'static str = "reporting.dashboard";

    fn cursors(&self) -> &StreamCursors {
        &self.cursors
    }

    fn project(
        &self,
        envelope: &EventEnvelope<JsonValue>,
        event: DashboardEvent,
    ) -> Result<(), ProjectionError> {
        let tenant_id = envelope.tenant_id();
        let id = DashboardId::from(envelope.aggregate_id());

        match event {
            DashboardEvent::Created(e) => self.store.upsert(
                tenant_id,
                id,
                DashboardView {
                    dashboard_id: id,
                    name: e.name,
                    description: e.description,
                    owner: e.owner,
                    widgets: Vec::new(),
                    status: DashboardStatus::Active,
                    created_at: e.occurred_at,
                    updated_at: e.occurred_at,
                },
            ),
            DashboardEvent::Renamed(e) => {
                self.store.update(tenant_id, &id, &mut |d| {
                    d.name = e.name.clone();
                    d.updated_at = e.occurred_at;
                });
            }
            DashboardEvent::WidgetAdded(e) => {
                self.store.update(tenant_id, &id, &mut |d| {
                    d.widgets.push(e.widget.clone());
                    d.updated_at = e.occurred_at;
                });
            }
            DashboardEvent::WidgetRemoved(e) => {
                self.store.update(tenant_id, &id, &mut |d| {
                    d.widgets.retain(|w| w.widget_no != e.widget_no);
                    d.updated_at = e.occurred_at;
                });
            }
            DashboardEvent::Archived(e) => {
                self.store.update(tenant_id, &id, &mut |d| {
                    d.status = DashboardStatus::Archived;
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
