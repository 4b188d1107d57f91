//! Organization directory: the only read model consulted across tenants, to
//! resolve a URL slug to its tenant.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use ironbooks_auth::{OrganizationEvent, OrganizationId};
use ironbooks_core::TenantId;
use ironbooks_core::money::Currency;
use ironbooks_events::EventEnvelope;

use super::{Projection, ProjectionError, StreamCursors};
use crate::read_model::{InMemoryTenantStore, TenantStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganizationView {
    pub organization_id: OrganizationId,
    pub tenant_id: TenantId,
    pub slug: String,
    pub name: String,
    pub base_currency: Currency,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct OrganizationDirectory {
    store: InMemoryTenantStore<OrganizationId, OrganizationView>,
    by_slug: RwLock<HashMap<String, TenantId>>,
    cursors: StreamCursors,
}

impl OrganizationDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_by_slug(&self, slug: &str) -> Option<OrganizationView> {
        let tenant_id = *self.by_slug.read().ok()?.get(slug)?;
        self.for_tenant(tenant_id)
    }

    pub fn slug_taken(&self, slug: &str) -> bool {
        self.by_slug
            .read()
            .map(|m| m.contains_key(slug))
            .unwrap_or(false)
    }

    pub fn for_tenant(&self, tenant_id: TenantId) -> Option<OrganizationView> {
        self.store.list(tenant_id).into_iter().next()
    }
}

impl Projection for OrganizationDirectory {
    type Event = OrganizationEvent;

    const NAME: &'static str = "auth.organizations";
    const AGGREGATE_TYPE: &'static str = "auth.organization";

    fn cursors(&self) -> &StreamCursors {
        &self.cursors
    }

    fn project(
        &self,
        envelope: &EventEnvelope<JsonValue>,
        event: OrganizationEvent,
    ) -> Result<(), ProjectionError> {
        let tenant_id = envelope.tenant_id();
        let organization_id = OrganizationId::from(envelope.aggregate_id());

        match event {
            OrganizationEvent::Registered(e) => {
                if let Ok(mut by_slug) = self.by_slug.write() {
                    by_slug.insert(e.slug.clone(), tenant_id);
                }
                self.store.upsert(
                    tenant_id,
                    organization_id,
                    OrganizationView {
                        organization_id,
                        tenant_id,
                        slug: e.slug,
                        name: e.name,
                        base_currency: e.base_currency,
                        registered_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            OrganizationEvent::Renamed(e) => {
                self.store.update(tenant_id, &organization_id, &mut |org| {
                    org.name = e.name.clone();
                    org.updated_at = e.occurred_at;
                });
            }
        }
        Ok(())
    }

    fn clear_rows(&self, tenant_id: TenantId) {
        if let Ok(mut by_slug) = self.by_slug.write() {
            by_slug.retain(|_, t| *t != tenant_id);
        }
        self.store.clear_tenant(tenant_id);
    }
}
