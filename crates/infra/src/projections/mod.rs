//! Read model builders.
//!
//! Every projection is tenant-partitioned, idempotent under redelivery (via
//! [`StreamCursors`]) and rebuildable from the event store.

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use ironbooks_core::TenantId;
use ironbooks_events::EventEnvelope;

pub mod costing;
pub mod cursor;
pub mod ledger;
pub mod organizations;
pub mod payables;
pub mod planning;
pub mod quality;
pub mod read_models;
pub mod replay;
pub mod reporting;

pub use cursor::StreamCursors;
pub use read_models::{ReadModels, TenantMetrics};
pub use replay::{ReplayError, ReplayReport, replay_all};

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize {aggregate_type} event: {message}")]
    Deserialize {
        aggregate_type: String,
        message: String,
    },

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// One read model fed by one aggregate type.
pub trait Projection: Send + Sync {
    type Event: DeserializeOwned;

    const NAME: &'static str;
    const AGGREGATE_TYPE: &'static str;

    fn cursors(&self) -> &StreamCursors;

    /// Fold one decoded event into the read model.
    fn project(
        &self,
        envelope: &EventEnvelope<JsonValue>,
        event: Self::Event,
    ) -> Result<(), ProjectionError>;

    /// Drop every row owned by `tenant_id`.
    fn clear_rows(&self, tenant_id: TenantId);

    /// Apply an envelope if it belongs to this projection and is next in its stream.
    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != Self::AGGREGATE_TYPE {
            return Ok(());
        }
        if !self.cursors().admit(envelope)? {
            return Ok(());
        }

        ensure_payload_tenant(envelope)?;
        let event: Self::Event = serde_json::from_value(envelope.payload().clone()).map_err(|e| {
            ProjectionError::Deserialize {
                aggregate_type: Self::AGGREGATE_TYPE.to_string(),
                message: e.to_string(),
            }
        })?;

        self.project(envelope, event)?;
        self.cursors().advance(envelope);
        Ok(())
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        self.clear_rows(tenant_id);
        self.cursors().clear_tenant(tenant_id);
    }

    /// Clear every tenant present in `envelopes`, then replay them in stream order.
    fn rebuild_from_scratch<I>(&self, envelopes: I) -> Result<(), ProjectionError>
    where
        I: IntoIterator<Item = EventEnvelope<JsonValue>>,
        Self: Sized,
    {
        let mut envs: Vec<_> = envelopes
            .into_iter()
            .filter(|e| e.aggregate_type() == Self::AGGREGATE_TYPE)
            .collect();

        let mut tenants: Vec<TenantId> = envs.iter().map(|e| e.tenant_id()).collect();
        tenants.sort();
        tenants.dedup();
        for t in tenants {
            self.clear_tenant(t);
        }

        envs.sort_by_key(|e| (e.tenant_id(), e.aggregate_id(), e.sequence_number()));
        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}

/// Events are externally tagged enums whose variant body carries `tenant_id`.
fn ensure_payload_tenant(envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
    let payload_tenant = envelope
        .payload()
        .as_object()
        .and_then(|variant| variant.values().next())
        .and_then(|body| body.get("tenant_id"))
        .and_then(|v| serde_json::from_value::<TenantId>(v.clone()).ok());

    match payload_tenant {
        Some(t) if t == envelope.tenant_id() => Ok(()),
        Some(_) => Err(ProjectionError::TenantIsolation(
            "event tenant_id does not match envelope tenant_id".to_string(),
        )),
        None => Err(ProjectionError::TenantIsolation(
            "event payload carries no tenant_id".to_string(),
        )),
    }
}
