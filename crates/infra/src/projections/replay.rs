//! Rebuilding read models from the event store.

use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::event_store::{EventStore, EventStoreError};

use super::{ProjectionError, ReadModels};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("projection error: {0}")]
    Projection(#[from] ProjectionError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub events: usize,
    pub streams: usize,
    pub tenants: usize,
}

/// Load the whole log and rebuild every read model in `models`.
pub async fn replay_all<S>(store: &S, models: &ReadModels) -> Result<ReplayReport, ReplayError>
where
    S: EventStore + ?Sized,
{
    let stored = store.load_all().await?;
    let envelopes: Vec<_> = stored.iter().map(|e| e.to_envelope()).collect();

    models.rebuild_all(&envelopes)?;

    let report = ReplayReport {
        events: stored.len(),
        streams: stored
            .iter()
            .map(|e| (e.tenant_id, e.aggregate_id))
            .collect::<HashSet<_>>()
            .len(),
        tenants: stored.iter().map(|e| e.tenant_id).collect::<HashSet<_>>().len(),
    };
    info!(
        events = report.events,
        streams = report.streams,
        tenants = report.tenants,
        "read models rebuilt from event store"
    );
    Ok(report)
}
