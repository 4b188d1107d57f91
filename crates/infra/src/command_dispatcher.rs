//! Command execution pipeline for event-sourced aggregates.
//!
//! ```text
//! Command
//!   -> load stream (tenant-scoped)
//!   -> validate stream (tenant, aggregate, monotonic sequence)
//!   -> rehydrate
//!   -> handle (pure decision)
//!   -> append with ExpectedVersion::Exact(loaded version)
//!   -> publish committed envelopes
//! ```
//!
//! Publication happens strictly after a successful append. A publish failure
//! is reported, but the events are already durable and read models can be
//! rebuilt from the store.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use ironbooks_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, TenantId};
use ironbooks_events::{Command, EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Stale aggregate version, or a duplicate the domain reports as a conflict.
    #[error("conflict: {0}")]
    Concurrency(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    InvariantViolation(String),

    #[error("{0}")]
    InvalidId(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    /// Historical payloads no longer match the aggregate's event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),

    #[error("publish failed after append: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            EventStoreError::TenantIsolation(msg) => DispatchError::TenantIsolation(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::InvalidId(msg),
        }
    }
}

impl DispatchError {
    pub fn is_concurrency(&self) -> bool {
        matches!(self, DispatchError::Concurrency(_))
    }
}

/// Runs commands against any aggregate type over an injected store and bus.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch one command to one aggregate instance.
    ///
    /// `make_aggregate` builds the empty aggregate that history is folded into.
    /// Returns the committed events; an empty vec means the command was a no-op.
    pub async fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate,
        A::Command: Command,
        A::Event: ironbooks_events::Event + Serialize + DeserializeOwned,
    {
        if command.tenant_id() != tenant_id {
            return Err(DispatchError::TenantIsolation(
                "command tenant_id does not match request tenant".to_string(),
            ));
        }

        let history = self.store.load_stream(tenant_id, aggregate_id).await?;
        validate_loaded_stream(tenant_id, aggregate_id, A::AGGREGATE_TYPE, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;

        let decided = aggregate.handle(&command)?;
        if decided.is_empty() {
            debug!(
                tenant_id = %tenant_id,
                aggregate_id = %aggregate_id,
                aggregate_type = A::AGGREGATE_TYPE,
                "command produced no events"
            );
            return Ok(vec![]);
        }

        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    tenant_id,
                    aggregate_id,
                    A::AGGREGATE_TYPE,
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected).await?;
        debug!(
            tenant_id = %tenant_id,
            aggregate_id = %aggregate_id,
            aggregate_type = A::AGGREGATE_TYPE,
            events = committed.len(),
            version = stream_version(&committed),
            "command committed"
        );

        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }

    /// Rehydrate an aggregate without issuing a command. `None` when the stream is empty.
    pub async fn load<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Option<A>, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id).await?;
        if history.is_empty() {
            return Ok(None);
        }
        validate_loaded_stream(tenant_id, aggregate_id, A::AGGREGATE_TYPE, &history)?;

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;
        Ok(Some(aggregate))
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    aggregate_type: &str,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // Enforced even though the store is keyed by tenant: a faulty backend must not leak.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong tenant_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.aggregate_type != aggregate_type {
            return Err(DispatchError::Store(EventStoreError::AggregateTypeMismatch(
                format!(
                    "stream holds '{}' events, dispatched as '{aggregate_type}'",
                    e.aggregate_type
                ),
            )));
        }
        if e.sequence_number != last + 1 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-contiguous sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use ironbooks_core::UserId;
    use ironbooks_events::InMemoryEventBus;
    use ironbooks_reporting::dashboard::{
        ArchiveDashboard, CreateDashboard, Dashboard, DashboardCommand, DashboardId, RenameDashboard,
    };

    use super::*;
    use crate::event_store::InMemoryEventStore;

    type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    fn dispatcher() -> Dispatcher {
        CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryEventBus::new()))
    }

    fn create(tenant_id: TenantId) -> DashboardCommand {
        DashboardCommand::Create(CreateDashboard {
            tenant_id,
            name: "AP overview".to_string(),
            description: None,
            owner: UserId::new(),
            occurred_at: Utc::now(),
        })
    }

    fn make(id: AggregateId) -> Dashboard {
        Dashboard::empty(DashboardId::from(id))
    }

    #[tokio::test]
    async fn commits_then_publishes() {
        let d = dispatcher();
        let sub = d.bus().subscribe();
        let tenant = TenantId::new();
        let id = AggregateId::new();

        let committed = d.dispatch(tenant, id, create(tenant), make).await.unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].sequence_number, 1);
        assert_eq!(committed[0].aggregate_type, "reporting.dashboard");

        let env = sub.try_recv().unwrap();
        assert_eq!(env.event_type(), "reporting.dashboard.created");
        assert_eq!(env.tenant_id(), tenant);
    }

    #[tokio::test]
    async fn rehydrates_before_handling() {
        let d = dispatcher();
        let tenant = TenantId::new();
        let id = AggregateId::new();
        d.dispatch(tenant, id, create(tenant), make).await.unwrap();

        let again = d.dispatch(tenant, id, create(tenant), make).await.unwrap_err();
        assert!(matches!(again, DispatchError::Concurrency(_) | DispatchError::InvariantViolation(_)));

        let rename = DashboardCommand::Rename(RenameDashboard {
            tenant_id: tenant,
            name: "Payables".to_string(),
            occurred_at: Utc::now(),
        });
        let committed = d.dispatch(tenant, id, rename, make).await.unwrap();
        assert_eq!(committed[0].sequence_number, 2);

        let loaded = d.load(tenant, id, make).await.unwrap().unwrap();
        assert_eq!(loaded.name(), "Payables");
        assert_eq!(loaded.version(), 2);
    }

    #[tokio::test]
    async fn rejects_command_for_another_tenant() {
        let d = dispatcher();
        let tenant = TenantId::new();
        let err = d
            .dispatch(tenant, AggregateId::new(), create(TenantId::new()), make)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::TenantIsolation(_)));
    }

    #[tokio::test]
    async fn other_tenant_sees_an_empty_stream() {
        let d = dispatcher();
        let (t1, t2) = (TenantId::new(), TenantId::new());
        let id = AggregateId::new();
        d.dispatch(t1, id, create(t1), make).await.unwrap();

        let archive = DashboardCommand::Archive(ArchiveDashboard {
            tenant_id: t2,
            occurred_at: Utc::now(),
        });
        let err = d.dispatch(t2, id, archive, make).await.unwrap_err();
        assert!(matches!(err, DispatchError::NotFound | DispatchError::InvariantViolation(_)));
        assert!(d.load(t2, id, make).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn domain_errors_leave_the_stream_untouched() {
        let d = dispatcher();
        let tenant = TenantId::new();
        let id = AggregateId::new();
        let bad = DashboardCommand::Create(CreateDashboard {
            tenant_id: tenant,
            name: "  ".to_string(),
            description: None,
            owner: UserId::new(),
            occurred_at: Utc::now(),
        });
        let err = d.dispatch(tenant, id, bad, make).await.unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
        assert!(d.store().load_stream(tenant, id).await.unwrap().is_empty());
    }
}
