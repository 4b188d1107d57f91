use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use ironbooks_core::{AggregateId, ExpectedVersion, TenantId};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent, validate_batch};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<StreamKey, Vec<StoredEvent>>,
    /// Commit order across all streams.
    log: Vec<StoredEvent>,
}

/// In-memory append-only event store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }
        let (tenant_id, aggregate_id, aggregate_type) = validate_batch(&events)?;

        let mut inner = self
            .inner
            .write()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;
        let Inner { streams, log } = &mut *inner;

        let stream = streams
            .entry(StreamKey {
                tenant_id,
                aggregate_id,
            })
            .or_default();
        let current = Self::current_version(stream);

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        if let Some(existing) = stream.first() {
            if existing.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    existing.aggregate_type, aggregate_type
                )));
            }
        }

        let committed: Vec<StoredEvent> = events
            .into_iter()
            .zip(current + 1..)
            .map(|(e, sequence_number)| StoredEvent {
                event_id: e.event_id,
                tenant_id: e.tenant_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            })
            .collect();

        stream.extend(committed.iter().cloned());
        log.extend(committed.iter().cloned());
        Ok(committed)
    }

    async fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        Ok(inner
            .streams
            .get(&StreamKey {
                tenant_id,
                aggregate_id,
            })
            .cloned()
            .unwrap_or_default())
    }

    async fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;
        Ok(inner.log.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn event(tenant_id: TenantId, aggregate_id: AggregateId, aggregate_type: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            tenant_id,
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            event_type: "test.thing.happened".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: json!({ "Happened": { "tenant_id": tenant_id } }),
        }
    }

    #[tokio::test]
    async fn assigns_sequence_numbers_and_checks_version() {
        let store = InMemoryEventStore::new();
        let t = TenantId::new();
        let a = AggregateId::new();

        let first = store
            .append(vec![event(t, a, "test.thing"), event(t, a, "test.thing")], ExpectedVersion::Exact(0))
            .await
            .unwrap();
        assert_eq!(first.iter().map(|e| e.sequence_number).collect::<Vec<_>>(), vec![1, 2]);

        let stale = store
            .append(vec![event(t, a, "test.thing")], ExpectedVersion::Exact(1))
            .await
            .unwrap_err();
        assert!(matches!(stale, EventStoreError::Concurrency(_)));

        store
            .append(vec![event(t, a, "test.thing")], ExpectedVersion::Exact(2))
            .await
            .unwrap();
        assert_eq!(store.load_stream(t, a).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn streams_are_tenant_isolated() {
        let store = InMemoryEventStore::new();
        let (t1, t2) = (TenantId::new(), TenantId::new());
        let a = AggregateId::new();

        store
            .append(vec![event(t1, a, "test.thing")], ExpectedVersion::Any)
            .await
            .unwrap();
        assert!(store.load_stream(t2, a).await.unwrap().is_empty());

        let mixed = store
            .append(vec![event(t1, a, "test.thing"), event(t2, a, "test.thing")], ExpectedVersion::Any)
            .await
            .unwrap_err();
        assert!(matches!(mixed, EventStoreError::TenantIsolation(_)));
    }

    #[tokio::test]
    async fn aggregate_type_is_fixed_per_stream() {
        let store = InMemoryEventStore::new();
        let t = TenantId::new();
        let a = AggregateId::new();
        store
            .append(vec![event(t, a, "test.thing")], ExpectedVersion::Any)
            .await
            .unwrap();
        let err = store
            .append(vec![event(t, a, "test.other")], ExpectedVersion::Any)
            .await
            .unwrap_err();
        assert!(matches!(err, EventStoreError::AggregateTypeMismatch(_)));
    }

    #[tokio::test]
    async fn load_all_keeps_commit_order() {
        let store = InMemoryEventStore::new();
        let t = TenantId::new();
        let (a, b) = (AggregateId::new(), AggregateId::new());
        for id in [a, b, a] {
            store
                .append(vec![event(t, id, "test.thing")], ExpectedVersion::Any)
                .await
                .unwrap();
        }
        let all = store.load_all().await.unwrap();
        let order: Vec<_> = all.iter().map(|e| (e.aggregate_id, e.sequence_number)).collect();
        assert_eq!(order, vec![(a, 1), (b, 1), (a, 2)]);
    }
}
