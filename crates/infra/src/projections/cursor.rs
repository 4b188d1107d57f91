use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;

use ironbooks_core::{AggregateId, TenantId};
use ironbooks_events::EventEnvelope;

use super::ProjectionError;

/// Last applied sequence number per `(tenant, aggregate)` stream.
///
/// Redelivered envelopes (at or below the cursor) are skipped; a forward gap is
/// an error. The first envelope seen for a stream may start anywhere, which lets
/// a projection attach to streams that began before it subscribed.
#[derive(Debug, Default)]
pub struct StreamCursors {
    inner: RwLock<HashMap<(TenantId, AggregateId), u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> u64 {
        self.inner
            .read()
            .ok()
            .and_then(|m| m.get(&(tenant_id, aggregate_id)).copied())
            .unwrap_or(0)
    }

    /// `Ok(true)` when the envelope is next in its stream and should be applied.
    pub fn admit(&self, envelope: &EventEnvelope<JsonValue>) -> Result<bool, ProjectionError> {
        let last = self.get(envelope.tenant_id(), envelope.aggregate_id());
        let found = envelope.sequence_number();

        if found == 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found });
        }
        if found <= last {
            return Ok(false);
        }
        if last != 0 && found != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found });
        }
        Ok(true)
    }

    pub fn advance(&self, envelope: &EventEnvelope<JsonValue>) {
        if let Ok(mut m) = self.inner.write() {
            m.insert(
                (envelope.tenant_id(), envelope.aggregate_id()),
                envelope.sequence_number(),
            );
        }
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        if let Ok(mut m) = self.inner.write() {
            m.retain(|(t, _), _| *t != tenant_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn env(tenant_id: TenantId, aggregate_id: AggregateId, seq: u64) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            tenant_id,
            aggregate_id,
            "test.thing",
            seq,
            "test.thing.happened",
            Utc::now(),
            JsonValue::Null,
        )
    }

    #[test]
    fn skips_duplicates_and_rejects_gaps() {
        let cursors = StreamCursors::new();
        let (t, a) = (TenantId::new(), AggregateId::new());

        assert!(cursors.admit(&env(t, a, 1)).unwrap());
        cursors.advance(&env(t, a, 1));

        assert!(!cursors.admit(&env(t, a, 1)).unwrap());
        assert!(cursors.admit(&env(t, a, 2)).unwrap());
        assert!(matches!(
            cursors.admit(&env(t, a, 4)),
            Err(ProjectionError::NonMonotonicSequence { last: 1, found: 4 })
        ));
        assert!(cursors.admit(&env(t, a, 0)).is_err());
    }

    #[test]
    fn clearing_a_tenant_resets_its_streams_only() {
        let cursors = StreamCursors::new();
        let (t1, t2, a) = (TenantId::new(), TenantId::new(), AggregateId::new());
        cursors.advance(&env(t1, a, 3));
        cursors.advance(&env(t2, a, 5));

        cursors.clear_tenant(t1);
        assert_eq!(cursors.get(t1, a), 0);
        assert_eq!(cursors.get(t2, a), 5);
    }
}
