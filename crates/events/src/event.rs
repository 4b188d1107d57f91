use chrono::{DateTime, Utc};

/// A fact recorded by an aggregate.
///
/// Events are immutable and carry their own schema version so stored payloads
/// can evolve without breaking replay.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable name, e.g. `"payables.bill.approved"`.
    fn event_type(&self) -> &'static str;

    fn version(&self) -> u32 {
        1
    }

    /// Business time at which the event happened.
    fn occurred_at(&self) -> DateTime<Utc>;
}
