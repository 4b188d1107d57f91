//! Event-sourced aggregate contract.

use crate::error::{DomainError, DomainResult};
use crate::id::AggregateId;

/// Optimistic concurrency expectation for an append.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking.
    Any,
    /// Require the stream to be at exactly this version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}

/// A consistency boundary rebuilt from its own events.
///
/// - `handle` decides which events a command produces and never mutates.
/// - `apply` folds one event into state and bumps `version()` by exactly one.
///
/// Implementations are pure: no clocks beyond what the command carries, no IO.
pub trait Aggregate {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;

    /// Stable stream type name, e.g. `"payables.bill"`.
    const AGGREGATE_TYPE: &'static str;

    fn id(&self) -> AggregateId;

    /// Number of events applied so far.
    fn version(&self) -> u64;

    fn apply(&mut self, event: &Self::Event);

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, DomainError>;
}
