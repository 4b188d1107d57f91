//! `ironbooks-core`: domain building blocks shared by every business module.
//!
//! Nothing in here performs IO.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod money;
pub mod text;

pub use aggregate::{Aggregate, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, TenantId, UserId};
