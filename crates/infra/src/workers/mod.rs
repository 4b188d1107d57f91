//! Background workers fed by the event bus.

pub mod projection_worker;

pub use projection_worker::{ProjectionWorker, WorkerHandle};
