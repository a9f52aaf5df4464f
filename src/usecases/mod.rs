//! Application use cases. Orchestrate domain logic via ports.

pub mod reconciler;

pub use reconciler::{ApplyPolicy, Intervals, MAX_IMMEDIATE_RETRIES, Reconciler};
