//! Utilities for testing handoff pipelines.
//!
//! - [`items`] builds batches of [`crate::types::WorkItem`]s.
//! - [`transforms`] provides transforms that record, fail, panic or block on demand.
//! - [`notify`] wraps [`tokio::sync::Notify`] with a timeout so that a test waiting for a state
//!   that is never reached fails instead of hanging.
//! - [`pipeline`] runs pipelines under the same timeout.
//! - `failpoints` arms the fail points compiled in with the `failpoints` feature.
#[cfg(feature = "failpoints")]
pub mod failpoints;
pub mod items;
pub mod notify;
pub mod pipeline;
pub mod transforms;
