//! Concurrency primitives used by handoff pipelines.
//!
//! Stages exchange work exclusively through [`queue::BoundedQueue`]s. A queue is shared by every
//! producer writing into a stage and by every worker of that stage, and it is the only place where
//! workers suspend to synchronize with each other:
//!
//! - producers suspend in [`queue::BoundedQueue::put`] while the queue is full, which propagates
//!   backpressure from slow stages up to the dispatcher;
//! - consumers suspend in [`queue::BoundedQueue::get`] while the queue is empty.
//!
//! There is no timeout and no cancellation on either operation. A worker stops only after
//! receiving its shutdown message, see [`crate::types::StageMessage`].

pub mod queue;
