//! Work queues for the trender backend.
//!
//! This crate provides:
//! - The queue adapter contract consumed by the job service
//! - Producer/worker operations with attempt accounting and backoff
//! - A Redis-backed queue engine with retention-based eviction
//! - An in-memory queue with the same semantics

pub mod adapter;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod queue;

pub use adapter::{backoff_delay, AddOptions, FailOutcome, QueueAdapter, QueueJob, WorkQueue};
pub use error::{QueueError, QueueResult};
pub use memory::MemoryQueue;
pub use queue::{QueueConfig, RedisQueue};
