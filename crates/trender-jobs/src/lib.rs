//! Unified job service for the trender backend.
//!
//! This crate provides:
//! - `UnifiedJobService`: get, list, cancel and retry across the scrape,
//!   pipeline and generation queues
//! - Fallback to durable job records once a queue has evicted a job
//! - Mapping of queue jobs and records onto `UnifiedJobResponse`

pub mod error;
pub mod map;
pub mod service;

pub use error::{JobsError, JobsResult};
pub use service::UnifiedJobService;
