//! Store of record for the trender backend.
//!
//! This crate provides:
//! - Repository traits for reels, analyses, templates, job records and reel logs
//! - A Firestore REST implementation with token caching, retry and metrics
//! - An in-memory implementation with the same semantics

pub mod client;
pub mod codec;
pub mod error;
pub mod firestore;
pub mod memory;
pub mod metrics;
pub mod repository;
pub mod retry;
pub mod token_cache;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{StoreError, StoreResult};
pub use firestore::{collections, FirestoreStore};
pub use memory::MemoryStore;
pub use repository::{
    AnalysisRepository, JobRecordRepository, ReelLogRepository, ReelRepository, Store,
    TemplateRepository,
};
pub use retry::RetryConfig;
