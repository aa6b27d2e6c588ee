//! Video storage for the trender backend.
//!
//! This crate provides:
//! - The `ObjectStore` contract (put/get/delete by key)
//! - An S3-compatible client
//! - Local disk storage used when object storage is absent or failing
//! - An in-memory object store

pub mod client;
pub mod error;
pub mod local;
pub mod memory;

use async_trait::async_trait;

pub use client::{S3Client, S3Config};
pub use error::{StorageError, StorageResult};
pub use local::LocalStore;
pub use memory::MemoryObjectStore;

/// Content type used for reel videos.
pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";

/// Binary object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<()>;

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    async fn delete(&self, key: &str) -> StorageResult<()>;
}

/// Object key for a reel's video.
pub fn reel_video_key(reel_id: &str) -> String {
    format!("reels/{}.mp4", reel_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reel_video_key() {
        assert_eq!(reel_video_key("abc"), "reels/abc.mp4");
    }

    #[tokio::test]
    async fn test_memory_store_failing_puts() {
        let store = MemoryObjectStore::new();
        store.put("a", vec![1], VIDEO_CONTENT_TYPE).await.unwrap();
        store.fail_puts(true);
        assert!(matches!(
            store.put("b", vec![2], VIDEO_CONTENT_TYPE).await,
            Err(StorageError::UploadFailed(_))
        ));
        assert_eq!(store.get("a").await.unwrap(), vec![1]);
        assert!(matches!(store.get("b").await, Err(StorageError::NotFound(_))));
    }
}
