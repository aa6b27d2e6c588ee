//! Where reel videos are kept: object storage when configured, local disk otherwise.

use std::sync::Arc;

use tracing::debug;

use trender_models::{ReelId, VideoLocation};
use trender_storage::{reel_video_key, LocalStore, ObjectStore, StorageResult, VIDEO_CONTENT_TYPE};

/// Video bytes in object storage or on local disk.
#[derive(Clone)]
pub struct VideoVault {
    objects: Option<Arc<dyn ObjectStore>>,
    local: LocalStore,
}

impl VideoVault {
    pub fn new(objects: Option<Arc<dyn ObjectStore>>, local: LocalStore) -> Self {
        Self { objects, local }
    }

    /// Local disk only.
    pub fn local_only(local: LocalStore) -> Self {
        Self::new(None, local)
    }

    pub fn has_object_store(&self) -> bool {
        self.objects.is_some()
    }

    /// Upload under `reels/{id}.mp4`. `None` when no object store is configured.
    pub async fn upload(
        &self,
        reel_id: &ReelId,
        bytes: Vec<u8>,
    ) -> Option<StorageResult<VideoLocation>> {
        let objects = self.objects.as_ref()?;
        let key = reel_video_key(reel_id.as_str());
        Some(
            objects
                .put(&key, bytes, VIDEO_CONTENT_TYPE)
                .await
                .map(|_| VideoLocation::object(key)),
        )
    }

    /// Write to `{downloads}/{folder}/{id}.mp4`.
    pub async fn write_local(
        &self,
        folder: &str,
        reel_id: &ReelId,
        bytes: &[u8],
    ) -> StorageResult<VideoLocation> {
        let path = self
            .local
            .write(&format!("{}/{}.mp4", folder, reel_id), bytes)
            .await?;
        Ok(VideoLocation::local(path.to_string_lossy().into_owned()))
    }

    pub async fn load(&self, location: &VideoLocation) -> StorageResult<Vec<u8>> {
        debug!("Loading video from {}", location);
        match location {
            VideoLocation::Object { key } => match &self.objects {
                Some(objects) => objects.get(key).await,
                None => Err(trender_storage::StorageError::config_error(format!(
                    "video {} is in object storage but none is configured",
                    key
                ))),
            },
            VideoLocation::Local { path } => self.local.read(path).await,
        }
    }

    /// Remove a stored video. Missing files are not an error.
    pub async fn delete(&self, location: &VideoLocation) -> StorageResult<()> {
        match location {
            VideoLocation::Object { key } => match &self.objects {
                Some(objects) => objects.delete(key).await,
                None => Ok(()),
            },
            VideoLocation::Local { path } => self.local.delete(path).await,
        }
    }
}
