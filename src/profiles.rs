//! Directory and avatar helpers: who you can talk to, and the blob-storage
//! side of profile pictures.

use time::OffsetDateTime;
use tracing::debug;

use crate::backend::{BlobStorage, Store};
use crate::records::Profile;
use crate::{AppResult, Error};

pub const AVATAR_BUCKET: &str = "avatars";

/// Everyone the viewer can start a conversation with.
pub async fn contacts(store: &dyn Store, viewer_id: &str) -> AppResult<Vec<Profile>> {
    let mut profiles = store.list_profiles().await?;
    profiles.retain(|profile| profile.id != viewer_id);
    Ok(profiles)
}

/// Upload an avatar under a fresh timestamped name and return its public
/// URL. Names never collide, so the store's no-overwrite rule never fires.
pub async fn upload_avatar(
    blobs: &dyn BlobStorage,
    user_id: &str,
    bytes: Vec<u8>,
    content_type: &str,
) -> AppResult<String> {
    let ext = extension_for(content_type);
    let stamp = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let path = format!("{user_id}/{user_id}-{stamp}.{ext}");
    blobs.upload(AVATAR_BUCKET, &path, bytes, content_type).await?;
    debug!(user = user_id, path, "avatar uploaded");
    Ok(blobs.public_url(AVATAR_BUCKET, &path))
}

/// Delete an avatar given its public URL.
pub async fn remove_avatar(blobs: &dyn BlobStorage, url: &str) -> AppResult<()> {
    let marker = format!("/object/public/{AVATAR_BUCKET}/");
    let Some((_, path)) = url.split_once(marker.as_str()) else {
        return Err(Error::Validation(format!("not an avatar url: {url}")));
    };
    blobs.remove(AVATAR_BUCKET, path).await
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "jpg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingBlobs {
        removed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BlobStorage for RecordingBlobs {
        async fn upload(&self, _: &str, _: &str, _: Vec<u8>, _: &str) -> AppResult<()> {
            Ok(())
        }

        fn public_url(&self, bucket: &str, path: &str) -> String {
            format!("local://storage/object/public/{bucket}/{path}")
        }

        async fn remove(&self, _: &str, path: &str) -> AppResult<()> {
            self.removed.lock().unwrap().push(path.to_owned());
            Ok(())
        }
    }

    #[tokio::test]
    async fn upload_url_round_trips_through_remove() {
        let blobs = RecordingBlobs::default();
        let url = upload_avatar(&blobs, "u1", vec![1, 2, 3], "image/png")
            .await
            .unwrap();
        assert!(url.contains("/object/public/avatars/u1/u1-"));
        assert!(url.ends_with(".png"));

        remove_avatar(&blobs, &url).await.unwrap();
        let removed = blobs.removed.lock().unwrap();
        assert_eq!(removed.len(), 1);
        assert!(removed[0].starts_with("u1/u1-"));
    }

    #[tokio::test]
    async fn foreign_urls_are_rejected() {
        let blobs = RecordingBlobs::default();
        let err = remove_avatar(&blobs, "https://elsewhere.example/cat.png")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation");
    }

    #[test]
    fn unknown_content_types_fall_back_to_jpg() {
        assert_eq!(extension_for("image/png"), "png");
        assert_eq!(extension_for("application/octet-stream"), "jpg");
    }
}
