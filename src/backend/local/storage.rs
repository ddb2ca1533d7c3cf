use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;

use crate::backend::BlobStorage;
use crate::{AppResult, Error};

/// Blob rows in the same sqlite file as everything else. URLs follow the
/// hosted layout (`…/object/public/{bucket}/{path}`) so path recovery from a
/// public URL works the same against either backend.
pub struct LocalBlobs {
    pool: SqlitePool,
    base_url: String,
}

impl LocalBlobs {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            base_url: "local://storage".to_owned(),
        }
    }
}

#[async_trait]
impl BlobStorage for LocalBlobs {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> AppResult<()> {
        sqlx::query("INSERT INTO objects (bucket,path,content_type,data) VALUES (?,?,?,?)")
            .bind(bucket)
            .bind(path)
            .bind(content_type)
            .bind(bytes)
            .execute(&self.pool)
            .await
            .map_err(|err| {
                if let sqlx::Error::Database(db) = &err {
                    if db.is_unique_violation() {
                        return Error::Conflict(format!("object {bucket}/{path}"));
                    }
                }
                Error::Db(err)
            })?;
        debug!(bucket, path, "object stored");
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/object/public/{bucket}/{path}", self.base_url)
    }

    async fn remove(&self, bucket: &str, path: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM objects WHERE bucket=? AND path=?")
            .bind(bucket)
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
