//! In-process reference implementation of the four collaborator contracts,
//! used by the demo binary and the test suite. Rows live in sqlite; realtime
//! is an in-memory fan-out hub; auth is an in-memory directory. Not a
//! server, and not meant to become one.

mod auth;
mod realtime;
mod storage;
mod store;

use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use self::auth::{LocalAuth, UserDirectory};
use self::realtime::RealtimeHub;
use self::storage::LocalBlobs;
use self::store::SqliteStore;
use crate::{AppResult, Backend};

pub struct LocalBackend {
    pool: SqlitePool,
    hub: RealtimeHub,
    users: UserDirectory,
}

impl LocalBackend {
    pub async fn open(url: &str) -> AppResult<Self> {
        // a pooled in-memory sqlite would give every connection its own db
        let max_connections = if url.contains(":memory:") { 1 } else { 16 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        init_schema(&pool).await?;
        Ok(Self {
            pool,
            hub: RealtimeHub::new(),
            users: UserDirectory::default(),
        })
    }

    pub async fn open_in_memory() -> AppResult<Self> {
        Self::open("sqlite::memory:").await
    }

    /// A client handle, one per simulated device. Handles share rows, the
    /// account directory and the realtime hub; each keeps its own session.
    pub fn client(&self) -> Backend {
        Backend {
            auth: Arc::new(LocalAuth::new(self.users.clone())),
            store: Arc::new(SqliteStore::new(self.pool.clone(), self.hub.clone())),
            realtime: Arc::new(self.hub.clone()),
            blobs: Arc::new(LocalBlobs::new(self.pool.clone())),
        }
    }
}

async fn init_schema(pool: &SqlitePool) -> AppResult<()> {
    for statement in [
        "CREATE TABLE IF NOT EXISTS profiles (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL,
            full_name TEXT,
            avatar_url TEXT,
            created_at TEXT NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS rooms (
            id TEXT PRIMARY KEY,
            user1_id TEXT NOT NULL,
            user2_id TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            sender_id TEXT NOT NULL,
            room_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            is_read INTEGER NOT NULL DEFAULT 0
        )",
        "CREATE TABLE IF NOT EXISTS objects (
            bucket TEXT NOT NULL,
            path TEXT NOT NULL,
            content_type TEXT NOT NULL,
            data BLOB NOT NULL,
            PRIMARY KEY (bucket, path)
        )",
    ] {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
