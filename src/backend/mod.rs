//! Contracts of the hosted services this client delegates to: auth,
//! relational rows, realtime pub/sub and blob storage. Wire framing belongs
//! to the implementations; these traits are the whole surface the rest of
//! the crate sees.

pub mod local;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};

use crate::AppResult;
use crate::records::{Message, NewMessage, PresenceRecord, Profile, ProfileChanges, Room};

/// Identity as issued by the auth service. `metadata` is the service-side
/// user metadata blob (display name and the like).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub metadata: Value,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: AuthUser,
    pub access_token: String,
}

/// Session lifecycle notifications, broadcast to whoever subscribed.
#[derive(Debug, Clone)]
pub enum AuthChange {
    SignedIn(AuthUser),
    SignedOut,
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Create an identity. The service signs the new identity in.
    async fn sign_up(&self, email: &str, password: &str, metadata: Value)
    -> AppResult<AuthSession>;

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<AuthSession>;

    async fn sign_out(&self) -> AppResult<()>;

    async fn get_session(&self) -> AppResult<Option<AuthSession>>;

    /// Merge into the identity's metadata. Requires an active session.
    async fn update_user_metadata(&self, metadata: Value) -> AppResult<AuthUser>;

    fn changes(&self) -> broadcast::Receiver<AuthChange>;
}

/// Relational rows. Single-row fetches miss with the distinguished
/// [`Error::NotFound`](crate::Error::NotFound) code; every other failure is
/// terminal for the operation.
#[async_trait]
pub trait Store: Send + Sync {
    async fn fetch_profile(&self, id: &str) -> AppResult<Profile>;

    async fn upsert_profile(&self, profile: Profile) -> AppResult<Profile>;

    /// Writes only the supplied fields; rejects an empty change set.
    async fn update_profile(&self, id: &str, changes: ProfileChanges) -> AppResult<Profile>;

    async fn list_profiles(&self) -> AppResult<Vec<Profile>>;

    async fn fetch_room(&self, id: &str) -> AppResult<Room>;

    async fn insert_room(&self, room: Room) -> AppResult<Room>;

    /// Ascending by `created_at`; ties come back in the store's insertion
    /// order, and callers must not re-sort.
    async fn messages_in_room(&self, room_id: &str) -> AppResult<Vec<Message>>;

    async fn insert_message(&self, message: NewMessage) -> AppResult<Message>;
}

/// What a subscribed channel delivers.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A row matching the channel's topic filter was inserted.
    Insert(Message),
    /// Full presence snapshot, one record per tracked connection. Not a
    /// delta: a user connected twice appears twice.
    PresenceSync(Vec<PresenceRecord>),
}

#[async_trait]
pub trait Realtime: Send + Sync {
    /// Open a channel keyed by topic. Nothing is delivered until
    /// [`ChannelHandle::subscribe`] acknowledges.
    async fn open(&self, topic: &str, presence_key: &str) -> AppResult<Arc<dyn ChannelHandle>>;
}

#[async_trait]
pub trait ChannelHandle: Send + Sync {
    /// Attach to the channel. A returned receiver is the subscribe
    /// acknowledgment; insert delivery is at-least-once from then on.
    async fn subscribe(&self) -> AppResult<mpsc::Receiver<ChannelEvent>>;

    /// Publish this connection's presence record, overwriting the previous
    /// one. Every track fans a fresh snapshot out to all subscribers.
    async fn track(&self, record: PresenceRecord) -> AppResult<()>;

    /// Withdraw this connection's presence record.
    async fn untrack(&self) -> AppResult<()>;

    /// Release the channel; presence vanishes with it.
    async fn close(&self) -> AppResult<()>;
}

#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Store an object at `bucket/path`. Refuses to overwrite.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> AppResult<()>;

    /// Public URL for a stored path. Purely local string work, no I/O.
    fn public_url(&self, bucket: &str, path: &str) -> String;

    async fn remove(&self, bucket: &str, path: &str) -> AppResult<()>;
}
