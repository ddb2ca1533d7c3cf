use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use super::realtime::RealtimeHub;
use crate::backend::Store;
use crate::records::{Message, NewMessage, Profile, ProfileChanges, Room, timestamp};
use crate::{AppResult, Error};

pub struct SqliteStore {
    pool: SqlitePool,
    hub: RealtimeHub,
}

impl SqliteStore {
    pub(crate) fn new(pool: SqlitePool, hub: RealtimeHub) -> Self {
        Self { pool, hub }
    }
}

fn conflict_on_unique(err: sqlx::Error, what: String) -> Error {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return Error::Conflict(what);
        }
    }
    Error::Db(err)
}

type ProfileRow = (String, String, Option<String>, Option<String>, String);

fn profile_from_row((id, email, full_name, avatar_url, created_at): ProfileRow) -> Profile {
    Profile {
        id,
        email,
        full_name,
        avatar_url,
        created_at,
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn fetch_profile(&self, id: &str) -> AppResult<Profile> {
        let row: Option<ProfileRow> =
            sqlx::query_as("SELECT id,email,full_name,avatar_url,created_at FROM profiles WHERE id=?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(profile_from_row).ok_or(Error::NotFound("profile"))
    }

    async fn upsert_profile(&self, profile: Profile) -> AppResult<Profile> {
        sqlx::query(
            "INSERT INTO profiles (id,email,full_name,avatar_url,created_at) VALUES (?,?,?,?,?) \
             ON CONFLICT(id) DO UPDATE SET email=excluded.email, full_name=excluded.full_name, \
             avatar_url=excluded.avatar_url",
        )
        .bind(&profile.id)
        .bind(&profile.email)
        .bind(&profile.full_name)
        .bind(&profile.avatar_url)
        .bind(&profile.created_at)
        .execute(&self.pool)
        .await?;
        self.fetch_profile(&profile.id).await
    }

    async fn update_profile(&self, id: &str, changes: ProfileChanges) -> AppResult<Profile> {
        let mut sets = Vec::new();
        let mut values = Vec::new();
        if let Some(email) = changes.email {
            sets.push("email=?");
            values.push(email);
        }
        if let Some(full_name) = changes.full_name {
            sets.push("full_name=?");
            values.push(full_name);
        }
        if let Some(avatar_url) = changes.avatar_url {
            sets.push("avatar_url=?");
            values.push(avatar_url);
        }
        if sets.is_empty() {
            return Err(Error::Validation("no profile fields to update".into()));
        }

        let sql = format!("UPDATE profiles SET {} WHERE id=?", sets.join(","));
        let mut query = sqlx::query(&sql);
        for value in values {
            query = query.bind(value);
        }
        let result = query.bind(id).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound("profile"));
        }
        self.fetch_profile(id).await
    }

    async fn list_profiles(&self) -> AppResult<Vec<Profile>> {
        let rows: Vec<ProfileRow> =
            sqlx::query_as("SELECT id,email,full_name,avatar_url,created_at FROM profiles ORDER BY created_at")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(profile_from_row).collect())
    }

    async fn fetch_room(&self, id: &str) -> AppResult<Room> {
        let row: Option<(String, String, String, String)> =
            sqlx::query_as("SELECT id,user1_id,user2_id,created_at FROM rooms WHERE id=?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        let Some((id, user1_id, user2_id, created_at)) = row else {
            return Err(Error::NotFound("room"));
        };
        Ok(Room {
            id,
            user1_id,
            user2_id,
            created_at,
        })
    }

    async fn insert_room(&self, room: Room) -> AppResult<Room> {
        sqlx::query("INSERT INTO rooms (id,user1_id,user2_id,created_at) VALUES (?,?,?,?)")
            .bind(&room.id)
            .bind(&room.user1_id)
            .bind(&room.user2_id)
            .bind(&room.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, format!("room {}", room.id)))?;
        Ok(room)
    }

    async fn messages_in_room(&self, room_id: &str) -> AppResult<Vec<Message>> {
        // rowid breaks created_at ties in insertion order
        let rows: Vec<(String, String, String, String, String, bool)> = sqlx::query_as(
            "SELECT id,content,sender_id,room_id,created_at,is_read FROM messages \
             WHERE room_id=? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, content, sender_id, room_id, created_at, is_read)| Message {
                id,
                content,
                sender_id,
                room_id,
                created_at,
                is_read,
            })
            .collect())
    }

    async fn insert_message(&self, message: NewMessage) -> AppResult<Message> {
        let message = Message {
            id: Uuid::now_v7().to_string(),
            content: message.content,
            sender_id: message.sender_id,
            room_id: message.room_id,
            created_at: timestamp(),
            is_read: false,
        };
        sqlx::query(
            "INSERT INTO messages (id,content,sender_id,room_id,created_at,is_read) VALUES (?,?,?,?,?,?)",
        )
        .bind(&message.id)
        .bind(&message.content)
        .bind(&message.sender_id)
        .bind(&message.room_id)
        .bind(&message.created_at)
        .bind(message.is_read)
        .execute(&self.pool)
        .await?;
        debug!(room = %message.room_id, sender = %message.sender_id, "message stored");
        self.hub.publish_insert(&message);
        Ok(message)
    }
}
