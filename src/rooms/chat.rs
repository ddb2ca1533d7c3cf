//! A mounted conversation: the composition of room provisioning, history
//! hydration, the live channel and the typing debounce. Rendering is the
//! caller's business; this owns the state.

use std::sync::Arc;

use tokio::time::Duration;
use tracing::debug;

use super::channel::{ChatEvent, RoomChannel};
use super::history;
use super::typing::TypingDebounce;
use crate::backend::Store;
use crate::records::{Message, NewMessage, Room};
use crate::{AppResult, Backend, Error};

pub struct ChatSession {
    store: Arc<dyn Store>,
    room: Room,
    local_id: String,
    channel: RoomChannel,
    typing: TypingDebounce,
    draft: String,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("room", &self.room)
            .field("local_id", &self.local_id)
            .field("draft", &self.draft)
            .finish_non_exhaustive()
    }
}

impl ChatSession {
    /// Provision the pair's room, subscribe to it, then hydrate history.
    /// The channel is live before the fetch, so an insert racing the
    /// hydration is deduplicated by id instead of lost.
    pub async fn open(backend: &Backend, local_id: &str, peer_id: &str) -> AppResult<Self> {
        if local_id.is_empty() || peer_id.is_empty() {
            return Err(Error::Validation(
                "both participant identities are required".into(),
            ));
        }

        let room = super::provision_room(backend.store.as_ref(), local_id, peer_id).await?;
        let mut channel =
            RoomChannel::open(backend.realtime.as_ref(), &room.id, local_id, peer_id).await?;
        let snapshot = history::load_history(backend.store.as_ref(), &room.id).await?;
        channel.hydrate(snapshot);
        let typing = TypingDebounce::new(channel.presence(), local_id);

        Ok(Self {
            store: Arc::clone(&backend.store),
            room,
            local_id: local_id.to_owned(),
            channel,
            typing,
            draft: String::new(),
        })
    }

    pub fn room(&self) -> &Room {
        &self.room
    }

    pub fn messages(&self) -> &[Message] {
        self.channel.messages()
    }

    pub fn peer_typing(&self) -> bool {
        self.channel.peer_typing()
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_typing_quiet(&mut self, quiet: Duration) {
        self.typing.set_quiet_period(quiet);
    }

    /// Update the draft from a keystroke; drives typing presence.
    pub async fn set_draft(&mut self, text: &str) -> AppResult<()> {
        self.draft = text.to_owned();
        self.typing.input(text).await
    }

    /// Publish `typing: false`, insert the draft, re-fetch the
    /// authoritative history, clear the draft. A failure anywhere leaves
    /// the previous history and the draft in place.
    pub async fn send(&mut self) -> AppResult<()> {
        let content = self.draft.trim().to_owned();
        if content.is_empty() {
            debug!(room = %self.room.id, "ignoring empty draft");
            return Ok(());
        }

        self.typing.stop().await?;
        let refreshed = history::send_message(
            self.store.as_ref(),
            NewMessage {
                room_id: self.room.id.clone(),
                sender_id: self.local_id.clone(),
                content,
            },
        )
        .await?;
        self.channel.hydrate(refreshed);
        self.draft.clear();
        Ok(())
    }

    /// Next typed event from the room; `None` once the channel is gone.
    pub async fn next_event(&mut self) -> Option<ChatEvent> {
        self.channel.next().await
    }

    /// Tear down: disarm the debounce, withdraw presence, release the
    /// channel. Cleanup is best-effort, never transactional.
    pub async fn close(mut self) -> AppResult<()> {
        self.typing.cancel();
        self.channel.close().await
    }
}
