//! Per-room realtime coordination: one channel per mounted conversation,
//! message inserts merged into local history, presence snapshots collapsed
//! into an "is the other side typing" flag.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::backend::{ChannelEvent, ChannelHandle, Realtime};
use crate::records::{Message, PresenceRecord};
use crate::{AppResult, Error};

/// What a chat session hears from its room.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// A message reached the room, our own echoes included.
    Message(Message),
    /// Level, not edge: recomputed from every presence snapshot.
    PeerTyping(bool),
}

pub struct RoomChannel {
    handle: Arc<dyn ChannelHandle>,
    events: mpsc::Receiver<ChannelEvent>,
    history: Vec<Message>,
    peer_id: String,
    peer_typing: bool,
}

impl RoomChannel {
    /// Open the room's channel, subscribe, and announce ourselves the
    /// moment the subscription is acknowledged. Requires the room id and
    /// the local identity; without both, no network is touched.
    pub async fn open(
        realtime: &dyn Realtime,
        room_id: &str,
        local_id: &str,
        peer_id: &str,
    ) -> AppResult<Self> {
        if room_id.is_empty() || local_id.is_empty() {
            return Err(Error::Validation(
                "room id and local identity are required".into(),
            ));
        }
        let handle = realtime.open(room_id, local_id).await?;
        let events = handle.subscribe().await?;
        handle.track(PresenceRecord::new(local_id, false)).await?;
        debug!(room = room_id, "room channel subscribed");
        Ok(Self {
            handle,
            events,
            history: Vec::new(),
            peer_id: peer_id.to_owned(),
            peer_typing: false,
        })
    }

    /// Replace history with a fetched snapshot, keeping any live inserts
    /// that raced ahead of the fetch. Subscribing before fetching plus this
    /// id-dedup closes the missed-message window.
    pub fn hydrate(&mut self, mut snapshot: Vec<Message>) {
        for live in self.history.drain(..) {
            if !snapshot.iter().any(|m| m.id == live.id) {
                snapshot.push(live);
            }
        }
        self.history = snapshot;
    }

    pub fn messages(&self) -> &[Message] {
        &self.history
    }

    pub fn peer_typing(&self) -> bool {
        self.peer_typing
    }

    /// Shared handle for presence publishes (the typing debounce owns one).
    pub fn presence(&self) -> Arc<dyn ChannelHandle> {
        Arc::clone(&self.handle)
    }

    /// Next typed event, merging state as it goes. `None` once the channel
    /// is gone.
    pub async fn next(&mut self) -> Option<ChatEvent> {
        while let Some(event) = self.events.recv().await {
            match event {
                ChannelEvent::Insert(message) => {
                    if self.history.iter().any(|m| m.id == message.id) {
                        continue;
                    }
                    self.history.push(message.clone());
                    return Some(ChatEvent::Message(message));
                }
                ChannelEvent::PresenceSync(records) => {
                    self.peer_typing = peer_is_typing(&records, &self.peer_id);
                    return Some(ChatEvent::PeerTyping(self.peer_typing));
                }
            }
        }
        None
    }

    /// Withdraw presence, then release the channel. Both run even if the
    /// first fails; the first failure wins the report.
    pub async fn close(&mut self) -> AppResult<()> {
        let untracked = self.handle.untrack().await;
        let closed = self.handle.close().await;
        untracked.and(closed)
    }
}

/// The peer is typing iff any of their connections says so. No records at
/// all means not typing.
fn peer_is_typing(records: &[PresenceRecord], peer_id: &str) -> bool {
    records
        .iter()
        .any(|record| record.user_id == peer_id && record.typing)
}
