use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::backend::{ChannelEvent, ChannelHandle, Realtime};
use crate::records::{Message, PresenceRecord};
use crate::{AppResult, Error};

/// Per-topic fan-out hub. Subscribers get their own mpsc queue; presence is
/// keyed by connection and re-broadcast as a full snapshot on every change.
#[derive(Clone, Default)]
pub struct RealtimeHub {
    inner: Arc<Mutex<HubState>>,
}

#[derive(Default)]
struct HubState {
    topics: HashMap<String, Topic>,
    next_conn: u64,
}

#[derive(Default)]
struct Topic {
    subscribers: HashMap<u64, mpsc::Sender<ChannelEvent>>,
    // BTreeMap keeps snapshot order stable across syncs
    presence: BTreeMap<u64, PresenceRecord>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Row-insert fan-out, wired from the store: a message lands in the
    /// channel whose topic is its room id.
    pub(crate) fn publish_insert(&self, message: &Message) {
        let mut state = self.lock();
        if let Some(topic) = state.topics.get_mut(&message.room_id) {
            deliver(topic, ChannelEvent::Insert(message.clone()));
        }
    }
}

#[async_trait]
impl Realtime for RealtimeHub {
    async fn open(&self, topic: &str, presence_key: &str) -> AppResult<Arc<dyn ChannelHandle>> {
        let conn = {
            let mut state = self.lock();
            state.next_conn += 1;
            state.next_conn
        };
        debug!(topic, key = presence_key, conn, "channel opened");
        Ok(Arc::new(LocalChannel {
            inner: Arc::clone(&self.inner),
            topic: topic.to_owned(),
            presence_key: presence_key.to_owned(),
            conn,
            closed: AtomicBool::new(false),
        }))
    }
}

fn deliver(topic: &mut Topic, event: ChannelEvent) {
    // lossy on a full queue, dropped subscribers are pruned
    topic.subscribers.retain(|_, tx| match tx.try_send(event.clone()) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => true,
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    });
}

fn sync_presence(topic: &mut Topic) {
    let snapshot: Vec<PresenceRecord> = topic.presence.values().cloned().collect();
    deliver(topic, ChannelEvent::PresenceSync(snapshot));
}

pub struct LocalChannel {
    inner: Arc<Mutex<HubState>>,
    topic: String,
    presence_key: String,
    conn: u64,
    closed: AtomicBool,
}

impl LocalChannel {
    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn disconnect(&self) {
        let mut state = self.lock();
        if let Some(topic) = state.topics.get_mut(&self.topic) {
            topic.subscribers.remove(&self.conn);
            topic.presence.remove(&self.conn);
            sync_presence(topic);
            if topic.subscribers.is_empty() && topic.presence.is_empty() {
                state.topics.remove(&self.topic);
            }
        }
    }
}

#[async_trait]
impl ChannelHandle for LocalChannel {
    async fn subscribe(&self) -> AppResult<mpsc::Receiver<ChannelEvent>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ChannelClosed);
        }
        let (tx, rx) = mpsc::channel(64);
        let mut state = self.lock();
        state
            .topics
            .entry(self.topic.clone())
            .or_default()
            .subscribers
            .insert(self.conn, tx);
        Ok(rx)
    }

    async fn track(&self, record: PresenceRecord) -> AppResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ChannelClosed);
        }
        debug!(
            topic = %self.topic,
            key = %self.presence_key,
            typing = record.typing,
            "presence tracked"
        );
        let mut state = self.lock();
        let topic = state.topics.entry(self.topic.clone()).or_default();
        topic.presence.insert(self.conn, record);
        sync_presence(topic);
        Ok(())
    }

    async fn untrack(&self) -> AppResult<()> {
        let mut state = self.lock();
        if let Some(topic) = state.topics.get_mut(&self.topic) {
            topic.presence.remove(&self.conn);
            sync_presence(topic);
        }
        Ok(())
    }

    async fn close(&self) -> AppResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(topic = %self.topic, conn = self.conn, "channel closed");
            self.disconnect();
        }
        Ok(())
    }
}

impl Drop for LocalChannel {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.disconnect();
        }
    }
}
