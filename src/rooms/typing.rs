//! Keystrokes to presence updates: publish `typing: true` once per burst,
//! `typing: false` after a quiet period, on an emptied draft, and on send.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::backend::ChannelHandle;
use crate::records::PresenceRecord;
use crate::AppResult;

/// How long the draft has to sit untouched before typing is considered
/// over.
pub const TYPING_QUIET_PERIOD: Duration = Duration::from_millis(2000);

/// Trailing-edge debounce. At most one timer is live; every keystroke
/// disarms and re-arms it, and every exit path disarms it so nothing
/// publishes after teardown.
pub struct TypingDebounce {
    handle: Arc<dyn ChannelHandle>,
    user_id: String,
    quiet: Duration,
    typing: Arc<AtomicBool>,
    timer: Option<JoinHandle<()>>,
}

impl TypingDebounce {
    pub fn new(handle: Arc<dyn ChannelHandle>, user_id: &str) -> Self {
        Self {
            handle,
            user_id: user_id.to_owned(),
            quiet: TYPING_QUIET_PERIOD,
            typing: Arc::new(AtomicBool::new(false)),
            timer: None,
        }
    }

    pub fn set_quiet_period(&mut self, quiet: Duration) {
        self.quiet = quiet;
    }

    /// Feed the current draft after a keystroke.
    pub async fn input(&mut self, draft: &str) -> AppResult<()> {
        if draft.is_empty() {
            return self.stop().await;
        }
        if !self.typing.swap(true, Ordering::SeqCst) {
            self.handle
                .track(PresenceRecord::new(&self.user_id, true))
                .await?;
        }
        self.rearm();
        Ok(())
    }

    /// Publish `typing: false` now and disarm the timer. The send path
    /// calls this before the insert, whatever the timer had left.
    pub async fn stop(&mut self) -> AppResult<()> {
        self.disarm();
        if self.typing.swap(false, Ordering::SeqCst) {
            self.handle
                .track(PresenceRecord::new(&self.user_id, false))
                .await?;
        }
        Ok(())
    }

    /// Disarm without publishing; the teardown path, where untracking the
    /// channel withdraws presence anyway.
    pub fn cancel(&mut self) {
        self.disarm();
        self.typing.store(false, Ordering::SeqCst);
    }

    fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn rearm(&mut self) {
        self.disarm();
        let handle = Arc::clone(&self.handle);
        let typing = Arc::clone(&self.typing);
        let user_id = self.user_id.clone();
        let quiet = self.quiet;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            if typing.swap(false, Ordering::SeqCst) {
                let _ = handle.track(PresenceRecord::new(&user_id, false)).await;
            }
        }));
    }
}

impl Drop for TypingDebounce {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    use crate::backend::ChannelEvent;

    #[derive(Default)]
    struct RecordingChannel {
        published: Mutex<Vec<bool>>,
    }

    #[async_trait]
    impl ChannelHandle for RecordingChannel {
        async fn subscribe(&self) -> AppResult<mpsc::Receiver<ChannelEvent>> {
            Ok(mpsc::channel(1).1)
        }

        async fn track(&self, record: PresenceRecord) -> AppResult<()> {
            self.published.lock().unwrap().push(record.typing);
            Ok(())
        }

        async fn untrack(&self) -> AppResult<()> {
            Ok(())
        }

        async fn close(&self) -> AppResult<()> {
            Ok(())
        }
    }

    fn debounce(channel: &Arc<RecordingChannel>) -> TypingDebounce {
        let handle: Arc<dyn ChannelHandle> = channel.clone();
        TypingDebounce::new(handle, "u1")
    }

    fn published(channel: &RecordingChannel) -> Vec<bool> {
        channel.published.lock().unwrap().clone()
    }

    #[tokio::test(start_paused = true)]
    async fn one_keystroke_publishes_true_then_false() {
        let channel = Arc::new(RecordingChannel::default());
        let mut typing = debounce(&channel);

        typing.input("h").await.unwrap();
        assert_eq!(published(&channel), [true]);

        tokio::time::sleep(TYPING_QUIET_PERIOD + Duration::from_millis(100)).await;
        assert_eq!(published(&channel), [true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_keystrokes_defer_the_false() {
        let channel = Arc::new(RecordingChannel::default());
        let mut typing = debounce(&channel);

        for draft in ["h", "he", "hel", "hell", "hello"] {
            typing.input(draft).await.unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        // every keystroke landed inside the quiet period of the previous one
        assert_eq!(published(&channel), [true]);

        tokio::time::sleep(TYPING_QUIET_PERIOD).await;
        assert_eq!(published(&channel), [true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn emptied_draft_publishes_false_immediately() {
        let channel = Arc::new(RecordingChannel::default());
        let mut typing = debounce(&channel);

        typing.input("h").await.unwrap();
        typing.input("").await.unwrap();
        assert_eq!(published(&channel), [true, false]);

        // the timer was cancelled with the draft
        tokio::time::sleep(TYPING_QUIET_PERIOD * 2).await;
        assert_eq!(published(&channel), [true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_beats_the_timer_on_send() {
        let channel = Arc::new(RecordingChannel::default());
        let mut typing = debounce(&channel);

        typing.input("hi").await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        typing.stop().await.unwrap();
        assert_eq!(published(&channel), [true, false]);

        tokio::time::sleep(TYPING_QUIET_PERIOD * 2).await;
        assert_eq!(published(&channel), [true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_publishes_nothing() {
        let channel = Arc::new(RecordingChannel::default());
        let mut typing = debounce(&channel);

        typing.input("hi").await.unwrap();
        typing.cancel();
        tokio::time::sleep(TYPING_QUIET_PERIOD * 2).await;
        assert_eq!(published(&channel), [true]);
    }
}
