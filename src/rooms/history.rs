use crate::backend::Store;
use crate::records::{Message, NewMessage};
use crate::AppResult;

/// Ordered snapshot of a room's messages, ascending by `created_at`. The
/// store decides tie order and we keep it.
pub async fn load_history(store: &dyn Store, room_id: &str) -> AppResult<Vec<Message>> {
    store.messages_in_room(room_id).await
}

/// Insert a message, then re-fetch the full history. The round trip buys
/// the sender the authoritative post-insert ordering instead of an
/// optimistic local append.
pub async fn send_message(store: &dyn Store, message: NewMessage) -> AppResult<Vec<Message>> {
    let room_id = message.room_id.clone();
    store.insert_message(message).await?;
    load_history(store, &room_id).await
}
