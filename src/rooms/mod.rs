pub mod channel;
pub mod chat;
pub mod history;
pub mod typing;

use tracing::info;

use crate::backend::Store;
use crate::records::{Room, timestamp};
use crate::AppResult;

/// Stable conversation id for an unordered pair of participants: the two
/// identities sorted and joined with an underscore.
pub fn resolve_room_id(a: &str, b: &str) -> String {
    let (first, second) = sorted_pair(a, b);
    format!("{first}_{second}")
}

fn sorted_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Fetch the pair's room, creating it on first contact. Creation happens
/// only when the fetch missed with the distinguished not-found code; any
/// other failure aborts so a backend outage never masquerades as a missing
/// room. An existing room is never modified.
pub async fn provision_room(store: &dyn Store, a: &str, b: &str) -> AppResult<Room> {
    let id = resolve_room_id(a, b);
    match store.fetch_room(&id).await {
        Ok(room) => Ok(room),
        Err(err) if err.is_not_found() => {
            let (user1_id, user2_id) = sorted_pair(a, b);
            let room = store
                .insert_room(Room {
                    id,
                    user1_id: user1_id.to_owned(),
                    user2_id: user2_id.to_owned(),
                    created_at: timestamp(),
                })
                .await?;
            info!(room = %room.id, "chat room created");
            Ok(room)
        }
        Err(err) => Err(err),
    }
}
