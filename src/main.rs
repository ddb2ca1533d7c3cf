use anyhow::Result;
use pairtalk::backend::local::LocalBackend;
use pairtalk::profiles;
use pairtalk::records::{Message, ProfileChanges};
use pairtalk::rooms::channel::ChatEvent;
use pairtalk::rooms::chat::ChatSession;
use pairtalk::session::SessionStore;
use tokio::time::{Duration, timeout};
use tracing::info;

/// Scripted two-device exchange against the in-process backend. Point
/// DATABASE_URL at a sqlite file to keep the rows around between runs.
#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pairtalk=debug".into()),
        )
        .init();

    let db_url = dotenv::var("DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_owned());
    let service = LocalBackend::open(&db_url).await?;

    let alice_device = service.client();
    let bob_device = service.client();

    let alice = SessionStore::init(alice_device.clone()).await?;
    alice.sign_up("alice@example.com", "hunter2", None).await?.profile?;
    let bob = SessionStore::init(bob_device.clone()).await?;
    bob.sign_up("bob@example.com", "hunter2", Some("Bob Ross")).await?.profile?;

    let alice_id = alice.user().expect("alice session").id;
    let bob_id = bob.user().expect("bob session").id;

    for contact in profiles::contacts(alice_device.store.as_ref(), &alice_id).await? {
        info!(name = contact.full_name.as_deref().unwrap_or("?"), "alice sees contact");
    }

    let mut alice_chat = ChatSession::open(&alice_device, &alice_id, &bob_id).await?;
    let mut bob_chat = ChatSession::open(&bob_device, &bob_id, &alice_id).await?;
    info!(room = %alice_chat.room().id, "room ready");

    alice_chat.set_draft("hi bob!").await?;
    alice_chat.send().await?;
    let received = wait_for_message(&mut bob_chat).await?;
    info!(content = %received.content, "bob received");

    bob_chat.set_draft("h").await?;
    wait_for_typing(&mut alice_chat, true).await?;
    info!("alice sees bob typing");

    bob_chat.set_draft("hey alice").await?;
    bob_chat.send().await?;
    wait_for_typing(&mut alice_chat, false).await?;
    let received = wait_for_message(&mut alice_chat).await?;
    info!(content = %received.content, "alice received");
    info!(messages = alice_chat.messages().len(), "alice's history");

    let url = profiles::upload_avatar(
        bob_device.blobs.as_ref(),
        &bob_id,
        vec![0xFF, 0xD8, 0xFF],
        "image/jpeg",
    )
    .await?;
    bob.update_profile(ProfileChanges {
        avatar_url: Some(url),
        ..Default::default()
    })
    .await?
    .profile?;
    let bob_name = bob.profile().and_then(|p| p.full_name).unwrap_or_default();
    info!(name = %bob_name, "bob's profile updated");

    alice_chat.close().await?;
    bob_chat.close().await?;
    alice.sign_out().await?;
    bob.sign_out().await?;
    Ok(())
}

async fn wait_for_message(chat: &mut ChatSession) -> Result<Message> {
    loop {
        match timeout(Duration::from_secs(5), chat.next_event()).await? {
            Some(ChatEvent::Message(message)) => return Ok(message),
            Some(ChatEvent::PeerTyping(_)) => continue,
            None => anyhow::bail!("channel closed while waiting for a message"),
        }
    }
}

async fn wait_for_typing(chat: &mut ChatSession, want: bool) -> Result<()> {
    loop {
        match timeout(Duration::from_secs(5), chat.next_event()).await? {
            Some(ChatEvent::PeerTyping(typing)) if typing == want => return Ok(()),
            Some(_) => continue,
            None => anyhow::bail!("channel closed while waiting for typing"),
        }
    }
}
