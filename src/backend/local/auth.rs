use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

use crate::backend::{AuthApi, AuthChange, AuthSession, AuthUser};
use crate::records::timestamp;
use crate::{AppResult, Error};

/// Account directory shared between every client handle of a
/// [`LocalBackend`](super::LocalBackend); each handle keeps its own current
/// session, the way each installed app instance does against a hosted
/// service.
#[derive(Clone, Default)]
pub(crate) struct UserDirectory {
    inner: Arc<Mutex<HashMap<String, StoredUser>>>,
}

struct StoredUser {
    user: AuthUser,
    password: String,
}

impl UserDirectory {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, StoredUser>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct LocalAuth {
    users: UserDirectory,
    session: Mutex<Option<AuthSession>>,
    changes: broadcast::Sender<AuthChange>,
}

impl LocalAuth {
    pub(crate) fn new(users: UserDirectory) -> Self {
        Self {
            users,
            session: Mutex::new(None),
            changes: broadcast::channel(16).0,
        }
    }

    fn install(&self, session: AuthSession) {
        let user = session.user.clone();
        *self.session.lock().unwrap_or_else(|e| e.into_inner()) = Some(session);
        let _ = self.changes.send(AuthChange::SignedIn(user));
    }
}

#[async_trait]
impl AuthApi for LocalAuth {
    async fn sign_up(&self, email: &str, password: &str, metadata: Value) -> AppResult<AuthSession> {
        {
            let mut users = self.users.lock();
            if users.contains_key(email) {
                return Err(Error::rejected(
                    "email_taken",
                    format!("an account already exists for {email}"),
                ));
            }
            let user = AuthUser {
                id: Uuid::now_v7().to_string(),
                email: email.to_owned(),
                metadata,
                created_at: timestamp(),
            };
            users.insert(
                email.to_owned(),
                StoredUser {
                    user,
                    password: password.to_owned(),
                },
            );
        }
        info!(email, "account created");
        self.sign_in(email, password).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<AuthSession> {
        let user = {
            let users = self.users.lock();
            match users.get(email) {
                Some(stored) if stored.password == password => stored.user.clone(),
                _ => {
                    return Err(Error::rejected(
                        "invalid_credentials",
                        "invalid login credentials",
                    ));
                }
            }
        };
        let session = AuthSession {
            user,
            access_token: access_token(),
        };
        self.install(session.clone());
        Ok(session)
    }

    async fn sign_out(&self) -> AppResult<()> {
        let had_session = self
            .session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_some();
        if had_session {
            let _ = self.changes.send(AuthChange::SignedOut);
        }
        Ok(())
    }

    async fn get_session(&self) -> AppResult<Option<AuthSession>> {
        Ok(self
            .session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    async fn update_user_metadata(&self, metadata: Value) -> AppResult<AuthUser> {
        let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        let Some(session) = session.as_mut() else {
            return Err(Error::NoSession);
        };
        merge_metadata(&mut session.user.metadata, metadata);
        let mut users = self.users.lock();
        if let Some(stored) = users.get_mut(&session.user.email) {
            stored.user.metadata = session.user.metadata.clone();
        }
        Ok(session.user.clone())
    }

    fn changes(&self) -> broadcast::Receiver<AuthChange> {
        self.changes.subscribe()
    }
}

/// Keys merge into an existing metadata object; anything else replaces it.
fn merge_metadata(existing: &mut Value, patch: Value) {
    match (existing, patch) {
        (Value::Object(map), Value::Object(patch)) => {
            for (key, value) in patch {
                map.insert(key, value);
            }
        }
        (existing, patch) => *existing = patch,
    }
}

fn access_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
