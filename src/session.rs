//! Process-wide session state: the authenticated identity and its profile
//! row, owned by an explicit [`SessionStore`] handle rather than a global.

use std::sync::{Arc, RwLock};

use serde_json::{Map, Value, json};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use tokio::sync::broadcast;

use crate::backend::{AuthChange, AuthUser, Store};
use crate::records::{Profile, ProfileChanges, timestamp};
use crate::{AppResult, Backend, Error};

#[derive(Default)]
struct SessionState {
    user: Option<AuthUser>,
    profile: Option<Profile>,
}

/// Outcome of the two-phase sign-up. The identity always exists when this is
/// returned; the profile row may have failed independently, leaving the
/// identity orphaned until the caller retries the row write.
#[derive(Debug)]
pub struct SignUpResult {
    pub user: AuthUser,
    pub profile: Result<Profile, Error>,
}

/// Outcome of the two-phase profile update. `metadata_updated` reports the
/// auth-identity write; `profile` reports the row write. A failed second
/// phase leaves the two stores inconsistent, and that is the caller's call.
#[derive(Debug)]
pub struct ProfileUpdateResult {
    pub metadata_updated: bool,
    pub profile: Result<Profile, Error>,
}

pub struct SessionStore {
    backend: Backend,
    state: Arc<RwLock<SessionState>>,
    watcher: Option<JoinHandle<()>>,
}

impl SessionStore {
    /// Resolve the current session, if any, and start watching the auth
    /// service's session-change feed for the lifetime of this store.
    pub async fn init(backend: Backend) -> AppResult<Self> {
        let state = Arc::new(RwLock::new(SessionState::default()));

        if let Some(session) = backend.auth.get_session().await? {
            // a session with a missing profile row is still a session
            let profile = match backend.store.fetch_profile(&session.user.id).await {
                Ok(profile) => Some(profile),
                Err(err) => {
                    warn!(user = %session.user.id, %err, "session resolved without profile");
                    None
                }
            };
            *write(&state) = SessionState {
                user: Some(session.user),
                profile,
            };
        }

        // subscribe before spawning so no change slips past the watcher
        let changes = backend.auth.changes();
        let watcher = tokio::spawn(watch(changes, Arc::clone(&backend.store), Arc::clone(&state)));

        Ok(Self {
            backend,
            state,
            watcher: Some(watcher),
        })
    }

    pub fn user(&self) -> Option<AuthUser> {
        read(&self.state).user.clone()
    }

    pub fn profile(&self) -> Option<Profile> {
        read(&self.state).profile.clone()
    }

    /// Create the identity, then the profile row. The row's display name
    /// falls back to the email's local part.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> AppResult<SignUpResult> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(Error::Validation("email and password are required".into()));
        }
        let full_name = full_name
            .map(str::to_owned)
            .unwrap_or_else(|| local_part(email));

        let session = self
            .backend
            .auth
            .sign_up(email, password, json!({ "full_name": full_name.clone() }))
            .await?;
        let user = session.user;
        info!(user = %user.id, "signed up");

        let profile = self
            .backend
            .store
            .upsert_profile(Profile {
                id: user.id.clone(),
                email: email.to_owned(),
                full_name: Some(full_name),
                avatar_url: Some(String::new()),
                created_at: timestamp(),
            })
            .await;

        match &profile {
            Ok(profile) => {
                *write(&self.state) = SessionState {
                    user: Some(user.clone()),
                    profile: Some(profile.clone()),
                };
            }
            Err(err) => {
                // identity exists, row doesn't; surfaced, not retried
                warn!(user = %user.id, %err, "profile write failed after sign-up");
                *write(&self.state) = SessionState {
                    user: Some(user.clone()),
                    profile: None,
                };
            }
        }

        Ok(SignUpResult { user, profile })
    }

    /// Sign in and load the profile row. A missing row fails the whole
    /// sign-in, unlike session resolution at startup.
    pub async fn sign_in(&self, email: &str, password: &str) -> AppResult<Profile> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(Error::Validation("email and password are required".into()));
        }

        let session = self.backend.auth.sign_in(email, password).await?;
        let profile = self
            .backend
            .store
            .fetch_profile(&session.user.id)
            .await?;
        info!(user = %session.user.id, "signed in");

        *write(&self.state) = SessionState {
            user: Some(session.user),
            profile: Some(profile.clone()),
        };
        Ok(profile)
    }

    /// Clears local identity state only once the backend accepted the
    /// sign-out.
    pub async fn sign_out(&self) -> AppResult<()> {
        self.backend.auth.sign_out().await?;
        *write(&self.state) = SessionState::default();
        info!("signed out");
        Ok(())
    }

    /// Partial update of the caller's profile. When the display name
    /// changes, the auth identity's metadata is written first and the row
    /// second; the two writes are not atomic.
    pub async fn update_profile(&self, changes: ProfileChanges) -> AppResult<ProfileUpdateResult> {
        let user = self.user().ok_or(Error::NoSession)?;
        if changes.is_empty() {
            return Err(Error::Validation("no profile fields to update".into()));
        }

        let mut metadata_updated = false;
        if let Some(full_name) = &changes.full_name {
            let mut metadata = Map::new();
            metadata.insert("full_name".into(), Value::String(full_name.clone()));
            if let Some(avatar_url) = &changes.avatar_url {
                metadata.insert("avatar_url".into(), Value::String(avatar_url.clone()));
            }
            self.backend
                .auth
                .update_user_metadata(Value::Object(metadata))
                .await?;
            metadata_updated = true;
        }

        let email_change = changes.email.clone();
        let profile = self.backend.store.update_profile(&user.id, changes).await;

        match &profile {
            Ok(profile) => {
                let mut state = write(&self.state);
                state.profile = Some(profile.clone());
                if let (Some(email), Some(user)) = (email_change, state.user.as_mut()) {
                    user.email = email;
                }
            }
            Err(err) => {
                warn!(user = %user.id, metadata_updated, %err, "profile row update failed");
            }
        }

        Ok(ProfileUpdateResult {
            metadata_updated,
            profile,
        })
    }

    /// Stop watching session changes. Runs on drop as well.
    pub fn shutdown(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn watch(
    mut changes: broadcast::Receiver<AuthChange>,
    store: Arc<dyn Store>,
    state: Arc<RwLock<SessionState>>,
) {
    loop {
        match changes.recv().await {
            Ok(AuthChange::SignedIn(user)) => {
                let profile = store.fetch_profile(&user.id).await.ok();
                let mut state = write(&state);
                // a sign-up broadcast can outrun the profile upsert; don't
                // let a missed fetch erase a profile we already hold
                let same_user = state.user.as_ref().is_some_and(|u| u.id == user.id);
                if profile.is_some() || !same_user {
                    state.profile = profile;
                }
                state.user = Some(user);
            }
            Ok(AuthChange::SignedOut) => {
                *write(&state) = SessionState::default();
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "session change feed lagged");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn local_part(email: &str) -> String {
    email
        .split_once('@')
        .map(|(local, _)| local)
        .unwrap_or(email)
        .to_owned()
}

fn read(state: &RwLock<SessionState>) -> std::sync::RwLockReadGuard<'_, SessionState> {
    state.read().unwrap_or_else(|e| e.into_inner())
}

fn write(state: &RwLock<SessionState>) -> std::sync::RwLockWriteGuard<'_, SessionState> {
    state.write().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_part_strips_the_domain() {
        assert_eq!(local_part("alice@example.com"), "alice");
        assert_eq!(local_part("no-domain"), "no-domain");
    }
}
