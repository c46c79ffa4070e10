//! Per-browser-session auth state
//!
//! Caches the signed-in user, their profile and their attendance records.
//! The cache follows the session client's events: a listener task resyncs
//! on every session change and is cancelled when the context is dropped.
//! Sign-out clears the cache.

use heardlive_common::models::{AuthUser, ExperienceWithArtist, Profile, UserId};
use heardlive_common::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use super::session_client::SessionClient;
use crate::services::DataStore;

/// Cached auth state as the pages see it
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuthSnapshot {
    pub user: Option<AuthUser>,
    pub profile: Option<Profile>,
    pub experiences: Vec<ExperienceWithArtist>,
    pub loading: bool,
    /// Set once profile and experiences were read for `user`
    #[serde(skip)]
    loaded: bool,
}

struct ContextInner {
    client: Arc<SessionClient>,
    store: Arc<dyn DataStore>,
    state: RwLock<AuthSnapshot>,
    /// Serializes resyncs so one session change triggers one load
    sync_lock: Mutex<()>,
}

impl ContextInner {
    async fn sync(&self) -> Result<()> {
        let _guard = self.sync_lock.lock().await;
        let user = self.client.user().await;

        let Some(user) = user else {
            let mut state = self.state.write().await;
            if state.user.is_some() {
                tracing::debug!("Clearing cached auth state");
            }
            *state = AuthSnapshot::default();
            return Ok(());
        };

        {
            let mut state = self.state.write().await;
            if state.loaded && state.user.as_ref().map(|u| u.id) == Some(user.id) {
                // Same identity (e.g. token refresh); cached rows stay valid
                state.user = Some(user);
                return Ok(());
            }
            *state = AuthSnapshot {
                user: Some(user.clone()),
                loading: true,
                ..Default::default()
            };
        }

        tracing::debug!(user_id = %user.id, "Loading profile and experiences");
        let loaded = self.load(user.id).await;

        let mut state = self.state.write().await;
        state.loading = false;
        let (profile, experiences) = loaded?;
        state.profile = profile;
        state.experiences = experiences;
        state.loaded = true;
        Ok(())
    }

    async fn load(&self, user_id: UserId) -> Result<(Option<Profile>, Vec<ExperienceWithArtist>)> {
        let profile = self.store.profile_by_id(user_id).await?;
        let experiences = self.store.experiences_for_user(user_id).await?;
        Ok((profile, experiences))
    }
}

pub struct AuthContext {
    inner: Arc<ContextInner>,
    cancel: CancellationToken,
}

impl AuthContext {
    /// Create the context and start following the client's session events
    pub fn start(client: Arc<SessionClient>, store: Arc<dyn DataStore>) -> Self {
        let inner = Arc::new(ContextInner {
            client,
            store,
            state: RwLock::new(AuthSnapshot::default()),
            sync_lock: Mutex::new(()),
        });
        let cancel = CancellationToken::new();

        let mut rx = inner.client.events().subscribe();
        let listener = inner.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(event) => {
                            tracing::debug!(event = event.event_type(), "Session change");
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped = skipped, "Session events lagged; resyncing");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }

                if let Err(e) = listener.sync().await {
                    tracing::warn!(error = %e, "Failed to refresh auth state");
                }
            }
            tracing::debug!("Auth context listener stopped");
        });

        Self { inner, cancel }
    }

    pub fn client(&self) -> &Arc<SessionClient> {
        &self.inner.client
    }

    /// Bring the cache in line with the client's current session
    ///
    /// A no-op when the listener already did it.
    pub async fn sync(&self) -> Result<()> {
        self.inner.sync().await
    }

    pub async fn snapshot(&self) -> AuthSnapshot {
        self.inner.state.read().await.clone()
    }

    pub async fn user(&self) -> Option<AuthUser> {
        self.inner.state.read().await.user.clone()
    }

    pub async fn profile(&self) -> Option<Profile> {
        self.inner.state.read().await.profile.clone()
    }

    pub async fn experiences(&self) -> Vec<ExperienceWithArtist> {
        self.inner.state.read().await.experiences.clone()
    }

    /// The canonical record for an artist: the newest one held
    pub async fn experience_for_artist(&self, artist_id: &str) -> Option<ExperienceWithArtist> {
        experience_for_artist(&self.inner.state.read().await.experiences, artist_id).cloned()
    }

    fn signed_in_id(state: &AuthSnapshot) -> Result<UserId> {
        state.user.as_ref().map(|u| u.id).ok_or(Error::Unauthenticated)
    }

    /// Re-fetch the signed-in user's profile row
    pub async fn refresh_profile(&self) -> Result<Option<Profile>> {
        let user_id = Self::signed_in_id(&*self.inner.state.read().await)?;
        let profile = self.inner.store.profile_by_id(user_id).await?;

        let mut state = self.inner.state.write().await;
        if state.user.as_ref().map(|u| u.id) == Some(user_id) {
            state.profile = profile.clone();
        }
        Ok(profile)
    }

    /// Re-fetch the full attendance list after a write
    pub async fn refresh_experiences(&self) -> Result<()> {
        let user_id = Self::signed_in_id(&*self.inner.state.read().await)?;
        let experiences = self.inner.store.experiences_for_user(user_id).await?;

        let mut state = self.inner.state.write().await;
        if state.user.as_ref().map(|u| u.id) == Some(user_id) {
            state.experiences = experiences;
        }
        Ok(())
    }
}

impl Drop for AuthContext {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// First record for `artist_id` in a newest-first list
pub fn experience_for_artist<'a>(
    experiences: &'a [ExperienceWithArtist],
    artist_id: &str,
) -> Option<&'a ExperienceWithArtist> {
    experiences
        .iter()
        .find(|e| e.experience.artist_id == artist_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::MemoryBackend;
    use crate::services::SignUpMetadata;
    use heardlive_common::models::NewProfile;
    use std::time::Duration;

    async fn signed_in_context() -> (Arc<MemoryBackend>, AuthContext) {
        let backend = Arc::new(MemoryBackend::new());
        let client = Arc::new(SessionClient::new(backend.clone()));
        let context = AuthContext::start(client.clone(), backend.clone());

        let session = client
            .sign_up(
                "fan@example.com",
                "secret123",
                &SignUpMetadata {
                    username: "fan".into(),
                    name: None,
                },
            )
            .await
            .unwrap();
        backend
            .insert_profile(
                &session.access_token,
                &NewProfile {
                    id: session.user.id,
                    username: "fan".into(),
                    name: None,
                },
            )
            .await
            .unwrap();
        (backend, context)
    }

    #[tokio::test]
    async fn test_sync_loads_once_per_identity() {
        let (backend, context) = signed_in_context().await;

        context.sync().await.unwrap();
        context.sync().await.unwrap();

        let snapshot = context.snapshot().await;
        assert!(snapshot.user.is_some());
        assert!(!snapshot.loading);
        assert!(backend.calls("experiences_for_user").await <= 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_retried_on_next_sync() {
        let backend = Arc::new(MemoryBackend::new());
        let client = Arc::new(SessionClient::new(backend.clone()));
        let context = AuthContext::start(client.clone(), backend.clone());

        backend.fail_operation(Some("experiences_for_user")).await;
        let session = client
            .sign_up(
                "fan@example.com",
                "secret123",
                &SignUpMetadata {
                    username: "fan".into(),
                    name: None,
                },
            )
            .await
            .unwrap();
        backend
            .insert_profile(
                &session.access_token,
                &NewProfile {
                    id: session.user.id,
                    username: "fan".into(),
                    name: None,
                },
            )
            .await
            .unwrap();

        assert!(context.sync().await.is_err());
        assert!(context.profile().await.is_none());

        backend.fail_operation(None).await;
        context.sync().await.unwrap();

        let snapshot = context.snapshot().await;
        assert_eq!(snapshot.user.map(|u| u.id), Some(session.user.id));
        assert_eq!(
            snapshot.profile.and_then(|p| p.username).as_deref(),
            Some("fan")
        );
        assert!(!snapshot.loading);
        assert!(backend.calls("experiences_for_user").await >= 2);
    }

    #[tokio::test]
    async fn test_sign_out_clears_cache() {
        let (_backend, context) = signed_in_context().await;
        context.sync().await.unwrap();
        assert!(context.user().await.is_some());

        context.client().sign_out().await;
        context.sync().await.unwrap();

        let snapshot = context.snapshot().await;
        assert!(snapshot.user.is_none());
        assert!(snapshot.profile.is_none());
        assert!(snapshot.experiences.is_empty());
    }

    #[tokio::test]
    async fn test_dropping_context_stops_listener() {
        let backend = Arc::new(MemoryBackend::new());
        let client = Arc::new(SessionClient::new(backend.clone()));
        let context = AuthContext::start(client.clone(), backend);

        // Give the listener a chance to start
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(client.events().subscriber_count(), 1);

        drop(context);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(client.events().subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_refresh_requires_sign_in() {
        let backend = Arc::new(MemoryBackend::new());
        let client = Arc::new(SessionClient::new(backend.clone()));
        let context = AuthContext::start(client, backend);
        assert!(matches!(
            context.refresh_experiences().await,
            Err(Error::Unauthenticated)
        ));
    }
}
