//! Typed client over the identity provider for one browser session
//!
//! Holds the provider-issued session and publishes a [`SessionEvent`] on
//! its bus after every call that changes who is signed in.

use chrono::Utc;
use heardlive_common::events::{EventBus, SessionEvent};
use heardlive_common::models::{AuthSession, AuthUser};
use heardlive_common::{Error, Result};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::services::{IdentityProvider, SignUpMetadata};

/// Events buffered per browser session before slow subscribers lag
const EVENT_CAPACITY: usize = 16;

pub struct SessionClient {
    identity: Arc<dyn IdentityProvider>,
    events: EventBus,
    session: RwLock<Option<AuthSession>>,
}

impl SessionClient {
    pub fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            identity,
            events: EventBus::new(EVENT_CAPACITY),
            session: RwLock::new(None),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    async fn establish(&self, session: AuthSession) -> AuthSession {
        tracing::info!(user_id = %session.user.id, "Session established");
        *self.session.write().await = Some(session.clone());
        self.events.emit_lossy(SessionEvent::signed_in(session.user.clone()));
        session
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &SignUpMetadata,
    ) -> Result<AuthSession> {
        let session = self.identity.sign_up(email, password, metadata).await?;
        Ok(self.establish(session).await)
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession> {
        let session = self.identity.sign_in_with_password(email, password).await?;
        Ok(self.establish(session).await)
    }

    pub async fn sign_in_with_id_token(&self, provider: &str, id_token: &str) -> Result<AuthSession> {
        let session = self.identity.sign_in_with_id_token(provider, id_token).await?;
        Ok(self.establish(session).await)
    }

    /// End the session locally, then tell the provider
    ///
    /// The local session is dropped even when the provider call fails so
    /// the browser is never left half signed in.
    pub async fn sign_out(&self) {
        let Some(session) = self.session.write().await.take() else {
            return;
        };

        if let Err(e) = self.identity.sign_out(&session.access_token).await {
            tracing::warn!(error = %e, "Provider sign-out failed; session dropped locally");
        }

        tracing::info!(user_id = %session.user.id, "Signed out");
        self.events.emit_lossy(SessionEvent::signed_out());
    }

    /// Current session, refreshed first when its token is about to expire
    ///
    /// A failed refresh ends the session.
    pub async fn current_session(&self) -> Option<AuthSession> {
        let mut guard = self.session.write().await;
        let session = guard.as_ref()?;

        if !session.is_expired_at(Utc::now()) {
            return Some(session.clone());
        }

        let refresh_token = session.refresh_token.clone();
        match self.identity.refresh_session(&refresh_token).await {
            Ok(fresh) => {
                tracing::debug!(user_id = %fresh.user.id, "Access token refreshed");
                *guard = Some(fresh.clone());
                self.events
                    .emit_lossy(SessionEvent::token_refreshed(fresh.user.clone()));
                Some(fresh)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed; ending session");
                *guard = None;
                self.events.emit_lossy(SessionEvent::signed_out());
                None
            }
        }
    }

    /// Signed-in user without touching the provider
    pub async fn user(&self) -> Option<AuthUser> {
        self.session.read().await.as_ref().map(|s| s.user.clone())
    }

    /// Access token for writes, or `Unauthenticated`
    pub async fn access_token(&self) -> Result<String> {
        self.current_session()
            .await
            .map(|s| s.access_token)
            .ok_or(Error::Unauthenticated)
    }
}
