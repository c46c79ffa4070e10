//! Sign-up and login forms
//!
//! Credential checks belong to the identity provider and handle
//! uniqueness to the data store. The gate only validates input shape,
//! offers a best-effort availability pre-check, and sequences the calls.

use heardlive_common::handle::{filter_handle_input, validate_handle};
use heardlive_common::models::{AuthSession, AuthUser, NewProfile, UserId};
use heardlive_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth_context::AuthContext;
use crate::services::{DataStore, SignUpMetadata};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Deserialize)]
pub struct SignUpForm {
    pub email: String,
    pub password: String,
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogInForm {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FederatedForm {
    pub provider: String,
    pub id_token: String,
}

/// The gate's tabs, each carrying its form
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "tab", rename_all = "snake_case")]
pub enum GateForm {
    SignUp(SignUpForm),
    LogIn(LogInForm),
}

/// Result of the handle pre-check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandleAvailability {
    /// Input after the typing filter
    pub handle: String,
    pub valid: bool,
    pub available: bool,
}

/// Check whether a handle could be claimed
///
/// Only shortens feedback while typing: the store's unique constraint
/// decides at write time. `exclude` lets a user keep their own handle.
pub async fn check_handle(
    store: &dyn DataStore,
    raw: &str,
    exclude: Option<UserId>,
) -> Result<HandleAvailability> {
    let handle = filter_handle_input(raw);
    if validate_handle(&handle).is_err() {
        return Ok(HandleAvailability {
            handle,
            valid: false,
            available: false,
        });
    }

    let taken = store.handle_exists(&handle, exclude).await?;
    Ok(HandleAvailability {
        handle,
        valid: true,
        available: !taken,
    })
}

fn validate_credentials(email: &str, password: &str) -> Result<()> {
    if !email.contains('@') {
        return Err(Error::InvalidInput("Enter a valid email address".to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::InvalidInput(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

pub struct AuthGate<'a> {
    auth: &'a AuthContext,
    store: Arc<dyn DataStore>,
}

impl<'a> AuthGate<'a> {
    pub fn new(auth: &'a AuthContext, store: Arc<dyn DataStore>) -> Self {
        Self { auth, store }
    }

    pub async fn check_handle(&self, raw: &str) -> Result<HandleAvailability> {
        let exclude = self.auth.user().await.map(|u| u.id);
        check_handle(self.store.as_ref(), raw, exclude).await
    }

    /// Submit whichever tab is active; `on_complete` runs once signed in
    pub async fn submit<F>(&self, form: GateForm, on_complete: F) -> Result<AuthUser>
    where
        F: FnOnce(&AuthUser) + Send,
    {
        let user = match form {
            GateForm::SignUp(form) => self.sign_up(form).await?,
            GateForm::LogIn(form) => self.log_in(form).await?,
        };
        on_complete(&user);
        Ok(user)
    }

    /// Create the identity, then claim the handle with the profile row
    ///
    /// A rejected profile insert signs the new session out again, so a
    /// user never ends up signed in without a profile. Signing up again
    /// with the same credentials resumes that identity and claims the
    /// new handle.
    pub async fn sign_up(&self, form: SignUpForm) -> Result<AuthUser> {
        let email = form.email.trim();
        validate_credentials(email, &form.password)?;
        validate_handle(&form.username)?;
        let name = form
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        let client = self.auth.client();
        let metadata = SignUpMetadata {
            username: form.username.clone(),
            name: name.clone(),
        };
        let session = match client.sign_up(email, &form.password, &metadata).await {
            Ok(session) => session,
            Err(Error::InvalidInput(message)) => self
                .resume_unclaimed(email, &form.password)
                .await
                .ok_or(Error::InvalidInput(message))?,
            Err(e) => return Err(e),
        };

        let profile = NewProfile {
            id: session.user.id,
            username: form.username.clone(),
            name,
        };

        if let Err(e) = self
            .store
            .insert_profile(&session.access_token, &profile)
            .await
        {
            let e = e.for_handle(&form.username);
            tracing::info!(handle = %form.username, error = %e, "Profile insert rejected; signing out");
            client.sign_out().await;
            self.sync_quietly().await;
            return Err(e);
        }

        tracing::info!(user_id = %session.user.id, handle = %form.username, "Account created");
        self.sync_quietly().await;
        self.refresh_profile_quietly().await;
        Ok(session.user)
    }

    /// Sign in to an already registered identity that has no profile row
    async fn resume_unclaimed(&self, email: &str, password: &str) -> Option<AuthSession> {
        let client = self.auth.client();
        let session = client.sign_in_with_password(email, password).await.ok()?;

        match self.store.profile_by_id(session.user.id).await {
            Ok(None) => {
                tracing::info!(user_id = %session.user.id, "Resuming sign-up for identity without a profile");
                Some(session)
            }
            Ok(Some(_)) => {
                client.sign_out().await;
                self.sync_quietly().await;
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not look up profile for existing identity");
                client.sign_out().await;
                self.sync_quietly().await;
                None
            }
        }
    }

    /// Password login; a profile row is created if the identity has none
    pub async fn log_in(&self, form: LogInForm) -> Result<AuthUser> {
        let email = form.email.trim();
        validate_credentials(email, &form.password)?;

        let session = self
            .auth
            .client()
            .sign_in_with_password(email, &form.password)
            .await?;
        self.ensure_profile(&session).await?;
        Ok(session.user)
    }

    /// Sign in with a token from an external identity provider
    ///
    /// First-time federated users get a profile row with a generated
    /// handle they can change in the profile editor.
    pub async fn federated(&self, form: FederatedForm) -> Result<AuthUser> {
        if form.provider.trim().is_empty() || form.id_token.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Provider and identity token are required".to_string(),
            ));
        }

        let session = self
            .auth
            .client()
            .sign_in_with_id_token(form.provider.trim(), form.id_token.trim())
            .await?;
        self.ensure_profile(&session).await?;
        Ok(session.user)
    }

    async fn ensure_profile(&self, session: &AuthSession) -> Result<()> {
        if self.store.profile_by_id(session.user.id).await?.is_none() {
            let profile = NewProfile {
                id: session.user.id,
                username: generated_handle(session.user.id),
                name: session.user.email_local_part().map(str::to_string),
            };
            if let Err(e) = self
                .store
                .insert_profile(&session.access_token, &profile)
                .await
            {
                tracing::warn!(user_id = %session.user.id, error = %e, "Could not create missing profile");
            }
            self.sync_quietly().await;
            self.refresh_profile_quietly().await;
            return Ok(());
        }

        self.sync_quietly().await;
        Ok(())
    }

    pub async fn log_out(&self) {
        self.auth.client().sign_out().await;
        self.sync_quietly().await;
    }

    async fn sync_quietly(&self) {
        if let Err(e) = self.auth.sync().await {
            tracing::warn!(error = %e, "Failed to load auth state");
        }
    }

    /// The session event may have been handled before the profile row
    /// existed, so pick it up explicitly.
    async fn refresh_profile_quietly(&self) {
        if let Err(e) = self.auth.refresh_profile().await {
            tracing::warn!(error = %e, "Failed to load profile");
        }
    }
}

/// Placeholder handle for accounts created without one
fn generated_handle(id: UserId) -> String {
    let simple = id.simple().to_string();
    format!("user_{}", &simple[..8])
}
