//! Current-user profile editor and avatar upload
//!
//! A [`ProfileEditor`] can only be obtained from [`ProfileEditor::load`],
//! so nothing is ever edited before the profile has been read.

use heardlive_common::handle::validate_handle;
use heardlive_common::models::{AuthUser, Profile, ProfileUpdate};
use heardlive_common::{Error, Result};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::auth_context::AuthContext;
use super::auth_gate::{check_handle, HandleAvailability};
use crate::services::{DataStore, ObjectStore};

/// Profile form as submitted
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileForm {
    pub name: String,
    pub username: String,
    pub country: String,
    pub twitter_url: String,
    pub spotify_url: String,
    pub soundcloud_url: String,
    pub youtube_url: String,
}

fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn social_url(label: &str, value: &str) -> Result<Option<String>> {
    match optional(value) {
        Some(url) if url.starts_with("https://") || url.starts_with("http://") => Ok(Some(url)),
        Some(_) => Err(Error::InvalidInput(format!(
            "{} link must start with http:// or https://",
            label
        ))),
        None => Ok(None),
    }
}

impl ProfileForm {
    pub fn validate(&self) -> Result<ProfileUpdate> {
        // A handle, once claimed, can be changed but never cleared
        let username = self.username.trim();
        validate_handle(username)?;

        let country = match optional(&self.country) {
            Some(code) if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) => {
                Some(code.to_ascii_uppercase())
            }
            Some(code) => {
                return Err(Error::InvalidInput(format!(
                    "Unknown country code: {}",
                    code
                )))
            }
            None => None,
        };

        Ok(ProfileUpdate {
            name: optional(&self.name),
            username: Some(username.to_string()),
            country,
            twitter_url: social_url("Twitter", &self.twitter_url)?,
            spotify_url: social_url("Spotify", &self.spotify_url)?,
            soundcloud_url: social_url("SoundCloud", &self.soundcloud_url)?,
            youtube_url: social_url("YouTube", &self.youtube_url)?,
        })
    }
}

/// File extension for an `image/*` MIME type
fn image_extension(content_type: &str) -> Option<&str> {
    let subtype = content_type
        .split(';')
        .next()?
        .trim()
        .strip_prefix("image/")?;
    let ext = match subtype {
        "jpeg" | "pjpeg" => "jpg",
        "svg+xml" => "svg",
        other => other,
    };
    (!ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric())).then_some(ext)
}

/// Editor over a loaded profile
pub struct ProfileEditor<'a> {
    auth: &'a AuthContext,
    store: Arc<dyn DataStore>,
    objects: Arc<dyn ObjectStore>,
    max_avatar_bytes: usize,
    user: AuthUser,
    profile: Profile,
}

impl<'a> ProfileEditor<'a> {
    /// Load the signed-in user's profile
    pub async fn load(
        auth: &'a AuthContext,
        store: Arc<dyn DataStore>,
        objects: Arc<dyn ObjectStore>,
        max_avatar_bytes: usize,
    ) -> Result<ProfileEditor<'a>> {
        let user = auth.user().await.ok_or(Error::Unauthenticated)?;

        let profile = match auth.profile().await {
            Some(profile) => profile,
            None => auth
                .refresh_profile()
                .await?
                .ok_or_else(|| Error::NotFound("Profile".to_string()))?,
        };

        Ok(Self {
            auth,
            store,
            objects,
            max_avatar_bytes,
            user,
            profile,
        })
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn into_profile(self) -> Profile {
        self.profile
    }

    /// Handle pre-check that treats the user's own handle as available
    pub async fn check_handle(&self, raw: &str) -> Result<HandleAvailability> {
        check_handle(self.store.as_ref(), raw, Some(self.user.id)).await
    }

    pub async fn save(&mut self, form: &ProfileForm) -> Result<&Profile> {
        let update = form.validate()?;
        let username = update.username.as_deref().unwrap_or_default();
        let token = self.auth.client().access_token().await?;

        let saved = self
            .store
            .update_profile(&token, self.user.id, &update)
            .await
            .map_err(|e| e.for_handle(username))?;

        tracing::info!(user_id = %self.user.id, "Profile saved");
        self.profile = saved;
        self.refresh_cached().await;
        Ok(&self.profile)
    }

    /// Store a new avatar and point the profile at it
    ///
    /// If the profile cannot be updated the uploaded object is deleted
    /// again before the error is returned.
    pub async fn upload_avatar(&mut self, bytes: Vec<u8>, content_type: &str) -> Result<&Profile> {
        let ext = image_extension(content_type).ok_or_else(|| {
            Error::InvalidInput("Avatar must be an image".to_string())
        })?;
        if bytes.is_empty() {
            return Err(Error::InvalidInput("Avatar file is empty".to_string()));
        }
        if bytes.len() > self.max_avatar_bytes {
            return Err(Error::InvalidInput(format!(
                "Avatar must be at most {} MB",
                self.max_avatar_bytes / (1024 * 1024)
            )));
        }

        let token = self.auth.client().access_token().await?;
        let path = format!("{}/{}.{}", self.user.id, Uuid::new_v4(), ext);
        let size = bytes.len();

        self.objects
            .upload(&token, &path, bytes, content_type)
            .await?;
        tracing::debug!(path = %path, size = size, "Avatar uploaded");

        let url = self.objects.public_url(&path);
        match self.store.set_avatar_url(&token, self.user.id, &url).await {
            Ok(saved) => {
                tracing::info!(user_id = %self.user.id, "Avatar updated");
                self.profile = saved;
                self.refresh_cached().await;
                Ok(&self.profile)
            }
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Profile update failed; removing uploaded avatar");
                if let Err(cleanup) = self.objects.remove(&token, &path).await {
                    tracing::error!(path = %path, error = %cleanup, "Could not remove orphaned avatar");
                }
                Err(e)
            }
        }
    }

    async fn refresh_cached(&self) {
        if let Err(e) = self.auth.refresh_profile().await {
            tracing::warn!(error = %e, "Failed to refresh cached profile");
        }
    }
}
