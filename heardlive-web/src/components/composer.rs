//! Experience composer
//!
//! Form state for recording (or editing) the user's attendance of one
//! artist, plus the companion lookup that feeds its companion list.
//!
//! States: `Closed -> Open(New | Edit) -> Submitting -> Closed`, with
//! `Submitting -> Open` and the error kept when a write fails.

use chrono::NaiveDate;
use heardlive_common::models::{
    ArtistRow, CatalogArtist, ExperienceFields, ExperienceWithArtist, NewExperience,
    ProfileSummary, UserId,
};
use heardlive_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::auth_context::AuthContext;
use super::debounce::{Debounced, Debouncer};
use crate::services::DataStore;

// ============================================================================
// Form
// ============================================================================

/// Text fields as typed into the form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormFields {
    pub event_name: String,
    pub venue: String,
    pub city: String,
    pub country: String,
    /// `YYYY-MM-DD`
    pub event_date: String,
    pub rating: Option<u8>,
    pub notes: String,
}

fn trimmed(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl FormFields {
    fn from_record(fields: &ExperienceFields) -> Self {
        Self {
            event_name: fields.event_name.clone().unwrap_or_default(),
            venue: fields.venue.clone().unwrap_or_default(),
            city: fields.city.clone().unwrap_or_default(),
            country: fields.country.clone().unwrap_or_default(),
            event_date: fields
                .event_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            rating: fields.rating,
            notes: fields.notes.clone().unwrap_or_default(),
        }
    }

    /// Validate and normalize into record fields
    pub fn validate(&self, companions: &[ProfileSummary]) -> Result<ExperienceFields> {
        if let Some(rating) = self.rating {
            if !(1..=5).contains(&rating) {
                return Err(Error::InvalidInput(
                    "Rating must be between 1 and 5".to_string(),
                ));
            }
        }

        let event_date = match trimmed(&self.event_date) {
            Some(date) => Some(NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|_| {
                Error::InvalidInput(format!("Invalid event date: {}", date))
            })?),
            None => None,
        };

        Ok(ExperienceFields {
            event_name: trimmed(&self.event_name),
            venue: trimmed(&self.venue),
            city: trimmed(&self.city),
            country: trimmed(&self.country),
            event_date,
            rating: self.rating,
            notes: trimmed(&self.notes),
            companion_ids: companions.iter().map(|c| c.id).collect(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ComposerMode {
    New,
    Edit { experience_id: Uuid },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposerForm {
    pub artist: CatalogArtist,
    pub fields: FormFields,
    pub companions: Vec<ProfileSummary>,
}

impl ComposerForm {
    /// Add a companion; a no-op when already present
    pub fn add_companion(&mut self, companion: ProfileSummary) -> bool {
        if self.companions.iter().any(|c| c.id == companion.id) {
            return false;
        }
        self.companions.push(companion);
        true
    }

    /// Remove a companion; a no-op when absent
    pub fn remove_companion(&mut self, id: UserId) -> bool {
        let before = self.companions.len();
        self.companions.retain(|c| c.id != id);
        self.companions.len() != before
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ComposerState {
    Closed,
    Open {
        mode: ComposerMode,
        form: ComposerForm,
        error: Option<String>,
    },
    Submitting {
        mode: ComposerMode,
        form: ComposerForm,
    },
}

impl ComposerState {
    fn ensure_idle(&self) -> Result<()> {
        match self {
            ComposerState::Submitting { .. } => Err(saving_in_progress()),
            _ => Ok(()),
        }
    }

    fn form_mut(&mut self) -> Result<&mut ComposerForm> {
        match self {
            ComposerState::Open { form, .. } => Ok(form),
            ComposerState::Submitting { .. } => Err(saving_in_progress()),
            ComposerState::Closed => Err(Error::InvalidInput(
                "No experience is being edited".to_string(),
            )),
        }
    }
}

fn saving_in_progress() -> Error {
    Error::InvalidInput("The experience is being saved".to_string())
}

// ============================================================================
// Companion lookup
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct CompanionResults {
    pub superseded: bool,
    pub loading: bool,
    pub profiles: Vec<ProfileSummary>,
}

/// Debounced profile lookup by handle or name
pub struct CompanionSearch {
    store: Arc<dyn DataStore>,
    debouncer: Debouncer,
    limit: usize,
    results: RwLock<Vec<ProfileSummary>>,
}

impl CompanionSearch {
    pub fn new(store: Arc<dyn DataStore>, debounce: Duration, limit: usize) -> Self {
        Self {
            store,
            debouncer: Debouncer::new(debounce),
            limit,
            results: RwLock::new(Vec::new()),
        }
    }

    /// Search profiles, never returning `exclude` (the searching user)
    pub async fn search(&self, query: &str, exclude: UserId) -> Result<CompanionResults> {
        let query = query.trim();
        if query.is_empty() {
            self.debouncer.cancel();
            self.results.write().await.clear();
            return Ok(self.respond(false).await);
        }

        let outcome = self
            .debouncer
            .run(|| self.store.search_profiles(query, exclude, self.limit))
            .await;

        match outcome {
            Debounced::Latest(found) => {
                let mut profiles = found?;
                profiles.retain(|p| p.id != exclude);
                profiles.truncate(self.limit);
                *self.results.write().await = profiles;
                Ok(self.respond(false).await)
            }
            Debounced::Superseded | Debounced::Stale => Ok(self.respond(true).await),
        }
    }

    async fn respond(&self, superseded: bool) -> CompanionResults {
        CompanionResults {
            superseded,
            loading: self.debouncer.is_loading(),
            profiles: self.results.read().await.clone(),
        }
    }

    async fn result(&self, id: UserId) -> Option<ProfileSummary> {
        self.results
            .read()
            .await
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }
}

// ============================================================================
// Composer
// ============================================================================

pub struct Composer {
    store: Arc<dyn DataStore>,
    state: Mutex<ComposerState>,
}

impl Composer {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self {
            store,
            state: Mutex::new(ComposerState::Closed),
        }
    }

    pub async fn state(&self) -> ComposerState {
        self.state.lock().await.clone()
    }

    /// Open on an artist, pre-filled from the user's existing record
    pub async fn open(&self, artist: CatalogArtist, auth: &AuthContext) -> Result<ComposerState> {
        self.state.lock().await.ensure_idle()?;
        let existing = auth.experience_for_artist(&artist.id).await;

        let (mode, fields, companions) = match existing {
            Some(ExperienceWithArtist { experience, .. }) => {
                let companions = if experience.fields.companion_ids.is_empty() {
                    Vec::new()
                } else {
                    self.store
                        .profiles_by_ids(&experience.fields.companion_ids)
                        .await?
                };
                (
                    ComposerMode::Edit {
                        experience_id: experience.id,
                    },
                    FormFields::from_record(&experience.fields),
                    companions,
                )
            }
            None => (ComposerMode::New, FormFields::default(), Vec::new()),
        };

        tracing::debug!(artist_id = %artist.id, mode = ?mode, "Opening composer");

        let mut state = self.state.lock().await;
        // A submit may have started while the record was being read
        state.ensure_idle()?;
        *state = ComposerState::Open {
            mode,
            form: ComposerForm {
                artist,
                fields,
                companions,
            },
            error: None,
        };
        Ok(state.clone())
    }

    pub async fn set_fields(&self, fields: FormFields) -> Result<ComposerState> {
        let mut state = self.state.lock().await;
        state.form_mut()?.fields = fields;
        Ok(state.clone())
    }

    /// Attach a companion found by the companion lookup (or by id)
    pub async fn add_companion(
        &self,
        id: UserId,
        lookup: &CompanionSearch,
        auth: &AuthContext,
    ) -> Result<ComposerState> {
        if auth.user().await.map(|u| u.id) == Some(id) {
            return Err(Error::InvalidInput(
                "You can't add yourself as a companion".to_string(),
            ));
        }

        let companion = match lookup.result(id).await {
            Some(found) => found,
            None => self
                .store
                .profiles_by_ids(&[id])
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| Error::NotFound("profile".to_string()))?,
        };

        let mut state = self.state.lock().await;
        state.form_mut()?.add_companion(companion);
        Ok(state.clone())
    }

    pub async fn remove_companion(&self, id: UserId) -> Result<ComposerState> {
        let mut state = self.state.lock().await;
        state.form_mut()?.remove_companion(id);
        Ok(state.clone())
    }

    pub async fn close(&self) -> ComposerState {
        let mut state = self.state.lock().await;
        if !matches!(*state, ComposerState::Submitting { .. }) {
            *state = ComposerState::Closed;
        }
        state.clone()
    }

    /// Write the record, refresh the user's list and close
    pub async fn submit(&self, auth: &AuthContext) -> Result<ComposerState> {
        let user_id = auth.user().await.map(|u| u.id);

        let (user_id, mode, form, fields) = {
            let mut state = self.state.lock().await;
            let (mode, form) = match &*state {
                ComposerState::Open { mode, form, .. } => (*mode, form.clone()),
                _ => {
                    return Err(Error::InvalidInput(
                        "No experience is being edited".to_string(),
                    ))
                }
            };

            let Some(user_id) = user_id else {
                return Err(Error::Unauthenticated);
            };

            let fields = match form.fields.validate(&form.companions) {
                Ok(fields) => fields,
                Err(e) => {
                    *state = ComposerState::Open {
                        mode,
                        form,
                        error: Some(e.user_message()),
                    };
                    return Err(e);
                }
            };

            *state = ComposerState::Submitting {
                mode,
                form: form.clone(),
            };
            (user_id, mode, form, fields)
        };

        let written = self.write(auth, user_id, mode, &form.artist, fields).await;

        let mut state = self.state.lock().await;
        match written {
            Ok(()) => {
                if let Err(e) = auth.refresh_experiences().await {
                    tracing::warn!(error = %e, "Saved experience but could not refresh the list");
                }
                *state = ComposerState::Closed;
                Ok(state.clone())
            }
            Err(e) => {
                tracing::warn!(artist_id = %form.artist.id, error = %e, "Saving experience failed");
                *state = ComposerState::Open {
                    mode,
                    form,
                    error: Some(e.user_message()),
                };
                Err(e)
            }
        }
    }

    async fn write(
        &self,
        auth: &AuthContext,
        user_id: UserId,
        mode: ComposerMode,
        artist: &CatalogArtist,
        fields: ExperienceFields,
    ) -> Result<()> {
        let token = auth.client().access_token().await?;

        match mode {
            ComposerMode::Edit { experience_id } => {
                self.store
                    .update_experience(&token, experience_id, user_id, &fields)
                    .await?;
                tracing::info!(experience_id = %experience_id, "Experience updated");
            }
            ComposerMode::New => {
                self.store
                    .ensure_artist(&token, &ArtistRow::from(artist))
                    .await?;
                let created = self
                    .store
                    .insert_experience(
                        &token,
                        &NewExperience {
                            user_id,
                            artist_id: artist.id.clone(),
                            fields,
                        },
                    )
                    .await?;
                tracing::info!(experience_id = %created.id, artist_id = %artist.id, "Experience recorded");
            }
        }
        Ok(())
    }
}
