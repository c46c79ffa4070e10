//! External collaborators behind async traits
//!
//! Components only see these ports. Production wires the Supabase and
//! Spotify clients; local development and the tests wire [`memory`].

pub mod memory;
pub mod spotify_client;
pub mod supabase;

use async_trait::async_trait;
use heardlive_common::models::{
    ArtistRow, AuthSession, AuthUser, CatalogArtist, Experience, ExperienceFields,
    ExperienceWithArtist, NewExperience, NewProfile, Profile, ProfileSummary, ProfileUpdate,
    UserId,
};
use heardlive_common::Result;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// External music catalog
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Free-text artist search, ranked by the catalog, at most `limit` rows
    async fn search_artists(&self, query: &str, limit: usize) -> Result<Vec<CatalogArtist>>;
}

/// Metadata attached to a new identity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignUpMetadata {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Session/identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &SignUpMetadata,
    ) -> Result<AuthSession>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession>;

    /// Federated sign-in with a token issued by `provider` (e.g. "google")
    async fn sign_in_with_id_token(&self, provider: &str, id_token: &str) -> Result<AuthSession>;

    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession>;

    async fn sign_out(&self, access_token: &str) -> Result<()>;

    async fn get_user(&self, access_token: &str) -> Result<AuthUser>;
}

/// Relational data store (profiles, artists, attendance records)
///
/// Reads run with the public key; writes carry the signed-in user's
/// access token so the store's row policies apply.
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn profile_by_id(&self, id: UserId) -> Result<Option<Profile>>;

    async fn profile_by_handle(&self, handle: &str) -> Result<Option<Profile>>;

    async fn profiles_by_ids(&self, ids: &[UserId]) -> Result<Vec<ProfileSummary>>;

    /// True when some profile other than `exclude` owns `handle`
    async fn handle_exists(&self, handle: &str, exclude: Option<UserId>) -> Result<bool>;

    /// Profiles whose handle or name contains `query`, never `exclude`
    async fn search_profiles(
        &self,
        query: &str,
        exclude: UserId,
        limit: usize,
    ) -> Result<Vec<ProfileSummary>>;

    async fn insert_profile(&self, token: &str, profile: &NewProfile) -> Result<Profile>;

    async fn update_profile(
        &self,
        token: &str,
        id: UserId,
        update: &ProfileUpdate,
    ) -> Result<Profile>;

    async fn set_avatar_url(&self, token: &str, id: UserId, url: &str) -> Result<Profile>;

    /// Insert the artist unless a row with its id already exists
    async fn ensure_artist(&self, token: &str, artist: &ArtistRow) -> Result<()>;

    async fn insert_experience(&self, token: &str, experience: &NewExperience)
        -> Result<Experience>;

    async fn update_experience(
        &self,
        token: &str,
        id: Uuid,
        user_id: UserId,
        fields: &ExperienceFields,
    ) -> Result<Experience>;

    /// All records of a user joined with their artist, newest first
    async fn experiences_for_user(&self, user_id: UserId) -> Result<Vec<ExperienceWithArtist>>;
}

/// Object storage for avatar images
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(
        &self,
        token: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()>;

    async fn remove(&self, token: &str, path: &str) -> Result<()>;

    fn public_url(&self, path: &str) -> String;
}

/// The set of external collaborators a running service talks to
#[derive(Clone)]
pub struct Backends {
    pub catalog: Arc<dyn Catalog>,
    pub identity: Arc<dyn IdentityProvider>,
    pub store: Arc<dyn DataStore>,
    pub objects: Arc<dyn ObjectStore>,
}

impl Backends {
    /// All collaborators served by one in-process backend
    pub fn in_memory(backend: Arc<memory::MemoryBackend>, catalog: memory::StaticCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
            identity: backend.clone(),
            store: backend.clone(),
            objects: backend,
        }
    }
}
