//! In-process stand-ins for the external collaborators
//!
//! `MemoryBackend` plays identity provider, data store and object storage
//! with the same rules the real store enforces on handles (unique and
//! check constraints) and on artists (insert-if-absent). `StaticCatalog`
//! answers artist searches from a fixed list. Both count the calls they
//! receive so callers can observe how many external requests a flow made.

use async_trait::async_trait;
use chrono::Utc;
use heardlive_common::error::{CHECK_VIOLATION, UNIQUE_VIOLATION};
use heardlive_common::handle::has_only_handle_chars;
use heardlive_common::models::{
    ArtistRow, AuthSession, AuthUser, CatalogArtist, CatalogImage, Experience, ExperienceFields,
    ExperienceWithArtist, NewExperience, NewProfile, Profile, ProfileSummary, ProfileUpdate,
    UserId,
};
use heardlive_common::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Catalog, DataStore, IdentityProvider, ObjectStore, SignUpMetadata};

const SESSION_LIFETIME_SECS: i64 = 3600;

#[derive(Default)]
struct Accounts {
    /// email (or provider:subject) -> (password, user)
    users: HashMap<String, (Option<String>, AuthUser)>,
    /// access token -> user id
    access_tokens: HashMap<String, UserId>,
    /// refresh token -> login key
    refresh_tokens: HashMap<String, String>,
}

#[derive(Default)]
struct Tables {
    profiles: Vec<Profile>,
    artists: HashMap<String, ArtistRow>,
    experiences: Vec<Experience>,
    objects: HashMap<String, (Vec<u8>, String)>,
}

/// Identity provider, data store and object storage in one process
#[derive(Default)]
pub struct MemoryBackend {
    accounts: Mutex<Accounts>,
    tables: Mutex<Tables>,
    calls: Mutex<HashMap<&'static str, usize>>,
    failing_operation: Mutex<Option<&'static str>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls received for an operation (e.g. "experiences_for_user")
    pub async fn calls(&self, operation: &str) -> usize {
        self.calls.lock().await.get(operation).copied().unwrap_or(0)
    }

    /// Make every later call of `operation` fail as if the store were down
    pub async fn fail_operation(&self, operation: Option<&'static str>) {
        *self.failing_operation.lock().await = operation;
    }

    pub async fn artist(&self, id: &str) -> Option<ArtistRow> {
        self.tables.lock().await.artists.get(id).cloned()
    }

    pub async fn object_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.tables.lock().await.objects.keys().cloned().collect();
        paths.sort();
        paths
    }

    async fn record(&self, operation: &'static str) -> Result<()> {
        *self.calls.lock().await.entry(operation).or_insert(0) += 1;
        if *self.failing_operation.lock().await == Some(operation) {
            return Err(Error::service(
                heardlive_common::ExternalService::DataStore,
                format!("{} unavailable", operation),
            ));
        }
        Ok(())
    }

    async fn user_for_token(&self, token: &str) -> Result<UserId> {
        self.accounts
            .lock()
            .await
            .access_tokens
            .get(token)
            .copied()
            .ok_or(Error::Unauthenticated)
    }

    fn issue_session(accounts: &mut Accounts, login_key: &str) -> Result<AuthSession> {
        let user = accounts
            .users
            .get(login_key)
            .map(|(_, user)| user.clone())
            .ok_or_else(|| Error::InvalidInput("Invalid login credentials".to_string()))?;

        let access_token = format!("mem-access-{}", Uuid::new_v4());
        let refresh_token = format!("mem-refresh-{}", Uuid::new_v4());
        accounts.access_tokens.insert(access_token.clone(), user.id);
        accounts
            .refresh_tokens
            .insert(refresh_token.clone(), login_key.to_string());

        Ok(AuthSession {
            access_token,
            refresh_token,
            expires_at: Some(Utc::now().timestamp() + SESSION_LIFETIME_SECS),
            user,
        })
    }

    /// Enforce the store's handle constraints
    fn check_handle(profiles: &[Profile], id: UserId, handle: Option<&str>) -> Result<()> {
        let Some(handle) = handle else {
            return Ok(());
        };

        if !has_only_handle_chars(handle) {
            return Err(Error::Constraint {
                code: CHECK_VIOLATION.to_string(),
                message: "new row violates check constraint \"username_format\"".to_string(),
            });
        }

        if profiles
            .iter()
            .any(|p| p.id != id && p.username.as_deref() == Some(handle))
        {
            return Err(Error::Constraint {
                code: UNIQUE_VIOLATION.to_string(),
                message: "duplicate key value violates unique constraint \"profiles_username_key\""
                    .to_string(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for MemoryBackend {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &SignUpMetadata,
    ) -> Result<AuthSession> {
        self.record("sign_up").await?;
        let mut accounts = self.accounts.lock().await;

        let key = email.to_ascii_lowercase();
        if accounts.users.contains_key(&key) {
            return Err(Error::InvalidInput("User already registered".to_string()));
        }

        let user = AuthUser {
            id: Uuid::new_v4(),
            email: Some(key.clone()),
            user_metadata: serde_json::to_value(metadata).unwrap_or_default(),
        };
        accounts
            .users
            .insert(key.clone(), (Some(password.to_string()), user));

        Self::issue_session(&mut accounts, &key)
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession> {
        self.record("sign_in_with_password").await?;
        let mut accounts = self.accounts.lock().await;

        let key = email.to_ascii_lowercase();
        let matches = accounts
            .users
            .get(&key)
            .map(|(stored, _)| stored.as_deref() == Some(password))
            .unwrap_or(false);
        if !matches {
            return Err(Error::InvalidInput("Invalid login credentials".to_string()));
        }

        Self::issue_session(&mut accounts, &key)
    }

    async fn sign_in_with_id_token(&self, provider: &str, id_token: &str) -> Result<AuthSession> {
        self.record("sign_in_with_id_token").await?;
        let mut accounts = self.accounts.lock().await;

        let key = format!("{}:{}", provider, id_token);
        accounts.users.entry(key.clone()).or_insert_with(|| {
            (
                None,
                AuthUser {
                    id: Uuid::new_v4(),
                    email: None,
                    user_metadata: serde_json::json!({ "provider": provider }),
                },
            )
        });

        Self::issue_session(&mut accounts, &key)
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession> {
        self.record("refresh_session").await?;
        let mut accounts = self.accounts.lock().await;

        let key = accounts
            .refresh_tokens
            .remove(refresh_token)
            .ok_or(Error::Unauthenticated)?;
        Self::issue_session(&mut accounts, &key)
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        self.record("sign_out").await?;
        self.accounts.lock().await.access_tokens.remove(access_token);
        Ok(())
    }

    async fn get_user(&self, access_token: &str) -> Result<AuthUser> {
        self.record("get_user").await?;
        let accounts = self.accounts.lock().await;
        let id = accounts
            .access_tokens
            .get(access_token)
            .ok_or(Error::Unauthenticated)?;
        accounts
            .users
            .values()
            .map(|(_, user)| user)
            .find(|user| user.id == *id)
            .cloned()
            .ok_or(Error::Unauthenticated)
    }
}

#[async_trait]
impl DataStore for MemoryBackend {
    async fn profile_by_id(&self, id: UserId) -> Result<Option<Profile>> {
        self.record("profile_by_id").await?;
        let tables = self.tables.lock().await;
        Ok(tables.profiles.iter().find(|p| p.id == id).cloned())
    }

    async fn profile_by_handle(&self, handle: &str) -> Result<Option<Profile>> {
        self.record("profile_by_handle").await?;
        let tables = self.tables.lock().await;
        Ok(tables
            .profiles
            .iter()
            .find(|p| p.username.as_deref() == Some(handle))
            .cloned())
    }

    async fn profiles_by_ids(&self, ids: &[UserId]) -> Result<Vec<ProfileSummary>> {
        self.record("profiles_by_ids").await?;
        let tables = self.tables.lock().await;
        Ok(tables
            .profiles
            .iter()
            .filter(|p| ids.contains(&p.id))
            .map(Profile::summary)
            .collect())
    }

    async fn handle_exists(&self, handle: &str, exclude: Option<UserId>) -> Result<bool> {
        self.record("handle_exists").await?;
        let tables = self.tables.lock().await;
        Ok(tables
            .profiles
            .iter()
            .any(|p| p.username.as_deref() == Some(handle) && Some(p.id) != exclude))
    }

    async fn search_profiles(
        &self,
        query: &str,
        exclude: UserId,
        limit: usize,
    ) -> Result<Vec<ProfileSummary>> {
        self.record("search_profiles").await?;
        let needle = query.trim().to_lowercase();
        let tables = self.tables.lock().await;
        Ok(tables
            .profiles
            .iter()
            .filter(|p| p.id != exclude)
            .filter(|p| {
                [p.username.as_deref(), p.name.as_deref()]
                    .into_iter()
                    .flatten()
                    .any(|field| field.to_lowercase().contains(&needle))
            })
            .take(limit)
            .map(Profile::summary)
            .collect())
    }

    async fn insert_profile(&self, token: &str, profile: &NewProfile) -> Result<Profile> {
        self.record("insert_profile").await?;
        let user_id = self.user_for_token(token).await?;
        if user_id != profile.id {
            return Err(Error::Unauthenticated);
        }

        let mut tables = self.tables.lock().await;
        if tables.profiles.iter().any(|p| p.id == profile.id) {
            return Err(Error::Constraint {
                code: UNIQUE_VIOLATION.to_string(),
                message: "duplicate key value violates unique constraint \"profiles_pkey\""
                    .to_string(),
            });
        }
        Self::check_handle(&tables.profiles, profile.id, Some(&profile.username))?;

        let row = Profile {
            id: profile.id,
            username: Some(profile.username.clone()),
            name: profile.name.clone(),
            ..Default::default()
        };
        tables.profiles.push(row.clone());
        Ok(row)
    }

    async fn update_profile(
        &self,
        token: &str,
        id: UserId,
        update: &ProfileUpdate,
    ) -> Result<Profile> {
        self.record("update_profile").await?;
        if self.user_for_token(token).await? != id {
            return Err(Error::Unauthenticated);
        }

        let mut tables = self.tables.lock().await;
        Self::check_handle(&tables.profiles, id, update.username.as_deref())?;

        let row = tables
            .profiles
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::NotFound("profile".to_string()))?;
        row.name = update.name.clone();
        row.username = update.username.clone();
        row.country = update.country.clone();
        row.twitter_url = update.twitter_url.clone();
        row.spotify_url = update.spotify_url.clone();
        row.soundcloud_url = update.soundcloud_url.clone();
        row.youtube_url = update.youtube_url.clone();
        Ok(row.clone())
    }

    async fn set_avatar_url(&self, token: &str, id: UserId, url: &str) -> Result<Profile> {
        self.record("set_avatar_url").await?;
        if self.user_for_token(token).await? != id {
            return Err(Error::Unauthenticated);
        }

        let mut tables = self.tables.lock().await;
        let row = tables
            .profiles
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::NotFound("profile".to_string()))?;
        row.avatar_url = Some(url.to_string());
        Ok(row.clone())
    }

    async fn ensure_artist(&self, token: &str, artist: &ArtistRow) -> Result<()> {
        self.record("ensure_artist").await?;
        self.user_for_token(token).await?;

        let mut tables = self.tables.lock().await;
        tables
            .artists
            .entry(artist.id.clone())
            .or_insert_with(|| artist.clone());
        Ok(())
    }

    async fn insert_experience(
        &self,
        token: &str,
        experience: &NewExperience,
    ) -> Result<Experience> {
        self.record("insert_experience").await?;
        if self.user_for_token(token).await? != experience.user_id {
            return Err(Error::Unauthenticated);
        }

        let mut tables = self.tables.lock().await;
        if !tables.artists.contains_key(&experience.artist_id) {
            return Err(Error::Constraint {
                code: "23503".to_string(),
                message: "insert violates foreign key constraint \"artist_id_fkey\"".to_string(),
            });
        }

        let row = Experience {
            id: Uuid::new_v4(),
            user_id: experience.user_id,
            artist_id: experience.artist_id.clone(),
            fields: experience.fields.clone(),
            created_at: Some(Utc::now()),
        };
        tables.experiences.push(row.clone());
        Ok(row)
    }

    async fn update_experience(
        &self,
        token: &str,
        id: Uuid,
        user_id: UserId,
        fields: &ExperienceFields,
    ) -> Result<Experience> {
        self.record("update_experience").await?;
        if self.user_for_token(token).await? != user_id {
            return Err(Error::Unauthenticated);
        }

        let mut tables = self.tables.lock().await;
        let row = tables
            .experiences
            .iter_mut()
            .find(|e| e.id == id && e.user_id == user_id)
            .ok_or_else(|| Error::NotFound("experience".to_string()))?;
        row.fields = fields.clone();
        Ok(row.clone())
    }

    async fn experiences_for_user(&self, user_id: UserId) -> Result<Vec<ExperienceWithArtist>> {
        self.record("experiences_for_user").await?;
        let tables = self.tables.lock().await;

        // Newest first; insertion order stands in for created_at ties
        Ok(tables
            .experiences
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .filter_map(|e| {
                tables.artists.get(&e.artist_id).map(|artist| ExperienceWithArtist {
                    experience: e.clone(),
                    artist: artist.clone(),
                })
            })
            .collect())
    }
}

#[async_trait]
impl ObjectStore for MemoryBackend {
    async fn upload(
        &self,
        token: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        self.record("upload").await?;
        self.user_for_token(token).await?;

        let mut tables = self.tables.lock().await;
        if tables.objects.contains_key(path) {
            return Err(Error::service(
                heardlive_common::ExternalService::Storage,
                "The resource already exists",
            ));
        }
        tables
            .objects
            .insert(path.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }

    async fn remove(&self, token: &str, path: &str) -> Result<()> {
        self.record("remove").await?;
        self.user_for_token(token).await?;
        self.tables.lock().await.objects.remove(path);
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("memory://avatars/{}", path)
    }
}

/// Catalog answering from a fixed artist list
pub struct StaticCatalog {
    artists: Vec<CatalogArtist>,
    requests: AtomicUsize,
}

impl StaticCatalog {
    pub fn new(artists: Vec<CatalogArtist>) -> Self {
        Self {
            artists,
            requests: AtomicUsize::new(0),
        }
    }

    /// A handful of well-known acts for local development
    pub fn demo() -> Self {
        fn artist(id: &str, name: &str, followers: u64, genres: &[&str]) -> CatalogArtist {
            CatalogArtist {
                id: id.to_string(),
                name: name.to_string(),
                images: vec![CatalogImage {
                    url: format!("https://placehold.co/640x640?text={}", name.replace(' ', "+")),
                    width: Some(640),
                    height: Some(640),
                }],
                followers,
                genres: genres.iter().map(|g| g.to_string()).collect(),
                external_url: Some(format!("https://open.spotify.com/artist/{}", id)),
                popularity: 70,
            }
        }

        Self::new(vec![
            artist("4tZwfgrHOc3mvqYlEYSvVi", "Daft Punk", 9_000_000, &["electro", "filter house", "french house"]),
            artist("1vCWHaC5f2uS3yhpwWbIA6", "Avicii", 22_000_000, &["edm", "pop dance"]),
            artist("7uaIm6Pw7xplS8Dy06V6pT", "Dimitri Vegas & Like Mike", 4_000_000, &["big room", "edm"]),
            artist("4gzpq5DPGxSnKTe4SA8HAU", "Coldplay", 50_000_000, &["permanent wave", "pop"]),
            artist("3WrFJ7ztbogyGnTHbHJFl2", "The Beatles", 30_000_000, &["british invasion", "rock"]),
        ])
    }

    /// Number of searches received
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Catalog for StaticCatalog {
    async fn search_artists(&self, query: &str, limit: usize) -> Result<Vec<CatalogArtist>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let needle = query.trim().to_lowercase();
        Ok(self
            .artists
            .iter()
            .filter(|a| a.name.to_lowercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn signed_up(backend: &MemoryBackend, email: &str) -> AuthSession {
        backend
            .sign_up(
                email,
                "secret123",
                &SignUpMetadata {
                    username: "ignored".to_string(),
                    name: None,
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_unique_handle_constraint() {
        let backend = MemoryBackend::new();
        let a = signed_up(&backend, "a@example.com").await;
        let b = signed_up(&backend, "b@example.com").await;

        backend
            .insert_profile(&a.access_token, &NewProfile { id: a.user.id, username: "raver".into(), name: None })
            .await
            .unwrap();
        let err = backend
            .insert_profile(&b.access_token, &NewProfile { id: b.user.id, username: "raver".into(), name: None })
            .await
            .unwrap_err();

        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_check_constraint_on_handle() {
        let backend = MemoryBackend::new();
        let a = signed_up(&backend, "a@example.com").await;
        let err = backend
            .insert_profile(&a.access_token, &NewProfile { id: a.user.id, username: "Bad Handle".into(), name: None })
            .await
            .unwrap_err();
        assert!(err.is_check_violation());
    }

    #[tokio::test]
    async fn test_ensure_artist_is_idempotent() {
        let backend = MemoryBackend::new();
        let a = signed_up(&backend, "a@example.com").await;
        let catalog = StaticCatalog::demo();
        let first = catalog.search_artists("daft", 1).await.unwrap().remove(0);

        let row = ArtistRow::from(&first);
        backend.ensure_artist(&a.access_token, &row).await.unwrap();

        let renamed = ArtistRow {
            name: "Renamed".to_string(),
            ..row.clone()
        };
        backend.ensure_artist(&a.access_token, &renamed).await.unwrap();

        assert_eq!(backend.artist(&row.id).await.unwrap().name, "Daft Punk");
    }

    #[tokio::test]
    async fn test_writes_require_valid_token() {
        let backend = MemoryBackend::new();
        let err = backend
            .set_avatar_url("nope", Uuid::new_v4(), "memory://x")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthenticated));
    }

    #[tokio::test]
    async fn test_wrong_password_rejected() {
        let backend = MemoryBackend::new();
        signed_up(&backend, "a@example.com").await;
        let err = backend
            .sign_in_with_password("a@example.com", "wrong")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_static_catalog_counts_requests() {
        let catalog = StaticCatalog::demo();
        let results = catalog.search_artists("the", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(catalog.request_count(), 1);
    }
}
