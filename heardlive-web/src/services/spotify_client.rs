//! Spotify Web API client (artist catalog)
//!
//! Authenticates with the client-credentials flow. The bearer token is
//! cached until shortly before it expires and dropped on a 401 so the
//! next search fetches a fresh one.

use async_trait::async_trait;
use heardlive_common::models::{CatalogArtist, CatalogImage};
use heardlive_common::{Error, ExternalService};
use serde::Deserialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::services::Catalog;

const USER_AGENT: &str = concat!("heardlive/", env!("CARGO_PKG_VERSION"));

/// Refresh the token this long before the catalog says it expires
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Spotify client errors
#[derive(Debug, Error)]
pub enum SpotifyError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Token exchange rejected: {0}")]
    TokenRejected(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<SpotifyError> for Error {
    fn from(err: SpotifyError) -> Self {
        Error::service(ExternalService::Catalog, err.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    artists: ArtistPage,
}

#[derive(Debug, Deserialize)]
struct ArtistPage {
    items: Vec<SpotifyArtist>,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    id: String,
    name: String,
    #[serde(default)]
    images: Vec<CatalogImage>,
    #[serde(default)]
    followers: Option<Followers>,
    #[serde(default)]
    genres: Vec<String>,
    #[serde(default)]
    external_urls: Option<ExternalUrls>,
    #[serde(default)]
    popularity: u32,
}

#[derive(Debug, Deserialize)]
struct Followers {
    #[serde(default)]
    total: u64,
}

#[derive(Debug, Deserialize)]
struct ExternalUrls {
    #[serde(default)]
    spotify: Option<String>,
}

impl From<SpotifyArtist> for CatalogArtist {
    fn from(artist: SpotifyArtist) -> Self {
        CatalogArtist {
            id: artist.id,
            name: artist.name,
            images: artist.images,
            followers: artist.followers.map(|f| f.total).unwrap_or(0),
            genres: artist.genres,
            external_url: artist.external_urls.and_then(|u| u.spotify),
            popularity: artist.popularity,
        }
    }
}

struct CachedToken {
    access_token: String,
    refresh_at: Instant,
}

/// Spotify catalog client
pub struct SpotifyClient {
    http_client: reqwest::Client,
    accounts_url: String,
    api_url: String,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyClient {
    pub fn new(
        accounts_url: &str,
        api_url: &str,
        client_id: String,
        client_secret: String,
        timeout: Duration,
    ) -> Result<Self, SpotifyError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| SpotifyError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            accounts_url: accounts_url.trim_end_matches('/').to_string(),
            api_url: api_url.trim_end_matches('/').to_string(),
            client_id,
            client_secret,
            token: Mutex::new(None),
        })
    }

    /// Current bearer token, exchanging client credentials when needed
    async fn access_token(&self) -> Result<String, SpotifyError> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.access_token.clone());
            }
        }

        tracing::debug!("Exchanging client credentials for a catalog token");

        let response = self
            .http_client
            .post(format!("{}/api/token", self.accounts_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| SpotifyError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SpotifyError::TokenRejected(format!("{}: {}", status.as_u16(), error_text)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SpotifyError::ParseError(e.to_string()))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });

        Ok(token.access_token)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    /// Search artists by free text
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<CatalogArtist>, SpotifyError> {
        let token = self.access_token().await?;

        tracing::debug!(query = %query, limit = limit, "Querying catalog");

        let response = self
            .http_client
            .get(format!("{}/search", self.api_url))
            .bearer_auth(&token)
            .query(&[
                ("q", query.to_string()),
                ("type", "artist".to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await
            .map_err(|e| SpotifyError::NetworkError(e.to_string()))?;

        let status = response.status();

        if status == 401 {
            self.invalidate_token().await;
        }

        if status == 429 {
            return Err(SpotifyError::RateLimitExceeded);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SpotifyError::ApiError(status.as_u16(), error_text));
        }

        let page: SearchResponse = response
            .json()
            .await
            .map_err(|e| SpotifyError::ParseError(e.to_string()))?;

        let artists: Vec<CatalogArtist> = page
            .artists
            .items
            .into_iter()
            .take(limit)
            .map(CatalogArtist::from)
            .collect();

        tracing::info!(query = %query, results = artists.len(), "Catalog search complete");

        Ok(artists)
    }
}

#[async_trait]
impl Catalog for SpotifyClient {
    async fn search_artists(
        &self,
        query: &str,
        limit: usize,
    ) -> heardlive_common::Result<Vec<CatalogArtist>> {
        Ok(self.search(query, limit).await?)
    }
}
