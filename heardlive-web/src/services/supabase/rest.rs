//! PostgREST (Supabase data API) client

use async_trait::async_trait;
use heardlive_common::models::{
    ArtistRow, Experience, ExperienceFields, ExperienceWithArtist, NewExperience, NewProfile,
    Profile, ProfileSummary, ProfileUpdate, UserId,
};
use heardlive_common::{Error, ExternalService, Result};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::json;
use uuid::Uuid;

use super::{expect_success, read_json, send, SupabaseClient};
use crate::services::DataStore;

const SERVICE: ExternalService = ExternalService::DataStore;

const PROFILES: &str = "/rest/v1/profiles";
const ARTISTS: &str = "/rest/v1/artists";
const EXPERIENCES: &str = "/rest/v1/user_artist_experiences";

const SUMMARY_COLUMNS: &str = "id,username,name,avatar_url";

/// Characters with meaning inside PostgREST logic filters
fn strip_filter_syntax(query: &str) -> String {
    query
        .chars()
        .filter(|c| !matches!(c, ',' | '(' | ')' | '"' | '*' | '\\' | '.' | ':'))
        .collect()
}

/// Data store backed by PostgREST
pub struct SupabaseRest {
    client: SupabaseClient,
}

impl SupabaseRest {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = send(SERVICE, request).await?;
        read_json(SERVICE, response).await
    }

    /// Run a write that returns the affected rows and take the first
    async fn first_row<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let rows: Vec<T> = self
            .fetch(request.header("Prefer", "return=representation"))
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(what.to_string()))
    }

    async fn profile_where(&self, column: &str, value: String) -> Result<Option<Profile>> {
        let request = self
            .client
            .request(Method::GET, PROFILES)
            .query(&[("select", "*".to_string()), (column, value), ("limit", "1".to_string())]);
        let rows: Vec<Profile> = self.fetch(request).await?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl DataStore for SupabaseRest {
    async fn profile_by_id(&self, id: UserId) -> Result<Option<Profile>> {
        self.profile_where("id", format!("eq.{}", id)).await
    }

    async fn profile_by_handle(&self, handle: &str) -> Result<Option<Profile>> {
        self.profile_where("username", format!("eq.{}", handle)).await
    }

    async fn profiles_by_ids(&self, ids: &[UserId]) -> Result<Vec<ProfileSummary>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let list = ids
            .iter()
            .map(Uuid::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let request = self
            .client
            .request(Method::GET, PROFILES)
            .query(&[("select", SUMMARY_COLUMNS.to_string()), ("id", format!("in.({})", list))]);
        self.fetch(request).await
    }

    async fn handle_exists(&self, handle: &str, exclude: Option<UserId>) -> Result<bool> {
        let mut params = vec![
            ("select", "id".to_string()),
            ("username", format!("eq.{}", handle)),
            ("limit", "1".to_string()),
        ];
        if let Some(id) = exclude {
            params.push(("id", format!("neq.{}", id)));
        }

        let request = self.client.request(Method::GET, PROFILES).query(&params);
        let rows: Vec<serde_json::Value> = self.fetch(request).await?;
        Ok(!rows.is_empty())
    }

    async fn search_profiles(
        &self,
        query: &str,
        exclude: UserId,
        limit: usize,
    ) -> Result<Vec<ProfileSummary>> {
        let needle = strip_filter_syntax(query.trim());
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let request = self.client.request(Method::GET, PROFILES).query(&[
            ("select", SUMMARY_COLUMNS.to_string()),
            (
                "or",
                format!("(username.ilike.*{0}*,name.ilike.*{0}*)", needle),
            ),
            ("id", format!("neq.{}", exclude)),
            ("limit", limit.to_string()),
        ]);
        self.fetch(request).await
    }

    async fn insert_profile(&self, token: &str, profile: &NewProfile) -> Result<Profile> {
        let request = self
            .client
            .user_request(Method::POST, PROFILES, token)
            .json(profile);
        self.first_row(request, "profile").await
    }

    async fn update_profile(
        &self,
        token: &str,
        id: UserId,
        update: &ProfileUpdate,
    ) -> Result<Profile> {
        let request = self
            .client
            .user_request(Method::PATCH, PROFILES, token)
            .query(&[("id", format!("eq.{}", id))])
            .json(update);
        self.first_row(request, "profile").await
    }

    async fn set_avatar_url(&self, token: &str, id: UserId, url: &str) -> Result<Profile> {
        let request = self
            .client
            .user_request(Method::PATCH, PROFILES, token)
            .query(&[("id", format!("eq.{}", id))])
            .json(&json!({ "avatar_url": url }));
        self.first_row(request, "profile").await
    }

    async fn ensure_artist(&self, token: &str, artist: &ArtistRow) -> Result<()> {
        tracing::debug!(artist_id = %artist.id, "Ensuring artist row exists");

        let request = self
            .client
            .user_request(Method::POST, ARTISTS, token)
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=ignore-duplicates,return=minimal")
            .json(artist);
        let response = send(SERVICE, request).await?;
        expect_success(SERVICE, response).await
    }

    async fn insert_experience(
        &self,
        token: &str,
        experience: &NewExperience,
    ) -> Result<Experience> {
        let request = self
            .client
            .user_request(Method::POST, EXPERIENCES, token)
            .json(experience);
        self.first_row(request, "experience").await
    }

    async fn update_experience(
        &self,
        token: &str,
        id: Uuid,
        user_id: UserId,
        fields: &ExperienceFields,
    ) -> Result<Experience> {
        let request = self
            .client
            .user_request(Method::PATCH, EXPERIENCES, token)
            .query(&[("id", format!("eq.{}", id)), ("user_id", format!("eq.{}", user_id))])
            .json(fields);
        self.first_row(request, "experience").await
    }

    async fn experiences_for_user(&self, user_id: UserId) -> Result<Vec<ExperienceWithArtist>> {
        let request = self.client.request(Method::GET, EXPERIENCES).query(&[
            ("select", "*,artist:artists(*)".to_string()),
            ("user_id", format!("eq.{}", user_id)),
            ("order", "created_at.desc".to_string()),
        ]);
        self.fetch(request).await
    }
}
