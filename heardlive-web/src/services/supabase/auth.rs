//! GoTrue (Supabase Auth) client

use async_trait::async_trait;
use chrono::Utc;
use heardlive_common::models::{AuthSession, AuthUser};
use heardlive_common::{Error, ExternalService, Result};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;

use super::{expect_success, read_json, send, SupabaseClient};
use crate::services::{IdentityProvider, SignUpMetadata};

const SERVICE: ExternalService = ExternalService::Identity;

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl From<TokenResponse> for AuthSession {
    fn from(token: TokenResponse) -> Self {
        let expires_at = token
            .expires_at
            .or_else(|| token.expires_in.map(|secs| Utc::now().timestamp() + secs));
        AuthSession {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
            user: token.user,
        }
    }
}

/// Identity provider backed by GoTrue
pub struct SupabaseAuth {
    client: SupabaseClient,
}

impl SupabaseAuth {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    async fn token_grant(&self, grant_type: &str, body: serde_json::Value) -> Result<AuthSession> {
        tracing::debug!(grant_type = %grant_type, "Requesting session from identity provider");

        let request = self
            .client
            .request(Method::POST, "/auth/v1/token")
            .query(&[("grant_type", grant_type)])
            .json(&body);

        let response = send(SERVICE, request).await?;
        let token: TokenResponse = read_json(SERVICE, response).await?;
        Ok(token.into())
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuth {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &SignUpMetadata,
    ) -> Result<AuthSession> {
        let request = self
            .client
            .request(Method::POST, "/auth/v1/signup")
            .json(&json!({
                "email": email,
                "password": password,
                "data": metadata,
            }));

        let response = send(SERVICE, request).await?;
        let body: serde_json::Value = read_json(SERVICE, response).await?;

        // With email confirmation enabled the provider answers with a bare
        // user and no session; the account is unusable until confirmed.
        match serde_json::from_value::<TokenResponse>(body) {
            Ok(token) => Ok(token.into()),
            Err(_) => Err(Error::InvalidInput(
                "Check your email to confirm your account, then log in".to_string(),
            )),
        }
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession> {
        self.token_grant("password", json!({ "email": email, "password": password }))
            .await
    }

    async fn sign_in_with_id_token(&self, provider: &str, id_token: &str) -> Result<AuthSession> {
        self.token_grant("id_token", json!({ "provider": provider, "id_token": id_token }))
            .await
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession> {
        self.token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        let request = self
            .client
            .user_request(Method::POST, "/auth/v1/logout", access_token);
        let response = send(SERVICE, request).await?;
        expect_success(SERVICE, response).await
    }

    async fn get_user(&self, access_token: &str) -> Result<AuthUser> {
        let request = self
            .client
            .user_request(Method::GET, "/auth/v1/user", access_token);
        let response = send(SERVICE, request).await?;
        read_json(SERVICE, response).await
    }
}
