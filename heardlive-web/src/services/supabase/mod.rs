//! Supabase-compatible backend clients
//!
//! One shared [`SupabaseClient`] carries the HTTP client, project URL and
//! public (anon) key; [`auth`], [`rest`] and [`storage`] wrap the GoTrue,
//! PostgREST and Storage endpoints on top of it.

pub mod auth;
pub mod rest;
pub mod storage;

pub use auth::SupabaseAuth;
pub use rest::SupabaseRest;
pub use storage::SupabaseStorage;

use heardlive_common::{Error, ExternalService, Result};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

const USER_AGENT: &str = concat!("heardlive/", env!("CARGO_PKG_VERSION"));

/// Shared connection details for one Supabase project
#[derive(Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(base_url: &str, anon_key: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request authorized with the public key only
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
    }

    /// Request authorized as the signed-in user
    fn user_request(&self, method: Method, path: &str, access_token: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
    }
}

/// Error body returned by PostgREST
#[derive(Debug, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

/// Error body returned by GoTrue and Storage (field names vary by version)
#[derive(Debug, Deserialize)]
struct ServiceErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl ServiceErrorBody {
    fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or_else(|| self.error.map(|e| e.as_str().map(str::to_string).unwrap_or(e.to_string())))
    }
}

fn network_error(service: ExternalService, err: reqwest::Error) -> Error {
    Error::service(service, err.to_string())
}

async fn send(service: ExternalService, request: RequestBuilder) -> Result<Response> {
    request.send().await.map_err(|e| network_error(service, e))
}

/// Map a non-success response to an [`Error`]
///
/// PostgREST constraint errors (SQLSTATE class 23) become
/// [`Error::Constraint`] so callers can match on the code.
async fn error_from_response(service: ExternalService, response: Response) -> Error {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Error::Unauthenticated;
    }

    if service == ExternalService::DataStore {
        if let Ok(body) = serde_json::from_str::<PostgrestError>(&text) {
            let message = body
                .message
                .clone()
                .or(body.details.clone())
                .unwrap_or_else(|| text.clone());
            if let Some(code) = body.code.filter(|c| c.starts_with("23")) {
                return Error::Constraint { code, message };
            }
            return Error::service(service, format!("HTTP {}: {}", status.as_u16(), message));
        }
    }

    let message = serde_json::from_str::<ServiceErrorBody>(&text)
        .ok()
        .and_then(ServiceErrorBody::into_message)
        .unwrap_or(text);

    // Rejected credentials or sign-up data are the user's to fix
    if service == ExternalService::Identity
        && matches!(status.as_u16(), 400 | 422)
    {
        return Error::InvalidInput(message);
    }

    Error::service(service, format!("HTTP {}: {}", status.as_u16(), message))
}

async fn read_json<T: DeserializeOwned>(service: ExternalService, response: Response) -> Result<T> {
    if !response.status().is_success() {
        return Err(error_from_response(service, response).await);
    }
    response
        .json::<T>()
        .await
        .map_err(|e| Error::service(service, format!("Parse error: {}", e)))
}

async fn expect_success(service: ExternalService, response: Response) -> Result<()> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(error_from_response(service, response).await)
    }
}
