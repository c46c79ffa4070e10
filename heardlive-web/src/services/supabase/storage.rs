//! Supabase Storage client (avatar bucket)

use async_trait::async_trait;
use heardlive_common::{ExternalService, Result};
use reqwest::Method;
use serde_json::json;

use super::{expect_success, send, SupabaseClient};
use crate::services::ObjectStore;

const SERVICE: ExternalService = ExternalService::Storage;

/// Object storage scoped to one public bucket
pub struct SupabaseStorage {
    client: SupabaseClient,
    bucket: String,
}

impl SupabaseStorage {
    pub fn new(client: SupabaseClient, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for SupabaseStorage {
    async fn upload(
        &self,
        token: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        tracing::debug!(bucket = %self.bucket, path = %path, size = bytes.len(), "Uploading object");

        let request = self
            .client
            .user_request(
                Method::POST,
                &format!("/storage/v1/object/{}/{}", self.bucket, path),
                token,
            )
            .header("content-type", content_type)
            .header("x-upsert", "false")
            .body(bytes);
        let response = send(SERVICE, request).await?;
        expect_success(SERVICE, response).await
    }

    async fn remove(&self, token: &str, path: &str) -> Result<()> {
        let request = self
            .client
            .user_request(
                Method::DELETE,
                &format!("/storage/v1/object/{}", self.bucket),
                token,
            )
            .json(&json!({ "prefixes": [path] }));
        let response = send(SERVICE, request).await?;
        expect_success(SERVICE, response).await
    }

    fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.client.base_url(),
            self.bucket,
            path
        )
    }
}
