//! Bluesky platform client
//!
//! Publishes posts through the AT Protocol `createRecord` endpoint. Reply
//! threading is not wired up here, so link follow-ups are skipped for
//! Bluesky targets.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::error::PlatformError;
use crate::platforms::{classify_transport_error, PlatformClient};
use crate::types::Platform;

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);
const CHARACTER_LIMIT: usize = 300;

#[derive(Debug, Deserialize)]
struct CreateRecordResponse {
    uri: String,
}

pub struct BlueskyClient {
    client: reqwest::Client,
    api_base: String,
}

impl BlueskyClient {
    pub fn new(api_base: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(PUBLISH_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PlatformClient for BlueskyClient {
    fn platform(&self) -> Platform {
        Platform::Bluesky
    }

    fn supports_threading(&self) -> bool {
        false
    }

    fn character_limit(&self) -> Option<usize> {
        Some(CHARACTER_LIMIT)
    }

    async fn publish(
        &self,
        access_token: &str,
        content: &str,
    ) -> Result<String, PlatformError> {
        let body = serde_json::json!({
            "collection": "app.bsky.feed.post",
            "record": {
                "$type": "app.bsky.feed.post",
                "text": content,
                "createdAt": chrono::Utc::now().to_rfc3339(),
            }
        });

        let response = self
            .client
            .post(format!(
                "{}/xrpc/com.atproto.repo.createRecord",
                self.api_base
            ))
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::from_status(status, body));
        }

        let record: CreateRecordResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::Permanent(format!("malformed record response: {}", e)))?;
        Ok(record.uri)
    }

    async fn reply(
        &self,
        _access_token: &str,
        _parent_id: &str,
        _content: &str,
    ) -> Result<String, PlatformError> {
        Err(PlatformError::Permanent(
            "bluesky client does not support threaded replies".to_string(),
        ))
    }
}
