//! Mastodon platform client
//!
//! Publishes statuses through `/api/v1/statuses` and supports threaded
//! replies via `in_reply_to_id`, which carries link follow-ups.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::error::PlatformError;
use crate::platforms::{classify_transport_error, PlatformClient};
use crate::types::Platform;

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);
const CHARACTER_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
struct StatusResponse {
    id: String,
}

pub struct MastodonClient {
    client: reqwest::Client,
    api_base: String,
}

impl MastodonClient {
    pub fn new(api_base: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(PUBLISH_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    async fn post_status(
        &self,
        access_token: &str,
        content: &str,
        in_reply_to_id: Option<&str>,
    ) -> Result<String, PlatformError> {
        let mut form = vec![("status", content.to_string())];
        if let Some(parent) = in_reply_to_id {
            form.push(("in_reply_to_id", parent.to_string()));
        }

        let response = self
            .client
            .post(format!("{}/api/v1/statuses", self.api_base))
            .bearer_auth(access_token)
            .form(&form)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::from_status(status, body));
        }

        let status_response: StatusResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::Permanent(format!("malformed status response: {}", e)))?;
        Ok(status_response.id)
    }
}

#[async_trait]
impl PlatformClient for MastodonClient {
    fn platform(&self) -> Platform {
        Platform::Mastodon
    }

    fn supports_threading(&self) -> bool {
        true
    }

    fn character_limit(&self) -> Option<usize> {
        Some(CHARACTER_LIMIT)
    }

    async fn publish(
        &self,
        access_token: &str,
        content: &str,
    ) -> Result<String, PlatformError> {
        self.post_status(access_token, content, None).await
    }

    async fn reply(
        &self,
        access_token: &str,
        parent_id: &str,
        content: &str,
    ) -> Result<String, PlatformError> {
        self.post_status(access_token, content, Some(parent_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_publish_returns_status_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/statuses"))
            .and(header("authorization", "Bearer tok-123"))
            .and(body_string_contains("Hello+fediverse"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "109501",
                "url": "https://example.social/@me/109501"
            })))
            .mount(&server)
            .await;

        let client = MastodonClient::new(server.uri());
        let id = client.publish("tok-123", "Hello fediverse").await.unwrap();
        assert_eq!(id, "109501");
    }

    #[tokio::test]
    async fn test_reply_threads_under_parent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/statuses"))
            .and(body_string_contains("in_reply_to_id=109501"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "id": "109502" })),
            )
            .mount(&server)
            .await;

        let client = MastodonClient::new(server.uri());
        let id = client
            .reply("tok-123", "109501", "https://example.com/article")
            .await
            .unwrap();
        assert_eq!(id, "109502");
    }

    #[tokio::test]
    async fn test_publish_5xx_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/statuses"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = MastodonClient::new(server.uri());
        let err = client.publish("tok-123", "content").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_publish_422_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/statuses"))
            .respond_with(
                ResponseTemplate::new(422).set_body_string("Validation failed: too long"),
            )
            .mount(&server)
            .await;

        let client = MastodonClient::new(server.uri());
        let err = client.publish("tok-123", "content").await.unwrap_err();
        assert!(!err.is_transient());
        assert!(matches!(err, PlatformError::Permanent(_)));
    }

    #[test]
    fn test_supports_threading() {
        let client = MastodonClient::new("https://example.social".to_string());
        assert!(client.supports_threading());
        assert_eq!(client.character_limit(), Some(500));
        assert_eq!(client.platform(), Platform::Mastodon);
    }
}
