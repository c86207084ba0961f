//! Mock platform client for testing
//!
//! A configurable client that can simulate publish successes, transient
//! and permanent failures, and threading support, while recording every
//! call for verification. Used by the executor and orchestrator tests to
//! exercise retry logic without network access.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::error::PlatformError;
use crate::platforms::PlatformClient;
use crate::types::Platform;

/// Configuration for mock client behavior
#[derive(Clone)]
pub struct MockConfig {
    pub platform: Platform,

    /// Outcomes returned by successive publish calls; once exhausted the
    /// last entry repeats
    pub publish_outcomes: Vec<Result<String, PlatformError>>,

    /// Outcome of reply calls
    pub reply_outcome: Result<String, PlatformError>,

    pub supports_threading: bool,

    pub character_limit: Option<usize>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            platform: Platform::Mastodon,
            publish_outcomes: vec![Ok("mock-post-1".to_string())],
            reply_outcome: Ok("mock-reply-1".to_string()),
            supports_threading: true,
            character_limit: None,
        }
    }
}

/// Mock client that records calls and replays configured outcomes
pub struct MockClient {
    config: MockConfig,
    publish_calls: Arc<Mutex<Vec<String>>>,
    reply_calls: Arc<Mutex<Vec<(String, String)>>>,
    tokens_seen: Arc<Mutex<Vec<String>>>,
}

impl MockClient {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            publish_calls: Arc::new(Mutex::new(Vec::new())),
            reply_calls: Arc::new(Mutex::new(Vec::new())),
            tokens_seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A client whose publishes always succeed
    pub fn success(platform: Platform) -> Self {
        Self::new(MockConfig {
            platform,
            ..Default::default()
        })
    }

    /// A client that always fails publishing with the given error
    pub fn publish_failure(platform: Platform, error: PlatformError) -> Self {
        Self::new(MockConfig {
            platform,
            publish_outcomes: vec![Err(error)],
            ..Default::default()
        })
    }

    /// A client that replays the given outcomes in order
    pub fn with_outcomes(
        platform: Platform,
        outcomes: Vec<Result<String, PlatformError>>,
    ) -> Self {
        Self::new(MockConfig {
            platform,
            publish_outcomes: outcomes,
            ..Default::default()
        })
    }

    pub fn publish_count(&self) -> usize {
        match self.publish_calls.lock() {
            Ok(calls) => calls.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn published_content(&self) -> Vec<String> {
        match self.publish_calls.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replies as (parent_id, content) pairs
    pub fn replies(&self) -> Vec<(String, String)> {
        match self.reply_calls.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Access tokens presented across all calls
    pub fn tokens_seen(&self) -> Vec<String> {
        match self.tokens_seen.lock() {
            Ok(tokens) => tokens.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl PlatformClient for MockClient {
    fn platform(&self) -> Platform {
        self.config.platform
    }

    fn supports_threading(&self) -> bool {
        self.config.supports_threading
    }

    fn character_limit(&self) -> Option<usize> {
        self.config.character_limit
    }

    async fn publish(
        &self,
        access_token: &str,
        content: &str,
    ) -> Result<String, PlatformError> {
        if let Ok(mut tokens) = self.tokens_seen.lock() {
            tokens.push(access_token.to_string());
        }
        let call_index = match self.publish_calls.lock() {
            Ok(mut calls) => {
                calls.push(content.to_string());
                calls.len() - 1
            }
            Err(poisoned) => {
                let mut calls = poisoned.into_inner();
                calls.push(content.to_string());
                calls.len() - 1
            }
        };

        let outcomes = &self.config.publish_outcomes;
        let outcome = outcomes
            .get(call_index)
            .or_else(|| outcomes.last())
            .cloned()
            .unwrap_or_else(|| Ok("mock-post".to_string()));
        outcome
    }

    async fn reply(
        &self,
        access_token: &str,
        parent_id: &str,
        content: &str,
    ) -> Result<String, PlatformError> {
        if let Ok(mut tokens) = self.tokens_seen.lock() {
            tokens.push(access_token.to_string());
        }
        if let Ok(mut calls) = self.reply_calls.lock() {
            calls.push((parent_id.to_string(), content.to_string()));
        }
        self.config.reply_outcome.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_mock_records_content() {
        let client = MockClient::success(Platform::Mastodon);

        let id = client.publish("tok", "first post").await.unwrap();
        assert_eq!(id, "mock-post-1");
        assert_eq!(client.publish_count(), 1);
        assert_eq!(client.published_content(), vec!["first post".to_string()]);
        assert_eq!(client.tokens_seen(), vec!["tok".to_string()]);
    }

    #[tokio::test]
    async fn test_outcomes_replay_in_order_then_repeat() {
        let client = MockClient::with_outcomes(
            Platform::Bluesky,
            vec![
                Err(PlatformError::Transient("HTTP 503".to_string())),
                Ok("post-2".to_string()),
            ],
        );

        assert!(client.publish("tok", "a").await.is_err());
        assert_eq!(client.publish("tok", "b").await.unwrap(), "post-2");
        // Past the end of the list the last outcome repeats
        assert_eq!(client.publish("tok", "c").await.unwrap(), "post-2");
        assert_eq!(client.publish_count(), 3);
    }

    #[tokio::test]
    async fn test_reply_recording() {
        let client = MockClient::success(Platform::Mastodon);
        client.reply("tok", "parent-1", "the link").await.unwrap();
        assert_eq!(
            client.replies(),
            vec![("parent-1".to_string(), "the link".to_string())]
        );
    }
}
