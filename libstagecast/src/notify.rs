//! Terminal-failure notifications
//!
//! When a target exhausts its retries the orchestrator sends exactly one
//! notification through a chat-bot webhook. Delivery is best effort: a
//! failed send is logged and swallowed, never retried, and never affects
//! the target's stored state.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

use crate::types::{Platform, MAX_RETRIES};

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);
const SNIPPET_LEN: usize = 100;

/// Everything a failure notification carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureNotice {
    pub item_id: String,
    pub platform: Platform,
    pub content: String,
    pub error_detail: String,
    pub retry_count: i64,
}

impl FailureNotice {
    /// Render the notification message
    ///
    /// The leading marker line and the `attempts/max` counter are fixed
    /// strings that downstream alerting matches on.
    pub fn render(&self) -> String {
        let snippet: String = self.content.chars().take(SNIPPET_LEN).collect();
        format!(
            "Post Publishing Failed\nPlatform: {}\nContent: {}\nError: {}\nAttempts: {}/{}",
            self.platform, snippet, self.error_detail, self.retry_count, MAX_RETRIES
        )
    }
}

/// Delivers terminal-failure notices
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send one notice. Implementations must not return an error for
    /// delivery failures; they log and absorb them.
    async fn notify_failure(&self, notice: &FailureNotice);
}

/// Chat-bot webhook notifier (Telegram-style `sendMessage` API)
pub struct WebhookNotifier {
    client: reqwest::Client,
    api_base: String,
    chat_id: String,
    bot_token: String,
}

impl WebhookNotifier {
    pub fn new(api_base: String, chat_id: String, bot_token: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(NOTIFY_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_base: api_base.trim_end_matches('/').to_string(),
            chat_id,
            bot_token,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify_failure(&self, notice: &FailureNotice) {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": notice.render(),
        });

        match self.client.post(&url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                warn!(
                    item_id = %notice.item_id,
                    platform = %notice.platform,
                    status = response.status().as_u16(),
                    "failure notification rejected by webhook"
                );
            }
            Err(e) => {
                warn!(
                    item_id = %notice.item_id,
                    platform = %notice.platform,
                    error = %e,
                    "failure notification could not be delivered"
                );
            }
        }
    }
}

/// Fallback notifier used when no webhook is configured
///
/// Keeps the exactly-once failure notice visible in the logs so a
/// deployment without a chat webhook still surfaces terminal failures.
#[derive(Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_failure(&self, notice: &FailureNotice) {
        warn!(
            item_id = %notice.item_id,
            platform = %notice.platform,
            "{}",
            notice.render()
        );
    }
}

/// Test notifier that records every notice
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<FailureNotice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<FailureNotice> {
        match self.notices.lock() {
            Ok(notices) => notices.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_failure(&self, notice: &FailureNotice) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(notice.clone());
        }
    }
}
