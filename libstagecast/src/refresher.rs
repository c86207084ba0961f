//! OAuth token refresh
//!
//! Refreshes a (user, platform) grant against the platform's token
//! endpoint, re-encrypts both tokens, and persists them together with the
//! new expiry in a single credential write. Transient endpoint failures
//! are retried with exponential backoff; a rejected grant surfaces as a
//! re-authorization error and is never retried.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::config::{Config, Secrets};
use crate::db::Database;
use crate::error::{PlatformError, Result, StagecastError};
use crate::platforms::classify_transport_error;
use crate::types::{Credential, Platform};
use crate::vault::Vault;

/// Fallback token lifetime when the endpoint omits `expires_in`: 60 days
const DEFAULT_EXPIRES_IN_SECS: i64 = 5_184_000;

/// Retry behavior for the token endpoint
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each retry
    pub base_delay: Duration,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Millisecond-scale policy for tests
    pub fn fast() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            request_timeout: Duration::from_secs(5),
        }
    }

    /// Backoff before the given retry (attempt numbers start at 1)
    fn delay_before_attempt(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(2))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

/// Refreshes stored OAuth credentials
pub struct TokenRefresher {
    db: Database,
    vault: Arc<Vault>,
    config: Arc<Config>,
    secrets: Arc<Secrets>,
    policy: RetryPolicy,
    client: reqwest::Client,
}

impl TokenRefresher {
    pub fn new(
        db: Database,
        vault: Arc<Vault>,
        config: Arc<Config>,
        secrets: Arc<Secrets>,
        policy: RetryPolicy,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(policy.request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            db,
            vault,
            config,
            secrets,
            policy,
            client,
        }
    }

    /// Refresh the stored grant and return the fresh access token
    ///
    /// On success both tokens and the expiry have been persisted before
    /// this returns. A response lacking either token leaves the stored
    /// credential untouched.
    pub async fn refresh(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<Zeroizing<String>> {
        let platform_config = self.config.platform(platform).ok_or_else(|| {
            PlatformError::MissingCredentials(format!("{} is not enabled", platform))
        })?;
        let client_creds = self.secrets.client_credentials(platform).ok_or_else(|| {
            PlatformError::MissingCredentials(format!(
                "no client id/secret configured for {}",
                platform
            ))
        })?;

        let credential = self
            .db
            .get_credential(user_id, platform)
            .await?
            .ok_or_else(|| {
                PlatformError::NeedsReauth(format!(
                    "no stored credential for user {} on {}",
                    user_id, platform
                ))
            })?;

        let refresh_token = self.vault.decrypt(&credential.refresh_token_enc)?;

        let response = self
            .request_with_retry(&platform_config.token_url, &refresh_token, client_creds)
            .await?;

        let (access_token, new_refresh_token) =
            match (response.access_token, response.refresh_token) {
                (Some(access), Some(refresh)) => (Zeroizing::new(access), Zeroizing::new(refresh)),
                (access, refresh) => {
                    let mut missing = Vec::new();
                    if access.is_none() {
                        missing.push("access_token");
                    }
                    if refresh.is_none() {
                        missing.push("refresh_token");
                    }
                    return Err(StagecastError::Platform(PlatformError::MissingTokens(
                        format!("token endpoint omitted {}", missing.join(" and ")),
                    )));
                }
            };

        let expires_in = response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        let expires_at_ms = chrono::Utc::now().timestamp_millis() + expires_in * 1000;

        // Re-encrypt both tokens and replace the row wholesale, so the
        // stored triple is never mixed across refreshes
        let access_token_enc = self.vault.encrypt(&access_token)?;
        let refresh_token_enc = self.vault.encrypt(&new_refresh_token)?;

        self.db
            .upsert_credential(&Credential {
                user_id: user_id.to_string(),
                platform,
                access_token_enc,
                refresh_token_enc,
                expires_at_ms,
            })
            .await?;

        debug!(%platform, user_id, expires_at_ms, "refreshed credential");
        Ok(access_token)
    }

    async fn request_with_retry(
        &self,
        token_url: &str,
        refresh_token: &str,
        client_creds: &crate::config::ClientCredentials,
    ) -> Result<TokenResponse> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self
                .request_once(token_url, refresh_token, client_creds)
                .await
            {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay_before_attempt(attempt + 1);
                    warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "token refresh attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn request_once(
        &self,
        token_url: &str,
        refresh_token: &str,
        client_creds: &crate::config::ClientCredentials,
    ) -> std::result::Result<TokenResponse, PlatformError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_creds.client_id.as_str()),
            ("client_secret", client_creds.client_secret.as_str()),
        ];

        let response = self
            .client
            .post(token_url)
            .form(&form)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::from_status(status, body));
        }

        response
            .json()
            .await
            .map_err(|e| PlatformError::Permanent(format!("malformed token response: {}", e)))
    }
}
