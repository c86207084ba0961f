//! Platform client abstraction and implementations
//!
//! Each implementation wraps one platform's publish API. Clients are
//! stateless with respect to credentials: the decrypted access token is
//! passed per call and never stored on the client.

use async_trait::async_trait;

use crate::error::PlatformError;
use crate::types::Platform;

pub mod bluesky;
pub mod mastodon;

// Mock client is available for all builds to support integration tests
pub mod mock;

/// Unified publish interface over platform APIs
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Which platform this client talks to
    fn platform(&self) -> Platform;

    /// Whether the platform supports threaded replies (link follow-ups)
    fn supports_threading(&self) -> bool;

    /// Maximum characters per post, or None if unlimited
    fn character_limit(&self) -> Option<usize>;

    /// Publish content, returning the platform-assigned post id
    async fn publish(
        &self,
        access_token: &str,
        content: &str,
    ) -> Result<String, PlatformError>;

    /// Post a threaded reply under an existing post
    ///
    /// Only meaningful when [`supports_threading`](Self::supports_threading)
    /// returns true.
    async fn reply(
        &self,
        access_token: &str,
        parent_id: &str,
        content: &str,
    ) -> Result<String, PlatformError>;
}

/// Map a reqwest transport error to the retry classification
///
/// Timeouts get their own variant so logs can distinguish them; all other
/// transport failures (connection refused, DNS, reset) are transient.
pub(crate) fn classify_transport_error(err: reqwest::Error) -> PlatformError {
    if err.is_timeout() {
        PlatformError::Timeout(err.to_string())
    } else {
        PlatformError::Transient(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_transport_error_connection() {
        // A refused connection is transient, not permanent
        let rt = tokio::runtime::Runtime::new().unwrap();
        let err = rt.block_on(async {
            reqwest::Client::new()
                .get("http://127.0.0.1:1/unreachable")
                .send()
                .await
                .unwrap_err()
        });
        assert!(classify_transport_error(err).is_transient());
    }
}
