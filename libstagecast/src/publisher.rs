//! Single publish attempts
//!
//! One attempt takes a target from decrypted credentials to a platform
//! post id. The executor refreshes an expired access token first, then
//! publishes, then posts the item's link as a threaded reply where the
//! platform supports it. The link follow-up is best effort: its failure
//! never changes the outcome of the attempt.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::db::Database;
use crate::error::{PlatformError, Result, StagecastError};
use crate::platforms::PlatformClient;
use crate::refresher::TokenRefresher;
use crate::types::{Platform, PlatformTarget, ScheduledItem};
use crate::vault::Vault;

/// How one publish attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Published; the platform assigned this post id
    Success { published_id: String },
    /// Failed in a way a later retry may resolve
    Transient { detail: String },
    /// Failed in a way no retry will resolve
    Permanent { detail: String },
}

/// Executes one publish attempt for one platform target
pub struct PublishAttemptExecutor {
    db: Database,
    vault: Arc<Vault>,
    refresher: Arc<TokenRefresher>,
    clients: HashMap<Platform, Arc<dyn PlatformClient>>,
}

impl PublishAttemptExecutor {
    pub fn new(
        db: Database,
        vault: Arc<Vault>,
        refresher: Arc<TokenRefresher>,
        clients: HashMap<Platform, Arc<dyn PlatformClient>>,
    ) -> Self {
        Self {
            db,
            vault,
            refresher,
            clients,
        }
    }

    /// Run one attempt
    ///
    /// Returns `Err` only for infrastructure failures (database); those
    /// are treated upstream like transient outcomes. Everything the
    /// platform or credential layer produces is folded into the outcome.
    pub async fn attempt(
        &self,
        item: &ScheduledItem,
        target: &PlatformTarget,
    ) -> Result<AttemptOutcome> {
        let Some(client) = self.clients.get(&target.platform) else {
            return Ok(AttemptOutcome::Permanent {
                detail: format!("no client configured for {}", target.platform),
            });
        };

        let access_token = match self.fresh_access_token(&item.user_id, target.platform).await {
            Ok(token) => token,
            Err(StagecastError::Platform(e)) if e.is_transient() => {
                return Ok(AttemptOutcome::Transient {
                    detail: e.to_string(),
                })
            }
            Err(StagecastError::Platform(e)) => {
                return Ok(AttemptOutcome::Permanent {
                    detail: e.to_string(),
                })
            }
            Err(StagecastError::Crypto(e)) => {
                return Ok(AttemptOutcome::Permanent {
                    detail: e.to_string(),
                })
            }
            Err(other) => return Err(other),
        };

        let published_id = match client.publish(&access_token, &target.content).await {
            Ok(id) => id,
            Err(e) if e.is_transient() => {
                return Ok(AttemptOutcome::Transient {
                    detail: e.to_string(),
                })
            }
            Err(e) => {
                return Ok(AttemptOutcome::Permanent {
                    detail: e.to_string(),
                })
            }
        };

        debug!(
            item_id = %item.id,
            platform = %target.platform,
            published_id = %published_id,
            "published"
        );

        // Best-effort link follow-up, posted as a reply in the same
        // thread. Its failure does not touch the attempt outcome.
        if let Some(link) = &item.link {
            if client.supports_threading() {
                if let Err(e) = client.reply(&access_token, &published_id, link).await {
                    warn!(
                        item_id = %item.id,
                        platform = %target.platform,
                        error = %e,
                        "link follow-up failed"
                    );
                }
            }
        }

        Ok(AttemptOutcome::Success { published_id })
    }

    /// The current access token, refreshing first if it has expired
    async fn fresh_access_token(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<Zeroizing<String>> {
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

        if credential.is_expired(chrono::Utc::now().timestamp_millis()) {
            debug!(%platform, user_id, "access token expired, refreshing");
            return self.refresher.refresh(user_id, platform).await;
        }

        Ok(self.vault.decrypt(&credential.access_token_enc)?)
    }
}
