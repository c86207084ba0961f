//! Publish orchestration
//!
//! Drives a platform target through its lifecycle when a scheduler fire
//! arrives. The guarded `scheduled -> publishing` transition is the
//! concurrency backstop: duplicate fires, stale timers, and racing
//! workers all lose that update and become no-ops, which also keeps the
//! terminal-failure notification to exactly one send.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::db::Database;
use crate::error::Result;
use crate::notify::{FailureNotice, Notifier};
use crate::publisher::{AttemptOutcome, PublishAttemptExecutor};
use crate::scheduler::{JobPayload, JobScheduler};
use crate::types::{ItemStatus, Platform, PlatformTarget, MAX_RETRIES};

/// Retry pacing for failed publish attempts
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum retries per target
    pub max_retries: i64,
    /// Delay before the first retry; doubles each retry (1, 2, 4 minutes
    /// at the default)
    pub retry_base: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            retry_base: Duration::from_secs(60),
        }
    }
}

impl OrchestratorConfig {
    /// Second-scale pacing for tests
    pub fn fast() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            retry_base: Duration::from_secs(1),
        }
    }

    /// Delay before the retry that brings the count to `retry_count + 1`
    fn retry_delay(&self, retry_count: i64) -> Duration {
        self.retry_base * 2u32.saturating_pow(retry_count.clamp(0, 30) as u32)
    }
}

pub struct PublishOrchestrator {
    db: Database,
    executor: PublishAttemptExecutor,
    scheduler: Arc<dyn JobScheduler>,
    notifier: Arc<dyn Notifier>,
    config: OrchestratorConfig,
}

impl PublishOrchestrator {
    pub fn new(
        db: Database,
        executor: PublishAttemptExecutor,
        scheduler: Arc<dyn JobScheduler>,
        notifier: Arc<dyn Notifier>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            db,
            executor,
            scheduler,
            notifier,
            config,
        }
    }

    /// Handle one scheduler fire for a target
    ///
    /// Safe to call any number of times for the same target: fires
    /// against missing, terminal, or already-claimed targets are no-ops.
    pub async fn handle_fire(&self, item_id: &str, platform: Platform) -> Result<()> {
        let Some(target) = self.db.get_target(item_id, platform).await? else {
            debug!(item_id, %platform, "fire for unknown target, ignoring");
            return Ok(());
        };

        if target.status.is_terminal() {
            debug!(
                item_id,
                %platform,
                status = %target.status,
                "fire for terminal target, ignoring"
            );
            return Ok(());
        }

        // Claim the target. Losing this update means another fire for the
        // same target got here first.
        let claimed = self
            .db
            .transition_status(item_id, platform, &[ItemStatus::Scheduled], ItemStatus::Publishing)
            .await?;
        if !claimed {
            debug!(item_id, %platform, "target already claimed, ignoring fire");
            return Ok(());
        }

        // An orphaned target can never publish; give it the same terminal
        // treatment as a permanent failure so the owner hears about it
        let Some(item) = self.db.get_item(item_id).await? else {
            warn!(item_id, %platform, "claimed target has no parent item");
            self.fail_target(&target, "parent item missing").await?;
            return Ok(());
        };

        let outcome = match self.executor.attempt(&item, &target).await {
            Ok(outcome) => outcome,
            // Infrastructure failures get the same treatment as a
            // transient platform error
            Err(e) => AttemptOutcome::Transient {
                detail: e.to_string(),
            },
        };

        match outcome {
            AttemptOutcome::Success { published_id } => {
                self.db
                    .mark_published(item_id, platform, &published_id)
                    .await?;
                info!(item_id, %platform, published_id, "target published");
            }
            AttemptOutcome::Transient { detail } if target.retry_count < self.config.max_retries => {
                self.schedule_retry(&target, &detail).await?;
            }
            AttemptOutcome::Transient { detail } | AttemptOutcome::Permanent { detail } => {
                self.fail_target(&target, &detail).await?;
            }
        }

        Ok(())
    }

    async fn schedule_retry(&self, target: &PlatformTarget, detail: &str) -> Result<()> {
        let new_count = target.retry_count + 1;
        let delay = self.config.retry_delay(target.retry_count);
        let fire_at = chrono::Utc::now().timestamp() + delay.as_secs() as i64;

        let handle = self
            .scheduler
            .schedule_at(
                fire_at,
                JobPayload {
                    item_id: target.item_id.clone(),
                    platform: target.platform,
                },
            )
            .await;

        self.db
            .record_retry(&target.item_id, target.platform, new_count, &handle)
            .await?;

        warn!(
            item_id = %target.item_id,
            platform = %target.platform,
            retry = new_count,
            max_retries = self.config.max_retries,
            delay_secs = delay.as_secs(),
            detail,
            "publish attempt failed, retry scheduled"
        );
        Ok(())
    }

    async fn fail_target(&self, target: &PlatformTarget, detail: &str) -> Result<()> {
        self.db
            .mark_failed(&target.item_id, target.platform, detail)
            .await?;

        error!(
            item_id = %target.item_id,
            platform = %target.platform,
            retry_count = target.retry_count,
            detail,
            "target failed terminally"
        );

        // The claim above makes this path run once per target, so the
        // notice cannot be duplicated.
        self.notifier
            .notify_failure(&FailureNotice {
                item_id: target.item_id.clone(),
                platform: target.platform,
                content: target.content.clone(),
                error_detail: detail.to_string(),
                retry_count: target.retry_count,
            })
            .await;
        Ok(())
    }
}
