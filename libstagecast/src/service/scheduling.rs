//! Scheduling operations
//!
//! Creating, editing, and deleting scheduled items, plus recurring
//! queues. Edits and deletes are only allowed while every affected target
//! is still `scheduled`; once a target is claimed for publishing its row
//! belongs to the orchestrator.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::conflict::{Conflict, ConflictDetector};
use crate::db::Database;
use crate::error::{Result, StagecastError};
use crate::scheduler::{JobPayload, JobScheduler};
use crate::service::validation::ValidationService;
use crate::types::{ItemStatus, Platform, PlatformTarget, RecurringQueue, ScheduledItem};

/// One platform's slice of a new or edited item
#[derive(Debug, Clone)]
pub struct TargetRequest {
    pub platform: Platform,
    pub content: String,
    /// Target publish time (Unix seconds)
    pub scheduled_at: i64,
}

#[derive(Debug, Clone)]
pub struct CreateItemRequest {
    pub user_id: String,
    pub link: Option<String>,
    pub targets: Vec<TargetRequest>,
}

/// Conflicts found while scheduling, grouped by platform
///
/// Conflicts are surfaced rather than enforced: the item is created
/// anyway and the caller decides whether to reschedule.
#[derive(Debug, Clone)]
pub struct PlatformConflicts {
    pub platform: Platform,
    pub conflicts: Vec<Conflict>,
}

#[derive(Debug, Clone)]
pub struct CreateItemResponse {
    pub item_id: String,
    pub conflicts: Vec<PlatformConflicts>,
}

pub struct SchedulingService {
    db: Database,
    scheduler: Arc<dyn JobScheduler>,
    validation: ValidationService,
    min_separation_minutes: i64,
}

impl SchedulingService {
    pub fn new(
        db: Database,
        scheduler: Arc<dyn JobScheduler>,
        min_separation_minutes: i64,
    ) -> Self {
        Self {
            db,
            scheduler,
            validation: ValidationService::new(),
            min_separation_minutes,
        }
    }

    fn detector(&self) -> ConflictDetector {
        ConflictDetector::new(self.db.clone(), self.min_separation_minutes)
    }

    /// Create a scheduled item and arm a fire per target
    ///
    /// Every target must pass validation; scheduling conflicts do not
    /// block creation but are returned for the caller to surface.
    pub async fn create_item(&self, request: CreateItemRequest) -> Result<CreateItemResponse> {
        if request.targets.is_empty() {
            return Err(StagecastError::InvalidInput(
                "at least one platform target is required".to_string(),
            ));
        }

        let mut errors = Vec::new();
        for target in &request.targets {
            let result = self
                .validation
                .validate_target(target.platform, &target.content);
            if !result.valid {
                errors.push(format!("{}: {}", target.platform, result.errors.join("; ")));
            }
        }
        if !errors.is_empty() {
            return Err(StagecastError::InvalidInput(errors.join("; ")));
        }

        let detector = self.detector();
        let mut conflicts = Vec::new();
        for target in &request.targets {
            let found = detector
                .find_conflicts(target.platform, target.scheduled_at, None)
                .await?;
            if !found.is_empty() {
                conflicts.push(PlatformConflicts {
                    platform: target.platform,
                    conflicts: found,
                });
            }
        }

        let item = ScheduledItem::new(request.user_id, request.link);
        let targets: Vec<PlatformTarget> = request
            .targets
            .iter()
            .map(|t| {
                PlatformTarget::new(
                    item.id.clone(),
                    t.platform,
                    t.content.clone(),
                    t.scheduled_at,
                )
            })
            .collect();

        self.db.create_item(&item, &targets).await?;

        for target in &targets {
            self.arm(target).await?;
        }

        info!(
            item_id = %item.id,
            targets = targets.len(),
            conflicts = conflicts.len(),
            "item scheduled"
        );
        Ok(CreateItemResponse {
            item_id: item.id,
            conflicts,
        })
    }

    /// Edit a target's content and time while it is still scheduled
    pub async fn edit_target(
        &self,
        item_id: &str,
        platform: Platform,
        content: &str,
        scheduled_at: i64,
    ) -> Result<Vec<Conflict>> {
        let target = self
            .db
            .get_target(item_id, platform)
            .await?
            .ok_or_else(|| {
                StagecastError::InvalidInput(format!(
                    "no {} target for item {}",
                    platform, item_id
                ))
            })?;

        if target.status != ItemStatus::Scheduled {
            return Err(StagecastError::InvalidInput(format!(
                "target is {} and can no longer be edited",
                target.status
            )));
        }

        let result = self.validation.validate_target(platform, content);
        if !result.valid {
            return Err(StagecastError::InvalidInput(result.errors.join("; ")));
        }

        let conflicts = self
            .detector()
            .find_conflicts(platform, scheduled_at, Some(item_id))
            .await?;

        // Cancel the old fire before rewriting the row; a fire that slips
        // through hits the orchestrator's guards against the updated row
        if let Some(handle) = &target.job_handle {
            if !self.scheduler.cancel(handle).await {
                debug!(item_id, %platform, "old fire already gone during edit");
            }
        }

        self.db
            .update_target(item_id, platform, content, scheduled_at)
            .await?;

        let mut updated = target;
        updated.content = content.to_string();
        updated.scheduled_at = scheduled_at;
        self.arm(&updated).await?;

        Ok(conflicts)
    }

    /// Delete an item and cancel its pending fires
    ///
    /// Refused unless every target is still Scheduled: mid-publish targets
    /// must reach an outcome first, and published/failed targets stay as
    /// the item's history.
    pub async fn delete_item(&self, item_id: &str) -> Result<()> {
        let targets = self.db.list_targets(item_id).await?;
        if targets.is_empty() {
            return Err(StagecastError::InvalidInput(format!(
                "no such item: {}",
                item_id
            )));
        }

        if let Some(blocked) = targets.iter().find(|t| t.status != ItemStatus::Scheduled) {
            return Err(StagecastError::InvalidInput(format!(
                "{} target is {} and only fully scheduled items can be deleted",
                blocked.platform, blocked.status
            )));
        }

        for target in &targets {
            if let Some(handle) = &target.job_handle {
                self.scheduler.cancel(handle).await;
            }
        }

        self.db.delete_item(item_id).await?;
        info!(item_id, "item deleted");
        Ok(())
    }

    /// Create a recurring queue anchored to an existing target
    ///
    /// Returns conflicts around the first fire time; like creation, they
    /// are surfaced but not enforced.
    pub async fn schedule_recurring(
        &self,
        item_id: &str,
        platform: Platform,
        interval_minutes: i64,
        first_fire_at: i64,
        max_executions: Option<i64>,
    ) -> Result<(String, Vec<Conflict>)> {
        if interval_minutes <= 0 {
            return Err(StagecastError::InvalidInput(
                "recurring interval must be positive".to_string(),
            ));
        }

        self.db.get_target(item_id, platform).await?.ok_or_else(|| {
            StagecastError::InvalidInput(format!("no {} target for item {}", platform, item_id))
        })?;

        let conflicts = self
            .detector()
            .find_conflicts(platform, first_fire_at, Some(item_id))
            .await?;

        let queue = RecurringQueue::new(
            item_id.to_string(),
            platform,
            interval_minutes,
            first_fire_at,
            max_executions,
        );
        self.db.create_recurring_queue(&queue).await?;

        info!(
            queue_id = %queue.id,
            item_id,
            %platform,
            interval_minutes,
            "recurring queue created"
        );
        Ok((queue.id, conflicts))
    }

    /// Process due recurring queues: clone the anchor item into a fresh
    /// scheduled target and advance each queue
    ///
    /// Exhausted queues are removed. Called from the daemon's poll loop.
    pub async fn process_due_recurring(&self, now: i64) -> Result<usize> {
        let due = self.db.due_recurring_queues(now).await?;
        let mut fired = 0;

        for mut queue in due {
            if queue.is_exhausted() {
                self.db.delete_recurring_queue(&queue.id).await?;
                continue;
            }

            let Some(anchor) = self
                .db
                .get_target(&queue.item_id, queue.platform)
                .await?
            else {
                warn!(
                    queue_id = %queue.id,
                    "recurring queue lost its anchor target, removing"
                );
                self.db.delete_recurring_queue(&queue.id).await?;
                continue;
            };
            let Some(anchor_item) = self.db.get_item(&queue.item_id).await? else {
                self.db.delete_recurring_queue(&queue.id).await?;
                continue;
            };

            let item = ScheduledItem::new(anchor_item.user_id, anchor_item.link);
            let target = PlatformTarget::new(
                item.id.clone(),
                queue.platform,
                anchor.content.clone(),
                queue.next_fire_at,
            );
            self.db
                .create_item(&item, std::slice::from_ref(&target))
                .await?;
            self.arm(&target).await?;

            queue.advance();
            if queue.is_exhausted() {
                self.db.delete_recurring_queue(&queue.id).await?;
            } else {
                self.db.update_recurring_queue(&queue).await?;
            }
            fired += 1;
        }

        Ok(fired)
    }

    /// Arm a fire for a target and store the handle
    pub async fn arm(&self, target: &PlatformTarget) -> Result<()> {
        let handle = self
            .scheduler
            .schedule_at(
                target.scheduled_at,
                JobPayload {
                    item_id: target.item_id.clone(),
                    platform: target.platform,
                },
            )
            .await;
        self.db
            .set_job_handle(&target.item_id, target.platform, Some(&handle))
            .await
    }
}
