//! Database operations for Stagecast
//!
//! The persisted item/target row is the single source of truth for the
//! publishing pipeline: scheduler fires coordinate only through guarded
//! status updates here, never through in-process state.

use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::path::Path;

use crate::error::{DbError, Result};
use crate::types::{Credential, ItemStatus, Platform, PlatformTarget, RecurringQueue, ScheduledItem};

/// A scheduled item with all its platform targets
#[derive(Debug, Clone)]
pub struct ItemWithTargets {
    pub item: ScheduledItem,
    pub targets: Vec<PlatformTarget>,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        // Expand path and create parent directories
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // Use forward slashes for the SQLite URL and mode=rwc so the file
        // is created on first run
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    // ------------------------------------------------------------------
    // Items and targets
    // ------------------------------------------------------------------

    /// Insert an item with its platform targets in one transaction
    pub async fn create_item(&self, item: &ScheduledItem, targets: &[PlatformTarget]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;

        sqlx::query("INSERT INTO items (id, user_id, link, created_at) VALUES (?, ?, ?, ?)")
            .bind(&item.id)
            .bind(&item.user_id)
            .bind(&item.link)
            .bind(item.created_at)
            .execute(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?;

        for target in targets {
            sqlx::query(
                r#"
                INSERT INTO item_targets
                    (item_id, platform, content, scheduled_at, status, retry_count)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&target.item_id)
            .bind(target.platform.as_str())
            .bind(&target.content)
            .bind(target.scheduled_at)
            .bind(target.status.as_str())
            .bind(target.retry_count)
            .execute(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?;
        }

        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Get an item by id
    pub async fn get_item(&self, item_id: &str) -> Result<Option<ScheduledItem>> {
        let row = sqlx::query("SELECT id, user_id, link, created_at FROM items WHERE id = ?")
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| ScheduledItem {
            id: r.get("id"),
            user_id: r.get("user_id"),
            link: r.get("link"),
            created_at: r.get("created_at"),
        }))
    }

    /// Get one platform target by (item, platform)
    pub async fn get_target(
        &self,
        item_id: &str,
        platform: Platform,
    ) -> Result<Option<PlatformTarget>> {
        let row = sqlx::query(
            r#"
            SELECT id, item_id, platform, content, scheduled_at, status,
                   published_id, error_message, retry_count, job_handle
            FROM item_targets WHERE item_id = ? AND platform = ?
            "#,
        )
        .bind(item_id)
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(Self::map_target))
    }

    /// All targets for an item
    pub async fn list_targets(&self, item_id: &str) -> Result<Vec<PlatformTarget>> {
        let rows = sqlx::query(
            r#"
            SELECT id, item_id, platform, content, scheduled_at, status,
                   published_id, error_message, retry_count, job_handle
            FROM item_targets WHERE item_id = ? ORDER BY platform
            "#,
        )
        .bind(item_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.into_iter().map(Self::map_target).collect())
    }

    /// Get an item together with its targets
    pub async fn get_item_with_targets(&self, item_id: &str) -> Result<Option<ItemWithTargets>> {
        let Some(item) = self.get_item(item_id).await? else {
            return Ok(None);
        };
        let targets = self.list_targets(item_id).await?;
        Ok(Some(ItemWithTargets { item, targets }))
    }

    /// Update a target's content and schedule (user edit while Scheduled)
    pub async fn update_target(
        &self,
        item_id: &str,
        platform: Platform,
        content: &str,
        scheduled_at: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE item_targets SET content = ?, scheduled_at = ?
            WHERE item_id = ? AND platform = ?
            "#,
        )
        .bind(content)
        .bind(scheduled_at)
        .bind(item_id)
        .bind(platform.as_str())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Delete an item and all its targets
    pub async fn delete_item(&self, item_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;

        sqlx::query("DELETE FROM item_targets WHERE item_id = ?")
            .bind(item_id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::query("DELETE FROM items WHERE id = ?")
            .bind(item_id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?;

        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Guarded status transition
    ///
    /// Updates the status only when the current status is one of `from`,
    /// and reports whether a row was actually changed. A duplicate
    /// scheduler fire loses this race and observes `false`.
    pub async fn transition_status(
        &self,
        item_id: &str,
        platform: Platform,
        from: &[ItemStatus],
        to: ItemStatus,
    ) -> Result<bool> {
        let placeholders = vec!["?"; from.len()].join(", ");
        let sql = format!(
            "UPDATE item_targets SET status = ? WHERE item_id = ? AND platform = ? AND status IN ({})",
            placeholders
        );

        let mut query = sqlx::query(&sql)
            .bind(to.as_str())
            .bind(item_id)
            .bind(platform.as_str());
        for status in from {
            query = query.bind(status.as_str());
        }

        let result = query
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a successful publish: terminal Published state plus the
    /// platform-assigned id
    pub async fn mark_published(
        &self,
        item_id: &str,
        platform: Platform,
        published_id: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE item_targets
            SET status = 'published', published_id = ?, error_message = NULL, job_handle = NULL
            WHERE item_id = ? AND platform = ?
            "#,
        )
        .bind(published_id)
        .bind(item_id)
        .bind(platform.as_str())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Record a retry: back to Scheduled with the bumped count and the
    /// new job handle
    pub async fn record_retry(
        &self,
        item_id: &str,
        platform: Platform,
        retry_count: i64,
        job_handle: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE item_targets
            SET status = 'scheduled', retry_count = ?, job_handle = ?
            WHERE item_id = ? AND platform = ?
            "#,
        )
        .bind(retry_count)
        .bind(job_handle)
        .bind(item_id)
        .bind(platform.as_str())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Record a terminal failure with its human-readable message
    pub async fn mark_failed(
        &self,
        item_id: &str,
        platform: Platform,
        error_message: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE item_targets
            SET status = 'failed', error_message = ?, job_handle = NULL
            WHERE item_id = ? AND platform = ?
            "#,
        )
        .bind(error_message)
        .bind(item_id)
        .bind(platform.as_str())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Store or clear the scheduler job handle for a target
    pub async fn set_job_handle(
        &self,
        item_id: &str,
        platform: Platform,
        job_handle: Option<&str>,
    ) -> Result<()> {
        sqlx::query("UPDATE item_targets SET job_handle = ? WHERE item_id = ? AND platform = ?")
            .bind(job_handle)
            .bind(item_id)
            .bind(platform.as_str())
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// All Scheduled targets, oldest first (daemon startup re-arm)
    pub async fn pending_targets(&self) -> Result<Vec<PlatformTarget>> {
        let rows = sqlx::query(
            r#"
            SELECT id, item_id, platform, content, scheduled_at, status,
                   published_id, error_message, retry_count, job_handle
            FROM item_targets WHERE status = 'scheduled'
            ORDER BY scheduled_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.into_iter().map(Self::map_target).collect())
    }

    /// Scheduled targets with no armed job whose fire time has passed
    /// (daemon poll-loop catch-up)
    pub async fn due_unarmed_targets(&self, now: i64) -> Result<Vec<PlatformTarget>> {
        let rows = sqlx::query(
            r#"
            SELECT id, item_id, platform, content, scheduled_at, status,
                   published_id, error_message, retry_count, job_handle
            FROM item_targets
            WHERE status = 'scheduled' AND job_handle IS NULL AND scheduled_at <= ?
            ORDER BY scheduled_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.into_iter().map(Self::map_target).collect())
    }

    /// Requeue targets stranded mid-publish by a dead process
    ///
    /// A target only sits in Publishing while a live worker drives it, so
    /// every Publishing row found at startup belongs to a run that died
    /// before recording an outcome. Sweeping them back to Scheduled (with
    /// the stale handle cleared) lets the startup re-arm pick them up.
    /// Returns the number of requeued targets.
    pub async fn reset_stale_publishing(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE item_targets
            SET status = 'scheduled', job_handle = NULL
            WHERE status = 'publishing'
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;
        Ok(result.rows_affected())
    }

    /// Scheduled targets for a platform inside a time window (conflict
    /// detection)
    pub async fn targets_in_window(
        &self,
        platform: Platform,
        window_start: i64,
        window_end: i64,
    ) -> Result<Vec<PlatformTarget>> {
        let rows = sqlx::query(
            r#"
            SELECT id, item_id, platform, content, scheduled_at, status,
                   published_id, error_message, retry_count, job_handle
            FROM item_targets
            WHERE platform = ? AND status = 'scheduled'
              AND scheduled_at >= ? AND scheduled_at <= ?
            ORDER BY scheduled_at ASC
            "#,
        )
        .bind(platform.as_str())
        .bind(window_start)
        .bind(window_end)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.into_iter().map(Self::map_target).collect())
    }

    // ------------------------------------------------------------------
    // Credentials
    // ------------------------------------------------------------------

    /// Store a credential, replacing access token, refresh token, and
    /// expiry atomically together
    pub async fn upsert_credential(&self, credential: &Credential) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO credentials
                (user_id, platform, access_token_enc, refresh_token_enc, expires_at_ms)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (user_id, platform) DO UPDATE SET
                access_token_enc = excluded.access_token_enc,
                refresh_token_enc = excluded.refresh_token_enc,
                expires_at_ms = excluded.expires_at_ms
            "#,
        )
        .bind(&credential.user_id)
        .bind(credential.platform.as_str())
        .bind(&credential.access_token_enc)
        .bind(&credential.refresh_token_enc)
        .bind(credential.expires_at_ms)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Look up the credential for a (user, platform) pair
    pub async fn get_credential(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<Option<Credential>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, platform, access_token_enc, refresh_token_enc, expires_at_ms
            FROM credentials WHERE user_id = ? AND platform = ?
            "#,
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| Credential {
            user_id: r.get("user_id"),
            platform: Platform::from_str_opt(&r.get::<String, _>("platform"))
                .unwrap_or(Platform::Mastodon),
            access_token_enc: r.get("access_token_enc"),
            refresh_token_enc: r.get("refresh_token_enc"),
            expires_at_ms: r.get("expires_at_ms"),
        }))
    }

    /// Remove a credential (user revoked the grant)
    pub async fn delete_credential(&self, user_id: &str, platform: Platform) -> Result<()> {
        sqlx::query("DELETE FROM credentials WHERE user_id = ? AND platform = ?")
            .bind(user_id)
            .bind(platform.as_str())
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Recurring queues
    // ------------------------------------------------------------------

    pub async fn create_recurring_queue(&self, queue: &RecurringQueue) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO recurring_queues
                (id, item_id, platform, interval_minutes, next_fire_at,
                 execution_count, max_executions)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&queue.id)
        .bind(&queue.item_id)
        .bind(queue.platform.as_str())
        .bind(queue.interval_minutes)
        .bind(queue.next_fire_at)
        .bind(queue.execution_count)
        .bind(queue.max_executions)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;
        Ok(())
    }

    pub async fn get_recurring_queue(&self, queue_id: &str) -> Result<Option<RecurringQueue>> {
        let row = sqlx::query(
            r#"
            SELECT id, item_id, platform, interval_minutes, next_fire_at,
                   execution_count, max_executions
            FROM recurring_queues WHERE id = ?
            "#,
        )
        .bind(queue_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| RecurringQueue {
            id: r.get("id"),
            item_id: r.get("item_id"),
            platform: Platform::from_str_opt(&r.get::<String, _>("platform"))
                .unwrap_or(Platform::Mastodon),
            interval_minutes: r.get("interval_minutes"),
            next_fire_at: r.get("next_fire_at"),
            execution_count: r.get("execution_count"),
            max_executions: r.get("max_executions"),
        }))
    }

    /// Recurring queues whose next fire time has passed
    pub async fn due_recurring_queues(&self, now: i64) -> Result<Vec<RecurringQueue>> {
        let rows = sqlx::query(
            r#"
            SELECT id, item_id, platform, interval_minutes, next_fire_at,
                   execution_count, max_executions
            FROM recurring_queues WHERE next_fire_at <= ?
            ORDER BY next_fire_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows
            .into_iter()
            .map(|r| RecurringQueue {
                id: r.get("id"),
                item_id: r.get("item_id"),
                platform: Platform::from_str_opt(&r.get::<String, _>("platform"))
                    .unwrap_or(Platform::Mastodon),
                interval_minutes: r.get("interval_minutes"),
                next_fire_at: r.get("next_fire_at"),
                execution_count: r.get("execution_count"),
                max_executions: r.get("max_executions"),
            })
            .collect())
    }

    /// Remove a recurring queue
    pub async fn delete_recurring_queue(&self, queue_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM recurring_queues WHERE id = ?")
            .bind(queue_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Persist an advanced queue (execution count and next fire time)
    pub async fn update_recurring_queue(&self, queue: &RecurringQueue) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE recurring_queues
            SET next_fire_at = ?, execution_count = ?
            WHERE id = ?
            "#,
        )
        .bind(queue.next_fire_at)
        .bind(queue.execution_count)
        .bind(&queue.id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Raw pool access for tests that need to poke at rows directly
    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// In-memory database for unit tests
    #[cfg(test)]
    pub(crate) async fn in_memory() -> Database {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("migrations");
        Database { pool }
    }

    fn map_target(r: sqlx::sqlite::SqliteRow) -> PlatformTarget {
        PlatformTarget {
            id: Some(r.get("id")),
            item_id: r.get("item_id"),
            platform: Platform::from_str_opt(&r.get::<String, _>("platform"))
                .unwrap_or(Platform::Mastodon),
            content: r.get("content"),
            scheduled_at: r.get("scheduled_at"),
            status: ItemStatus::from_str_opt(&r.get::<String, _>("status"))
                .unwrap_or(ItemStatus::Scheduled),
            published_id: r.get("published_id"),
            error_message: r.get("error_message"),
            retry_count: r.get("retry_count"),
            job_handle: r.get("job_handle"),
        }
    }
}
