//! Core types for Stagecast

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of publish retries per platform target
pub const MAX_RETRIES: i64 = 3;

/// A platform a scheduled item can be delivered to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Mastodon,
    Bluesky,
}

impl Platform {
    /// Lowercase identifier used in the database and in configuration keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Mastodon => "mastodon",
            Platform::Bluesky => "bluesky",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "mastodon" => Some(Platform::Mastodon),
            "bluesky" => Some(Platform::Bluesky),
            _ => None,
        }
    }

    pub fn all() -> [Platform; 2] {
        [Platform::Mastodon, Platform::Bluesky]
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a platform target
///
/// Transitions only along `Scheduled -> Publishing -> {Published |
/// Scheduled (retry) | Failed}`. `Published` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ItemStatus {
    Scheduled,
    Publishing,
    Published,
    Failed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Scheduled => "scheduled",
            ItemStatus::Publishing => "publishing",
            ItemStatus::Published => "published",
            ItemStatus::Failed => "failed",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(ItemStatus::Scheduled),
            "publishing" => Some(ItemStatus::Publishing),
            "published" => Some(ItemStatus::Published),
            "failed" => Some(ItemStatus::Failed),
            _ => None,
        }
    }

    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Published | ItemStatus::Failed)
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One unit of scheduled content, owned by a user
///
/// Per-platform content and timing live on [`PlatformTarget`] rows; the
/// item itself carries only what is shared across platforms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledItem {
    pub id: String,
    pub user_id: String,
    /// Optional attached link, posted as a threaded follow-up where the
    /// platform supports it
    pub link: Option<String>,
    pub created_at: i64,
}

impl ScheduledItem {
    pub fn new(user_id: String, link: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            link,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Per-platform delivery state for a scheduled item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformTarget {
    pub id: Option<i64>,
    pub item_id: String,
    pub platform: Platform,
    pub content: String,
    /// Target publish time (Unix timestamp, seconds)
    pub scheduled_at: i64,
    pub status: ItemStatus,
    /// Platform-assigned post id, set iff the publish succeeded
    pub published_id: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: i64,
    /// Opaque scheduler job handle, used to cancel a pending fire
    pub job_handle: Option<String>,
}

impl PlatformTarget {
    pub fn new(item_id: String, platform: Platform, content: String, scheduled_at: i64) -> Self {
        Self {
            id: None,
            item_id,
            platform,
            content,
            scheduled_at,
            status: ItemStatus::Scheduled,
            published_id: None,
            error_message: None,
            retry_count: 0,
            job_handle: None,
        }
    }
}

/// One OAuth grant for a (user, platform) pair
///
/// Both tokens are stored only in encrypted form (vault blob strings) and
/// are replaced atomically together with the expiry on every refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub user_id: String,
    pub platform: Platform,
    pub access_token_enc: String,
    pub refresh_token_enc: String,
    /// Absolute expiry, epoch milliseconds
    pub expires_at_ms: i64,
}

impl Credential {
    /// Whether the access token has expired as of `now_ms`
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms <= now_ms
    }
}

/// A repeating schedule anchored to an original item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringQueue {
    pub id: String,
    pub item_id: String,
    pub platform: Platform,
    pub interval_minutes: i64,
    /// Next fire time (Unix timestamp, seconds)
    pub next_fire_at: i64,
    pub execution_count: i64,
    pub max_executions: Option<i64>,
}

impl RecurringQueue {
    pub fn new(
        item_id: String,
        platform: Platform,
        interval_minutes: i64,
        next_fire_at: i64,
        max_executions: Option<i64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            item_id,
            platform,
            interval_minutes,
            next_fire_at,
            execution_count: 0,
            max_executions,
        }
    }

    /// Whether the queue has used up its execution budget
    pub fn is_exhausted(&self) -> bool {
        match self.max_executions {
            Some(max) => self.execution_count >= max,
            None => false,
        }
    }

    /// Advance past one execution, moving the next-fire time forward
    pub fn advance(&mut self) {
        self.execution_count += 1;
        self.next_fire_at += self.interval_minutes * 60;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduled_item_new_uuid_generation() {
        let item = ScheduledItem::new("user-1".to_string(), None);
        let uuid = uuid::Uuid::parse_str(&item.id).expect("item id should be a valid UUID");
        assert_eq!(uuid.get_version(), Some(uuid::Version::Random));
    }

    #[test]
    fn test_scheduled_item_new_unique_ids() {
        let a = ScheduledItem::new("user-1".to_string(), None);
        let b = ScheduledItem::new("user-1".to_string(), None);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_scheduled_item_defaults() {
        let item = ScheduledItem::new("user-1".to_string(), Some("https://example.com".into()));
        assert_eq!(item.user_id, "user-1");
        assert_eq!(item.link.as_deref(), Some("https://example.com"));
        assert!(item.created_at > 1_600_000_000);
    }

    #[test]
    fn test_platform_target_defaults() {
        let target = PlatformTarget::new(
            "item-1".to_string(),
            Platform::Mastodon,
            "Hello fediverse".to_string(),
            1_900_000_000,
        );
        assert_eq!(target.status, ItemStatus::Scheduled);
        assert_eq!(target.retry_count, 0);
        assert_eq!(target.published_id, None);
        assert_eq!(target.error_message, None);
        assert_eq!(target.job_handle, None);
    }

    #[test]
    fn test_item_status_round_trip() {
        for status in [
            ItemStatus::Scheduled,
            ItemStatus::Publishing,
            ItemStatus::Published,
            ItemStatus::Failed,
        ] {
            assert_eq!(ItemStatus::from_str_opt(status.as_str()), Some(status));
        }
        assert_eq!(ItemStatus::from_str_opt("bogus"), None);
    }

    #[test]
    fn test_item_status_terminal() {
        assert!(ItemStatus::Published.is_terminal());
        assert!(ItemStatus::Failed.is_terminal());
        assert!(!ItemStatus::Scheduled.is_terminal());
        assert!(!ItemStatus::Publishing.is_terminal());
    }

    #[test]
    fn test_platform_round_trip() {
        for platform in Platform::all() {
            assert_eq!(Platform::from_str_opt(platform.as_str()), Some(platform));
        }
        assert_eq!(Platform::from_str_opt("myspace"), None);
    }

    #[test]
    fn test_platform_serde_lowercase() {
        let json = serde_json::to_string(&Platform::Mastodon).unwrap();
        assert_eq!(json, r#""mastodon""#);
        let back: Platform = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Platform::Mastodon);
    }

    #[test]
    fn test_credential_expiry() {
        let cred = Credential {
            user_id: "user-1".to_string(),
            platform: Platform::Mastodon,
            access_token_enc: "blob-a".to_string(),
            refresh_token_enc: "blob-r".to_string(),
            expires_at_ms: 1_000,
        };
        assert!(cred.is_expired(1_000));
        assert!(cred.is_expired(2_000));
        assert!(!cred.is_expired(999));
    }

    #[test]
    fn test_recurring_queue_advance() {
        let mut queue = RecurringQueue::new(
            "item-1".to_string(),
            Platform::Bluesky,
            30,
            1_900_000_000,
            Some(2),
        );
        assert!(!queue.is_exhausted());

        queue.advance();
        assert_eq!(queue.execution_count, 1);
        assert_eq!(queue.next_fire_at, 1_900_000_000 + 30 * 60);
        assert!(!queue.is_exhausted());

        queue.advance();
        assert!(queue.is_exhausted());
    }

    #[test]
    fn test_recurring_queue_unbounded() {
        let mut queue =
            RecurringQueue::new("item-1".to_string(), Platform::Mastodon, 60, 0, None);
        for _ in 0..100 {
            queue.advance();
        }
        assert!(!queue.is_exhausted());
    }

    #[test]
    fn test_platform_target_serialization() {
        let target = PlatformTarget::new(
            "item-1".to_string(),
            Platform::Bluesky,
            "Test".to_string(),
            1_900_000_000,
        );
        let json = serde_json::to_string(&target).unwrap();
        let back: PlatformTarget = serde_json::from_str(&json).unwrap();
        assert_eq!(back.item_id, target.item_id);
        assert_eq!(back.platform, target.platform);
        assert_eq!(back.status, target.status);
    }
}
