//! Scheduling conflict detection
//!
//! Checks a candidate fire time against existing scheduled targets on the
//! same platform and reports every target closer than the minimum
//! separation, so a caller can present all conflicts at once instead of
//! discovering them one reschedule at a time.

use crate::db::Database;
use crate::error::Result;
use crate::types::Platform;

/// One existing target that sits too close to a candidate time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub existing_item_id: String,
    /// The existing target's fire time (Unix seconds)
    pub existing_time: i64,
}

pub struct ConflictDetector {
    db: Database,
    min_separation_secs: i64,
}

impl ConflictDetector {
    pub fn new(db: Database, min_separation_minutes: i64) -> Self {
        Self {
            db,
            min_separation_secs: min_separation_minutes * 60,
        }
    }

    /// All scheduled targets on `platform` strictly closer to
    /// `candidate_time` than the minimum separation
    ///
    /// A target exactly at the separation boundary is not a conflict.
    /// Targets belonging to `exclude_item` are skipped so an item can be
    /// rescheduled against its own slot.
    pub async fn find_conflicts(
        &self,
        platform: Platform,
        candidate_time: i64,
        exclude_item: Option<&str>,
    ) -> Result<Vec<Conflict>> {
        let window_start = candidate_time - self.min_separation_secs;
        let window_end = candidate_time + self.min_separation_secs;

        let nearby = self
            .db
            .targets_in_window(platform, window_start, window_end)
            .await?;

        Ok(nearby
            .into_iter()
            .filter(|t| (t.scheduled_at - candidate_time).abs() < self.min_separation_secs)
            .filter(|t| exclude_item != Some(t.item_id.as_str()))
            .map(|t| Conflict {
                existing_item_id: t.item_id,
                existing_time: t.scheduled_at,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PlatformTarget, ScheduledItem};

    const BASE: i64 = 1_900_000_000;

    async fn seed(db: &Database, platform: Platform, scheduled_at: i64) -> String {
        let item = ScheduledItem::new("user-1".to_string(), None);
        let target = PlatformTarget::new(
            item.id.clone(),
            platform,
            "content".to_string(),
            scheduled_at,
        );
        db.create_item(&item, std::slice::from_ref(&target))
            .await
            .unwrap();
        item.id
    }

    #[tokio::test]
    async fn test_nearby_target_conflicts() {
        let db = Database::in_memory().await;
        let existing = seed(&db, Platform::Mastodon, BASE).await;
        let detector = ConflictDetector::new(db, 15);

        // Five minutes after an existing target, inside the 15-minute
        // separation
        let conflicts = detector
            .find_conflicts(Platform::Mastodon, BASE + 5 * 60, None)
            .await
            .unwrap();
        assert_eq!(
            conflicts,
            vec![Conflict {
                existing_item_id: existing,
                existing_time: BASE,
            }]
        );
    }

    #[tokio::test]
    async fn test_exact_separation_is_not_a_conflict() {
        let db = Database::in_memory().await;
        seed(&db, Platform::Mastodon, BASE).await;
        let detector = ConflictDetector::new(db, 15);

        let conflicts = detector
            .find_conflicts(Platform::Mastodon, BASE + 15 * 60, None)
            .await
            .unwrap();
        assert!(conflicts.is_empty());
    }

    #[tokio::test]
    async fn test_all_conflicts_reported_at_once() {
        let db = Database::in_memory().await;
        seed(&db, Platform::Mastodon, BASE - 10 * 60).await;
        seed(&db, Platform::Mastodon, BASE + 3 * 60).await;
        seed(&db, Platform::Mastodon, BASE + 14 * 60).await;
        // Outside the window
        seed(&db, Platform::Mastodon, BASE + 40 * 60).await;
        let detector = ConflictDetector::new(db, 15);

        let conflicts = detector
            .find_conflicts(Platform::Mastodon, BASE, None)
            .await
            .unwrap();
        assert_eq!(conflicts.len(), 3);
    }

    #[tokio::test]
    async fn test_other_platform_does_not_conflict() {
        let db = Database::in_memory().await;
        seed(&db, Platform::Bluesky, BASE).await;
        let detector = ConflictDetector::new(db, 15);

        let conflicts = detector
            .find_conflicts(Platform::Mastodon, BASE, None)
            .await
            .unwrap();
        assert!(conflicts.is_empty());
    }

    #[tokio::test]
    async fn test_excluded_item_skipped() {
        let db = Database::in_memory().await;
        let own = seed(&db, Platform::Mastodon, BASE).await;
        let detector = ConflictDetector::new(db, 15);

        let conflicts = detector
            .find_conflicts(Platform::Mastodon, BASE + 60, Some(&own))
            .await
            .unwrap();
        assert!(conflicts.is_empty());
    }

    #[tokio::test]
    async fn test_terminal_targets_ignored() {
        let db = Database::in_memory().await;
        let item_id = seed(&db, Platform::Mastodon, BASE).await;
        db.mark_published(&item_id, Platform::Mastodon, "done")
            .await
            .unwrap();
        let detector = ConflictDetector::new(db, 15);

        let conflicts = detector
            .find_conflicts(Platform::Mastodon, BASE, None)
            .await
            .unwrap();
        assert!(conflicts.is_empty());
    }
}
