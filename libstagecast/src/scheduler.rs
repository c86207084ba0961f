//! Timer-based job scheduling
//!
//! The scheduler only delivers fires; it never touches the database. A
//! fire is a `(item_id, platform)` payload handed to the daemon's worker
//! channel, and the orchestrator decides there whether the fire is still
//! meaningful. Cancellation is best effort: a fire that slips through is
//! absorbed by the orchestrator's status guards.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::types::Platform;

/// What a scheduler fire carries: enough to look the target up again
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPayload {
    pub item_id: String,
    pub platform: Platform,
}

/// Arms and cancels timed publish fires
#[async_trait]
pub trait JobScheduler: Send + Sync {
    /// Arm a fire for `fire_at` (Unix seconds), returning an opaque
    /// handle. A fire time in the past fires immediately.
    async fn schedule_at(&self, fire_at: i64, payload: JobPayload) -> String;

    /// Cancel a pending fire. Returns false if the handle is unknown or
    /// the fire already went off.
    async fn cancel(&self, handle: &str) -> bool;
}

type TimerMap = Arc<Mutex<HashMap<String, tokio::task::JoinHandle<()>>>>;

/// Tokio timer-task scheduler
///
/// Each armed fire is a sleeping task that sends its payload into the
/// daemon's channel when the deadline passes.
pub struct TokioJobScheduler {
    tx: mpsc::Sender<JobPayload>,
    timers: TimerMap,
}

impl TokioJobScheduler {
    pub fn new(tx: mpsc::Sender<JobPayload>) -> Self {
        Self {
            tx,
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of currently armed fires
    pub fn armed_count(&self) -> usize {
        match self.timers.lock() {
            Ok(timers) => timers.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

#[async_trait]
impl JobScheduler for TokioJobScheduler {
    async fn schedule_at(&self, fire_at: i64, payload: JobPayload) -> String {
        let handle_id = Uuid::new_v4().to_string();
        let delay_secs = (fire_at - chrono::Utc::now().timestamp()).max(0) as u64;

        let tx = self.tx.clone();
        let timers = Arc::clone(&self.timers);
        let timer_key = handle_id.clone();

        let task = tokio::spawn(async move {
            if delay_secs > 0 {
                tokio::time::sleep(std::time::Duration::from_secs(delay_secs)).await;
            }
            if tx.send(payload).await.is_err() {
                tracing::warn!("fire dropped: worker channel closed");
            }
            if let Ok(mut timers) = timers.lock() {
                timers.remove(&timer_key);
            }
        });

        match self.timers.lock() {
            Ok(mut timers) => {
                timers.insert(handle_id.clone(), task);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(handle_id.clone(), task);
            }
        }

        handle_id
    }

    async fn cancel(&self, handle: &str) -> bool {
        let task = match self.timers.lock() {
            Ok(mut timers) => timers.remove(handle),
            Err(poisoned) => poisoned.into_inner().remove(handle),
        };
        match task {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}

/// Test scheduler that records calls instead of arming timers
#[derive(Default)]
pub struct RecordingScheduler {
    scheduled: Mutex<Vec<(i64, JobPayload)>>,
    cancelled: Mutex<Vec<String>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scheduled(&self) -> Vec<(i64, JobPayload)> {
        match self.scheduled.lock() {
            Ok(scheduled) => scheduled.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn cancelled(&self) -> Vec<String> {
        match self.cancelled.lock() {
            Ok(cancelled) => cancelled.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl JobScheduler for RecordingScheduler {
    async fn schedule_at(&self, fire_at: i64, payload: JobPayload) -> String {
        let handle = Uuid::new_v4().to_string();
        if let Ok(mut scheduled) = self.scheduled.lock() {
            scheduled.push((fire_at, payload));
        }
        handle
    }

    async fn cancel(&self, handle: &str) -> bool {
        if let Ok(mut cancelled) = self.cancelled.lock() {
            cancelled.push(handle.to_string());
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(item_id: &str) -> JobPayload {
        JobPayload {
            item_id: item_id.to_string(),
            platform: Platform::Mastodon,
        }
    }

    #[tokio::test]
    async fn test_past_fire_time_fires_immediately() {
        let (tx, mut rx) = mpsc::channel(4);
        let scheduler = TokioJobScheduler::new(tx);

        scheduler.schedule_at(0, payload("item-1")).await;

        let fired = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .expect("fire should arrive promptly")
            .expect("channel should stay open");
        assert_eq!(fired.item_id, "item-1");
    }

    #[tokio::test]
    async fn test_future_fire_arrives_after_delay() {
        tokio::time::pause();
        let (tx, mut rx) = mpsc::channel(4);
        let scheduler = TokioJobScheduler::new(tx);

        scheduler
            .schedule_at(chrono::Utc::now().timestamp() + 60, payload("item-2"))
            .await;

        // Nothing yet
        assert!(rx.try_recv().is_err());

        tokio::time::advance(std::time::Duration::from_secs(61)).await;
        let fired = rx.recv().await.expect("fire should arrive after advance");
        assert_eq!(fired.item_id, "item-2");
    }

    #[tokio::test]
    async fn test_cancel_pending_fire() {
        let (tx, mut rx) = mpsc::channel(4);
        let scheduler = TokioJobScheduler::new(tx);

        let handle = scheduler
            .schedule_at(chrono::Utc::now().timestamp() + 3600, payload("item-3"))
            .await;
        assert_eq!(scheduler.armed_count(), 1);

        assert!(scheduler.cancel(&handle).await);
        assert_eq!(scheduler.armed_count(), 0);
        assert!(rx.try_recv().is_err());

        // Second cancel reports the handle as gone
        assert!(!scheduler.cancel(&handle).await);
    }

    #[tokio::test]
    async fn test_cancel_unknown_handle() {
        let (tx, _rx) = mpsc::channel(4);
        let scheduler = TokioJobScheduler::new(tx);
        assert!(!scheduler.cancel("no-such-handle").await);
    }

    #[tokio::test]
    async fn test_recording_scheduler_captures_calls() {
        let scheduler = RecordingScheduler::new();

        let handle = scheduler.schedule_at(1_900_000_000, payload("item-4")).await;
        scheduler.cancel(&handle).await;

        let scheduled = scheduler.scheduled();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].0, 1_900_000_000);
        assert_eq!(scheduled[0].1.item_id, "item-4");
        assert_eq!(scheduler.cancelled(), vec![handle]);
    }
}
