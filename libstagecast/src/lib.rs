//! Stagecast - scheduled publishing for social platforms
//!
//! This library provides the core pipeline for publishing scheduled
//! content: encrypted credential storage, OAuth token refresh, timed
//! publish orchestration with retries, and scheduling-conflict detection.

pub mod config;
pub mod conflict;
pub mod db;
pub mod error;
pub mod logging;
pub mod notify;
pub mod orchestrator;
pub mod platforms;
pub mod publisher;
pub mod refresher;
pub mod scheduler;
pub mod service;
pub mod types;
pub mod vault;

// Re-export commonly used types
pub use config::{Config, Secrets};
pub use db::{Database, ItemWithTargets};
pub use error::{Result, StagecastError};
pub use types::{Credential, ItemStatus, Platform, PlatformTarget, ScheduledItem};
pub use vault::Vault;
