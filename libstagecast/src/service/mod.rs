//! Service layer for Stagecast
//!
//! A facade over the scheduling and validation operations, sharing one
//! database handle and configuration between them. The daemon and any
//! embedding binary go through [`StagecastService`] instead of wiring the
//! pieces themselves.

pub mod scheduling;
pub mod validation;

pub use scheduling::{
    CreateItemRequest, CreateItemResponse, PlatformConflicts, SchedulingService, TargetRequest,
};
pub use validation::{TargetValidation, ValidationService};

use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::scheduler::JobScheduler;

/// Main service facade
pub struct StagecastService {
    db: Database,
    config: Arc<Config>,
    scheduling: SchedulingService,
    validation: ValidationService,
}

impl StagecastService {
    /// Create a service from loaded configuration and a scheduler
    pub async fn from_config(config: Config, scheduler: Arc<dyn JobScheduler>) -> Result<Self> {
        let db = Database::new(&config.database.path).await?;
        Ok(Self::from_parts(db, Arc::new(config), scheduler))
    }

    /// Assemble a service from existing parts (tests, embedding)
    pub fn from_parts(
        db: Database,
        config: Arc<Config>,
        scheduler: Arc<dyn JobScheduler>,
    ) -> Self {
        let scheduling = SchedulingService::new(
            db.clone(),
            scheduler,
            config.scheduling.min_separation_minutes,
        );
        Self {
            db,
            config,
            scheduling,
            validation: ValidationService::new(),
        }
    }

    pub fn scheduling(&self) -> &SchedulingService {
        &self.scheduling
    }

    pub fn validation(&self) -> &ValidationService {
        &self.validation
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
