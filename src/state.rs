use std::path::Path;
use std::sync::Arc;

use crate::db::DbPool;
use crate::error::AppResult;
use crate::services::calendar_service::CalendarService;
use crate::services::scheduling_service::SchedulingService;
use crate::services::slot_reconciler::SchedulerConfig;

/// Shared handles for the embedding application.
#[derive(Clone)]
pub struct AppState {
    db_pool: DbPool,
    calendar_service: Arc<CalendarService>,
    scheduling_service: Arc<SchedulingService>,
}

impl AppState {
    pub fn new(db_pool: DbPool, config: SchedulerConfig) -> Self {
        let calendar_service = Arc::new(CalendarService::new(db_pool.clone()));
        let scheduling_service = Arc::new(SchedulingService::new(
            db_pool.clone(),
            Arc::clone(&calendar_service),
            config,
        ));

        Self {
            db_pool,
            calendar_service,
            scheduling_service,
        }
    }

    /// Opens (or creates) the database at `db_path` with default tunables.
    pub fn open(db_path: &Path) -> AppResult<Self> {
        let pool = DbPool::new(db_path)?;
        Ok(Self::new(pool, SchedulerConfig::default()))
    }

    pub fn calendars(&self) -> Arc<CalendarService> {
        Arc::clone(&self.calendar_service)
    }

    pub fn scheduling(&self) -> Arc<SchedulingService> {
        Arc::clone(&self.scheduling_service)
    }

    pub fn db(&self) -> DbPool {
        self.db_pool.clone()
    }
}
