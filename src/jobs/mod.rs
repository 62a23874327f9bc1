//! Scheduled Jobs
//!
//! Background maintenance driven by an in-process scheduler. The only job is
//! the expiration sweep: a set-based, idempotent status transition over all
//! cards past their expiration date.

use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::interval;

use crate::card::CardRepository;

// =========================================================================
// Expiration Sweep
// =========================================================================

/// Transition every ACTIVE card with `expiration_date < today` to EXPIRED.
///
/// One set-based update; running it twice with the same date changes nothing
/// the second time. BLOCKED cards are left alone; expiration only ever
/// moves cards out of ACTIVE.
pub async fn sweep_expired_cards(pool: &PgPool, today: NaiveDate) -> Result<u64, JobError> {
    let repository = CardRepository::new(pool.clone());
    let rows_updated = repository
        .expire_before(today)
        .await
        .map_err(|e| JobError::Sweep(e.to_string()))?;

    if rows_updated > 0 {
        tracing::info!(rows_updated, %today, "Expired cards swept");
    }

    Ok(rows_updated)
}

// =========================================================================
// Job Scheduler
// =========================================================================

/// Configuration for job scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval between expiration sweeps (default: 24 hours)
    pub sweep_interval: Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(24 * 3600),
        }
    }
}

/// Job Scheduler - runs periodic maintenance tasks
pub struct JobScheduler {
    pool: PgPool,
    config: JobSchedulerConfig,
}

impl JobScheduler {
    /// Create a new job scheduler
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            config: JobSchedulerConfig::default(),
        }
    }

    /// Create with custom configuration
    pub fn with_config(pool: PgPool, config: JobSchedulerConfig) -> Self {
        Self { pool, config }
    }

    /// Start the job scheduler in the background
    /// Returns a handle that can be used to abort the scheduler
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run the scheduler loop. A failed sweep is logged and never prevents
    /// the next scheduled run.
    async fn run(&self) {
        tracing::info!("Job scheduler started");

        let mut sweep_interval = interval(self.config.sweep_interval);

        loop {
            sweep_interval.tick().await;

            let today = Utc::now().date_naive();
            if let Err(e) = sweep_expired_cards(&self.pool, today).await {
                tracing::error!(error = %e, "Expiration sweep failed");
            }
        }
    }

    /// Run the sweep once (manual trigger or testing)
    pub async fn run_once(&self) -> SweepReport {
        let today = Utc::now().date_naive();
        let mut report = SweepReport {
            swept_as_of: today,
            cards_expired: 0,
            errors: Vec::new(),
        };

        match sweep_expired_cards(&self.pool, today).await {
            Ok(count) => report.cards_expired = count,
            Err(e) => report.errors.push(format!("Expiration sweep: {}", e)),
        }

        report
    }
}

/// Report from running the sweep manually
#[derive(Debug, Clone, serde::Serialize)]
pub struct SweepReport {
    pub swept_as_of: NaiveDate,
    pub cards_expired: u64,
    pub errors: Vec<String>,
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Sweep failed: {0}")]
    Sweep(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_scheduler_config_default() {
        let config = JobSchedulerConfig::default();
        assert_eq!(config.sweep_interval, Duration::from_secs(86400));
    }

    #[test]
    fn test_sweep_report_serializes() {
        let report = SweepReport {
            swept_as_of: NaiveDate::from_ymd_opt(2026, 8, 6).unwrap(),
            cards_expired: 3,
            errors: Vec::new(),
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["cards_expired"], 3);
    }
}
