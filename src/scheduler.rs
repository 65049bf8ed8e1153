use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::monitor::{PriceMonitor, RunReport};
use crate::utils::error::AppError;

/// Drives monitoring runs on a cron schedule, with an on-demand trigger.
///
/// Single-flight: a scheduled firing that finds the previous run still in
/// flight skips its turn; a manual trigger queues behind whatever is
/// running and then executes exactly one run.
pub struct MonitorScheduler {
    scheduler: JobScheduler,
    monitor: Arc<PriceMonitor>,
    run_lock: Arc<Mutex<()>>,
    check_interval: String,
}

impl MonitorScheduler {
    /// Fails on a malformed schedule expression; the service must not
    /// start with one.
    pub async fn new(check_interval: &str, monitor: Arc<PriceMonitor>) -> Result<Self, AppError> {
        let check_interval = Self::normalize_cron(check_interval)?;
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            monitor,
            run_lock: Arc::new(Mutex::new(())),
            check_interval,
        })
    }

    /// Accept standard 5-field cron by prepending a seconds field; the
    /// underlying scheduler wants 6 (or 7) fields.
    fn normalize_cron(expression: &str) -> Result<String, AppError> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        match parts.len() {
            5 => Ok(format!("0 {}", parts.join(" "))),
            6 | 7 => Ok(parts.join(" ")),
            _ => Err(AppError::Config(config::ConfigError::Message(format!(
                "invalid cron expression: {:?}",
                expression
            )))),
        }
    }

    pub async fn start(&self) -> Result<(), AppError> {
        let monitor = Arc::clone(&self.monitor);
        let run_lock = Arc::clone(&self.run_lock);

        // The cron string gets its authoritative parse here; a bad
        // expression fails startup.
        let job = Job::new_async(self.check_interval.as_str(), move |_uuid, _l| {
            let monitor = Arc::clone(&monitor);
            let run_lock = Arc::clone(&run_lock);

            Box::pin(async move {
                Self::run_guarded(monitor, run_lock).await;
            })
        })?;

        self.scheduler.add(job).await?;
        self.scheduler.start().await?;

        tracing::info!(
            "Monitor scheduler started with interval: {}",
            self.check_interval
        );
        Ok(())
    }

    async fn run_guarded(monitor: Arc<PriceMonitor>, run_lock: Arc<Mutex<()>>) {
        let Ok(_guard) = run_lock.try_lock() else {
            tracing::info!("Previous monitoring run still in flight, skipping this firing");
            return;
        };

        match monitor.run_once().await {
            Ok(report) => {
                if !report.failures.is_empty() {
                    tracing::warn!(
                        "Scheduled run finished with {} item failures",
                        report.failures.len()
                    );
                }
            }
            Err(e) => tracing::error!("Scheduled monitoring run failed: {}", e),
        }
    }

    /// Manual trigger, equivalent to one scheduled firing. Waits for any
    /// in-flight run to finish first and returns the completed report.
    pub async fn run_now(&self) -> Result<RunReport, AppError> {
        let _guard = self.run_lock.lock().await;
        self.monitor.run_once().await
    }

    /// Trigger with scheduled-firing semantics: skips instead of waiting,
    /// returning `None` when a run is already in flight.
    pub async fn try_run_now(&self) -> Option<Result<RunReport, AppError>> {
        match self.run_lock.try_lock() {
            Ok(_guard) => Some(self.monitor.run_once().await),
            Err(_) => None,
        }
    }

    pub async fn shutdown(&mut self) -> Result<(), AppError> {
        self.scheduler.shutdown().await?;
        tracing::info!("Monitor scheduler shut down");
        Ok(())
    }
}
