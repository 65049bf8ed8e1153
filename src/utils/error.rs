use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Scheduler error: {0}")]
    Schedule(#[from] tokio_cron_scheduler::JobSchedulerError),

    #[error("Email error: {0}")]
    Email(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Invalid selector: {selector}")]
    Selector { selector: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-item failure during a monitoring run. Recorded in the run report
/// and logged; never escalated to abort the run.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum CheckError {
    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("no price element matched any selector")]
    PriceNotFound,

    #[error("price text {0:?} did not parse to a finite number")]
    PriceParse(String),

    #[error("store update failed: {0}")]
    Store(String),
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::Io(_)));
    }

    #[test]
    fn test_selector_error_display() {
        let err = AppError::Selector {
            selector: ">>>".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid selector: >>>");
    }

    #[test]
    fn test_check_error_display() {
        let err = CheckError::Fetch("connection refused".to_string());
        assert_eq!(err.to_string(), "fetch failed: connection refused");

        let err = CheckError::PriceParse("N/A".to_string());
        assert!(err.to_string().contains("N/A"));
    }
}
