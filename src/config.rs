use config::{Config, ConfigError, Environment, File};
use scraper::Selector;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scraper: ScraperConfig,
    pub scheduler: SchedulerConfig,
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    pub user_agent: String,
    pub request_timeout: u64,
    pub max_concurrent_checks: usize,
    pub chrome_path: Option<String>,
    /// CSS selectors tried in order; the first non-empty match wins.
    pub price_selectors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Cron expression driving monitoring runs; 5-field (standard) or
    /// 6-field (leading seconds) syntax.
    pub check_interval: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: Option<String>,
    pub from_name: String,
    pub to: Vec<String>,
    pub use_tls: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name("config/default"))
            // Add environment-specific config
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix "PRICE_SENTRY_"
            .add_source(Environment::with_prefix("PRICE_SENTRY").separator("__"))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        // Add Chrome path from environment if not set
        if config.scraper.chrome_path.is_none() {
            config.scraper.chrome_path = env::var("CHROME_PATH").ok();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate database configuration
        if self.database.max_connections == 0 {
            return Err(ConfigError::Message(
                "Database max_connections must be greater than 0".into(),
            ));
        }

        // Validate scraper configuration
        if self.scraper.max_concurrent_checks == 0 {
            return Err(ConfigError::Message(
                "Scraper max_concurrent_checks must be greater than 0".into(),
            ));
        }

        if self.scraper.price_selectors.is_empty() {
            return Err(ConfigError::Message(
                "Scraper price_selectors must list at least one selector".into(),
            ));
        }

        for selector in &self.scraper.price_selectors {
            if Selector::parse(selector).is_err() {
                return Err(ConfigError::Message(format!(
                    "Invalid CSS selector in scraper.price_selectors: {}",
                    selector
                )));
            }
        }

        // Validate scheduler configuration - basic cron validation
        if !self.is_valid_cron(&self.scheduler.check_interval) {
            return Err(ConfigError::Message(
                "Invalid cron expression in scheduler.check_interval".into(),
            ));
        }

        // Validate SMTP configuration; missing credentials are startup-fatal
        if self.smtp.port == 0 {
            return Err(ConfigError::Message("SMTP port must be greater than 0".into()));
        }

        if self.smtp.username.is_none() || self.smtp.password.is_none() {
            return Err(ConfigError::Message(
                "SMTP username and password are required".into(),
            ));
        }

        if self.smtp.from_address.is_none() {
            return Err(ConfigError::Message("SMTP from_address is required".into()));
        }

        if self.smtp.to.is_empty() {
            return Err(ConfigError::Message(
                "SMTP to must list at least one recipient".into(),
            ));
        }

        Ok(())
    }

    fn is_valid_cron(&self, cron_expr: &str) -> bool {
        // Accept standard 5-field expressions and 6-field with leading seconds
        let parts: Vec<&str> = cron_expr.split_whitespace().collect();
        if parts.len() != 5 && parts.len() != 6 {
            return false;
        }

        // Each part should be valid
        for part in parts {
            if part.is_empty() {
                return false;
            }
            // Allow numbers, ranges, lists, wildcards, and steps
            if !part
                .chars()
                .all(|c| c.is_ascii_digit() || c == '*' || c == '-' || c == ',' || c == '/')
            {
                return false;
            }
        }

        true
    }
}
