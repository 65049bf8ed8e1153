use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use url::Url;
use uuid::Uuid;

use crate::utils::error::AppError;

/// A product listing registered for price monitoring.
///
/// `id`, `url` and `target_price` are fixed at creation; a monitoring run
/// only ever touches the observed-price fields and the two timestamps.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct TrackedItem {
    pub id: String,
    pub name: String,
    pub url: String,

    /// Alert threshold; an alert fires when the observed price is strictly below it.
    pub target_price: f64,

    // Observed price state, absent until the first successful check
    pub current_price: Option<f64>,
    pub last_checked_price: Option<f64>,
    pub last_checked: Option<DateTime<Utc>>,

    /// When the last alert was sent; gates re-notification.
    pub last_notified: Option<DateTime<Utc>>,

    /// Inactive items are excluded from every run.
    pub is_active: bool,

    // Metadata
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTrackedItem {
    pub name: String,
    pub url: String,
    pub target_price: f64,
}

impl NewTrackedItem {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("name must not be empty".into()));
        }
        if Url::parse(&self.url).is_err() {
            return Err(AppError::Validation(format!("invalid URL: {}", self.url)));
        }
        if !self.target_price.is_finite() || self.target_price <= 0.0 {
            return Err(AppError::Validation(format!(
                "target price must be a finite positive number, got {}",
                self.target_price
            )));
        }
        Ok(())
    }
}

impl TrackedItem {
    pub fn new(new_item: NewTrackedItem) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: new_item.name,
            url: new_item.url,
            target_price: new_item.target_price,
            current_price: None,
            last_checked_price: None,
            last_checked: None,
            last_notified: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether an alert should fire for a freshly observed price.
    ///
    /// Fires strictly below target, and only once per drop: after an alert
    /// the item stays quiet until the price climbs back to or above target
    /// and falls under it again. `self` holds the state from *before* the
    /// current check, so `current_price` here is the previous observation.
    pub fn should_notify(&self, observed_price: f64) -> bool {
        if observed_price >= self.target_price {
            return false;
        }
        match (self.last_notified, self.current_price) {
            (None, _) => true,
            (Some(_), Some(previous)) => previous >= self.target_price,
            // Already notified but no prior observation on record; treat the
            // drop as still standing rather than alert again.
            (Some(_), None) => false,
        }
    }
}
