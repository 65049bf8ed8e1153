use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::config::DatabaseConfig;
use crate::models::{NewTrackedItem, TrackedItem};
use crate::utils::error::AppError;

/// Persistence boundary for tracked items. The monitoring engine only
/// consumes this contract; item CRUD beyond seeding lives elsewhere.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackedItemStore: Send + Sync {
    /// Snapshot of all active items, taken once per run.
    async fn list_active(&self) -> Result<Vec<TrackedItem>, AppError>;

    /// Record a successful observation. Updates `current_price`,
    /// `last_checked_price` and `last_checked` together; an unknown id
    /// (item deleted mid-run) is a no-op.
    async fn update_price_state(
        &self,
        id: &str,
        price: f64,
        checked_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Record that an alert was sent. Unknown id is a no-op.
    async fn mark_notified(&self, id: &str, notified_at: DateTime<Utc>) -> Result<(), AppError>;

    async fn insert(&self, new_item: NewTrackedItem) -> Result<TrackedItem, AppError>;

    async fn get(&self, id: &str) -> Result<Option<TrackedItem>, AppError>;
}

#[derive(Clone)]
pub struct SqliteItemStore {
    pool: SqlitePool,
}

impl SqliteItemStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout))
            .connect(&config.url)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<(), AppError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tracked_items (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                url TEXT NOT NULL,
                target_price REAL NOT NULL,
                current_price REAL,
                last_checked_price REAL,
                last_checked TEXT,
                last_notified TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl SqliteItemStore {
    /// Flip an item in or out of monitoring. Belongs to the CRUD boundary
    /// rather than the run loop, so it stays off the trait.
    pub async fn set_active(&self, id: &str, active: bool) -> Result<(), AppError> {
        sqlx::query("UPDATE tracked_items SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(chrono::Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM tracked_items WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl TrackedItemStore for SqliteItemStore {
    async fn list_active(&self) -> Result<Vec<TrackedItem>, AppError> {
        let items = sqlx::query_as::<_, TrackedItem>(
            "SELECT * FROM tracked_items WHERE is_active = 1 ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    async fn update_price_state(
        &self,
        id: &str,
        price: f64,
        checked_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE tracked_items
            SET current_price = ?, last_checked_price = ?, last_checked = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(price)
        .bind(price)
        .bind(checked_at)
        .bind(checked_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!("Item {} vanished before price update, skipping", id);
        }

        Ok(())
    }

    async fn mark_notified(&self, id: &str, notified_at: DateTime<Utc>) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE tracked_items SET last_notified = ?, updated_at = ? WHERE id = ?",
        )
        .bind(notified_at)
        .bind(notified_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!("Item {} vanished before notification update, skipping", id);
        }

        Ok(())
    }

    async fn insert(&self, new_item: NewTrackedItem) -> Result<TrackedItem, AppError> {
        new_item.validate()?;
        let item = TrackedItem::new(new_item);

        sqlx::query(
            r#"
            INSERT INTO tracked_items
                (id, name, url, target_price, current_price, last_checked_price,
                 last_checked, last_notified, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.id)
        .bind(&item.name)
        .bind(&item.url)
        .bind(item.target_price)
        .bind(item.current_price)
        .bind(item.last_checked_price)
        .bind(item.last_checked)
        .bind(item.last_notified)
        .bind(item.is_active)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(item)
    }

    async fn get(&self, id: &str) -> Result<Option<TrackedItem>, AppError> {
        let item = sqlx::query_as::<_, TrackedItem>("SELECT * FROM tracked_items WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(item)
    }
}
