use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::extractor::PriceExtractor;
use crate::models::TrackedItem;
use crate::notifier::Notifier;
use crate::renderer::PageRenderer;
use crate::store::TrackedItemStore;
use crate::utils::error::{AppError, CheckError};

#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    pub item_id: String,
    pub name: String,
    pub url: String,
    pub error: CheckError,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub notifications_sent: usize,
    pub failures: Vec<ItemFailure>,
    pub total_time_ms: u64,
}

enum ItemOutcome {
    Success { notified: bool },
    Failure(ItemFailure),
}

/// One full pass over all active tracked items: render each listing,
/// extract the price, persist the observation and alert on drops below
/// target. Items are independent; a bounded number run concurrently and
/// one item's failure never aborts the run.
pub struct PriceMonitor {
    store: Arc<dyn TrackedItemStore>,
    renderer: Arc<dyn PageRenderer>,
    notifier: Arc<dyn Notifier>,
    extractor: PriceExtractor,
    max_concurrent: usize,
}

impl PriceMonitor {
    pub fn new(
        store: Arc<dyn TrackedItemStore>,
        renderer: Arc<dyn PageRenderer>,
        notifier: Arc<dyn Notifier>,
        extractor: PriceExtractor,
        max_concurrent: usize,
    ) -> Self {
        Self {
            store,
            renderer,
            notifier,
            extractor,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Execute a single monitoring run over a snapshot of active items.
    /// Only the initial snapshot read can fail; everything after is
    /// recorded per item in the report.
    pub async fn run_once(&self) -> Result<RunReport, AppError> {
        let start_time = Instant::now();
        let items = self.store.list_active().await?;
        let attempted = items.len();

        tracing::info!("Starting monitoring run over {} active items", attempted);

        let outcomes: Vec<ItemOutcome> = stream::iter(items)
            .map(|item| self.check_item(item))
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let mut succeeded = 0;
        let mut notifications_sent = 0;
        let mut failures = Vec::new();

        for outcome in outcomes {
            match outcome {
                ItemOutcome::Success { notified } => {
                    succeeded += 1;
                    if notified {
                        notifications_sent += 1;
                    }
                }
                ItemOutcome::Failure(failure) => failures.push(failure),
            }
        }

        let report = RunReport {
            attempted,
            succeeded,
            notifications_sent,
            failures,
            total_time_ms: start_time.elapsed().as_millis() as u64,
        };

        tracing::info!(
            "Monitoring run complete: {}/{} items succeeded, {} alerts sent, {} failures",
            report.succeeded,
            report.attempted,
            report.notifications_sent,
            report.failures.len()
        );

        Ok(report)
    }

    async fn check_item(&self, item: TrackedItem) -> ItemOutcome {
        match self.try_check_item(&item).await {
            Ok(notified) => ItemOutcome::Success { notified },
            Err(error) => {
                tracing::warn!(
                    "Check failed for item {} ({}) at {}: {}",
                    item.id,
                    item.name,
                    item.url,
                    error
                );
                ItemOutcome::Failure(ItemFailure {
                    item_id: item.id,
                    name: item.name,
                    url: item.url,
                    error,
                })
            }
        }
    }

    async fn try_check_item(&self, item: &TrackedItem) -> Result<bool, CheckError> {
        let page = self.renderer.render(&item.url).await?;
        let price = self.extractor.extract(&page.html)?;

        let now = Utc::now();
        self.store
            .update_price_state(&item.id, price, now)
            .await
            .map_err(|e| CheckError::Store(e.to_string()))?;

        tracing::debug!("Item {} ({}) observed at {:.2}", item.id, item.name, price);

        // `item` still carries the pre-check state, which is what the
        // re-notification gate needs.
        if !item.should_notify(price) {
            return Ok(false);
        }

        match self.notifier.notify(price, &item.url).await {
            Ok(()) => {
                if let Err(e) = self.store.mark_notified(&item.id, now).await {
                    tracing::warn!("Failed to record notification for item {}: {}", item.id, e);
                }
                tracing::info!(
                    "Price drop for {} ({}): {:.2} below target {:.2}",
                    item.name,
                    item.url,
                    price,
                    item.target_price
                );
                Ok(true)
            }
            Err(e) => {
                // Best-effort: the price state is already persisted and the
                // drop will be re-evaluated next cycle.
                tracing::warn!("Alert delivery failed for item {}: {}", item.id, e);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewTrackedItem;
    use crate::notifier::MockNotifier;
    use crate::renderer::{MockPageRenderer, RenderedPage};
    use crate::store::MockTrackedItemStore;
    use chrono::Utc;

    fn item(name: &str, target: f64) -> TrackedItem {
        TrackedItem::new(NewTrackedItem {
            name: name.to_string(),
            url: format!("https://shop.example.com/{}", name),
            target_price: target,
        })
    }

    fn extractor() -> PriceExtractor {
        PriceExtractor::new(&[".price".to_string()]).unwrap()
    }

    fn page(price: &str) -> RenderedPage {
        RenderedPage {
            html: format!(r#"<html><body><span class="price">{}</span></body></html>"#, price),
            final_url: "https://shop.example.com".to_string(),
        }
    }

    fn monitor(
        store: MockTrackedItemStore,
        renderer: MockPageRenderer,
        notifier: MockNotifier,
    ) -> PriceMonitor {
        PriceMonitor::new(
            Arc::new(store),
            Arc::new(renderer),
            Arc::new(notifier),
            extractor(),
            2,
        )
    }

    #[tokio::test]
    async fn test_price_drop_notifies_and_marks() {
        let tracked = item("keyboard", 100.0);
        let id = tracked.id.clone();
        let items = vec![tracked];

        let mut store = MockTrackedItemStore::new();
        store
            .expect_list_active()
            .times(1)
            .returning(move || Ok(items.clone()));
        {
            let id = id.clone();
            store
                .expect_update_price_state()
                .withf(move |got_id, price, _| got_id == id && *price == 89.99)
                .times(1)
                .returning(|_, _, _| Ok(()));
        }
        store
            .expect_mark_notified()
            .withf(move |got_id, _| got_id == id)
            .times(1)
            .returning(|_, _| Ok(()));

        let mut renderer = MockPageRenderer::new();
        renderer
            .expect_render()
            .times(1)
            .returning(|_| Ok(page("$89.99")));

        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|price, url| *price == 89.99 && url.contains("keyboard"))
            .times(1)
            .returning(|_, _| Ok(()));

        let report = monitor(store, renderer, notifier).run_once().await.unwrap();

        assert_eq!(report.attempted, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.notifications_sent, 1);
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn test_price_above_target_does_not_notify() {
        let items = vec![item("keyboard", 100.0)];

        let mut store = MockTrackedItemStore::new();
        store
            .expect_list_active()
            .returning(move || Ok(items.clone()));
        store
            .expect_update_price_state()
            .times(1)
            .returning(|_, _, _| Ok(()));
        store.expect_mark_notified().times(0);

        let mut renderer = MockPageRenderer::new();
        renderer.expect_render().returning(|_| Ok(page("$120.00")));

        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(0);

        let report = monitor(store, renderer, notifier).run_once().await.unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.notifications_sent, 0);
    }

    #[tokio::test]
    async fn test_repeat_drop_is_suppressed() {
        let mut tracked = item("keyboard", 100.0);
        tracked.current_price = Some(89.99);
        tracked.last_checked_price = Some(89.99);
        tracked.last_notified = Some(Utc::now());
        let items = vec![tracked];

        let mut store = MockTrackedItemStore::new();
        store
            .expect_list_active()
            .returning(move || Ok(items.clone()));
        store
            .expect_update_price_state()
            .times(1)
            .returning(|_, _, _| Ok(()));
        store.expect_mark_notified().times(0);

        let mut renderer = MockPageRenderer::new();
        renderer.expect_render().returning(|_| Ok(page("$89.99")));

        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(0);

        let report = monitor(store, renderer, notifier).run_once().await.unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.notifications_sent, 0);
    }

    #[tokio::test]
    async fn test_renotifies_after_price_recovered() {
        let mut tracked = item("keyboard", 100.0);
        tracked.current_price = Some(110.0); // climbed back above target
        tracked.last_checked_price = Some(110.0);
        tracked.last_notified = Some(Utc::now());
        let items = vec![tracked];

        let mut store = MockTrackedItemStore::new();
        store
            .expect_list_active()
            .returning(move || Ok(items.clone()));
        store
            .expect_update_price_state()
            .returning(|_, _, _| Ok(()));
        store
            .expect_mark_notified()
            .times(1)
            .returning(|_, _| Ok(()));

        let mut renderer = MockPageRenderer::new();
        renderer.expect_render().returning(|_| Ok(page("$95.00")));

        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(1).returning(|_, _| Ok(()));

        let report = monitor(store, renderer, notifier).run_once().await.unwrap();

        assert_eq!(report.notifications_sent, 1);
    }

    #[tokio::test]
    async fn test_one_failing_item_does_not_abort_run() {
        let good_a = item("alpha", 50.0);
        let bad = item("broken", 50.0);
        let good_b = item("omega", 50.0);
        let bad_id = bad.id.clone();
        let items = vec![good_a, bad, good_b];

        let mut store = MockTrackedItemStore::new();
        store
            .expect_list_active()
            .returning(move || Ok(items.clone()));
        store
            .expect_update_price_state()
            .times(2)
            .returning(|_, _, _| Ok(()));
        store.expect_mark_notified().times(0);

        let mut renderer = MockPageRenderer::new();
        renderer.expect_render().times(3).returning(|url| {
            if url.contains("broken") {
                Err(CheckError::Fetch("connection reset".to_string()))
            } else {
                Ok(page("$75.00"))
            }
        });

        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(0);

        let report = monitor(store, renderer, notifier).run_once().await.unwrap();

        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].item_id, bad_id);
        assert!(matches!(report.failures[0].error, CheckError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_extraction_failure_is_recorded() {
        let items = vec![item("keyboard", 100.0)];

        let mut store = MockTrackedItemStore::new();
        store
            .expect_list_active()
            .returning(move || Ok(items.clone()));
        store.expect_update_price_state().times(0);

        let mut renderer = MockPageRenderer::new();
        renderer
            .expect_render()
            .returning(|_| Ok(page("Currently unavailable")));

        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(0);

        let report = monitor(store, renderer, notifier).run_once().await.unwrap();

        assert_eq!(report.succeeded, 0);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            report.failures[0].error,
            CheckError::PriceParse(_)
        ));
    }

    #[tokio::test]
    async fn test_notify_failure_keeps_price_state() {
        let items = vec![item("keyboard", 100.0)];

        let mut store = MockTrackedItemStore::new();
        store
            .expect_list_active()
            .returning(move || Ok(items.clone()));
        store
            .expect_update_price_state()
            .times(1)
            .returning(|_, _, _| Ok(()));
        // Delivery failed, so the alert timestamp must stay unset
        store.expect_mark_notified().times(0);

        let mut renderer = MockPageRenderer::new();
        renderer.expect_render().returning(|_| Ok(page("$80.00")));

        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .times(1)
            .returning(|_, _| Err(AppError::Email("relay unreachable".to_string())));

        let report = monitor(store, renderer, notifier).run_once().await.unwrap();

        // The item itself still counts as checked
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.notifications_sent, 0);
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn test_empty_snapshot_is_a_noop_run() {
        let mut store = MockTrackedItemStore::new();
        store.expect_list_active().returning(|| Ok(Vec::new()));

        let renderer = MockPageRenderer::new();
        let notifier = MockNotifier::new();

        let report = monitor(store, renderer, notifier).run_once().await.unwrap();

        assert_eq!(report.attempted, 0);
        assert_eq!(report.succeeded, 0);
        assert!(report.failures.is_empty());
    }
}
