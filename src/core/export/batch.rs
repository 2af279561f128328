//! Generic prioritized batch executor
//!
//! Items are sorted by priority (ascending, stable), split into batches, and
//! processed batch by batch. Within a batch, items run concurrently under a
//! semaphore; a batch fully drains before the next one starts.

use super::memory::relieve_memory_pressure;
use crate::config::BatchSettings;
use crate::domain::{QuipError, Result};
use futures::future::join_all;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Configuration for batch processing
#[derive(Debug, Clone, PartialEq)]
pub struct BatchProcessorConfig {
    /// Items per batch
    pub batch_size: usize,
    /// Items running at once within a batch
    pub concurrency: usize,
    /// Pause between batches
    pub rate_limit_delay: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Base retry delay
    pub retry_delay: Duration,
    /// Double the delay on each retry
    pub exponential_backoff: bool,
    /// Resident memory above which the executor pauses between batches
    pub memory_threshold_bytes: u64,
}

impl Default for BatchProcessorConfig {
    fn default() -> Self {
        Self::from(&BatchSettings::default())
    }
}

impl From<&BatchSettings> for BatchProcessorConfig {
    fn from(settings: &BatchSettings) -> Self {
        Self {
            batch_size: settings.batch_size.max(1),
            concurrency: settings.concurrency.max(1),
            rate_limit_delay: Duration::from_millis(settings.rate_limit_delay_ms),
            max_retries: settings.max_retries,
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
            exponential_backoff: settings.exponential_backoff,
            memory_threshold_bytes: settings.memory_threshold_mb * 1024 * 1024,
        }
    }
}

impl BatchProcessorConfig {
    /// Delay before retry number `attempt` (zero-based)
    pub fn retry_delay_for(&self, attempt: u32) -> Duration {
        if self.exponential_backoff {
            self.retry_delay
                .saturating_mul(2u32.saturating_pow(attempt))
        } else {
            self.retry_delay
        }
    }
}

/// Status of a batch item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Skipped,
}

/// Unit of work handled by [`BatchProcessor`]
#[derive(Debug, Clone)]
pub struct BatchItem<T> {
    pub id: String,
    /// Lower runs earlier
    pub priority: i32,
    pub retry_count: u32,
    pub status: ItemStatus,
    pub payload: T,
    pub error: Option<String>,
    pub processing_time: Option<Duration>,
    /// Index of the batch the item ran in
    pub batch_index: Option<usize>,
}

impl<T> BatchItem<T> {
    /// Create a pending item with priority 0
    pub fn new(id: impl Into<String>, payload: T) -> Self {
        Self {
            id: id.into(),
            priority: 0,
            retry_count: 0,
            status: ItemStatus::Pending,
            payload,
            error: None,
            processing_time: None,
            batch_index: None,
        }
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Live counters for a run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchStatistics {
    pub total_items: usize,
    pub processed_items: usize,
    pub successful_items: usize,
    pub failed_items: usize,
    pub skipped_items: usize,
    pub current_batch: usize,
    pub total_batches: usize,
    pub is_running: bool,
}

/// Notification published while a run progresses
#[derive(Debug, Clone)]
pub enum BatchEvent {
    BatchStarted {
        batch_index: usize,
        size: usize,
    },
    /// An item reached a terminal state
    ItemCompleted {
        id: String,
        status: ItemStatus,
        error: Option<String>,
    },
    BatchCompleted {
        batch_index: usize,
        successful: usize,
        failed: usize,
    },
    Progress(BatchStatistics),
}

/// Result of [`BatchProcessor::process`]
#[derive(Debug, Clone)]
pub struct BatchRunResult<T> {
    pub total_items: usize,
    pub processed_items: usize,
    pub successful_items: usize,
    pub failed_items: usize,
    pub skipped_items: usize,
    /// Items in execution order with their final status
    pub items: Vec<BatchItem<T>>,
    pub duration: Duration,
    pub average_processing_time: Duration,
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Batch processor for homogeneous items
pub struct BatchProcessor {
    config: BatchProcessorConfig,
    running: AtomicBool,
    cancel: Mutex<CancellationToken>,
    stats: Mutex<BatchStatistics>,
    events: broadcast::Sender<BatchEvent>,
}

impl BatchProcessor {
    /// Create a new batch processor
    pub fn new(config: BatchProcessorConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            running: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
            stats: Mutex::new(BatchStatistics::default()),
            events,
        }
    }

    /// Processor configuration
    pub fn config(&self) -> &BatchProcessorConfig {
        &self.config
    }

    /// Subscribe to batch and item events
    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.events.subscribe()
    }

    /// Request cooperative cancellation of the current run
    ///
    /// Items not yet started are marked skipped; in-flight items finish.
    pub fn cancel(&self) {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
        tracing::info!("Batch processing cancellation requested");
    }

    /// Snapshot of the live counters
    pub fn get_statistics(&self) -> BatchStatistics {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update_stats(&self, f: impl FnOnce(&mut BatchStatistics)) {
        let snapshot = {
            let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut stats);
            stats.clone()
        };
        let _ = self.events.send(BatchEvent::Progress(snapshot));
    }

    /// Process `items` with `processor`
    ///
    /// # Arguments
    ///
    /// * `items` - Items to process; sorted by priority before batching
    /// * `processor` - Called with a clone of each item's payload
    ///
    /// # Errors
    ///
    /// Returns [`QuipError::Batch`] if a run is already in progress. Item
    /// failures never fail the run; they are reported per item.
    pub async fn process<T, F, Fut>(
        &self,
        mut items: Vec<BatchItem<T>>,
        processor: F,
    ) -> Result<BatchRunResult<T>>
    where
        T: Clone,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(QuipError::Batch(
                "Batch processing is already running".to_string(),
            ));
        }
        let _running = RunningGuard(&self.running);

        let token = CancellationToken::new();
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = token.clone();

        let started = Instant::now();
        items.sort_by_key(|item| item.priority);

        let total_items = items.len();
        let batch_size = self.config.batch_size.max(1);
        let total_batches = total_items.div_ceil(batch_size);

        self.update_stats(|stats| {
            *stats = BatchStatistics {
                total_items,
                total_batches,
                is_running: true,
                ..Default::default()
            };
        });

        tracing::info!(
            total_items,
            total_batches,
            batch_size,
            concurrency = self.config.concurrency,
            "Starting batch processing"
        );

        let semaphore = Semaphore::new(self.config.concurrency.max(1));
        let mut finished: Vec<BatchItem<T>> = Vec::with_capacity(total_items);
        let mut remaining = items.into_iter();

        for batch_index in 0..total_batches {
            let batch: Vec<BatchItem<T>> = remaining.by_ref().take(batch_size).collect();

            if token.is_cancelled() {
                for item in batch {
                    finished.push(self.skip_item(item, batch_index));
                }
                continue;
            }

            self.update_stats(|stats| stats.current_batch = batch_index + 1);
            let _ = self.events.send(BatchEvent::BatchStarted {
                batch_index,
                size: batch.len(),
            });
            crate::log_batch_processing!(batch_index + 1, total_batches, batch.len());

            let results = join_all(batch.into_iter().map(|item| {
                self.run_item(item, batch_index, &semaphore, &token, &processor)
            }))
            .await;

            let successful = results
                .iter()
                .filter(|i| i.status == ItemStatus::Completed)
                .count();
            let failed = results
                .iter()
                .filter(|i| i.status == ItemStatus::Failed)
                .count();
            finished.extend(results);

            let _ = self.events.send(BatchEvent::BatchCompleted {
                batch_index,
                successful,
                failed,
            });

            if batch_index + 1 < total_batches
                && !token.is_cancelled()
                && !self.config.rate_limit_delay.is_zero()
            {
                tokio::time::sleep(self.config.rate_limit_delay).await;
            }
            relieve_memory_pressure(self.config.memory_threshold_bytes).await;
        }

        self.update_stats(|stats| stats.is_running = false);
        let stats = self.get_statistics();

        let timed: Vec<Duration> = finished.iter().filter_map(|i| i.processing_time).collect();
        let average_processing_time = if timed.is_empty() {
            Duration::ZERO
        } else {
            timed.iter().sum::<Duration>() / timed.len() as u32
        };

        let duration = started.elapsed();
        tracing::info!(
            successful = stats.successful_items,
            failed = stats.failed_items,
            skipped = stats.skipped_items,
            duration_ms = duration.as_millis() as u64,
            "Batch processing finished"
        );

        Ok(BatchRunResult {
            total_items,
            processed_items: stats.processed_items,
            successful_items: stats.successful_items,
            failed_items: stats.failed_items,
            skipped_items: stats.skipped_items,
            items: finished,
            duration,
            average_processing_time,
        })
    }

    fn skip_item<T>(&self, mut item: BatchItem<T>, batch_index: usize) -> BatchItem<T> {
        item.status = ItemStatus::Skipped;
        item.batch_index = Some(batch_index);
        self.update_stats(|stats| stats.skipped_items += 1);
        let _ = self.events.send(BatchEvent::ItemCompleted {
            id: item.id.clone(),
            status: ItemStatus::Skipped,
            error: None,
        });
        item
    }

    async fn run_item<T, F, Fut>(
        &self,
        mut item: BatchItem<T>,
        batch_index: usize,
        semaphore: &Semaphore,
        token: &CancellationToken,
        processor: &F,
    ) -> BatchItem<T>
    where
        T: Clone,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let _permit = match semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => return self.skip_item(item, batch_index),
        };

        if token.is_cancelled() {
            return self.skip_item(item, batch_index);
        }

        item.status = ItemStatus::Processing;
        item.batch_index = Some(batch_index);
        let started = Instant::now();
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                if token.is_cancelled() {
                    break;
                }
                let delay = self.config.retry_delay_for(attempt - 1);
                crate::log_retry_attempt!(item.id, attempt, self.config.max_retries, delay);
                tokio::time::sleep(delay).await;
                item.retry_count = attempt;
            }

            match processor(item.payload.clone()).await {
                Ok(()) => {
                    last_error = None;
                    item.status = ItemStatus::Completed;
                    break;
                }
                Err(e) => last_error = Some(e.to_string()),
            }
        }

        item.processing_time = Some(started.elapsed());

        if let Some(error) = last_error {
            tracing::warn!(item_id = %item.id, error = %error, "Batch item failed");
            item.status = ItemStatus::Failed;
            item.error = Some(error);
            self.update_stats(|stats| {
                stats.processed_items += 1;
                stats.failed_items += 1;
            });
        } else {
            self.update_stats(|stats| {
                stats.processed_items += 1;
                stats.successful_items += 1;
            });
        }

        let _ = self.events.send(BatchEvent::ItemCompleted {
            id: item.id.clone(),
            status: item.status,
            error: item.error.clone(),
        });
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn config(batch_size: usize, concurrency: usize) -> BatchProcessorConfig {
        BatchProcessorConfig {
            batch_size,
            concurrency,
            rate_limit_delay: Duration::from_millis(100),
            max_retries: 2,
            retry_delay: Duration::from_millis(10),
            exponential_backoff: true,
            memory_threshold_bytes: u64::MAX,
        }
    }

    fn items(n: usize) -> Vec<BatchItem<usize>> {
        (0..n).map(|i| BatchItem::new(format!("item-{i}"), i)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_failing_item() {
        let processor = BatchProcessor::new(config(2, 1));

        let result = processor
            .process(items(5), |n| async move {
                if n == 3 {
                    Err(QuipError::Export("always broken".to_string()))
                } else {
                    Ok(())
                }
            })
            .await
            .unwrap();

        assert_eq!(result.total_items, 5);
        assert_eq!(result.successful_items, 4);
        assert_eq!(result.failed_items, 1);
        assert_eq!(result.skipped_items, 0);

        let failed = result.items.iter().find(|i| i.payload == 3).unwrap();
        assert_eq!(failed.status, ItemStatus::Failed);
        assert_eq!(failed.retry_count, 2);
        assert!(!failed.error.as_deref().unwrap_or("").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success() {
        let processor = BatchProcessor::new(config(5, 1));
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let result = processor
            .process(items(1), move |_| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(QuipError::Connection("reset".to_string()))
                    } else {
                        Ok(())
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.successful_items, 1);
        assert_eq!(result.items[0].retry_count, 1);
        assert!(result.items[0].error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_determines_batch_order() {
        let processor = BatchProcessor::new(config(2, 2));
        let input = vec![
            BatchItem::new("a", 'a').with_priority(5),
            BatchItem::new("b", 'b').with_priority(1),
            BatchItem::new("c", 'c').with_priority(3),
            BatchItem::new("d", 'd').with_priority(1),
            BatchItem::new("e", 'e').with_priority(2),
        ];

        let result = processor.process(input, |_| async { Ok(()) }).await.unwrap();

        let order: Vec<&str> = result.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(order, vec!["b", "d", "e", "c", "a"]);

        for a in &result.items {
            for b in &result.items {
                if a.priority < b.priority {
                    assert!(a.batch_index <= b.batch_index);
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_bounded_by_semaphore() {
        let processor = BatchProcessor::new(config(6, 2));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (a, p) = (active.clone(), peak.clone());
        processor
            .process(items(6), move |_| {
                let (active, peak) = (a.clone(), p.clone());
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await
            .unwrap();

        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_skips_remaining_items() {
        let processor = Arc::new(BatchProcessor::new(config(2, 1)));
        let calls = Arc::new(AtomicUsize::new(0));

        let (bp, counter) = (processor.clone(), calls.clone());
        let result = processor
            .process(items(6), move |_| {
                let (bp, counter) = (bp.clone(), counter.clone());
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        bp.cancel();
                    }
                    Ok(())
                }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.successful_items, 1);
        assert_eq!(result.skipped_items, 5);
        assert!(result.items[1..]
            .iter()
            .all(|i| i.status == ItemStatus::Skipped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_run_rejected() {
        let processor = Arc::new(BatchProcessor::new(config(2, 1)));

        let bp = processor.clone();
        let first = tokio::spawn(async move {
            bp.process(items(2), |_| async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            })
            .await
            .map(|r| r.successful_items)
        });
        tokio::task::yield_now().await;

        let second = processor.process(items(1), |_| async { Ok(()) }).await;
        assert!(matches!(second, Err(QuipError::Batch(_))));

        assert_eq!(first.await.unwrap().unwrap(), 2);
        assert!(!processor.get_statistics().is_running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_separated_by_delay() {
        let processor = BatchProcessor::new(config(1, 1));
        let started = Instant::now();

        processor.process(items(3), |_| async { Ok(()) }).await.unwrap();

        // two gaps of 100ms, none after the last batch
        assert_eq!(started.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_events_report_items() {
        let processor = BatchProcessor::new(config(2, 1));
        let mut events = processor.subscribe();

        processor.process(items(2), |_| async { Ok(()) }).await.unwrap();

        let mut completed = 0;
        while let Ok(event) = events.try_recv() {
            if let BatchEvent::ItemCompleted { status, .. } = event {
                assert_eq!(status, ItemStatus::Completed);
                completed += 1;
            }
        }
        assert_eq!(completed, 2);
    }

    #[test]
    fn test_retry_delay_for() {
        let mut cfg = config(1, 1);
        cfg.retry_delay = Duration::from_millis(100);
        assert_eq!(cfg.retry_delay_for(2), Duration::from_millis(400));

        cfg.exponential_backoff = false;
        assert_eq!(cfg.retry_delay_for(2), Duration::from_millis(100));
    }
}
