use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, PoisonError,
};

use prometheus::Registry;
use tokio::{
    sync::mpsc,
    time::{Duration, Instant},
};

use crate::cluster::ClusterClient;
use crate::committed_offsets::AlternateLagSource;
use crate::consumer_group_metrics::ConsumerGroupAggregator;
use crate::metrics::{Metric, MetricEmitter, MetricSample, ScrapeResult};
use crate::name_filter::NameFilter;
use crate::offset_table::OffsetTable;
use crate::topic_metrics::TopicMetricsScheduler;

/// Configuration of every scrape, set once at startup.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub topic_filter: NameFilter,
    pub group_filter: NameFilter,

    /// Upper bound to the amount of Topics processed concurrently.
    pub topic_workers: usize,

    /// Request committed offsets for every known Topic Partition, not only the assigned ones.
    pub fetch_all_offsets: bool,

    /// Let every scrape run on its own, instead of coalescing the concurrent ones.
    pub allow_concurrent: bool,

    pub metadata_refresh_interval: Duration,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            topic_filter: NameFilter::default(),
            group_filter: NameFilter::default(),
            topic_workers: 100,
            fetch_all_offsets: false,
            allow_concurrent: false,
            metadata_refresh_interval: Duration::from_secs(30),
        }
    }
}

/// One complete scrape: metadata refresh, then Topic metrics, then Consumer Group metrics.
///
/// Phases run strictly one after the other: the Consumer Group phase only starts once every
/// Topic has been processed, so it observes a fully populated [`OffsetTable`].
pub struct ScrapePipeline {
    client: Arc<dyn ClusterClient>,
    topic_scheduler: TopicMetricsScheduler,
    group_aggregator: ConsumerGroupAggregator,

    metadata_refresh_interval: Duration,
    next_metadata_refresh: Mutex<Instant>,
    metadata_cached: AtomicBool,
}

impl ScrapePipeline {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        config: &ScrapeConfig,
        alternate_lag_source: Option<Arc<dyn AlternateLagSource>>,
        metrics: Arc<Registry>,
    ) -> Self {
        Self {
            topic_scheduler: TopicMetricsScheduler::new(
                client.clone(),
                config.topic_filter.clone(),
                config.topic_workers,
                alternate_lag_source,
                metrics,
            ),
            group_aggregator: ConsumerGroupAggregator::new(
                client.clone(),
                config.group_filter.clone(),
                config.fetch_all_offsets,
            ),
            client,
            metadata_refresh_interval: config.metadata_refresh_interval,
            next_metadata_refresh: Mutex::new(Instant::now()),
            metadata_cached: AtomicBool::new(false),
        }
    }

    /// Runs all the phases, and collects every emitted [`MetricSample`].
    ///
    /// Never fails: whatever could not be fetched is missing from the returned [`ScrapeResult`].
    pub async fn run(&self) -> ScrapeResult {
        let (sx, mut rx) = mpsc::unbounded_channel::<MetricSample>();

        self.emit_all(Arc::new(sx)).await;

        // Every phase has joined its tasks: all the senders are gone, and all samples are queued
        let mut samples = Vec::new();
        while let Ok(sample) = rx.try_recv() {
            samples.push(sample);
        }
        debug!("Scrape collected {} samples", samples.len());

        ScrapeResult::from(samples)
    }

    async fn emit_all(&self, emitter: Arc<dyn MetricEmitter>) {
        self.refresh_metadata_if_stale().await;

        let brokers = self.client.brokers().await;
        emitter.emit(MetricSample::new(Metric::Brokers, vec![], brokers.len() as i64));
        for b in &brokers {
            emitter.emit(MetricSample::new(Metric::BrokerInfo, vec![b.id.to_string(), b.address()], 1));
        }

        let topics = match self.client.topics().await {
            Ok(topics) => topics,
            Err(e) => {
                error!("Cannot get topics, ending scrape early: {e}");
                return;
            },
        };

        let offsets = Arc::new(OffsetTable::new());

        debug!("Topic phase: {} topics", topics.len());
        let processed = self.topic_scheduler.run(topics, offsets.clone(), emitter.clone()).await;
        debug!("Topic phase done: {processed} topics processed, {} offsets known", offsets.len());

        debug!("Consumer group phase: {} brokers", brokers.len());
        self.group_aggregator.run(brokers, offsets, emitter).await;
        debug!("Consumer group phase done");
    }

    /// Refreshes the cluster metadata, if the refresh interval has elapsed since the last refresh.
    ///
    /// On failure, the previously fetched metadata keeps being used.
    /// Until a first refresh succeeds there is nothing cached, so every scrape retries.
    async fn refresh_metadata_if_stale(&self) {
        let now = Instant::now();
        {
            let mut next = self.next_metadata_refresh.lock().unwrap_or_else(PoisonError::into_inner);
            if now < *next {
                return;
            }
            *next = now + self.metadata_refresh_interval;
        }

        info!("Refreshing cluster metadata");
        match self.client.refresh_metadata().await {
            Ok(()) => self.metadata_cached.store(true, Ordering::SeqCst),
            Err(e) if self.metadata_cached.load(Ordering::SeqCst) => {
                error!("Cannot refresh topics, using cached data: {e}");
            },
            Err(e) => {
                error!("Cannot refresh topics, no cached data: retrying at next scrape: {e}");
                *self.next_metadata_refresh.lock().unwrap_or_else(PoisonError::into_inner) = now;
            },
        }
    }
}
