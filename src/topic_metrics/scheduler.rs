use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex, PoisonError,
};

use prometheus::{register_histogram_vec_with_registry, HistogramVec, Registry};
use tokio::task::JoinSet;

use crate::cluster::{ClusterClient, OffsetPosition};
use crate::committed_offsets::AlternateLagSource;
use crate::metrics::{Metric, MetricEmitter, MetricSample, LABEL_TOPIC};
use crate::name_filter::NameFilter;
use crate::offset_table::OffsetTable;

const MET_FETCH_NAME: &str = "topic_metrics_fetch_time_seconds";
const MET_FETCH_HELP: &str = "Time (s) taken to fetch metadata and offsets of all the partitions of a topic";

/// Fans a list of Topics out to a bounded pool of workers, that emit the Topic and Partition metrics.
///
/// While doing so, it populates the [`OffsetTable`] with the current offset of every Partition.
pub struct TopicMetricsScheduler {
    client: Arc<dyn ClusterClient>,
    filter: NameFilter,
    workers: usize,
    alternate_lag_source: Option<Arc<dyn AlternateLagSource>>,

    // Prometheus Metrics
    metric_fetch: HistogramVec,
}

impl TopicMetricsScheduler {
    /// Create a new [`TopicMetricsScheduler`].
    ///
    /// # Arguments
    ///
    /// * `client` - Used to fetch Partitions, their replication status and offsets
    /// * `filter` - Topics not accepted by it are never processed
    /// * `workers` - Upper bound to the amount of Topics processed concurrently
    /// * `alternate_lag_source` - If set, used to emit an additional Consumer Group lag metric
    /// * `metrics` - Registry to register the internal metrics with
    pub fn new(
        client: Arc<dyn ClusterClient>,
        filter: NameFilter,
        workers: usize,
        alternate_lag_source: Option<Arc<dyn AlternateLagSource>>,
        metrics: Arc<Registry>,
    ) -> Self {
        Self {
            client,
            filter,
            workers,
            alternate_lag_source,
            metric_fetch: register_histogram_vec_with_registry!(
                MET_FETCH_NAME,
                MET_FETCH_HELP,
                &[LABEL_TOPIC],
                metrics
            )
            .unwrap_or_else(|e| panic!("Failed to create metric '{MET_FETCH_NAME}': {e}")),
        }
    }

    /// Processes every accepted Topic, and returns only once all of them have been processed.
    ///
    /// Returns the amount of Topics processed.
    pub async fn run(&self, topics: Vec<String>, offsets: Arc<OffsetTable>, emitter: Arc<dyn MetricEmitter>) -> usize {
        let worker_count = worker_count(topics.len(), self.workers);

        let queue = TopicQueue::new(topics.into_iter().filter(|t| {
            let accepted = self.filter.accepts(t);
            if !accepted {
                trace!("Topic '{t}' filtered out");
            }
            accepted
        }));
        debug!("Dispatching {} topics to {} workers", queue.len(), worker_count);

        let processed = Arc::new(AtomicUsize::new(0));
        let mut workers = JoinSet::new();
        for id in 0..worker_count {
            let worker = TopicWorker {
                id,
                client: self.client.clone(),
                offsets: offsets.clone(),
                emitter: emitter.clone(),
                alternate_lag_source: self.alternate_lag_source.clone(),
                metric_fetch: self.metric_fetch.clone(),
            };
            let queue = queue.clone();
            let processed = processed.clone();

            workers.spawn(async move {
                while let Some(topic) = queue.next() {
                    worker.process_topic(&topic).await;
                    processed.fetch_add(1, Ordering::SeqCst);
                }
                trace!("Topic worker {} done", worker.id);
            });
        }

        // Completion barrier: all the workers have drained the queue
        while let Some(res) = workers.join_next().await {
            if let Err(e) = res {
                error!("Topic worker failed: {e}");
            }
        }

        processed.load(Ordering::SeqCst)
    }
}

/// Amount of workers to process `topics` Topics with, given the `configured` upper bound.
///
/// Half the Topics, capped at `configured`, but at least 1 worker when there is at least 1 Topic.
pub(crate) fn worker_count(topics: usize, configured: usize) -> usize {
    if topics == 0 {
        return 0;
    }

    let n = if topics > 1 {
        (topics / 2).min(configured)
    } else {
        topics
    };
    n.max(1)
}

/// Work queue shared by the workers: each worker pulls the next Topic once done with the previous one.
#[derive(Clone)]
struct TopicQueue {
    topics: Arc<Mutex<VecDeque<String>>>,
}

impl TopicQueue {
    fn new(topics: impl Iterator<Item = String>) -> Self {
        Self {
            topics: Arc::new(Mutex::new(topics.collect())),
        }
    }

    fn next(&self) -> Option<String> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner).pop_front()
    }

    fn len(&self) -> usize {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

struct TopicWorker {
    id: usize,
    client: Arc<dyn ClusterClient>,
    offsets: Arc<OffsetTable>,
    emitter: Arc<dyn MetricEmitter>,
    alternate_lag_source: Option<Arc<dyn AlternateLagSource>>,
    metric_fetch: HistogramVec,
}

impl TopicWorker {
    async fn process_topic(&self, topic: &str) {
        trace!("Worker {} fetching metadata and offsets for Partitions of Topic '{topic}'", self.id);
        let timer = self.metric_fetch.with_label_values(&[topic]).start_timer();

        match self.client.partitions(topic).await {
            Ok(partitions) => {
                self.emitter.emit(MetricSample::new(
                    Metric::TopicPartitions,
                    vec![topic.to_string()],
                    partitions.len() as i64,
                ));

                for p in partitions {
                    self.process_partition(topic, p).await;
                }
            },
            Err(e) => {
                error!("Cannot get partitions of topic '{topic}': {e}");
            },
        }

        timer.observe_duration();
    }

    /// Every attribute of the Partition is fetched independently: a failure only omits the related metric.
    async fn process_partition(&self, topic: &str, partition: u32) {
        let emit = |metric: Metric, value: i64| {
            self.emitter.emit(MetricSample::new(metric, vec![topic.to_string(), partition.to_string()], value));
        };

        let leader = match self.client.leader(topic, partition).await {
            Ok(leader) => {
                emit(Metric::TopicPartitionLeader, leader as i64);
                Some(leader)
            },
            Err(e) => {
                error!("Cannot get leader of topic '{topic}' partition {partition}: {e}");
                None
            },
        };

        let current_offset = match self.client.offset(topic, partition, OffsetPosition::Newest).await {
            Ok(offset) => {
                self.offsets.set(topic, partition, offset);
                emit(Metric::TopicPartitionCurrentOffset, offset);
                Some(offset)
            },
            Err(e) => {
                error!("Cannot get current offset of topic '{topic}' partition {partition}: {e}");
                None
            },
        };

        match self.client.offset(topic, partition, OffsetPosition::Oldest).await {
            Ok(offset) => emit(Metric::TopicPartitionOldestOffset, offset),
            Err(e) => error!("Cannot get oldest offset of topic '{topic}' partition {partition}: {e}"),
        }

        let replicas = match self.client.replicas(topic, partition).await {
            Ok(replicas) => {
                emit(Metric::TopicPartitionReplicas, replicas.len() as i64);
                Some(replicas)
            },
            Err(e) => {
                error!("Cannot get replicas of topic '{topic}' partition {partition}: {e}");
                None
            },
        };

        let in_sync_replicas = match self.client.in_sync_replicas(topic, partition).await {
            Ok(isr) => {
                emit(Metric::TopicPartitionInSyncReplica, isr.len() as i64);
                Some(isr)
            },
            Err(e) => {
                error!("Cannot get in-sync replicas of topic '{topic}' partition {partition}: {e}");
                None
            },
        };

        emit(
            Metric::TopicPartitionLeaderIsPreferred,
            leader_is_preferred(leader, replicas.as_deref()) as i64,
        );
        emit(
            Metric::TopicPartitionUnderReplicatedPartition,
            is_under_replicated(replicas.as_deref(), in_sync_replicas.as_deref()) as i64,
        );

        if let (Some(source), Some(current_offset)) = (&self.alternate_lag_source, current_offset) {
            for (group, committed_offset) in source.committed_offsets(topic, partition).await {
                if committed_offset > 0 {
                    self.emitter.emit(MetricSample::new(
                        Metric::ConsumerGroupLagAlternateSource,
                        vec![group, topic.to_string(), partition.to_string()],
                        current_offset - committed_offset,
                    ));
                }
            }
        }
    }
}

/// `true` iff the leader is known, and it's the first of the replicas.
fn leader_is_preferred(leader: Option<u32>, replicas: Option<&[u32]>) -> bool {
    match (leader, replicas.and_then(<[u32]>::first)) {
        (Some(l), Some(preferred)) => l == *preferred,
        _ => false,
    }
}

/// `true` iff both replicas and in-sync replicas are known, and fewer replicas are in-sync.
fn is_under_replicated(replicas: Option<&[u32]>, in_sync_replicas: Option<&[u32]>) -> bool {
    match (replicas, in_sync_replicas) {
        (Some(r), Some(isr)) => isr.len() < r.len(),
        _ => false,
    }
}
