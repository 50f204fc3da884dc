use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rdkafka::{
    admin::AdminClient,
    client::DefaultClientContext,
    consumer::{BaseConsumer, Consumer},
    error::KafkaResult,
    metadata::Metadata,
    ClientConfig, Offset, TopicPartitionList,
};
use tokio::{sync::RwLock, task, time::Duration};

use super::client::{ClusterClient, OffsetPosition};
use super::errors::{ClusterError, ClusterResult};
use crate::constants::{KONSUMER_OFFSETS_DATA_TOPIC, KONSUMER_OFFSETS_KCL_CONSUMER};
use crate::kafka_types::{
    Broker, CommittedOffset, GroupDescription, PartitionStatus, TopicPartition, TopicPartitionsStatus,
    NO_COMMITTED_OFFSET,
};

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Snapshot of the Kafka Cluster status, as of the latest metadata refresh.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct ClusterStatus {
    /// Topics (and Partitions) as reported by the Kafka cluster, minus `__consumer_offsets`.
    topics: Vec<TopicPartitionsStatus>,

    /// Brokers as reported by the Kafka cluster.
    brokers: Vec<Broker>,

    /// Leader of each `__consumer_offsets` Partition, indexed by Partition.
    ///
    /// The leader of a `__consumer_offsets` Partition is the Group Coordinator
    /// of all the Consumer Groups that hash to it.
    group_coordinators: Vec<Option<u32>>,
}

impl From<&Metadata> for ClusterStatus {
    fn from(m: &Metadata) -> Self {
        let mut group_coordinators = Vec::new();
        if let Some(co) = m.topics().iter().find(|mt| mt.name() == KONSUMER_OFFSETS_DATA_TOPIC) {
            group_coordinators = vec![None; co.partitions().len()];
            for p in co.partitions() {
                if let Some(slot) = group_coordinators.get_mut(p.id() as usize) {
                    *slot = u32::try_from(p.leader()).ok();
                }
            }
        }

        Self {
            topics: m
                .topics()
                .iter()
                // Ignore `__consumer_offsets` topic
                .filter(|mt| mt.name() != KONSUMER_OFFSETS_DATA_TOPIC)
                .map(TopicPartitionsStatus::from)
                .collect(),
            brokers: m.brokers().iter().map(Broker::from).collect(),
            group_coordinators,
        }
    }
}

impl ClusterStatus {
    fn partition(&self, topic: &str, partition: u32) -> ClusterResult<&PartitionStatus> {
        self.topics
            .iter()
            .find(|t| t.name == topic)
            .ok_or_else(|| ClusterError::TopicNotFound(topic.to_string()))?
            .partitions
            .iter()
            .find(|p| p.id == partition)
            .ok_or_else(|| ClusterError::PartitionNotFound(topic.to_string(), partition))
    }

    /// Identifier of the Broker coordinating the given Consumer Group.
    ///
    /// Falls back to the lowest Broker identifier, when `__consumer_offsets` is not known (yet).
    fn coordinator_of(&self, group: &str) -> Option<u32> {
        let lowest_broker = || self.brokers.iter().map(|b| b.id).min();

        if self.group_coordinators.is_empty() {
            return lowest_broker();
        }

        let partition = (java_string_hash(group) & 0x7fffffff) as usize % self.group_coordinators.len();
        self.group_coordinators[partition].or_else(lowest_broker)
    }
}

/// Hash of a string, as computed by Java's `String.hashCode()`.
///
/// This is what Kafka uses to map a Consumer Group to a `__consumer_offsets` Partition.
fn java_string_hash(s: &str) -> i32 {
    s.encode_utf16().fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(c as i32))
}

/// [`ClusterClient`] built on top of `librdkafka`.
///
/// Network calls of `librdkafka` block the calling thread: they are executed via
/// [`task::spawn_blocking`], so they don't stall the async runtime.
pub struct RdKafkaClusterClient {
    client_config: ClientConfig,
    admin_client: Arc<AdminClient<DefaultClientContext>>,
    latest_status: RwLock<Option<ClusterStatus>>,
}

impl RdKafkaClusterClient {
    /// Create a new [`RdKafkaClusterClient`].
    ///
    /// No metadata is fetched at creation: the first call to [`ClusterClient::refresh_metadata`] does that.
    ///
    /// # Arguments
    ///
    /// * `client_config` - Kafka client configuration, used to create the internal Admin Client
    ///   and, for fetching committed offsets, short-lived Consumers
    pub fn new(client_config: ClientConfig) -> ClusterResult<Self> {
        let admin_client: AdminClient<DefaultClientContext> = client_config.create()?;

        Ok(Self {
            client_config,
            admin_client: Arc::new(admin_client),
            latest_status: RwLock::new(None),
        })
    }

    /// Runs a blocking Admin Client call on a dedicated thread.
    async fn blocking<F, T>(&self, f: F) -> ClusterResult<T>
    where
        F: FnOnce(&AdminClient<DefaultClientContext>) -> KafkaResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let admin_client = self.admin_client.clone();
        Ok(task::spawn_blocking(move || f(&admin_client)).await??)
    }

    /// Applies `f` to the cached [`PartitionStatus`] of a Partition.
    async fn with_partition<F, T>(&self, topic: &str, partition: u32, f: F) -> ClusterResult<T>
    where
        F: FnOnce(&PartitionStatus) -> ClusterResult<T>,
    {
        match &*(self.latest_status.read().await) {
            None => Err(ClusterError::MetadataUnavailable),
            Some(cs) => f(cs.partition(topic, partition)?),
        }
    }
}

#[async_trait]
impl ClusterClient for RdKafkaClusterClient {
    async fn refresh_metadata(&self) -> ClusterResult<()> {
        let status = self
            .blocking(|admin_client| {
                admin_client.inner().fetch_metadata(None, FETCH_TIMEOUT).map(|m| ClusterStatus::from(&m))
            })
            .await?;

        info!("Refreshed cluster metadata: {} topics, {} brokers", status.topics.len(), status.brokers.len());
        *(self.latest_status.write().await) = Some(status);

        Ok(())
    }

    async fn brokers(&self) -> Vec<Broker> {
        match &*(self.latest_status.read().await) {
            None => Vec::new(),
            Some(cs) => cs.brokers.clone(),
        }
    }

    async fn topics(&self) -> ClusterResult<Vec<String>> {
        match &*(self.latest_status.read().await) {
            None => Err(ClusterError::MetadataUnavailable),
            Some(cs) => Ok(cs.topics.iter().map(|t| t.name.clone()).collect()),
        }
    }

    async fn partitions(&self, topic: &str) -> ClusterResult<Vec<u32>> {
        match &*(self.latest_status.read().await) {
            None => Err(ClusterError::MetadataUnavailable),
            Some(cs) => cs
                .topics
                .iter()
                .find(|t| t.name == topic)
                .map(|t| t.partitions.iter().map(|p| p.id).collect())
                .ok_or_else(|| ClusterError::TopicNotFound(topic.to_string())),
        }
    }

    async fn leader(&self, topic: &str, partition: u32) -> ClusterResult<u32> {
        self.with_partition(topic, partition, |p| {
            p.leader_broker.ok_or_else(|| ClusterError::LeaderNotAvailable(topic.to_string(), partition))
        })
        .await
    }

    async fn offset(&self, topic: &str, partition: u32, position: OffsetPosition) -> ClusterResult<i64> {
        let t = topic.to_string();
        let (earliest, latest) = self
            .blocking(move |admin_client| {
                admin_client.inner().fetch_watermarks(&t, partition as i32, FETCH_TIMEOUT)
            })
            .await?;

        Ok(match position {
            OffsetPosition::Newest => latest,
            OffsetPosition::Oldest => earliest,
        })
    }

    async fn replicas(&self, topic: &str, partition: u32) -> ClusterResult<Vec<u32>> {
        self.with_partition(topic, partition, |p| Ok(p.replica_brokers.clone())).await
    }

    async fn in_sync_replicas(&self, topic: &str, partition: u32) -> ClusterResult<Vec<u32>> {
        self.with_partition(topic, partition, |p| Ok(p.in_sync_replica_brokers.clone())).await
    }

    async fn list_groups(&self) -> ClusterResult<HashMap<u32, Vec<String>>> {
        // `librdkafka` lists the Groups of all Brokers at once: the Group Coordinator
        // is then used to assign each Group to its Broker
        let all_groups = self
            .blocking(|admin_client| {
                admin_client.inner().fetch_group_list(None, FETCH_TIMEOUT).map(|gl| {
                    gl.groups().iter().map(|g| g.name().to_string()).collect::<Vec<String>>()
                })
            })
            .await?;

        match &*(self.latest_status.read().await) {
            None => Err(ClusterError::MetadataUnavailable),
            Some(cs) => {
                let mut by_coordinator = HashMap::<u32, Vec<String>>::new();
                // Ignore own consumer of `__consumer_offsets` topic
                for g in all_groups.into_iter().filter(|g| g != KONSUMER_OFFSETS_KCL_CONSUMER) {
                    match cs.coordinator_of(&g) {
                        Some(coordinator) => by_coordinator.entry(coordinator).or_default().push(g),
                        None => warn!("No coordinator known for Consumer Group '{g}'"),
                    }
                }
                Ok(by_coordinator)
            },
        }
    }

    async fn describe_groups(&self, _broker: &Broker, groups: &[String]) -> ClusterResult<Vec<GroupDescription>> {
        let groups = groups.to_vec();

        self.blocking(move |admin_client| {
            let mut described = Vec::with_capacity(groups.len());
            for g in groups.iter() {
                match admin_client.inner().fetch_group_list(Some(g), FETCH_TIMEOUT) {
                    Ok(gl) => described.extend(gl.groups().iter().map(GroupDescription::from)),
                    Err(e) => error!("Failed to describe Consumer Group '{g}': {e}"),
                }
            }

            Ok(described)
        })
        .await
    }

    async fn fetch_committed_offsets(
        &self,
        _broker: &Broker,
        group: &str,
        partitions: &[TopicPartition],
    ) -> ClusterResult<Vec<CommittedOffset>> {
        let mut consumer_config = self.client_config.clone();
        consumer_config.set("group.id", group).set("enable.auto.commit", "false");

        let mut tpl = TopicPartitionList::with_capacity(partitions.len());
        for tp in partitions.iter() {
            tpl.add_partition(&tp.topic, tp.partition as i32);
        }

        task::spawn_blocking(move || -> ClusterResult<Vec<CommittedOffset>> {
            // Committed offsets are fetched from the Group Coordinator on behalf of the Group:
            // the Consumer never joins the Group, nor it commits.
            let consumer: BaseConsumer = consumer_config.create()?;
            let committed = consumer.committed_offsets(tpl, FETCH_TIMEOUT)?;

            Ok(committed
                .elements()
                .iter()
                .map(|e| CommittedOffset {
                    topic_partition: TopicPartition::new(e.topic().to_string(), e.partition() as u32),
                    offset: match e.offset() {
                        Offset::Offset(o) => o,
                        _ => NO_COMMITTED_OFFSET,
                    },
                    error: e.error().err().map(|err| err.to_string()),
                })
                .collect())
        })
        .await?
    }
}
