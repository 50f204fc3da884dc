//! In-memory [`ClusterClient`], and other helpers, for unit tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use tokio::{
    sync::mpsc,
    time::{sleep, Duration},
};

use crate::cluster::{ClusterClient, ClusterError, ClusterResult, OffsetPosition};
use crate::kafka_types::{
    Broker, CommittedOffset, Group, GroupDescription, GroupMember, Member, TopicPartition, NO_COMMITTED_OFFSET,
};
use crate::metrics::{MetricEmitter, MetricSample, ScrapeResult};

/// Attributes of a Partition that can be made to fail independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Leader,
    NewestOffset,
    OldestOffset,
    Replicas,
    InSyncReplicas,
}

#[derive(Debug, Clone, Default)]
pub struct MockPartition {
    pub leader: u32,
    pub newest_offset: i64,
    pub oldest_offset: i64,
    pub replicas: Vec<u32>,
    pub in_sync_replicas: Vec<u32>,
}

impl MockPartition {
    pub fn new(newest_offset: i64, oldest_offset: i64) -> Self {
        Self {
            leader: 1,
            newest_offset,
            oldest_offset,
            replicas: vec![1],
            in_sync_replicas: vec![1],
        }
    }

    pub fn replicated(mut self, leader: u32, replicas: &[u32], in_sync_replicas: &[u32]) -> Self {
        self.leader = leader;
        self.replicas = replicas.to_vec();
        self.in_sync_replicas = in_sync_replicas.to_vec();
        self
    }
}

/// A [`ClusterClient`] answering from in-memory data, that counts the calls it receives.
#[derive(Default)]
pub struct MockClusterClient {
    brokers: Vec<Broker>,
    topics: BTreeMap<String, Vec<MockPartition>>,
    groups: HashMap<u32, Vec<GroupDescription>>,
    committed: HashMap<String, HashMap<TopicPartition, i64>>,

    failing_attributes: HashSet<(String, u32, Attribute)>,
    failing_topics: HashSet<String>,
    failing_brokers: HashSet<u32>,
    failing_groups: HashSet<String>,
    fail_topics_listing: bool,
    fail_groups_listing: bool,
    fail_refresh: bool,
    panic_on_topics: bool,

    /// Delay applied to every topology call, to make concurrency observable.
    delay: Duration,

    pub refresh_calls: AtomicUsize,
    pub topics_calls: AtomicUsize,
    pub list_groups_calls: AtomicUsize,
    pub partitions_in_flight: AtomicUsize,
    pub partitions_max_in_flight: AtomicUsize,
    pub fetch_requests: Mutex<Vec<(String, Vec<TopicPartition>)>>,
}

impl MockClusterClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_broker(mut self, id: u32) -> Self {
        self.brokers.push(Broker {
            id,
            host: format!("broker-{id}"),
            port: 9092,
        });
        self
    }

    pub fn with_topic(mut self, topic: &str, partitions: Vec<MockPartition>) -> Self {
        self.topics.insert(topic.to_string(), partitions);
        self
    }

    pub fn with_group(mut self, broker: u32, group: GroupDescription) -> Self {
        self.groups.entry(broker).or_default().push(group);
        self
    }

    pub fn with_committed(mut self, group: &str, topic: &str, partition: u32, offset: i64) -> Self {
        self.committed
            .entry(group.to_string())
            .or_default()
            .insert(TopicPartition::new(topic.to_string(), partition), offset);
        self
    }

    pub fn failing_attribute(mut self, topic: &str, partition: u32, attribute: Attribute) -> Self {
        self.failing_attributes.insert((topic.to_string(), partition, attribute));
        self
    }

    pub fn failing_topic(mut self, topic: &str) -> Self {
        self.failing_topics.insert(topic.to_string());
        self
    }

    /// Makes describing the Groups coordinated by `broker` fail.
    pub fn failing_broker(mut self, broker: u32) -> Self {
        self.failing_brokers.insert(broker);
        self
    }

    pub fn failing_group(mut self, group: &str) -> Self {
        self.failing_groups.insert(group.to_string());
        self
    }

    pub fn failing_topics_listing(mut self) -> Self {
        self.fail_topics_listing = true;
        self
    }

    pub fn failing_groups_listing(mut self) -> Self {
        self.fail_groups_listing = true;
        self
    }

    /// Makes `topics()` panic, after counting the call.
    pub fn panicking_topics(mut self) -> Self {
        self.panic_on_topics = true;
        self
    }

    pub fn failing_refresh(mut self) -> Self {
        self.fail_refresh = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn partition(&self, topic: &str, partition: u32, attribute: Attribute) -> ClusterResult<&MockPartition> {
        if self.failing_attributes.contains(&(topic.to_string(), partition, attribute)) {
            return Err(ClusterError::PartitionNotFound(topic.to_string(), partition));
        }

        self.topics
            .get(topic)
            .ok_or_else(|| ClusterError::TopicNotFound(topic.to_string()))?
            .get(partition as usize)
            .ok_or_else(|| ClusterError::PartitionNotFound(topic.to_string(), partition))
    }
}

#[async_trait]
impl ClusterClient for MockClusterClient {
    async fn refresh_metadata(&self) -> ClusterResult<()> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_refresh {
            return Err(ClusterError::MetadataUnavailable);
        }
        Ok(())
    }

    async fn brokers(&self) -> Vec<Broker> {
        self.brokers.clone()
    }

    async fn topics(&self) -> ClusterResult<Vec<String>> {
        self.topics_calls.fetch_add(1, Ordering::SeqCst);
        sleep(self.delay).await;

        if self.panic_on_topics {
            panic!("topics listing blew up");
        }
        if self.fail_topics_listing {
            return Err(ClusterError::MetadataUnavailable);
        }
        Ok(self.topics.keys().cloned().collect())
    }

    async fn partitions(&self, topic: &str) -> ClusterResult<Vec<u32>> {
        let in_flight = self.partitions_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.partitions_max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        sleep(self.delay).await;
        self.partitions_in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_topics.contains(topic) {
            return Err(ClusterError::TopicNotFound(topic.to_string()));
        }
        self.topics
            .get(topic)
            .map(|ps| (0..ps.len() as u32).collect())
            .ok_or_else(|| ClusterError::TopicNotFound(topic.to_string()))
    }

    async fn leader(&self, topic: &str, partition: u32) -> ClusterResult<u32> {
        self.partition(topic, partition, Attribute::Leader).map(|p| p.leader)
    }

    async fn offset(&self, topic: &str, partition: u32, position: OffsetPosition) -> ClusterResult<i64> {
        match position {
            OffsetPosition::Newest => self.partition(topic, partition, Attribute::NewestOffset).map(|p| p.newest_offset),
            OffsetPosition::Oldest => self.partition(topic, partition, Attribute::OldestOffset).map(|p| p.oldest_offset),
        }
    }

    async fn replicas(&self, topic: &str, partition: u32) -> ClusterResult<Vec<u32>> {
        self.partition(topic, partition, Attribute::Replicas).map(|p| p.replicas.clone())
    }

    async fn in_sync_replicas(&self, topic: &str, partition: u32) -> ClusterResult<Vec<u32>> {
        self.partition(topic, partition, Attribute::InSyncReplicas).map(|p| p.in_sync_replicas.clone())
    }

    async fn list_groups(&self) -> ClusterResult<HashMap<u32, Vec<String>>> {
        self.list_groups_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_groups_listing {
            return Err(ClusterError::MetadataUnavailable);
        }

        Ok(self
            .groups
            .iter()
            .map(|(broker, gs)| (*broker, gs.iter().map(|g| g.group.name.clone()).collect()))
            .collect())
    }

    async fn describe_groups(&self, broker: &Broker, groups: &[String]) -> ClusterResult<Vec<GroupDescription>> {
        if self.failing_brokers.contains(&broker.id) {
            return Err(ClusterError::MetadataUnavailable);
        }

        Ok(self
            .groups
            .get(&broker.id)
            .map(|gs| gs.iter().filter(|g| groups.contains(&g.group.name)).cloned().collect())
            .unwrap_or_default())
    }

    async fn fetch_committed_offsets(
        &self,
        _broker: &Broker,
        group: &str,
        partitions: &[TopicPartition],
    ) -> ClusterResult<Vec<CommittedOffset>> {
        self.fetch_requests.lock().unwrap().push((group.to_string(), partitions.to_vec()));

        if self.failing_groups.contains(group) {
            return Err(ClusterError::MetadataUnavailable);
        }

        let committed = self.committed.get(group);
        Ok(partitions
            .iter()
            .map(|tp| CommittedOffset {
                topic_partition: tp.clone(),
                offset: committed.and_then(|c| c.get(tp)).copied().unwrap_or(NO_COMMITTED_OFFSET),
                error: None,
            })
            .collect())
    }
}

pub fn group(name: &str, members: Vec<GroupMember>) -> GroupDescription {
    GroupDescription {
        group: Group {
            name: name.to_string(),
        },
        members,
    }
}

pub fn member(id: &str, assignment: Option<Vec<u8>>) -> GroupMember {
    GroupMember {
        member: Member {
            id: id.to_string(),
        },
        assignment,
    }
}

/// Encodes a version 0 `ConsumerProtocolAssignment`, as Kafka Consumers do.
pub fn encode_assignment(assigned: &[(&str, &[i32])]) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&0i16.to_be_bytes());
    bytes.extend_from_slice(&(assigned.len() as i32).to_be_bytes());
    for (topic, partitions) in assigned {
        bytes.extend_from_slice(&(topic.len() as i16).to_be_bytes());
        bytes.extend_from_slice(topic.as_bytes());
        bytes.extend_from_slice(&(partitions.len() as i32).to_be_bytes());
        for p in partitions.iter() {
            bytes.extend_from_slice(&p.to_be_bytes());
        }
    }
    // Empty user data
    bytes.extend_from_slice(&0i32.to_be_bytes());
    bytes
}

/// A [`MetricEmitter`], and the receiving end to collect what it emits.
pub fn emitter() -> (Arc<dyn MetricEmitter>, mpsc::UnboundedReceiver<MetricSample>) {
    let (sx, rx) = mpsc::unbounded_channel();
    (Arc::new(sx), rx)
}

/// Collects all the emitted samples: all the [`MetricEmitter`]s must have been dropped.
pub async fn collect(mut rx: mpsc::UnboundedReceiver<MetricSample>) -> ScrapeResult {
    let mut samples = Vec::new();
    while let Some(s) = rx.recv().await {
        samples.push(s);
    }
    ScrapeResult::from(samples)
}
