use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::cluster::ClusterClient;
use crate::kafka_types::{Broker, CommittedOffset, GroupDescription, TopicPartition, NO_COMMITTED_OFFSET};
use crate::metrics::{Metric, MetricEmitter, MetricSample};
use crate::name_filter::NameFilter;
use crate::offset_table::OffsetTable;

/// Emits the Consumer Group metrics, asking every Broker about the Groups it coordinates.
///
/// Lag is computed joining the committed offsets of each Group with the [`OffsetTable`]
/// populated by [`crate::topic_metrics::TopicMetricsScheduler`] earlier in the same scrape.
#[derive(Clone)]
pub struct ConsumerGroupAggregator {
    client: Arc<dyn ClusterClient>,
    filter: NameFilter,
    fetch_all: bool,
}

impl ConsumerGroupAggregator {
    /// Create a new [`ConsumerGroupAggregator`].
    ///
    /// # Arguments
    ///
    /// * `client` - Used to list and describe Groups, and to fetch their committed offsets
    /// * `filter` - Groups not accepted by it are never described
    /// * `fetch_all` - If `true`, committed offsets are requested for every Topic Partition in the [`OffsetTable`],
    ///   otherwise only for the ones assigned to the live Members of the Group
    pub fn new(client: Arc<dyn ClusterClient>, filter: NameFilter, fetch_all: bool) -> Self {
        Self {
            client,
            filter,
            fetch_all,
        }
    }

    /// Processes every Broker concurrently, and returns once all of them have been processed.
    ///
    /// Groups are listed once, then each Broker describes the Groups it coordinates.
    pub async fn run(&self, brokers: Vec<Broker>, offsets: Arc<OffsetTable>, emitter: Arc<dyn MetricEmitter>) {
        let mut groups_by_broker = match self.client.list_groups().await {
            Ok(groups_by_broker) => groups_by_broker,
            Err(e) => {
                error!("Cannot list consumer groups: {e}");
                return;
            },
        };

        let mut tasks = JoinSet::new();
        for broker in brokers {
            let groups = groups_by_broker.remove(&broker.id).unwrap_or_default();
            let aggregator = self.clone();
            let offsets = offsets.clone();
            let emitter = emitter.clone();

            tasks.spawn(async move {
                aggregator.process_broker(&broker, groups, &offsets, emitter.as_ref()).await;
            });
        }

        for (broker_id, groups) in groups_by_broker {
            warn!("Coordinator {broker_id} of {} consumer groups is not a known broker", groups.len());
        }

        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                error!("Consumer group task failed: {e}");
            }
        }
    }

    async fn process_broker(
        &self,
        broker: &Broker,
        groups: Vec<String>,
        offsets: &OffsetTable,
        emitter: &dyn MetricEmitter,
    ) {
        let groups = groups
            .into_iter()
            .filter(|g| {
                let accepted = self.filter.accepts(g);
                if !accepted {
                    trace!("Group '{g}' filtered out");
                }
                accepted
            })
            .collect::<Vec<String>>();
        if groups.is_empty() {
            trace!("No consumer groups to describe on broker {}", broker.id);
            return;
        }

        let descriptions = match self.client.describe_groups(broker, &groups).await {
            Ok(descriptions) => descriptions,
            Err(e) => {
                error!("Cannot describe consumer groups of broker {}: {e}", broker.id);
                return;
            },
        };
        debug!("Broker {} described {} consumer groups", broker.id, descriptions.len());

        for gd in descriptions {
            self.process_group(broker, gd, offsets, emitter).await;
        }
    }

    async fn process_group(
        &self,
        broker: &Broker,
        gd: GroupDescription,
        offsets: &OffsetTable,
        emitter: &dyn MetricEmitter,
    ) {
        let group = gd.group.name.as_str();

        emitter.emit(MetricSample::new(
            Metric::ConsumerGroupMembers,
            vec![group.to_string()],
            gd.members.len() as i64,
        ));

        let requested = if self.fetch_all {
            offsets.topic_partitions()
        } else {
            assigned_topic_partitions(&gd)
        };
        if requested.is_empty() {
            debug!("No topic partitions to fetch committed offsets for, for group '{group}'");
            return;
        }

        let committed = match self.client.fetch_committed_offsets(broker, group, &requested).await {
            Ok(committed) => committed,
            Err(e) => {
                error!("Cannot get committed offsets of group '{group}': {e}");
                return;
            },
        };

        for (topic, mut partitions) in by_topic(group, committed) {
            // Topics the Group never committed to are not consumed by it
            if partitions.iter().all(|co| co.offset == NO_COMMITTED_OFFSET) {
                trace!("Topic '{topic}' not consumed by group '{group}'");
                continue;
            }
            partitions.sort_by_key(|co| co.topic_partition.partition);

            let mut offset_sum = 0;
            let mut lag_sum = 0;
            for co in partitions {
                let label_values = vec![group.to_string(), topic.clone(), co.topic_partition.partition.to_string()];

                emitter.emit(MetricSample::new(Metric::ConsumerGroupCurrentOffset, label_values.clone(), co.offset));

                if co.offset == NO_COMMITTED_OFFSET {
                    emitter.emit(MetricSample::new(Metric::ConsumerGroupLag, label_values, NO_COMMITTED_OFFSET));
                    continue;
                }
                offset_sum += co.offset;

                match offsets.get(&topic, co.topic_partition.partition) {
                    Some(current_offset) => {
                        let lag = current_offset - co.offset;
                        lag_sum += lag;
                        emitter.emit(MetricSample::new(Metric::ConsumerGroupLag, label_values, lag));
                    },
                    None => {
                        warn!("No current offset of {}, cannot compute lag of group '{group}'", co.topic_partition);
                    },
                }
            }

            let label_values = vec![group.to_string(), topic];
            emitter.emit(MetricSample::new(Metric::ConsumerGroupCurrentOffsetSum, label_values.clone(), offset_sum));
            emitter.emit(MetricSample::new(Metric::ConsumerGroupLagSum, label_values, lag_sum));
        }
    }
}

/// Every [`TopicPartition`] assigned to the live Members of the Group, sorted.
///
/// Members whose assignment cannot be decoded are skipped.
fn assigned_topic_partitions(gd: &GroupDescription) -> Vec<TopicPartition> {
    let mut tps = BTreeSet::new();
    for gm in &gd.members {
        match gm.assigned_topic_partitions() {
            Ok(assigned) => tps.extend(assigned),
            Err(e) => {
                warn!("Cannot parse assignment of member '{}' of group '{}': {e}", gm.member.id, gd.group.name);
            },
        }
    }
    tps.into_iter().collect()
}

/// Groups the committed offsets by Topic, dropping the ones that came back with an error.
fn by_topic(group: &str, committed: Vec<CommittedOffset>) -> BTreeMap<String, Vec<CommittedOffset>> {
    let mut by_topic = BTreeMap::<String, Vec<CommittedOffset>>::new();
    for co in committed {
        if let Some(e) = &co.error {
            error!("Cannot get committed offset of group '{group}' for {}: {e}", co.topic_partition);
            continue;
        }
        by_topic.entry(co.topic_partition.topic.clone()).or_default().push(co);
    }
    by_topic
}

#[cfg(test)]
mod test {
    use std::sync::atomic::Ordering;

    use regex::Regex;

    use super::*;
    use crate::metrics::ScrapeResult;
    use crate::testing::{collect, emitter, encode_assignment, group, member, MockClusterClient};

    fn tp(topic: &str, partition: u32) -> TopicPartition {
        TopicPartition::new(topic.to_string(), partition)
    }

    /// Offsets the Topic phase would have recorded for "t" (2 partitions) and "u" (1 partition).
    fn offsets() -> Arc<OffsetTable> {
        let ot = OffsetTable::new();
        ot.set("t", 0, 10);
        ot.set("t", 1, 20);
        ot.set("u", 0, 30);
        Arc::new(ot)
    }

    async fn run(client: MockClusterClient, filter: NameFilter, fetch_all: bool) -> (Arc<MockClusterClient>, ScrapeResult) {
        let client = Arc::new(client);
        let brokers = client.brokers().await;
        let (em, rx) = emitter();

        ConsumerGroupAggregator::new(client.clone(), filter, fetch_all).run(brokers, offsets(), em).await;

        (client, collect(rx).await)
    }

    #[tokio::test]
    async fn should_compute_lag_against_current_offsets() {
        let client = MockClusterClient::new()
            .with_broker(1)
            .with_group(1, group("g", vec![member("m1", Some(encode_assignment(&[("t", &[0, 1])])))]))
            .with_committed("g", "t", 0, 7);

        let (_, res) = run(client, NameFilter::default(), false).await;

        assert_eq!(res.value(Metric::ConsumerGroupMembers, &["g"]), Some(1));
        assert_eq!(res.value(Metric::ConsumerGroupCurrentOffset, &["g", "t", "0"]), Some(7));
        assert_eq!(res.value(Metric::ConsumerGroupCurrentOffset, &["g", "t", "1"]), Some(-1));
        assert_eq!(res.value(Metric::ConsumerGroupLag, &["g", "t", "0"]), Some(3));
        assert_eq!(res.value(Metric::ConsumerGroupLag, &["g", "t", "1"]), Some(-1));
        assert_eq!(res.value(Metric::ConsumerGroupCurrentOffsetSum, &["g", "t"]), Some(7));
        assert_eq!(res.value(Metric::ConsumerGroupLagSum, &["g", "t"]), Some(3));
    }

    #[tokio::test]
    async fn should_request_only_assigned_partitions() {
        let client = MockClusterClient::new()
            .with_broker(1)
            .with_group(
                1,
                group(
                    "g",
                    vec![
                        member("m1", Some(encode_assignment(&[("t", &[1])]))),
                        member("m2", Some(encode_assignment(&[("u", &[0])]))),
                        member("m3", None),
                    ],
                ),
            )
            .with_committed("g", "t", 1, 15);

        let (client, res) = run(client, NameFilter::default(), false).await;

        let requests = client.fetch_requests.lock().unwrap().clone();
        assert_eq!(requests, vec![("g".to_string(), vec![tp("t", 1), tp("u", 0)])]);

        // "u" is assigned, but never committed to
        assert_eq!(res.value(Metric::ConsumerGroupMembers, &["g"]), Some(3));
        assert_eq!(res.value(Metric::ConsumerGroupLag, &["g", "t", "1"]), Some(5));
        assert!(res.of(Metric::ConsumerGroupLagSum).iter().all(|s| s.label_values[1] == "t"));
    }

    #[tokio::test]
    async fn should_request_every_known_partition_when_fetching_all() {
        let client = MockClusterClient::new()
            .with_broker(1)
            .with_group(1, group("g", vec![]))
            .with_committed("g", "u", 0, 25);

        let (client, res) = run(client, NameFilter::default(), true).await;

        let requests = client.fetch_requests.lock().unwrap().clone();
        assert_eq!(requests, vec![("g".to_string(), vec![tp("t", 0), tp("t", 1), tp("u", 0)])]);

        assert_eq!(res.value(Metric::ConsumerGroupMembers, &["g"]), Some(0));
        assert_eq!(res.value(Metric::ConsumerGroupLag, &["g", "u", "0"]), Some(5));
        assert!(res.of(Metric::ConsumerGroupCurrentOffset).iter().all(|s| s.label_values[1] == "u"));
    }

    #[tokio::test]
    async fn should_not_fetch_for_groups_without_assignments() {
        let client = MockClusterClient::new().with_broker(1).with_group(1, group("g", vec![member("m1", None)]));

        let (client, res) = run(client, NameFilter::default(), false).await;

        assert!(client.fetch_requests.lock().unwrap().is_empty());
        assert_eq!(res.value(Metric::ConsumerGroupMembers, &["g"]), Some(1));
        assert_eq!(res.len(), 1);
    }

    #[tokio::test]
    async fn should_skip_members_with_malformed_assignment() {
        let client = MockClusterClient::new()
            .with_broker(1)
            .with_group(
                1,
                group(
                    "g",
                    vec![member("m1", Some(vec![0xFF])), member("m2", Some(encode_assignment(&[("t", &[0])])))],
                ),
            )
            .with_committed("g", "t", 0, 9);

        let (client, res) = run(client, NameFilter::default(), false).await;

        let requests = client.fetch_requests.lock().unwrap().clone();
        assert_eq!(requests, vec![("g".to_string(), vec![tp("t", 0)])]);
        assert_eq!(res.value(Metric::ConsumerGroupLag, &["g", "t", "0"]), Some(1));
    }

    #[tokio::test]
    async fn should_not_compute_lag_without_current_offset() {
        let client = MockClusterClient::new()
            .with_broker(1)
            .with_group(1, group("g", vec![member("m1", Some(encode_assignment(&[("v", &[0])])))]))
            .with_committed("g", "v", 0, 4);

        let (_, res) = run(client, NameFilter::default(), false).await;

        assert_eq!(res.value(Metric::ConsumerGroupCurrentOffset, &["g", "v", "0"]), Some(4));
        assert_eq!(res.value(Metric::ConsumerGroupLag, &["g", "v", "0"]), None);
        assert_eq!(res.value(Metric::ConsumerGroupCurrentOffsetSum, &["g", "v"]), Some(4));
        assert_eq!(res.value(Metric::ConsumerGroupLagSum, &["g", "v"]), Some(0));
    }

    #[tokio::test]
    async fn should_keep_going_past_failing_brokers_and_groups() {
        let assigned = || Some(encode_assignment(&[("t", &[0])]));
        let client = MockClusterClient::new()
            .with_broker(1)
            .with_broker(2)
            .with_group(1, group("lost", vec![member("m1", assigned())]))
            .with_group(2, group("g1", vec![member("m1", assigned())]))
            .with_group(2, group("g2", vec![member("m1", assigned())]))
            .with_committed("g1", "t", 0, 1)
            .with_committed("g2", "t", 0, 2)
            .failing_broker(1)
            .failing_group("g1");

        let (_, res) = run(client, NameFilter::default(), false).await;

        assert_eq!(res.value(Metric::ConsumerGroupMembers, &["lost"]), None);
        assert_eq!(res.value(Metric::ConsumerGroupMembers, &["g1"]), Some(1));
        assert_eq!(res.value(Metric::ConsumerGroupLag, &["g1", "t", "0"]), None);
        assert_eq!(res.value(Metric::ConsumerGroupLag, &["g2", "t", "0"]), Some(8));
    }

    #[tokio::test]
    async fn should_list_groups_once_for_all_brokers() {
        let client = MockClusterClient::new()
            .with_broker(1)
            .with_broker(2)
            .with_broker(3)
            .with_group(1, group("g1", vec![]))
            .with_group(2, group("g2", vec![]))
            .with_group(9, group("orphan", vec![]));

        let (client, res) = run(client, NameFilter::default(), false).await;

        assert_eq!(client.list_groups_calls.load(Ordering::SeqCst), 1);
        assert_eq!(res.value(Metric::ConsumerGroupMembers, &["g1"]), Some(0));
        assert_eq!(res.value(Metric::ConsumerGroupMembers, &["g2"]), Some(0));
        assert_eq!(res.value(Metric::ConsumerGroupMembers, &["orphan"]), None);
    }

    #[tokio::test]
    async fn should_emit_nothing_when_groups_cannot_be_listed() {
        let client = MockClusterClient::new()
            .with_broker(1)
            .with_group(1, group("g", vec![]))
            .failing_groups_listing();

        let (client, res) = run(client, NameFilter::default(), true).await;

        assert_eq!(client.list_groups_calls.load(Ordering::SeqCst), 1);
        assert!(client.fetch_requests.lock().unwrap().is_empty());
        assert_eq!(res.len(), 0);
    }

    #[tokio::test]
    async fn should_never_describe_excluded_groups() {
        let client = MockClusterClient::new()
            .with_broker(1)
            .with_group(1, group("app-orders", vec![]))
            .with_group(1, group("app-orders-canary", vec![]))
            .with_group(1, group("other", vec![]));
        let filter = NameFilter::new(Regex::new("^app-").unwrap(), Regex::new("-canary$").unwrap());

        let (_, res) = run(client, filter, true).await;

        let groups = res
            .of(Metric::ConsumerGroupMembers)
            .iter()
            .map(|s| s.label_values[0].clone())
            .collect::<Vec<String>>();
        assert_eq!(groups, vec!["app-orders".to_string()]);
    }
}
