use std::sync::Arc;

use konsumer_offsets::KonsumerOffsetsData;
use prometheus::{register_int_gauge_with_registry, IntGauge, Registry};
use rdkafka::{
    consumer::{Consumer, StreamConsumer},
    ClientConfig, Message,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::constants::{KONSUMER_OFFSETS_DATA_TOPIC, KONSUMER_OFFSETS_KCL_CONSUMER};
use crate::internals::Emitter;
use crate::kafka_types::TopicPartition;

const CHANNEL_SIZE: usize = 10_000;

const MET_CH_CAP_NAME: &str = "committed_offsets_emitter_channel_capacity";
const MET_CH_CAP_HELP: &str =
    "Capacity of internal channel used to send committed offsets updates to rest of the service";

/// Change to the committed offsets, as recorded in the `__consumer_offsets` internal topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommittedOffsetUpdate {
    /// `group` committed `offset` for `topic_partition`.
    Commit {
        group: String,
        topic_partition: TopicPartition,
        offset: i64,
    },

    /// The committed offset of `group` for `topic_partition` expired or was deleted.
    Forget {
        group: String,
        topic_partition: TopicPartition,
    },

    /// The whole `group` was removed.
    ForgetGroup(String),
}

impl CommittedOffsetUpdate {
    /// Interprets a record of `__consumer_offsets`.
    ///
    /// Returns `None` for records that don't change any committed offset.
    fn from_konsumer_offsets_data(kod: KonsumerOffsetsData) -> Option<Self> {
        match kod {
            KonsumerOffsetsData::OffsetCommit(oc) => {
                let partition = u32::try_from(oc.partition).ok()?;
                let topic_partition = TopicPartition::new(oc.topic, partition);

                if oc.is_tombstone {
                    Some(Self::Forget {
                        group: oc.group,
                        topic_partition,
                    })
                } else {
                    Some(Self::Commit {
                        group: oc.group,
                        topic_partition,
                        offset: oc.offset,
                    })
                }
            },
            KonsumerOffsetsData::GroupMetadata(gm) if gm.is_tombstone => Some(Self::ForgetGroup(gm.group)),
            KonsumerOffsetsData::GroupMetadata(_) => None,
        }
    }
}

/// Emits [`CommittedOffsetUpdate`] via a provided [`mpsc::channel`].
///
/// It wraps a Kafka Consumer, consumes the `__consumer_offsets` topic from the beginning,
/// and emits its records parsed into [`CommittedOffsetUpdate`].
///
/// It shuts down when the provided [`CancellationToken`] is cancelled.
pub struct CommittedOffsetsEmitter {
    consumer_client_config: ClientConfig,

    // Prometheus Metrics
    metric_ch_cap: IntGauge,
}

impl CommittedOffsetsEmitter {
    /// Create a new [`CommittedOffsetsEmitter`]
    ///
    /// # Arguments
    ///
    /// * `client_config` - Kafka client configuration, used to consume `__consumer_offsets`
    /// * `metrics` - Registry to register the internal metrics with
    pub fn new(client_config: ClientConfig, metrics: Arc<Registry>) -> Self {
        Self {
            consumer_client_config: client_config,
            metric_ch_cap: register_int_gauge_with_registry!(MET_CH_CAP_NAME, MET_CH_CAP_HELP, metrics)
                .unwrap_or_else(|e| panic!("Failed to create metric '{MET_CH_CAP_NAME}': {e}")),
        }
    }

    fn set_kafka_config(mut client_config: ClientConfig) -> ClientConfig {
        // State is rebuilt from the whole topic at every start
        client_config.set("enable.auto.commit", "false");
        client_config.set("auto.offset.reset", "earliest");
        client_config.set("group.id", KONSUMER_OFFSETS_KCL_CONSUMER);

        client_config
    }
}

impl Emitter for CommittedOffsetsEmitter {
    type Emitted = CommittedOffsetUpdate;

    /// Spawn a new async task to consume `__consumer_offsets`.
    ///
    /// # Arguments
    ///
    /// * `shutdown_token`: A [`CancellationToken`] that, when cancelled, will make the internal loop terminate.
    fn spawn(&self, shutdown_token: CancellationToken) -> (mpsc::Receiver<Self::Emitted>, JoinHandle<()>) {
        let config = Self::set_kafka_config(self.consumer_client_config.clone());

        let consumer_client: StreamConsumer =
            config.create().unwrap_or_else(|e| panic!("Failed to create Consumer Client: {e}"));

        consumer_client
            .subscribe(&[KONSUMER_OFFSETS_DATA_TOPIC])
            .unwrap_or_else(|e| panic!("Failed to subscribe to '{KONSUMER_OFFSETS_DATA_TOPIC}': {e}"));

        let (sx, rx) = mpsc::channel::<Self::Emitted>(CHANNEL_SIZE);

        let metric_ch_cap = self.metric_ch_cap.clone();

        let join_handle = tokio::spawn(async move {
            loop {
                let kod = tokio::select! {
                    r_msg = consumer_client.recv() => match r_msg {
                        Ok(m) => match KonsumerOffsetsData::try_from_bytes(m.key(), m.payload()) {
                            Ok(kod) => kod,
                            Err(e) => {
                                warn!("Failed to parse record from '{KONSUMER_OFFSETS_DATA_TOPIC}': {e}");
                                continue;
                            },
                        },
                        Err(e) => {
                            error!("Failed to consume from '{KONSUMER_OFFSETS_DATA_TOPIC}': {e}");
                            continue;
                        },
                    },
                    _ = shutdown_token.cancelled() => {
                        info!("Shutting down");
                        break;
                    },
                };

                let Some(update) = CommittedOffsetUpdate::from_konsumer_offsets_data(kod) else {
                    continue;
                };

                let ch_cap = sx.capacity();
                if ch_cap == 0 {
                    warn!("Emitting channel saturated: receiver too slow?");
                }
                metric_ch_cap.set(ch_cap as i64);

                if let Err(e) = sx.send(update).await {
                    error!("Failed to emit {}: {e}", std::any::type_name::<CommittedOffsetUpdate>());
                    break;
                }
            }
        });

        (rx, join_handle)
    }
}
