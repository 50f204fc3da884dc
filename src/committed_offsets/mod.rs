// Inner modules
mod emitter;
mod register;

use std::sync::Arc;

use async_trait::async_trait;
use prometheus::Registry;
use rdkafka::ClientConfig;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::internals::{Emitter, Register};

pub use emitter::{CommittedOffsetUpdate, CommittedOffsetsEmitter};
pub use register::CommittedOffsetsRegister;

/// Source of Consumer Group committed offsets, alternative to asking the Group Coordinators.
#[async_trait]
pub trait AlternateLagSource: Send + Sync {
    /// Committed offset of every Consumer Group known to consume `topic`/`partition`, as `(group, offset)`.
    async fn committed_offsets(&self, topic: &str, partition: u32) -> Vec<(String, i64)>;
}

/// Starts consuming the `__consumer_offsets` internal topic in the background.
///
/// The returned [`CommittedOffsetsRegister`] is kept up to date until `shutdown_token` is cancelled.
pub fn init(
    client_config: ClientConfig,
    shutdown_token: CancellationToken,
    metrics: Arc<Registry>,
) -> (CommittedOffsetsRegister, JoinHandle<()>) {
    let co_emitter = CommittedOffsetsEmitter::new(client_config, metrics);
    let (co_rx, co_join) = co_emitter.spawn(shutdown_token);
    let co_reg = CommittedOffsetsRegister::new(co_rx);

    debug!("Initialized");
    (co_reg, co_join)
}
