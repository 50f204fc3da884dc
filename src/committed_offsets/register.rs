use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};

use super::{AlternateLagSource, CommittedOffsetUpdate};
use crate::internals::Register;
use crate::kafka_types::TopicPartition;

type CommittedByGroup = HashMap<String, i64>;

/// Holds the latest committed offset of every Consumer Group, for every [`TopicPartition`] it consumes.
///
/// Kept up to date by consuming the [`CommittedOffsetUpdate`] it receives.
#[derive(Debug, Clone, Default)]
pub struct CommittedOffsetsRegister {
    committed: Arc<RwLock<HashMap<TopicPartition, CommittedByGroup>>>,
}

impl Register for CommittedOffsetsRegister {
    type Registered = CommittedOffsetUpdate;

    fn new(mut rx: mpsc::Receiver<Self::Registered>) -> Self {
        let co_reg = Self::default();

        let committed = co_reg.committed.clone();
        tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                trace!("Registering {update:?}");
                apply(&mut *committed.write().await, update);
            }
            info!("Emitter stopped: breaking (internal) loop");
        });

        co_reg
    }
}

fn apply(committed: &mut HashMap<TopicPartition, CommittedByGroup>, update: CommittedOffsetUpdate) {
    match update {
        CommittedOffsetUpdate::Commit {
            group,
            topic_partition,
            offset,
        } => {
            committed.entry(topic_partition).or_default().insert(group, offset);
        },
        CommittedOffsetUpdate::Forget {
            group,
            topic_partition,
        } => {
            if let Some(by_group) = committed.get_mut(&topic_partition) {
                by_group.remove(&group);
                if by_group.is_empty() {
                    committed.remove(&topic_partition);
                }
            }
        },
        CommittedOffsetUpdate::ForgetGroup(group) => {
            committed.retain(|_, by_group| {
                by_group.remove(&group);
                !by_group.is_empty()
            });
        },
    }
}

#[async_trait]
impl AlternateLagSource for CommittedOffsetsRegister {
    async fn committed_offsets(&self, topic: &str, partition: u32) -> Vec<(String, i64)> {
        let tp = TopicPartition::new(topic.to_string(), partition);

        let mut offsets = self
            .committed
            .read()
            .await
            .get(&tp)
            .map(|by_group| by_group.iter().map(|(g, o)| (g.clone(), *o)).collect::<Vec<(String, i64)>>())
            .unwrap_or_default();
        offsets.sort();
        offsets
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn commit(group: &str, topic: &str, partition: u32, offset: i64) -> CommittedOffsetUpdate {
        CommittedOffsetUpdate::Commit {
            group: group.to_string(),
            topic_partition: TopicPartition::new(topic.to_string(), partition),
            offset,
        }
    }

    async fn register_all(updates: Vec<CommittedOffsetUpdate>) -> CommittedOffsetsRegister {
        let (sx, rx) = mpsc::channel(updates.len().max(1));
        let co_reg = CommittedOffsetsRegister::new(rx);
        for u in updates {
            sx.send(u).await.unwrap();
        }

        // Wait for the register to consume everything
        drop(sx);
        while !drained(&co_reg).await {
            tokio::task::yield_now().await;
        }
        co_reg
    }

    async fn drained(co_reg: &CommittedOffsetsRegister) -> bool {
        // The register task releases its reference to the map once it consumed everything
        Arc::strong_count(&co_reg.committed) == 1
    }

    #[tokio::test]
    async fn should_keep_latest_commit_per_group() {
        let co_reg = register_all(vec![
            commit("g1", "t", 0, 5),
            commit("g2", "t", 0, 3),
            commit("g1", "t", 0, 8),
            commit("g1", "t", 1, 1),
        ])
        .await;

        assert_eq!(co_reg.committed_offsets("t", 0).await, vec![("g1".to_string(), 8), ("g2".to_string(), 3)]);
        assert_eq!(co_reg.committed_offsets("t", 1).await, vec![("g1".to_string(), 1)]);
        assert!(co_reg.committed_offsets("t", 2).await.is_empty());
    }

    #[tokio::test]
    async fn should_forget_tombstoned_commits() {
        let co_reg = register_all(vec![
            commit("g1", "t", 0, 5),
            commit("g2", "t", 0, 3),
            CommittedOffsetUpdate::Forget {
                group: "g1".to_string(),
                topic_partition: TopicPartition::new("t".to_string(), 0),
            },
        ])
        .await;

        assert_eq!(co_reg.committed_offsets("t", 0).await, vec![("g2".to_string(), 3)]);
    }

    #[tokio::test]
    async fn should_forget_removed_groups() {
        let co_reg = register_all(vec![
            commit("g1", "t", 0, 5),
            commit("g1", "u", 0, 6),
            commit("g2", "t", 0, 3),
            CommittedOffsetUpdate::ForgetGroup("g1".to_string()),
        ])
        .await;

        assert_eq!(co_reg.committed_offsets("t", 0).await, vec![("g2".to_string(), 3)]);
        assert!(co_reg.committed_offsets("u", 0).await.is_empty());
        assert_eq!(co_reg.committed.read().await.len(), 1);
    }
}
