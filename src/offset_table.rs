use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::kafka_types::TopicPartition;

/// Latest (newest) offset of each Topic Partition, as observed during one scrape.
///
/// Written by the Topic workers, read by the Consumer Group analysis once every Topic
/// has been processed. A missing entry means the offset is unknown, never `0`.
///
/// Every access takes a single [`Mutex`], held only for the duration of the map
/// operation: no `await` nor callback ever happens while holding it.
#[derive(Debug, Default)]
pub struct OffsetTable {
    offsets: Mutex<HashMap<String, HashMap<u32, i64>>>,
}

impl OffsetTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the current `offset` of `topic`/`partition`.
    pub fn set(&self, topic: &str, partition: u32, offset: i64) {
        let mut guard = self.lock();
        match guard.get_mut(topic) {
            Some(partitions) => {
                partitions.insert(partition, offset);
            },
            None => {
                guard.insert(topic.to_string(), HashMap::from([(partition, offset)]));
            },
        }
    }

    /// Current offset of `topic`/`partition`, if it was recorded.
    pub fn get(&self, topic: &str, partition: u32) -> Option<i64> {
        self.lock().get(topic).and_then(|partitions| partitions.get(&partition).copied())
    }

    /// Every [`TopicPartition`] with a recorded offset, sorted.
    pub fn topic_partitions(&self) -> Vec<TopicPartition> {
        let mut tps = self
            .lock()
            .iter()
            .flat_map(|(t, partitions)| partitions.keys().map(|p| TopicPartition::new(t.clone(), *p)))
            .collect::<Vec<TopicPartition>>();
        tps.sort();
        tps
    }

    /// Amount of Topic Partitions with a recorded offset.
    pub fn len(&self) -> usize {
        self.lock().values().map(HashMap::len).sum()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, HashMap<u32, i64>>> {
        // Writers never leave the map half-updated, so a poisoned lock is still usable
        self.offsets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
