use std::collections::HashSet;

use konsumer_offsets::{ConsumerProtocolAssignment, KonsumerOffsetsError};
use rdkafka::groups::{GroupInfo, GroupMemberInfo};

use crate::kafka_types::TopicPartition;

/// Offset returned by the cluster when a Group has never committed for a Topic Partition.
pub const NO_COMMITTED_OFFSET: i64 = -1;

/// Consumer Group Member
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Member {
    /// Identifier
    pub id: String,
}

/// Consumer Group Member, paired with the (still encoded) assignment the Group Coordinator gave it
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupMember {
    /// The [`Member`] itself
    pub member: Member,

    /// Bytes of the `ConsumerProtocolAssignment`, if the Member has one
    pub assignment: Option<Vec<u8>>,
}

impl GroupMember {
    /// Decodes the assignment of this Member into the set of [`TopicPartition`] it consumes.
    ///
    /// A Member without assignment is assigned nothing.
    pub fn assigned_topic_partitions(&self) -> Result<HashSet<TopicPartition>, KonsumerOffsetsError> {
        let Some(assignment_bytes) = self.assignment.as_deref() else {
            return Ok(HashSet::new());
        };

        let cpa = ConsumerProtocolAssignment::try_from(assignment_bytes)?;
        Ok(cpa
            .assigned_topic_partitions
            .into_iter()
            .flat_map(|tps| {
                let topic = tps.topic;
                tps.partitions
                    .into_iter()
                    .filter_map(move |p| u32::try_from(p).ok().map(|p| TopicPartition::new(topic.clone(), p)))
            })
            .collect())
    }
}

impl From<&GroupMemberInfo> for GroupMember {
    fn from(m: &GroupMemberInfo) -> Self {
        GroupMember {
            member: Member {
                id: m.id().to_string(),
            },
            assignment: m.assignment().map(<[u8]>::to_vec),
        }
    }
}

/// Consumer Group
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Group {
    /// Group name
    pub name: String,
}

/// Consumer Group, as described by its Group Coordinator, paired with its live Members
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupDescription {
    pub group: Group,
    pub members: Vec<GroupMember>,
}

impl From<&GroupInfo> for GroupDescription {
    fn from(g: &GroupInfo) -> Self {
        GroupDescription {
            group: Group {
                name: g.name().to_string(),
            },
            members: g.members().iter().map(GroupMember::from).collect(),
        }
    }
}

/// Offset committed by a Consumer Group for a [`TopicPartition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedOffset {
    pub topic_partition: TopicPartition,

    /// Committed offset, or [`NO_COMMITTED_OFFSET`]
    pub offset: i64,

    /// Set when the cluster reported an error for this specific [`TopicPartition`]
    pub error: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::encode_assignment;

    #[test]
    fn should_decode_assignment() {
        let gm = GroupMember {
            member: Member::default(),
            assignment: Some(encode_assignment(&[("t1", &[0, 2]), ("t2", &[1])])),
        };

        let tps = gm.assigned_topic_partitions().unwrap();
        assert_eq!(tps.len(), 3);
        assert!(tps.contains(&TopicPartition::new("t1".into(), 0)));
        assert!(tps.contains(&TopicPartition::new("t1".into(), 2)));
        assert!(tps.contains(&TopicPartition::new("t2".into(), 1)));
    }

    #[test]
    fn should_assign_nothing_without_assignment() {
        let gm = GroupMember::default();
        assert!(gm.assigned_topic_partitions().unwrap().is_empty());
    }

    #[test]
    fn should_fail_on_malformed_assignment() {
        let gm = GroupMember {
            member: Member::default(),
            assignment: Some(vec![0xFF]),
        };
        assert!(gm.assigned_topic_partitions().is_err());
    }
}
