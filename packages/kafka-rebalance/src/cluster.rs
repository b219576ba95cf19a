//! The Kafka view of the cluster: brokers, disks, and partition replicas.
//!
//! The generic planner works on an opaque [`Placement`] of nodes and items.
//! This module keeps the Kafka meaning of those ids in side tables indexed
//! by [`NodeId::index`] / [`ItemId::index`]: each node is a disk on a
//! broker, each item a partition replica. The side tables also implement
//! [`PlacementConstraint`], adding the two Kafka rules on top of the
//! generic capacity check: leader replicas never move, and no broker may
//! end up with two replicas of one partition.

use std::collections::BTreeMap;

use rebalance_core::{ItemId, NodeId, Placement, PlacementConstraint};

/// Kafka broker id as reported by the metadata API.
pub type BrokerId = i32;

/// Current assignment of one partition: its leader and ordered replica
/// broker list. Keyed by `(topic, partition)`; the `BTreeMap` keeps
/// iteration deterministic so planning is reproducible run to run.
pub type PartitionMap = BTreeMap<(String, i32), PartitionAssignment>;

/// Leader and replica brokers of a partition, as currently assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionAssignment {
    pub leader: BrokerId,
    pub replicas: Vec<BrokerId>,
}

/// A broker process hosting one or more data disks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerInfo {
    pub id: BrokerId,
    pub host: String,
    pub port: i32,
}

/// A data disk on a broker. `mount_point` always carries a trailing `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskInfo {
    /// Index into [`ClusterLayout::brokers`].
    pub broker: usize,
    pub mount_point: String,
}

/// The Kafka identity of an item: one on-disk replica of a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaInfo {
    pub topic: String,
    pub partition: i32,
    /// Position of the hosting broker in the partition's replica list.
    pub replica_index: usize,
    pub is_leader: bool,
}

/// One planner decision translated back into Kafka terms, ready for the
/// reassignment document builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMove {
    pub topic: String,
    pub partition: i32,
    pub replica_index: usize,
    pub target_broker: BrokerId,
    /// Destination mount point, trailing `/` included.
    pub target_log_dir: String,
}

// ---------------------------------------------------------------------------
// ClusterLayout
// ---------------------------------------------------------------------------

/// Side tables mapping placement ids back to brokers, disks, and replicas.
///
/// Holds no reference to the [`Placement`] itself, so the planner can
/// mutate the placement while borrowing the layout as its constraint.
#[derive(Debug, Clone, Default)]
pub struct ClusterLayout {
    brokers: Vec<BrokerInfo>,
    disks: Vec<DiskInfo>,
    replicas: Vec<ReplicaInfo>,
    broker_disks: Vec<Vec<NodeId>>,
}

impl ClusterLayout {
    #[must_use]
    pub fn brokers(&self) -> &[BrokerInfo] {
        &self.brokers
    }

    #[must_use]
    pub fn disk(&self, node: NodeId) -> &DiskInfo {
        &self.disks[node.index()]
    }

    #[must_use]
    pub fn replica(&self, item: ItemId) -> &ReplicaInfo {
        &self.replicas[item.index()]
    }

    /// The broker hosting the given disk.
    #[must_use]
    pub fn broker_of(&self, node: NodeId) -> &BrokerInfo {
        &self.brokers[self.disks[node.index()].broker]
    }

    /// Does any disk of `broker` hold a replica of `(topic, partition)`,
    /// in either the initial or the planned placement?
    ///
    /// Both views are consulted: a replica already scheduled to arrive on
    /// the broker blocks further replicas of the same partition just as a
    /// resident one does.
    #[must_use]
    pub fn broker_hosts_partition(
        &self,
        placement: &Placement,
        broker: usize,
        topic: &str,
        partition: i32,
    ) -> bool {
        self.broker_disks[broker].iter().any(|&disk| {
            let node = placement.node(disk);
            node.initial_items()
                .iter()
                .chain(node.planned_items())
                .any(|&item| {
                    let replica = &self.replicas[item.index()];
                    replica.topic == topic && replica.partition == partition
                })
        })
    }
}

impl PlacementConstraint for ClusterLayout {
    fn admits(&self, placement: &Placement, item: ItemId, dest: NodeId) -> bool {
        let replica = &self.replicas[item.index()];
        // Leaders keep serving writes; don't move them.
        if replica.is_leader {
            return false;
        }
        let dest_broker = self.disks[dest.index()].broker;
        let origin_broker = self.disks[placement.item(item).initial_owner().index()].broker;
        if dest_broker != origin_broker
            && self.broker_hosts_partition(placement, dest_broker, &replica.topic, replica.partition)
        {
            return false;
        }
        true
    }
}

// ---------------------------------------------------------------------------
// ClusterInventory
// ---------------------------------------------------------------------------

/// Everything the planner and the document builder need: the placement
/// arena, the Kafka side tables, and the current partition assignments.
#[derive(Debug, Clone, Default)]
pub struct ClusterInventory {
    pub placement: Placement,
    pub layout: ClusterLayout,
    pub partitions: PartitionMap,
}

impl ClusterInventory {
    #[must_use]
    pub fn new(partitions: PartitionMap) -> Self {
        Self {
            placement: Placement::new(),
            layout: ClusterLayout::default(),
            partitions,
        }
    }

    /// Registers a broker; returns its index for [`Self::add_disk`].
    pub fn add_broker(&mut self, id: BrokerId, host: impl Into<String>, port: i32) -> usize {
        self.layout.brokers.push(BrokerInfo {
            id,
            host: host.into(),
            port,
        });
        self.layout.broker_disks.push(Vec::new());
        self.layout.brokers.len() - 1
    }

    /// Registers a disk on `broker`, normalizing the mount point to a
    /// trailing `/`.
    pub fn add_disk(&mut self, broker: usize, mount_point: &str, capacity: u64) -> NodeId {
        let node = self.placement.add_node(capacity);
        let mount_point = if mount_point.ends_with('/') {
            mount_point.to_string()
        } else {
            format!("{mount_point}/")
        };
        self.layout.disks.push(DiskInfo {
            broker,
            mount_point,
        });
        self.layout.broker_disks[broker].push(node);
        node
    }

    /// Registers a replica directory found on `disk`.
    pub fn add_replica(
        &mut self,
        disk: NodeId,
        topic: impl Into<String>,
        partition: i32,
        replica_index: usize,
        is_leader: bool,
        size: u64,
    ) -> ItemId {
        let item = self.placement.add_item(disk, size);
        self.layout.replicas.push(ReplicaInfo {
            topic: topic.into(),
            partition,
            replica_index,
            is_leader,
        });
        item
    }

    /// Translates a planner decision back into Kafka terms.
    ///
    /// # Panics
    ///
    /// Panics if the planner did not actually move `item`.
    #[must_use]
    pub fn describe_move(&self, item: ItemId) -> PlannedMove {
        let dest = self
            .placement
            .item(item)
            .planned_owner()
            .expect("describe_move called for an item the planner did not move");
        let replica = &self.layout.replicas[item.index()];
        let disk = &self.layout.disks[dest.index()];
        PlannedMove {
            topic: replica.topic.clone(),
            partition: replica.partition,
            replica_index: replica.replica_index,
            target_broker: self.layout.brokers[disk.broker].id,
            target_log_dir: disk.mount_point.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use rebalance_core::{plan, PlanSettings};

    use super::*;

    fn partition_map(entries: &[(&str, i32, BrokerId, &[BrokerId])]) -> PartitionMap {
        entries
            .iter()
            .map(|&(topic, partition, leader, replicas)| {
                (
                    (topic.to_string(), partition),
                    PartitionAssignment {
                        leader,
                        replicas: replicas.to_vec(),
                    },
                )
            })
            .collect()
    }

    fn move_settings(max_iters: usize, node_pct: f64) -> PlanSettings {
        PlanSettings::from_percentages(max_iters, node_pct, None, false)
            .expect("valid percentages")
    }

    // -- leader pinning --

    #[test]
    fn leader_replicas_never_move() {
        let mut inv = ClusterInventory::new(partition_map(&[("t", 0, 1, &[1, 2])]));
        let b1 = inv.add_broker(1, "a.example", 9092);
        let b2 = inv.add_broker(2, "b.example", 9092);
        let d1 = inv.add_disk(b1, "/kafka/0", 100);
        let _d2 = inv.add_disk(b2, "/kafka/0", 100);
        inv.add_replica(d1, "t", 0, 0, true, 50);

        let moves = plan(&mut inv.placement, &move_settings(5, 5.0), &inv.layout)
            .expect("plan");
        assert!(moves.is_empty());
    }

    // -- broker uniqueness --

    /// Broker 1 has disks A1, A2; broker 2 has B1, B2. Partition (t, 0)
    /// has replicas on A1 and B1, and A1 is overloaded while B2 sits
    /// emptiest. The preferred destination B2 is vetoed (broker 2 already
    /// hosts the partition on B1), so the replica lands on A2 instead.
    #[test]
    fn duplicate_broker_destination_is_vetoed() {
        let mut inv = ClusterInventory::new(partition_map(&[
            ("t", 0, 9, &[1, 2]),
            ("x", 0, 1, &[1]),
        ]));
        let broker1 = inv.add_broker(1, "a.example", 9092);
        let broker2 = inv.add_broker(2, "b.example", 9092);
        let a1 = inv.add_disk(broker1, "/kafka/0", 100);
        let a2 = inv.add_disk(broker1, "/kafka/1", 100);
        let b1 = inv.add_disk(broker2, "/kafka/0", 100);
        let b2 = inv.add_disk(broker2, "/kafka/1", 100);
        let moving = inv.add_replica(a1, "t", 0, 0, false, 40);
        // Leader ballast keeps A1 overloaded without being movable itself.
        inv.add_replica(a1, "x", 0, 0, true, 40);
        inv.add_replica(b1, "t", 0, 1, false, 40);
        inv.add_replica(a2, "u", 0, 0, false, 10);
        inv.add_replica(b2, "v", 0, 0, false, 5);
        inv.placement.begin_plan().expect("consistent placement");

        assert!(!inv.placement.can_move_to(moving, b2, &inv.layout));
        assert!(!inv.placement.can_move_to(moving, b1, &inv.layout));
        assert!(inv.placement.can_move_to(moving, a2, &inv.layout));

        let moves = plan(&mut inv.placement, &move_settings(1, 5.0), &inv.layout)
            .expect("plan");
        assert_eq!(moves, vec![moving]);
        assert_eq!(inv.placement.item(moving).planned_owner(), Some(a2));
    }

    #[test]
    fn planned_arrivals_also_block_a_broker() {
        let mut inv = ClusterInventory::new(partition_map(&[("t", 0, 9, &[1, 2, 3])]));
        let broker1 = inv.add_broker(1, "a.example", 9092);
        let broker2 = inv.add_broker(2, "b.example", 9092);
        let broker3 = inv.add_broker(3, "c.example", 9092);
        let a = inv.add_disk(broker1, "/kafka/0", 100);
        let b = inv.add_disk(broker2, "/kafka/0", 100);
        let c = inv.add_disk(broker3, "/kafka/0", 100);
        let first = inv.add_replica(a, "t", 0, 0, false, 40);
        let second = inv.add_replica(b, "t", 0, 1, false, 30);
        inv.placement.begin_plan().expect("consistent placement");

        // Relocate the first replica onto broker 3's disk; the second may
        // no longer follow it there.
        assert!(inv.placement.can_move_to(second, c, &inv.layout));
        inv.placement.move_item(first, c);
        assert!(!inv.placement.can_move_to(second, c, &inv.layout));
    }

    // -- describe_move --

    #[test]
    fn describe_move_reports_target_broker_and_dir() {
        let mut inv = ClusterInventory::new(partition_map(&[("t", 3, 1, &[1, 2])]));
        let b1 = inv.add_broker(1, "a.example", 9092);
        let b2 = inv.add_broker(2, "b.example", 9092);
        let d1 = inv.add_disk(b1, "/kafka/0", 100);
        let d2 = inv.add_disk(b2, "/kafka/5", 100);
        let item = inv.add_replica(d1, "t", 3, 0, false, 60);
        inv.placement.begin_plan().expect("consistent placement");
        inv.placement.move_item(item, d2);

        let planned = inv.describe_move(item);
        assert_eq!(
            planned,
            PlannedMove {
                topic: "t".to_string(),
                partition: 3,
                replica_index: 0,
                target_broker: 2,
                target_log_dir: "/kafka/5/".to_string(),
            }
        );
    }

    #[test]
    fn same_broker_disk_move_is_admitted() {
        let mut inv = ClusterInventory::new(partition_map(&[("t", 0, 9, &[1])]));
        let broker1 = inv.add_broker(1, "a.example", 9092);
        let d0 = inv.add_disk(broker1, "/kafka/0", 100);
        let d1 = inv.add_disk(broker1, "/kafka/1", 100);
        let item = inv.add_replica(d0, "t", 0, 0, false, 60);
        inv.placement.begin_plan().expect("consistent placement");
        // The partition already "exists" on broker 1, but a move between
        // the broker's own disks never duplicates it.
        assert!(inv.placement.can_move_to(item, d1, &inv.layout));
    }
}
