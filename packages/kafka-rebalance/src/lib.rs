//! Kafka disk-rebalance tool.
//!
//! Collects the live placement of partition replicas across broker disks,
//! plans a bounded set of relocations with the generic planner from
//! `rebalance-core`, and turns the plan into the JSON document consumed by
//! `kafka-reassign-partitions.sh`.
//!
//! - **Cluster** ([`cluster`]): brokers, disks, replicas, and the Kafka
//!   feasibility rules (leader pinning, one replica per broker)
//! - **Inventory** ([`inventory`]): metadata from the Kafka admin API plus
//!   `df`/`du` over SSH
//! - **Assignment** ([`assignment`]): reassignment document builder with
//!   the duplicate-broker anti-collision pass
//! - **Executor** ([`executor`]): submits the document on a working broker
//!   and polls `--verify` until completion
//! - **Ssh** ([`ssh`]): minimal remote command adapter

pub mod assignment;
pub mod cluster;
pub mod executor;
pub mod inventory;
pub mod ssh;

pub use assignment::{build_reassignment, AssignmentError, PartitionReassignment, ReassignmentDocument};
pub use cluster::{
    BrokerId, BrokerInfo, ClusterInventory, ClusterLayout, DiskInfo, PartitionAssignment,
    PartitionMap, PlannedMove, ReplicaInfo,
};
pub use executor::{execute, ExecError, Throttle};
pub use inventory::{collect, InventoryError};
pub use ssh::{quote, SshClient, SshError};
