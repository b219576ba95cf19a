//! Inventory collection: what is where, and how big is it.
//!
//! Three sources feed the [`ClusterInventory`]:
//!
//! - the Kafka metadata API: brokers and, per partition, the leader and
//!   ordered replica broker list
//! - `df` on each broker: the data disk mounts matching the disk glob and
//!   their capacities
//! - `du` over each mount: per-replica-directory usage, directories named
//!   `{topic}-{partition}`
//!
//! `df` and `du` both report 1 KiB blocks, so capacities and sizes share a
//! unit throughout. Replica directories are matched by constructing the
//! `{topic}-{partition}` key from the known partition list, never by
//! parsing directory names.

use std::collections::HashMap;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use tracing::{info, warn};

use crate::cluster::{BrokerId, BrokerInfo, ClusterInventory, PartitionAssignment, PartitionMap};
use crate::ssh::{quote, SshClient, SshError};

const METADATA_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from assembling the cluster inventory.
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("kafka: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
    #[error("kafka metadata error for {scope}: {reason}")]
    Metadata { scope: String, reason: String },
    #[error("malformed df output line {line:?}")]
    MalformedDf { line: String },
    #[error("malformed du output line {line:?}")]
    MalformedDu { line: String },
    #[error("replica dir {dir:?} is not prefixed with mount point {mount:?}")]
    ForeignDir { dir: String, mount: String },
    #[error(transparent)]
    Ssh(#[from] SshError),
    #[error("metadata task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Collects brokers, disks, and replica directories into a
/// [`ClusterInventory`] ready for planning.
///
/// # Errors
///
/// [`InventoryError`] on metadata failures, unreachable brokers, or
/// unparseable `df`/`du` output. A replica directory on a broker missing
/// from its partition's replica list is a warning, not an error: the
/// directory is skipped and collection continues.
pub async fn collect(
    bootstrap_server: &str,
    disk_glob: &str,
    ssh_user: &str,
) -> Result<ClusterInventory, InventoryError> {
    info!(bootstrap = bootstrap_server, "fetching cluster metadata");
    let bootstrap = bootstrap_server.to_string();
    let (brokers, partitions) =
        tokio::task::spawn_blocking(move || fetch_cluster_metadata(&bootstrap)).await??;
    info!(
        brokers = brokers.len(),
        partitions = partitions.len(),
        "metadata fetched"
    );

    let mut inventory = ClusterInventory::new(partitions);
    for broker in brokers {
        let ssh = SshClient::new(&broker.host, ssh_user);
        info!(broker = broker.id, host = %broker.host, "fetching disk usage");
        let idx = inventory.add_broker(broker.id, &broker.host, broker.port);
        // The glob stays unquoted: the remote shell expands it.
        let df = ssh
            .run(&format!("df -l --output=target,size,used -- {disk_glob}"))
            .await?;
        for (mount, capacity) in parse_df_output(&df.stdout)? {
            let disk = inventory.add_disk(idx, &mount, capacity);
            let mount = inventory.layout.disk(disk).mount_point.clone();
            info!(host = %broker.host, mount = %mount, "fetching partition usage");
            let du = ssh
                .run(&format!(
                    "find {} -maxdepth 1 -type d -exec du -x -s {{}} \\;",
                    quote(&mount)
                ))
                .await?;
            let dirs = parse_replica_dirs(&du.stdout, &mount)?;
            for spec in match_replica_dirs(&inventory.partitions, broker.id, &dirs) {
                inventory.add_replica(
                    disk,
                    spec.topic,
                    spec.partition,
                    spec.replica_index,
                    spec.is_leader,
                    spec.size,
                );
            }
        }
    }
    Ok(inventory)
}

/// Fetches brokers and partition assignments from the metadata API.
/// Internal topics (`__consumer_offsets` and friends) are skipped.
fn fetch_cluster_metadata(
    bootstrap: &str,
) -> Result<(Vec<BrokerInfo>, PartitionMap), InventoryError> {
    let consumer: BaseConsumer = ClientConfig::new()
        .set("bootstrap.servers", bootstrap)
        .create()?;
    let metadata = consumer.fetch_metadata(None, METADATA_TIMEOUT)?;

    let brokers = metadata
        .brokers()
        .iter()
        .map(|b| BrokerInfo {
            id: b.id(),
            host: b.host().to_string(),
            port: b.port(),
        })
        .collect();

    let mut partitions = PartitionMap::new();
    for topic in metadata.topics() {
        if let Some(err) = topic.error() {
            return Err(InventoryError::Metadata {
                scope: topic.name().to_string(),
                reason: format!("{err:?}"),
            });
        }
        if topic.name().starts_with("__") {
            continue;
        }
        for partition in topic.partitions() {
            if let Some(err) = partition.error() {
                return Err(InventoryError::Metadata {
                    scope: format!("{}-{}", topic.name(), partition.id()),
                    reason: format!("{err:?}"),
                });
            }
            partitions.insert(
                (topic.name().to_string(), partition.id()),
                PartitionAssignment {
                    leader: partition.leader(),
                    replicas: partition.replicas().to_vec(),
                },
            );
        }
    }
    Ok((brokers, partitions))
}

/// Parses `df -l --output=target,size,used` output into
/// `(mount, capacity)` pairs, skipping the header line.
fn parse_df_output(output: &str) -> Result<Vec<(String, u64)>, InventoryError> {
    let mut disks = Vec::new();
    for line in output.lines().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (Some(mount), Some(size), Some(_used)) =
            (fields.next(), fields.next(), fields.next())
        else {
            return Err(InventoryError::MalformedDf {
                line: line.to_string(),
            });
        };
        let capacity = size.parse().map_err(|_| InventoryError::MalformedDf {
            line: line.to_string(),
        })?;
        disks.push((mount.to_string(), capacity));
    }
    Ok(disks)
}

/// Parses `find … -exec du -x -s` output into directory-name -> usage,
/// stripping the mount prefix. The mount itself is skipped.
fn parse_replica_dirs(
    output: &str,
    mount_point: &str,
) -> Result<HashMap<String, u64>, InventoryError> {
    let mut dirs = HashMap::new();
    for line in output.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (Some(usage), Some(dir)) = (fields.next(), fields.next()) else {
            return Err(InventoryError::MalformedDu {
                line: line.to_string(),
            });
        };
        if dir == mount_point || dir == mount_point.trim_end_matches('/') {
            continue;
        }
        let Some(name) = dir.strip_prefix(mount_point) else {
            return Err(InventoryError::ForeignDir {
                dir: dir.to_string(),
                mount: mount_point.to_string(),
            });
        };
        let usage = usage.parse().map_err(|_| InventoryError::MalformedDu {
            line: line.to_string(),
        })?;
        dirs.insert(name.to_string(), usage);
    }
    Ok(dirs)
}

struct ReplicaSpec {
    topic: String,
    partition: i32,
    replica_index: usize,
    is_leader: bool,
    size: u64,
}

/// Matches the directories found on one broker's disk against the known
/// partitions, deriving each replica's index and leader flag.
fn match_replica_dirs(
    partitions: &PartitionMap,
    broker: BrokerId,
    dirs: &HashMap<String, u64>,
) -> Vec<ReplicaSpec> {
    let mut specs = Vec::new();
    for ((topic, partition), assignment) in partitions {
        let key = format!("{topic}-{partition}");
        let Some(&size) = dirs.get(&key) else {
            continue;
        };
        let Some(replica_index) = assignment.replicas.iter().position(|&b| b == broker) else {
            warn!(
                dir = %key,
                broker,
                "replica dir exists but broker is not in the partition's replica list"
            );
            continue;
        };
        if assignment.replicas.iter().filter(|&&b| b == broker).count() > 1 {
            warn!(
                dir = %key,
                broker,
                "broker appears more than once in the replica list, using its first position"
            );
        }
        specs.push(ReplicaSpec {
            topic: topic.clone(),
            partition: *partition,
            replica_index,
            is_leader: assignment.leader == broker,
            size,
        });
    }
    specs
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
