//! Reassignment document generation.
//!
//! Turns the planner's moves into the JSON document consumed by
//! `kafka-reassign-partitions.sh`: one record per touched partition with
//! the new replica broker list and a parallel `log_dirs` list pinning the
//! moved replica to its destination disk ("any" everywhere else).
//!
//! Substituting a broker into the replica list can collide with a broker
//! already present elsewhere in it; a randomized anti-collision pass
//! relocates the displaced broker (see [`relocation_slot`]'s rules). The
//! RNG is injected so tests can pin outcomes. Records that still carry a
//! duplicate broker after all substitutions are corrupt and dropped before
//! the document is emitted.

use std::collections::HashSet;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cluster::{BrokerId, PartitionMap, PlannedMove};

/// The wire-format document for `--reassignment-json-file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReassignmentDocument {
    pub version: u32,
    pub partitions: Vec<PartitionReassignment>,
}

/// One partition record. `replicas` and `log_dirs` are parallel lists;
/// `log_dirs` entries are either `"any"` or an absolute path without a
/// trailing `/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionReassignment {
    pub topic: String,
    pub partition: i32,
    pub replicas: Vec<BrokerId>,
    pub log_dirs: Vec<String>,
}

/// Errors from assembling the document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssignmentError {
    #[error("no current assignment known for {topic}-{partition}")]
    UnknownPartition { topic: String, partition: i32 },
    #[error("replica index {index} out of range for {topic}-{partition} with {len} replicas")]
    ReplicaIndexOutOfRange {
        topic: String,
        partition: i32,
        index: usize,
        len: usize,
    },
}

/// A record under construction; `original_replicas` is kept for debug
/// logging and never emitted.
#[derive(Debug)]
struct Draft {
    topic: String,
    partition: i32,
    replicas: Vec<BrokerId>,
    original_replicas: Vec<BrokerId>,
    log_dirs: Vec<String>,
}

/// Builds the reassignment document for a sequence of planned moves.
///
/// Records are created on a partition's first touch (starting from its
/// current replica list, all log dirs "any") and updated in place on later
/// touches, so two moved replicas of one partition land in a single
/// record. Partitions keep the order in which they were first touched.
///
/// # Errors
///
/// [`AssignmentError`] if a move references a partition absent from
/// `partitions` or a replica index beyond its replica list.
pub fn build_reassignment<R: Rng + ?Sized>(
    partitions: &PartitionMap,
    moves: &[PlannedMove],
    rng: &mut R,
) -> Result<ReassignmentDocument, AssignmentError> {
    let mut drafts: Vec<Draft> = Vec::new();

    for mv in moves {
        let position = drafts
            .iter()
            .position(|d| d.topic == mv.topic && d.partition == mv.partition);
        let position = match position {
            Some(i) => i,
            None => {
                let key = (mv.topic.clone(), mv.partition);
                let current = partitions.get(&key).ok_or_else(|| {
                    AssignmentError::UnknownPartition {
                        topic: mv.topic.clone(),
                        partition: mv.partition,
                    }
                })?;
                drafts.push(Draft {
                    topic: mv.topic.clone(),
                    partition: mv.partition,
                    replicas: current.replicas.clone(),
                    original_replicas: current.replicas.clone(),
                    log_dirs: vec!["any".to_string(); current.replicas.len()],
                });
                drafts.len() - 1
            }
        };
        let draft = &mut drafts[position];

        if mv.replica_index >= draft.replicas.len() {
            return Err(AssignmentError::ReplicaIndexOutOfRange {
                topic: mv.topic.clone(),
                partition: mv.partition,
                index: mv.replica_index,
                len: draft.replicas.len(),
            });
        }

        let displaced = draft.replicas[mv.replica_index];
        draft.replicas[mv.replica_index] = mv.target_broker;
        if let Some(slot) = relocation_slot(&draft.replicas, mv.target_broker, mv.replica_index, displaced, rng)
        {
            draft.replicas[slot] = displaced;
        }
        draft.log_dirs[mv.replica_index] = mv.target_log_dir.trim_end_matches('/').to_string();
    }

    debug!(?drafts, "assembled reassignment drafts");

    let partitions = drafts
        .into_iter()
        .filter(|d| {
            if has_duplicates(&d.replicas) {
                warn!(
                    topic = %d.topic,
                    partition = d.partition,
                    replicas = ?d.replicas,
                    original = ?d.original_replicas,
                    "dropping record with duplicate replicas"
                );
                false
            } else {
                true
            }
        })
        .map(|d| PartitionReassignment {
            topic: d.topic,
            partition: d.partition,
            replicas: d.replicas,
            log_dirs: d.log_dirs,
        })
        .collect();

    Ok(ReassignmentDocument {
        version: 1,
        partitions,
    })
}

/// Picks the position where a broker displaced from `new_pos` should be
/// re-inserted, or `None` to leave the list alone.
///
/// - If the displaced broker already sits elsewhere in the list, moving it
///   would repair nothing: leave the list alone.
/// - If the incoming broker occurs only once, any position other than
///   `new_pos` works; one is chosen uniformly.
/// - Otherwise duplicates of the incoming broker exist, and the displaced
///   broker goes over one of them (uniformly chosen, excluding `new_pos`).
///
/// A single-replica list offers no alternate position at all; the list is
/// left alone and the validity filter decides the record's fate.
fn relocation_slot<R: Rng + ?Sized>(
    replicas: &[BrokerId],
    new_id: BrokerId,
    new_pos: usize,
    displaced: BrokerId,
    rng: &mut R,
) -> Option<usize> {
    if replicas.contains(&displaced) {
        return None;
    }
    let duplicated = replicas.iter().filter(|&&b| b == new_id).count() >= 2;
    let slots: Vec<usize> = replicas
        .iter()
        .enumerate()
        .filter(|&(i, &b)| i != new_pos && (!duplicated || b == new_id))
        .map(|(i, _)| i)
        .collect();
    if slots.is_empty() {
        return None;
    }
    Some(slots[rng.random_range(0..slots.len())])
}

fn has_duplicates(replicas: &[BrokerId]) -> bool {
    let mut seen = HashSet::with_capacity(replicas.len());
    !replicas.iter().all(|b| seen.insert(b))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
