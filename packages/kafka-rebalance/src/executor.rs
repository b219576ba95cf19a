//! Reassignment execution on a working broker.
//!
//! Uploads the reassignment document to the broker, starts
//! `kafka-reassign-partitions.sh --execute` with the given throttles, and
//! optionally polls `--verify` until nothing is left in progress. Kafka
//! briefly reports `failed` at the end of a reassignment before flipping
//! to success, so a failed-looking verify only counts after several
//! consecutive observations.

use std::sync::LazyLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use regex::Regex;
use tracing::{info, warn};

use crate::assignment::ReassignmentDocument;
use crate::ssh::{quote, SshClient, SshError};

const REASSIGN_TOOL: &str = "/opt/kafka/bin/kafka-reassign-partitions.sh";
const VERIFY_INTERVAL: Duration = Duration::from_secs(60);
const FINISHED_FAILURE_LIMIT: u32 = 5;

static EXCEPTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-zA-Z0-9_-]+Exception\b").expect("static regex"));

/// Transfer rate limits passed through to the reassignment tool.
#[derive(Debug, Clone, Copy)]
pub struct Throttle {
    /// Bytes/sec between brokers.
    pub network: u64,
    /// Bytes/sec between disks on one broker.
    pub disk: u64,
}

/// Errors from submitting or verifying a reassignment.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("reassignment document has no partitions to submit")]
    EmptyPlan,
    #[error("failed to serialize reassignment document: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Ssh(#[from] SshError),
    #[error("one or more partitions or replicas failed to move")]
    Failed,
}

/// Submits the reassignment on `ssh`'s broker and, if `wait` is set,
/// polls until it completes.
///
/// # Errors
///
/// [`ExecError::EmptyPlan`] for a document with no partitions (the
/// validity filter may have dropped them all), [`ExecError::Failed`] if
/// the final verify still reports failures, or an [`SshError`] from the
/// remote invocations.
pub async fn execute(
    ssh: &SshClient,
    bootstrap_server: &str,
    zookeeper_server: &str,
    document: &ReassignmentDocument,
    throttle: Throttle,
    wait: bool,
) -> Result<(), ExecError> {
    if document.partitions.is_empty() {
        return Err(ExecError::EmptyPlan);
    }

    let json = serde_json::to_vec(document)?;
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let remote_file = format!("/tmp/kafka-reassignment-{stamp}.json");
    ssh.upload(&json, &remote_file).await?;
    info!(host = %ssh.host(), file = %remote_file, "uploaded reassignment document");

    let base = reassign_cmdline(bootstrap_server, zookeeper_server, &remote_file);
    let exec_cmdline = format!(
        "{base} --throttle {} --replica-alter-log-dirs-throttle {} --execute",
        throttle.network, throttle.disk
    );
    let verify_cmdline = format!("{base} --verify");

    info!("submitting rebalance");
    let exec_output = ssh.run(&exec_cmdline).await?;
    if contains_exception(&exec_output.stdout) || contains_exception(&exec_output.stderr) {
        warn!("exception while starting partition reassignment, some partitions may not get reassigned");
    }

    if !wait {
        return Ok(());
    }

    let mut finished_failures = 0u32;
    loop {
        let verify = ssh.run(&verify_cmdline).await?;
        let in_progress = verify
            .stdout
            .lines()
            .filter(|line| line.contains("in progress"))
            .count();
        info!(remaining = in_progress, "reassignment progress");

        if in_progress > 0 {
            finished_failures = 0;
            tokio::time::sleep(VERIFY_INTERVAL).await;
            continue;
        }
        if verify.stdout.contains("failed") {
            finished_failures += 1;
            if finished_failures >= FINISHED_FAILURE_LIMIT {
                warn!(output = %verify.stdout, "one or more partitions or replicas failed to move");
                return Err(ExecError::Failed);
            }
            continue;
        }
        return Ok(());
    }
}

fn reassign_cmdline(bootstrap_server: &str, zookeeper_server: &str, remote_file: &str) -> String {
    format!(
        "{REASSIGN_TOOL} --bootstrap-server {} --zookeeper {} --reassignment-json-file {}",
        quote(bootstrap_server),
        quote(zookeeper_server),
        quote(remote_file)
    )
}

fn contains_exception(output: &str) -> bool {
    EXCEPTION_RE.is_match(output)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
