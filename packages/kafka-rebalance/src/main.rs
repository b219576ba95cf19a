//! Command-line entry point: collect, plan, generate, execute.

use std::path::Path;

use anyhow::Context;
use clap::Parser;
use rand::Rng;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use rebalance_core::{format_bytes, plan, PlanSettings};

use kafka_rebalance::assignment::build_reassignment;
use kafka_rebalance::cluster::PlannedMove;
use kafka_rebalance::executor::{self, Throttle};
use kafka_rebalance::inventory;
use kafka_rebalance::ssh::SshClient;

/// Guards against concurrent runs; removed once execution succeeds.
const MARKER_FILE: &str = "reassign.json";

#[derive(Debug, Parser)]
#[command(name = "kafka-rebalance", version, about = "Rebalance partition replicas across broker disks")]
struct Cli {
    /// Kafka zookeeper server (<server:port>)
    zookeeper_server: String,
    /// Kafka bootstrap server (<server:port>)
    bootstrap_server: String,
    /// Maximum number of partitions to move
    #[arg(short, long, default_value_t = 20)]
    iterations: usize,
    /// Don't swap partitions whose sizes are within this percent of each
    /// other, to avoid exchanging similar-sized shards
    #[arg(short = 'p', long, default_value_t = 90.0)]
    partition_percentage: f64,
    /// Don't exchange between disks whose utilizations are within this
    /// many percentage points of each other
    #[arg(short = 'P', long, default_value_t = 10.0)]
    disk_percentage: f64,
    /// Exchange a large partition for a small one each round instead of
    /// plain moves
    #[arg(long)]
    swap: bool,
    /// Don't perform moves, just plan
    #[arg(short, long)]
    dry_run: bool,
    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Limit transfer between brokers by this amount, in bytes/sec
    #[arg(long, default_value_t = 40_000_000)]
    net_throttle: u64,
    /// Limit transfer between disks on the same broker by this amount, in
    /// bytes/sec
    #[arg(long, default_value_t = 200_000_000)]
    disk_throttle: u64,
    /// Don't wait for rebalancing to finish
    #[arg(long)]
    no_wait: bool,
    /// Glob matching the data disk mounts on each broker
    #[arg(long, default_value = "/kafka/*")]
    disk_glob: String,
    /// User for ssh connections to the brokers
    #[arg(long, default_value = "root", env = "KAFKA_REBALANCE_SSH_USER")]
    ssh_user: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if Path::new(MARKER_FILE).exists() {
        info!("reassignment JSON exists, is a reassignment already running?");
        return Ok(());
    }

    let settings = PlanSettings::from_percentages(
        cli.iterations,
        cli.disk_percentage,
        Some(cli.partition_percentage),
        cli.swap,
    )?;

    let mut inventory =
        inventory::collect(&cli.bootstrap_server, &cli.disk_glob, &cli.ssh_user).await?;

    info!("begin planning");
    let moves = plan(&mut inventory.placement, &settings, &inventory.layout)?;

    for &item in &moves {
        let replica = inventory.layout.replica(item);
        let source = inventory
            .layout
            .disk(inventory.placement.item(item).initial_owner());
        let planned = inventory.describe_move(item);
        info!(
            topic = %replica.topic,
            partition = replica.partition,
            replica = replica.replica_index,
            from = %source.mount_point,
            to = %planned.target_log_dir,
            // df/du report 1 KiB blocks.
            size = %format_bytes(inventory.placement.item(item).size() * 1024),
            "planned move"
        );
    }

    let planned: Vec<PlannedMove> = moves.iter().map(|&m| inventory.describe_move(m)).collect();
    let document = build_reassignment(&inventory.partitions, &planned, &mut rand::rng())?;
    debug!(?document, "reassignment document");

    if cli.dry_run {
        println!("{}", serde_json::to_string_pretty(&document)?);
        info!("dry run complete, run without --dry-run to execute");
        return Ok(());
    }

    std::fs::write(MARKER_FILE, serde_json::to_vec(&document)?)
        .with_context(|| format!("writing {MARKER_FILE}"))?;

    let brokers = inventory.layout.brokers();
    anyhow::ensure!(!brokers.is_empty(), "no brokers discovered");
    let work_broker = &brokers[rand::rng().random_range(0..brokers.len())];
    info!(broker = work_broker.id, host = %work_broker.host, "submitting on working broker");

    let ssh = SshClient::new(&work_broker.host, &cli.ssh_user);
    let bootstrap = format!("{}:{}", work_broker.host, work_broker.port);
    executor::execute(
        &ssh,
        &bootstrap,
        &cli.zookeeper_server,
        &document,
        Throttle {
            network: cli.net_throttle,
            disk: cli.disk_throttle,
        },
        !cli.no_wait,
    )
    .await?;

    if let Err(err) = std::fs::remove_file(MARKER_FILE) {
        warn!(error = %err, "failed to remove marker file");
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let default_filter = if verbose > 0 { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
