//! leaseq CLI: operator interface to a lease-based Redis work queue.

use anyhow::Context;
use clap::{Parser, Subcommand};
use leaseq::config::Config;
use leaseq::queue::{ExitPolicy, Producer, Reclaimer, Worker};
use leaseq::store::{QueueStore, RedisStore};
use leaseq::telemetry::{TelemetryConfig, init_telemetry};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "leaseq", about = "Lease-based work queue over Redis")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Push numbered work items onto the queue
    Produce {
        /// Number of items to push
        #[arg(long, default_value_t = 10)]
        count: u64,
        /// Item payload prefix; items are "<prefix>-<n>"
        #[arg(long, default_value = "bar")]
        prefix: String,
        /// Pause between pushes
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
    /// Lease and process items until cancelled or an exit condition holds
    Consume {
        /// Simulated processing time per item
        #[arg(long, default_value_t = 2000)]
        process_ms: u64,
        /// Exit once main and processing lists are both empty
        #[arg(long, conflicts_with = "max_items")]
        until_drained: bool,
        /// Exit after leasing this many items
        #[arg(long)]
        max_items: Option<u64>,
    },
    /// Show pending and in-flight counts
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Re-queue processing entries whose lease marker is gone
    Reclaim {
        /// Number of passes; entries are re-queued from the second pass on
        #[arg(long, default_value_t = 2)]
        passes: u32,
        /// Pause between passes; keep it longer than a lease round-trip
        #[arg(long, default_value_t = 5)]
        interval_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig::from_config(&config))?;

    let store: Arc<dyn QueueStore> = Arc::new(
        RedisStore::connect(&config.store)
            .await
            .context("failed to connect to the queue store")?,
    );

    match cli.command {
        Command::Produce {
            count,
            prefix,
            interval_ms,
        } => cmd_produce(store, &config, count, &prefix, interval_ms).await,
        Command::Consume {
            process_ms,
            until_drained,
            max_items,
        } => {
            let exit = match (until_drained, max_items) {
                (true, _) => ExitPolicy::WhenDrained,
                (false, Some(n)) => ExitPolicy::AfterItems(n),
                (false, None) => ExitPolicy::UntilCancelled,
            };
            cmd_consume(store, &config, process_ms, exit).await
        }
        Command::Status { json } => cmd_status(store, &config, json).await,
        Command::Reclaim {
            passes,
            interval_secs,
        } => cmd_reclaim(store, &config, passes, interval_secs).await,
    }
}

fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("interrupt received, finishing current item");
        signal_token.cancel();
    });
    token
}

async fn cmd_produce(
    store: Arc<dyn QueueStore>,
    config: &Config,
    count: u64,
    prefix: &str,
    interval_ms: u64,
) -> anyhow::Result<()> {
    let producer = Producer::new(store, &config.queue_name);
    let shutdown = shutdown_on_ctrl_c();

    for idx in 1..=count {
        if shutdown.is_cancelled() {
            break;
        }
        let item = format!("{prefix}-{idx}");
        let len = producer.enqueue(&item).await?;
        println!("Published {item} (queue length {len})");

        if idx < count {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_millis(interval_ms)) => {}
            }
        }
    }
    Ok(())
}

async fn cmd_consume(
    store: Arc<dyn QueueStore>,
    config: &Config,
    process_ms: u64,
    exit: ExitPolicy,
) -> anyhow::Result<()> {
    let worker = Worker::new(store, &config.queue_name).with_options(config.lease)?;
    println!("Worker with session ID: {}", worker.session_id());
    println!("Initial queue state empty: {}", worker.is_empty().await?);

    let handler = move |item: String| async move {
        println!("Working on: {item}");
        tokio::time::sleep(Duration::from_millis(process_ms)).await;
        Ok::<_, anyhow::Error>(())
    };

    let shutdown = shutdown_on_ctrl_c();
    let summary = worker.run(&handler, &shutdown, exit).await?;

    println!(
        "Leased {}, completed {}, failed {}, empty polls {}",
        summary.leased, summary.completed, summary.failed, summary.empty_polls
    );
    Ok(())
}

async fn cmd_status(store: Arc<dyn QueueStore>, config: &Config, json: bool) -> anyhow::Result<()> {
    let worker = Worker::new(store, &config.queue_name);
    let stats = worker.stats().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Queue:      {}", stats.queue);
    println!("Pending:    {}", stats.pending);
    println!("Processing: {}", stats.processing);
    println!("Drained:    {}", stats.is_drained());
    Ok(())
}

async fn cmd_reclaim(
    store: Arc<dyn QueueStore>,
    config: &Config,
    passes: u32,
    interval_secs: u64,
) -> anyhow::Result<()> {
    if passes < 2 {
        anyhow::bail!("reclaim needs at least 2 passes to re-queue anything");
    }

    let mut reclaimer = Reclaimer::new(store, &config.queue_name);
    let shutdown = shutdown_on_ctrl_c();

    for pass in 1..=passes {
        let report = reclaimer.sweep().await?;
        println!(
            "Pass {pass}: scanned {}, leased {}, suspected {}, requeued {}",
            report.scanned, report.leased, report.suspected, report.requeued
        );

        if pass < passes {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(interval_secs)) => {}
            }
        }
    }
    Ok(())
}
