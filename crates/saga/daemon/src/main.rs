//! eVote saga daemon
//!
//! Loads configuration, starts a worker pool over the in-memory substrate
//! and drives one election saga end to end against the simulated ledger,
//! printing progress as the saga advances.

use anyhow::Context;
use clap::Parser;
use evote_saga_engine::steps::calls;
use evote_saga_engine::{
    init_tracing, ElectionService, EngineConfig, InMemoryJobQueue, JobQueue, RawLedgerFailure,
    SimulatedLedger, SimulatedRegistrar, Worker,
};
use evote_saga_types::{Candidate, ElectionRequest, JobState, Participant};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// eVote saga daemon CLI.
#[derive(Parser)]
#[command(name = "evote-sagad")]
#[command(about = "Run an election creation saga against a simulated ledger", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path.
    #[arg(short, long, env = "EVOTE_CONFIG")]
    config: Option<String>,

    /// Log level, overrides the configured one.
    #[arg(long, env = "EVOTE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging.
    #[arg(long, env = "EVOTE_LOG_JSON")]
    json: bool,

    /// Election name.
    #[arg(long, default_value = "Demo Election")]
    name: String,

    /// Number of candidates to create.
    #[arg(long, default_value_t = 2)]
    candidates: usize,

    /// Number of participants to register.
    #[arg(long, default_value_t = 3)]
    participants: u64,

    /// Time out the first election submission to exercise resumption.
    #[arg(long)]
    inject_timeout: bool,

    /// Use immediate redelivery instead of the configured backoff.
    #[arg(long)]
    fast_retry: bool,
}

fn election(cli: &Cli) -> ElectionRequest {
    ElectionRequest {
        election_name: cli.name.clone(),
        election_date: vec!["2026-11-01".into()],
        election_location: "Online".into(),
        candidate_list: (1..=cli.candidates)
            .map(|n| Candidate::new(format!("Candidate {n}"), "Simulated candidate"))
            .collect(),
        participant_list: (1..=cli.participants)
            .map(|n| Participant::new(n, format!("Participant {n}")))
            .collect(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = EngineConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    config.logging.json |= cli.json;
    if cli.fast_retry {
        config.retry = EngineConfig::development().retry;
    }

    init_tracing(&config.logging)?;

    println!(
        r#"
  eVote Saga Daemon
  Version: {}
  Channel: {} / {}
  Workers: {}
"#,
        env!("CARGO_PKG_VERSION"),
        config.ledger.channel_name,
        config.ledger.chaincode_name,
        config.worker.concurrency,
    );

    let queue = Arc::new(InMemoryJobQueue::new(config.retry.clone(), &config.worker));
    let ledger = Arc::new(SimulatedLedger::new()?.with_latency(Duration::from_millis(50)));
    if cli.inject_timeout {
        ledger.fail_next(
            calls::CREATE_ELECTION,
            RawLedgerFailure::timed_out("simulated commit timeout"),
        );
    }

    let service = ElectionService::new(queue.clone(), config.queue.clone());
    let worker = Arc::new(Worker::new(
        queue.clone(),
        ledger.clone(),
        Arc::new(SimulatedRegistrar::new()),
        config.worker.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));

    let job_id = service.enqueue_workflow(election(&cli), "admin").await?;
    println!("  Job: {job_id}\n");

    let mut last_percent = None;
    loop {
        let progress = service.get_progress(&job_id).await?;
        if last_percent != Some(progress.percent) {
            println!(
                "  [{}] {:>3}% terminal={}",
                job_id.short(),
                progress.percent,
                progress.is_terminal
            );
            last_percent = Some(progress.percent);
        }

        let record = queue
            .get(&job_id)
            .await?
            .context("job evicted before it finished")?;
        if record.state.is_finished() {
            if record.state == JobState::Failed {
                println!(
                    "\n  Saga halted: {}",
                    record.failed_reason.unwrap_or_default()
                );
            }
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(config.worker.poll_interval()) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    let ctx = service.get_workflow(&job_id).await?;
    println!();
    if let Some(election_id) = &ctx.derived.election_id {
        println!("  Election: {election_id}");
    }
    println!(
        "  Identities registered: {}/{}",
        ctx.derived.registered_identities.len(),
        ctx.input.participant_list.len()
    );
    if let Some(status) = &ctx.terminal_status {
        println!("  Status: {status}");
    }
    for (step, attempt) in &ctx.attempts {
        println!("  {step}: {}", attempt.history.join(", "));
    }
    println!("  Ledger commits: {}", ledger.committed_ids().len());

    shutdown_tx.send(true).ok();
    worker_handle.await.context("worker task")?;
    Ok(())
}
