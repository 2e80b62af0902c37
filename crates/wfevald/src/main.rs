//! wfevald: demo controller daemon for the evaluation core.
//!
//! Registers a set of simulated workflow invocations and drives them through
//! an [`EvalDriver`] on a fixed tick, with an extra notification per tick
//! aimed at one invocation so evaluations contend for the same token. At the
//! end it prints every invocation's status as JSON and closes the cache.

mod controller;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use futures::future::join_all;
use tracing::{debug, info, Level};
use uuid::Uuid;

use wfeval_core::{
    init_tracing, DriverConfig, EvalAttempt, EvalCache, EvalDriver, StateSnapshot, TraceContext,
    METRICS,
};

use crate::controller::{InvokeTask, TaskController};

#[derive(Parser)]
#[command(name = "wfevald")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Drive simulated workflow invocations through the evaluation core", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, env = "WFEVALD_VERBOSE")]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, env = "WFEVALD_JSON")]
    json: bool,

    /// Number of simulated invocations
    #[arg(long, env = "WFEVALD_INVOCATIONS", default_value_t = 4)]
    invocations: usize,

    /// Tasks each invocation runs before completing
    #[arg(long, env = "WFEVALD_TASKS", default_value_t = 3)]
    tasks: usize,

    /// Maximum number of ticks before shutting down
    #[arg(long, env = "WFEVALD_TICKS", default_value_t = 10)]
    ticks: u32,

    /// Tick interval in milliseconds
    #[arg(long, env = "WFEVALD_TICK_MS", default_value_t = 100)]
    tick_ms: u64,

    /// Simulated duration of one evaluation in milliseconds
    #[arg(long, env = "WFEVALD_EVAL_MS", default_value_t = 20)]
    eval_ms: u64,

    /// Make every n-th evaluation fail (0 disables)
    #[arg(long, env = "WFEVALD_FAIL_EVERY", default_value_t = 0)]
    fail_every: usize,

    /// Wait this long for a busy invocation instead of skipping it
    #[arg(long, env = "WFEVALD_LOCK_TIMEOUT_MS")]
    lock_timeout_ms: Option<u64>,

    /// Give up on an invocation after this many failed evaluations in a row
    #[arg(long, env = "WFEVALD_MAX_ERRORS")]
    max_consecutive_errors: Option<usize>,

    /// Drop finished invocations from the cache
    #[arg(long, env = "WFEVALD_EVICT_FINISHED")]
    evict_finished: bool,
}

impl Cli {
    fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            lock_timeout_ms: self.lock_timeout_ms,
            max_consecutive_errors: self.max_consecutive_errors,
            evict_finished: self.evict_finished,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json, if cli.verbose { Level::DEBUG } else { Level::INFO });

    let cache = Arc::new(EvalCache::new());
    let controller = TaskController::new(
        cli.tasks,
        cli.fail_every,
        Duration::from_millis(cli.eval_ms),
    );
    let driver = Arc::new(EvalDriver::new(
        Arc::clone(&cache),
        controller,
        cli.driver_config(),
    ));

    let ids: Vec<String> = (0..cli.invocations)
        .map(|_| format!("wfi-{}", Uuid::new_v4()))
        .collect();
    info!(invocations = ids.len(), "wfevald started");

    let mut interval = tokio::time::interval(Duration::from_millis(cli.tick_ms));
    for tick in 0..cli.ticks {
        interval.tick().await;

        let span = tracing::info_span!("reconcile", tick = tick);
        let ctx = TraceContext::of(&span);
        let notified = ids.get(tick as usize % ids.len().max(1)).cloned();

        let attempts = ids
            .iter()
            .map(|id| (id.clone(), "tick"))
            .chain(notified.map(|id| (id, "notification")))
            .map(|(id, cause)| {
                let driver = Arc::clone(&driver);
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let attempt = driver.evaluate(&id, cause, &ctx).await;
                    (id, attempt)
                })
            });

        for joined in join_all(attempts).await {
            let (id, attempt) = joined.context("evaluation task panicked")?;
            match attempt {
                EvalAttempt::Evaluated(record) => {
                    if let Some(task) = record
                        .action
                        .as_ref()
                        .and_then(|a| a.as_any().downcast_ref::<InvokeTask>())
                    {
                        debug!(workflow_id = %id, task = task.index, "task invoked");
                    }
                }
                EvalAttempt::Contended => info!(workflow_id = %id, "evaluation skipped: busy"),
                EvalAttempt::Finished => {}
            }
        }

        let all_finished = ids
            .iter()
            .all(|id| cache.get(id).map_or(true, |state| state.is_finished()));
        if all_finished {
            info!(tick = tick, "all invocations finished");
            break;
        }
    }

    let mut snapshots: Vec<StateSnapshot> =
        cache.list().values().map(|state| state.snapshot()).collect();
    snapshots.sort_by(|a, b| a.id.cmp(&b.id));
    println!("{}", serde_json::to_string_pretty(&snapshots)?);

    cache.close()?;
    METRICS.flush();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_maps_driver_config() {
        let cli = Cli::parse_from([
            "wfevald",
            "--lock-timeout-ms",
            "50",
            "--max-consecutive-errors",
            "2",
            "--evict-finished",
        ]);
        let config = cli.driver_config();
        assert_eq!(config.lock_timeout_ms, Some(50));
        assert_eq!(config.max_consecutive_errors, Some(2));
        assert!(config.evict_finished);
    }

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["wfevald"]);
        assert_eq!(cli.invocations, 4);
        assert_eq!(cli.driver_config(), DriverConfig::default());
    }
}
