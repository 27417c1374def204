//! frame-demo: runs pausable Fibonacci computations on the frame scheduler.
//!
//! Each `--fib` value becomes one task. Tasks listed first get the higher
//! priority, so the report shows how aging still lets the later ones run.
//! An extra task sleeps asynchronously to exercise suspension, and
//! `--cancel` drops tasks mid-flight.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use tokio::task::LocalSet;
use tracing::{info, warn};

use framesched::{
    from_future, load_dotenv, Computation, Scheduler, SchedulerConfig, SchedulerMetrics, Step,
    SubmitOptions, TaskSnapshot, TokioHost,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Frame-budgeted scheduler demo.
#[derive(Parser, Debug)]
#[command(name = "frame-demo", version, about)]
struct Cli {
    /// Path to a scheduler TOML config. Defaults plus environment overrides when omitted.
    #[arg(long, env = "FRAMESCHED_CONFIG")]
    config: Option<PathBuf>,

    /// Fibonacci inputs, one task each, highest priority first.
    #[arg(long, value_delimiter = ',', default_values_t = vec![24u64, 27, 30])]
    fib: Vec<u64>,

    /// Stack operations per step before a task pauses.
    #[arg(long, default_value_t = 2_000)]
    ops_per_step: usize,

    /// Indices of `--fib` tasks to cancel after `--cancel-after-ms`.
    #[arg(long, value_delimiter = ',')]
    cancel: Vec<usize>,

    #[arg(long, default_value_t = 30)]
    cancel_after_ms: u64,

    /// Duration of the asynchronous sleeper task.
    #[arg(long, default_value_t = 50)]
    sleep_ms: u64,
}

// ── Fibonacci ───────────────────────────────────────────────────────

enum Op {
    Eval(u64),
    Combine,
}

/// Naive recursive Fibonacci unrolled onto an explicit stack, so it can stop
/// after any operation and pick up again on the next step.
struct Fib {
    ops: Vec<Op>,
    values: Vec<u64>,
    ops_per_step: usize,
}

impl Fib {
    fn new(n: u64, ops_per_step: usize) -> Self {
        Self {
            ops: vec![Op::Eval(n)],
            values: Vec::new(),
            ops_per_step: ops_per_step.max(1),
        }
    }

    fn pop_value(&mut self) -> Result<u64> {
        self.values.pop().ok_or_else(|| anyhow!("value stack underflow"))
    }
}

impl Computation for Fib {
    type Output = u64;
    type Resume = ();

    fn step(&mut self, _input: Option<()>) -> Result<Step<u64>> {
        for _ in 0..self.ops_per_step {
            match self.ops.pop() {
                None => return self.pop_value().map(Step::Done),
                Some(Op::Eval(n)) if n < 2 => self.values.push(n),
                Some(Op::Eval(n)) => {
                    self.ops.push(Op::Combine);
                    self.ops.push(Op::Eval(n - 1));
                    self.ops.push(Op::Eval(n - 2));
                }
                Some(Op::Combine) => {
                    let b = self.pop_value()?;
                    let a = self.pop_value()?;
                    match a.checked_add(b) {
                        Some(sum) => self.values.push(sum),
                        None => bail!("fibonacci overflowed u64"),
                    }
                }
            }
        }
        Ok(Step::pause())
    }
}

// ── Report ──────────────────────────────────────────────────────────

#[derive(Serialize)]
struct DemoReport {
    frames: u64,
    tasks: Vec<TaskSnapshot>,
    metrics: SchedulerMetrics,
}

// ── Main ────────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    load_dotenv();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SchedulerConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => SchedulerConfig::from_env().context("invalid scheduler environment")?,
    };
    config.log_summary();

    LocalSet::new().run_until(run(cli, config)).await
}

async fn run(cli: Cli, config: SchedulerConfig) -> Result<()> {
    let host = TokioHost::new();
    let scheduler = Scheduler::new(config, host.clone());

    let settled: Rc<RefCell<Vec<TaskSnapshot>>> = Rc::new(RefCell::new(Vec::new()));
    let record = |settled: &Rc<RefCell<Vec<TaskSnapshot>>>| {
        let settled = Rc::clone(settled);
        move |snapshot: &TaskSnapshot| settled.borrow_mut().push(snapshot.clone())
    };

    let count = cli.fib.len() as i64;
    let mut handles = Vec::with_capacity(cli.fib.len());
    for (i, &n) in cli.fib.iter().enumerate() {
        let options = SubmitOptions::new()
            .name(format!("fib({})", n))
            .priority(count - i as i64)
            .on_resolved(record(&settled))
            .on_rejected(record(&settled));
        handles.push(scheduler.submit(Fib::new(n, cli.ops_per_step), options));
    }

    let sleep_ms = cli.sleep_ms;
    let sleeper = scheduler.submit(
        from_future(async move {
            tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
            Ok(sleep_ms)
        }),
        SubmitOptions::new()
            .name("sleeper")
            .on_resolved(record(&settled))
            .on_rejected(record(&settled)),
    );

    let doomed: Vec<_> = cli
        .cancel
        .iter()
        .filter_map(|&i| handles.get(i).map(|h| h.cancel_signal()))
        .collect();
    if !doomed.is_empty() {
        let delay = Duration::from_millis(cli.cancel_after_ms);
        tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            info!(tasks = doomed.len(), "Canceling tasks");
            for signal in doomed {
                signal.cancel();
            }
        });
    }

    let frames = host.drive(&scheduler).await;

    for handle in handles {
        let name = handle.name().unwrap_or("anonymous").to_string();
        match handle.await {
            Ok(value) => info!(task = %name, value, "Task resolved"),
            Err(e) => warn!(task = %name, error = %e, "Task did not resolve"),
        }
    }
    match sleeper.await {
        Ok(ms) => info!(slept_ms = ms, "Sleeper resolved"),
        Err(e) => warn!(error = %e, "Sleeper did not resolve"),
    }

    let report = DemoReport {
        frames,
        tasks: settled.take(),
        metrics: scheduler.metrics(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
