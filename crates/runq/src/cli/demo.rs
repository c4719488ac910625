use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use console::style;
use serde_json::{json, Map, Value};

use runq::prelude::*;

/// Enqueue a batch of demo jobs, run workers and print the results.
#[derive(Parser)]
pub struct DemoCommand {
    /// Configuration file path. Defaults are used when omitted.
    #[arg(short, long)]
    pub config: Option<String>,

    /// Number of workers sharing the demo queues.
    #[arg(short, long, default_value = "2")]
    pub workers: usize,

    /// How long to wait for each job, in seconds.
    #[arg(long, default_value = "10")]
    pub wait: u64,
}

impl DemoCommand {
    pub async fn execute(self) -> Result<()> {
        let config = super::load_config(self.config.as_deref())?;
        super::init_tracing(&config.observability);

        println!();
        println!(
            "  {}  {} v{}",
            style("⚙").bold(),
            style("runq demo").bold().cyan(),
            env!("CARGO_PKG_VERSION")
        );
        println!();

        let runq = demo_engine(config)?;
        let ids = enqueue_batch(&runq)?;
        println!(
            "  {} Enqueued {} jobs, starting {} workers",
            style("→").dim(),
            ids.len(),
            self.workers.max(1)
        );

        runq.start_scheduler();
        let handles: Vec<WorkerHandle> = (0..self.workers.max(1))
            .map(|_| runq.worker(&["high", "default"]).spawn(WorkerMode::Continuous))
            .collect();

        let wait = Duration::from_secs(self.wait);
        for id in &ids {
            match runq.get_result(*id, Some(wait)).await {
                Ok(_) => {}
                Err(RunqError::JobFailed { .. }) => {}
                Err(e) => println!("  {} Job {}: {}", style("!").yellow(), id, e),
            }
        }

        runq.shutdown().await;
        for handle in handles {
            let stats = handle.join(runq.config().worker.stop_timeout()).await?;
            tracing::debug!(
                processed = stats.processed,
                finished = stats.finished,
                failed = stats.failed,
                "Worker summary"
            );
        }

        let snapshots: Vec<JobSnapshot> = ids.iter().filter_map(|id| runq.snapshot(*id)).collect();
        println!("{}", serde_json::to_string_pretty(&snapshots)?);

        let finished = snapshots
            .iter()
            .filter(|s| s.status == JobStatus::Finished)
            .count();
        println!();
        println!(
            "  {} {} finished, {} failed",
            style("✓").green(),
            finished,
            snapshots.len() - finished
        );
        println!();

        Ok(())
    }
}

/// Build an engine with the demo handlers registered.
fn demo_engine(config: RunqConfig) -> Result<Runq> {
    let runq = Runq::builder()
        .config(config)
        .register_fn("add", |_ctx, args: JobArgs| async move {
            let (a, b): (f64, f64) = args.decode()?;
            Ok::<_, RunqError>(a + b)
        })
        .register_fn("sleep", |_ctx, args: JobArgs| async move {
            let seconds: f64 = args.get(0)?;
            tokio::time::sleep(Duration::from_secs_f64(seconds.max(0.0))).await;
            Ok::<_, RunqError>(seconds)
        })
        .register_fn("fail", |_ctx, args: JobArgs| async move {
            let reason: Option<String> = args.get_kwarg("reason")?;
            Err::<Value, _>(RunqError::handler(
                reason.unwrap_or_else(|| "This job always fails".to_string()),
            ))
        })
        .register_fn("echo", |ctx: JobContext, args: JobArgs| async move {
            Ok::<_, RunqError>(json!({
                "job_id": ctx.job_id,
                "args": args.args,
                "kwargs": args.kwargs,
            }))
        })
        .build()?;
    Ok(runq)
}

fn enqueue_batch(runq: &Runq) -> Result<Vec<JobId>> {
    let mut greeting = Map::new();
    greeting.insert("greeting".to_string(), json!("hello"));

    let mut reason = Map::new();
    reason.insert("reason".to_string(), json!("demo failure"));

    let ids = vec![
        runq.enqueue("default", "add", vec![json!(3), json!(7)], Map::new(), None)?,
        runq.enqueue("default", "add", vec![json!(5), json!(5)], Map::new(), None)?,
        runq.enqueue("high", "echo", vec![json!("urgent")], greeting, Some("priority echo"))?,
        runq.enqueue("default", "fail", vec![], reason, None)?,
        runq.enqueue_in(
            "default",
            Duration::from_millis(300),
            "sleep",
            vec![json!(0.1)],
            Map::new(),
        )?,
    ];
    Ok(ids)
}
