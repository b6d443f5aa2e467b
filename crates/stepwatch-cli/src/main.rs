//! stepwatch - workflow の実行を見守り、過去の run を参照する CLI
//!
//! 設定は環境変数（`.env` も読む）から。ログは stderr、結果は stdout。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stepwatch_core::app::{ClientConfig, Fetched, HistoryClient, StreamEnd, WorkflowMonitor};
use stepwatch_core::domain::{
    HistoryQuery, StepName, StepStatus, WorkflowId, WorkflowRequest, WorkflowSnapshot,
};
use stepwatch_core::impls::{HttpEventSource, HttpHistoryApi, ScriptedEventSource};
use stepwatch_core::ports::EventSource;

#[derive(Parser)]
#[command(name = "stepwatch")]
#[command(about = "Watch workflow runs and browse their history")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a run and follow it until the stream ends
    Run {
        ticker: String,
        query: String,
        /// Stop after this step
        #[arg(long)]
        until_step: Option<StepName>,
        /// Run only these steps (comma separated)
        #[arg(long, value_delimiter = ',')]
        only_steps: Vec<StepName>,
        #[arg(long)]
        force_refresh: bool,
        /// Print the final snapshot as JSON
        #[arg(long)]
        json: bool,
        /// Replay a captured event stream instead of calling the server
        #[arg(long)]
        replay: Option<PathBuf>,
    },

    /// List completed runs, newest first
    Runs {
        #[arg(long)]
        ticker: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
        /// Follow cursors through every page
        #[arg(long)]
        all: bool,
    },

    /// Show one run and its event timeline
    Show { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stepwatch=info,stepwatch_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env().context("Failed to load configuration")?;

    match cli.command {
        Commands::Run {
            ticker,
            query,
            until_step,
            only_steps,
            force_refresh,
            json,
            replay,
        } => {
            let mut request = WorkflowRequest::new(ticker, query).with_force_refresh(force_refresh);
            if let Some(step) = until_step {
                request = request.with_until_step(step);
            }
            if !only_steps.is_empty() {
                request = request.with_only_steps(only_steps);
            }
            run(&config, request, replay, json).await
        }
        Commands::Runs { ticker, limit, all } => list(&config, ticker, limit, all).await,
        Commands::Show { id } => show(&config, WorkflowId::new(id)).await,
    }
}

// ============================================================================
// run
// ============================================================================

async fn run(
    config: &ClientConfig,
    request: WorkflowRequest,
    replay: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let source: Arc<dyn EventSource> = match replay {
        Some(path) => {
            let captured = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            info!(path = %path.display(), "replaying captured stream");
            let lines: Vec<String> = captured.split_inclusive('\n').map(str::to_owned).collect();
            Arc::new(ScriptedEventSource::new(lines).with_delay(Duration::from_millis(200)))
        }
        None => Arc::new(HttpEventSource::from_config(config)?),
    };

    let monitor = WorkflowMonitor::new(source, config);
    let progress = tokio::spawn(print_progress(monitor.subscribe()));

    let report = tokio::select! {
        report = monitor.run(&request) => report,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted");
            progress.abort();
            print_snapshot(&monitor.snapshot(), json)?;
            bail!("interrupted");
        }
    };
    progress.abort();

    let snapshot = monitor.snapshot();
    print_snapshot(&snapshot, json)?;

    let report = report?;
    for error in &report.frame_errors {
        warn!(%error, "record skipped");
    }
    info!(
        session = %report.session,
        events = report.events_applied,
        end = ?report.end,
        "stream finished"
    );
    if report.end != StreamEnd::Completed {
        bail!("stream ended before the workflow completed");
    }
    Ok(())
}

/// Print one line per step transition.
async fn print_progress(mut rx: watch::Receiver<WorkflowSnapshot>) {
    let mut seen = rx.borrow_and_update().step_status;
    while rx.changed().await.is_ok() {
        let snapshot = rx.borrow_and_update().clone();
        for step in StepName::ALL {
            let status = snapshot.status_of(step);
            if *seen.get(step) == status {
                continue;
            }
            match status {
                StepStatus::Running => eprintln!("▶ {step}"),
                StepStatus::Pending => {}
                _ => eprintln!("■ {step} {status} ({}s)", snapshot.elapsed(step)),
            }
        }
        seen = snapshot.step_status;
    }
}

fn print_snapshot(snapshot: &WorkflowSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
        return Ok(());
    }

    let id = snapshot.id.as_ref().map_or("-", |id| id.as_str());
    println!("workflow {id}: {}", snapshot.overall_status);
    for step in StepName::ALL {
        println!(
            "  {:<12} {:<10} {:>5}s",
            step.as_str(),
            snapshot.status_of(step).as_str(),
            snapshot.elapsed(step)
        );
    }
    if let Some(error) = &snapshot.server_error {
        println!("error: {error}");
    }
    Ok(())
}

// ============================================================================
// runs / show
// ============================================================================

async fn list(
    config: &ClientConfig,
    ticker: Option<String>,
    limit: Option<u32>,
    all: bool,
) -> Result<()> {
    let history = history_client(config)?;

    let (runs, next_cursor) = if all {
        (history.collect_runs(ticker).await?, None)
    } else {
        let query = HistoryQuery::first_page(limit.unwrap_or(config.page_size)).with_ticker(ticker);
        let page = history.list_runs(&query).await?;
        (page.runs, page.next_cursor)
    };

    for run in &runs {
        let completed_at = run
            .completed_at
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {:<6} {:<10} {}",
            completed_at, run.ticker, run.status, run.workflow_id
        );
    }
    if next_cursor.is_some() {
        println!("(more runs available; use --all)");
    }
    Ok(())
}

async fn show(config: &ClientConfig, id: WorkflowId) -> Result<()> {
    let history = history_client(config)?;
    let Fetched::Current(_) = history.select_run(id.clone()).await? else {
        bail!("request for {id} was superseded");
    };

    // state には新しい順に並んだタイムラインが入っている
    let state = history.state();
    let record = state.record.context("run detail missing")?;

    println!("workflow {} ({}): {}", record.workflow_id, record.ticker, record.status);
    println!("  started   {}", record.started_at);
    if let Some(completed_at) = record.completed_at {
        println!("  completed {completed_at}");
    }
    for (step, result) in record.ordered_results() {
        let status = result.status.map_or("-", |s| s.as_str());
        let duration = result
            .duration_ms
            .map(|ms| format!("{ms}ms"))
            .unwrap_or_default();
        println!("  {:<12} {:<10} {}", step.as_str(), status, duration);
        for warning in &result.warnings {
            println!("    ! {warning}");
        }
    }

    println!("events:");
    for event in &state.events {
        let step = event.step.as_deref().unwrap_or("");
        println!("  {}  {:<18} {}", event.timestamp.format("%H:%M:%S"), event.event, step);
    }
    Ok(())
}

fn history_client(config: &ClientConfig) -> Result<HistoryClient> {
    let api = HttpHistoryApi::from_config(config)?;
    Ok(HistoryClient::new(Arc::new(api), config))
}
