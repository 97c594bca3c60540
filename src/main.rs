//! worker-pattern - Distributed work queue with coordinated shutdown
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use worker_pattern::bus::{CompletionBus, CompletionEvent};
use worker_pattern::config::{CliArgs, RunConfig, StoreKind};
use worker_pattern::pool::WorkerPool;
use worker_pattern::progress::{print_header, print_summary, ProgressReporter};
use worker_pattern::store::{MemoryStore, RedisStore, Store};

#[derive(Serialize)]
struct VersionInfo {
    version: &'static str,
    build_date: &'static str,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    if args.version {
        return print_version();
    }

    setup_logging(args.verbose)?;

    let config = RunConfig::from_args(args).context("Invalid configuration")?;

    if config.ttl_may_expire_tasks() {
        warn!(
            ttl_s = config.pool.task_ttl.as_secs(),
            estimate_s = config.estimated_run_time().as_secs(),
            "Task TTL is shorter than the worst-case run, late tasks may expire"
        );
    }

    let store: Arc<dyn Store> = match config.store {
        StoreKind::Redis => Arc::new(
            RedisStore::new(config.redis.clone()).context("Invalid store configuration")?,
        ),
        StoreKind::Memory => Arc::new(MemoryStore::new()),
    };

    if config.show_progress {
        print_header(
            &config.store_display(),
            config.pool.workers,
            config.pool.tasks,
        );
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create async runtime")?;

    runtime.block_on(run_pool(config, store))
}

async fn run_pool(config: RunConfig, store: Arc<dyn Store>) -> Result<()> {
    let pool = WorkerPool::new(store.clone(), config.pool.clone());

    // Setup signal handler for graceful shutdown
    let shutdown = pool.shutdown_token();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, shutting down...");
        shutdown.cancel();
    })
    .context("Failed to set signal handler")?;

    let mut progress = if config.show_progress {
        let mut reporter = ProgressReporter::new(config.pool.tasks as u64);
        reporter.set_status("Populating work queue...");
        match CompletionBus::new(store).subscribe::<CompletionEvent>().await {
            Ok(events) => reporter.follow(events),
            Err(e) => warn!(error = %e, "Progress will not be shown"),
        }
        Some(reporter)
    } else {
        None
    };

    // Only a strict health check failure ends up here
    let report = pool.run().await.context("Run aborted")?;

    if let Some(ref mut p) = progress {
        if report.is_complete() {
            p.finish("Run completed");
        } else {
            p.finish("Run interrupted");
        }
    }

    if config.show_progress {
        print_summary(&report);
    }

    // Operational failures are reported, not turned into an exit code
    if !report.is_complete() {
        info!("Run did not complete cleanly");
    }
    if report.tasks_skipped() > 0 {
        info!(skipped = report.tasks_skipped(), "Run completed with skipped tasks");
    }

    Ok(())
}

fn print_version() -> Result<()> {
    let info = VersionInfo {
        version: env!("CARGO_PKG_VERSION"),
        build_date: env!("WORKER_PATTERN_BUILD_DATE"),
    };
    let json = serde_json::to_string_pretty(&info).context("Failed to encode version")?;
    eprintln!("{}", json);
    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let default = if verbose {
        "worker_pattern=debug,warn"
    } else {
        "worker_pattern=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
