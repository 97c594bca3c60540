//! Configuration types for worker-pattern
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation

use crate::error::ConfigError;
use crate::pool::WorkerPoolConfig;
use crate::producer::ProducerConfig;
use crate::store::RedisStoreConfig;

use clap::{Parser, ValueEnum};
use std::time::Duration;

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 512;

/// Backing store selection
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreKind {
    /// Shared Redis server
    #[default]
    Redis,
    /// In-process store (single run, no server needed)
    Memory,
}

/// Distribute simulated tasks across a pool of workers through Redis
#[derive(Parser, Debug, Clone)]
#[command(
    name = "worker-pattern",
    about = "Distribute simulated tasks across a pool of workers through Redis",
    long_about = "Populates a Redis work queue with simulated tasks, then runs a pool of workers \
                  that claim tasks until the queue is empty. A coordinator waits until every \
                  worker has reported finished.",
    disable_version_flag = true,
    after_help = "EXAMPLES:\n    \
        worker-pattern --host redis:6379 -w 3 -n 100\n    \
        worker-pattern --store memory -w 8 -n 1000\n    \
        worker-pattern --deadline 30 --strict-health\n    \
        worker-pattern -v"
)]
pub struct CliArgs {
    /// Redis address (host:port or redis:// URL)
    #[arg(long, env = "REDIS_HOST", default_value = "redis:6379", value_name = "ADDR")]
    pub host: String,

    /// Redis password
    #[arg(long, env = "REDIS_PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,

    /// Number of concurrent workers
    #[arg(short = 'w', long, default_value_t = 3, value_name = "NUM")]
    pub workers: usize,

    /// Number of tasks to produce
    #[arg(short = 'n', long, default_value_t = 100, value_name = "NUM")]
    pub iterations: usize,

    /// Backing store
    #[arg(long, value_enum, default_value_t = StoreKind::Redis)]
    pub store: StoreKind,

    /// Shortest simulated task duration in milliseconds
    #[arg(long, default_value_t = 10, value_name = "MS")]
    pub min_duration: u64,

    /// Longest simulated task duration in milliseconds
    #[arg(long, default_value_t = 60, value_name = "MS")]
    pub max_duration: u64,

    /// Expiry of task records in seconds
    #[arg(long, default_value_t = 100, value_name = "SECS")]
    pub task_ttl: u64,

    /// Cancel the run after this many seconds
    #[arg(long, value_name = "SECS")]
    pub deadline: Option<f64>,

    /// Abort when the store health check fails
    #[arg(long)]
    pub strict_health: bool,

    /// How long to keep waiting for finished events once all workers exited
    #[arg(long, default_value_t = 2000, value_name = "MS")]
    pub finish_grace: u64,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Debug logging
    #[arg(long)]
    pub verbose: bool,

    /// Print version information as JSON and exit
    #[arg(short = 'v', long = "version")]
    pub version: bool,
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub store: StoreKind,
    pub redis: RedisStoreConfig,
    pub pool: WorkerPoolConfig,
    pub show_progress: bool,
    pub verbose: bool,
}

impl RunConfig {
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        if args.workers == 0 || args.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.workers,
                max: MAX_WORKERS,
            });
        }

        let producer = ProducerConfig {
            min_duration_ms: args.min_duration,
            max_duration_ms: args.max_duration,
        };
        producer.validate()?;

        if args.task_ttl == 0 {
            return Err(ConfigError::InvalidTtl(
                "must be at least one second".to_string(),
            ));
        }

        let deadline = match args.deadline {
            None => None,
            Some(secs) if secs.is_finite() && secs > 0.0 => Some(
                Duration::try_from_secs_f64(secs)
                    .map_err(|e| ConfigError::InvalidDeadline(format!("{}: {}", secs, e)))?,
            ),
            Some(secs) => {
                return Err(ConfigError::InvalidDeadline(format!(
                    "must be a positive number of seconds, got {}",
                    secs
                )))
            }
        };

        let pool = WorkerPoolConfig {
            workers: args.workers,
            tasks: args.iterations,
            task_ttl: Duration::from_secs(args.task_ttl),
            producer,
            strict_health: args.strict_health,
            finish_grace: Duration::from_millis(args.finish_grace),
            deadline,
            ..Default::default()
        };

        Ok(Self {
            store: args.store,
            redis: RedisStoreConfig::new(&args.host, &args.password),
            pool,
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }

    /// Worst-case time for the workers to drain the queue
    pub fn estimated_run_time(&self) -> Duration {
        let rounds = self.pool.tasks.div_ceil(self.pool.workers.max(1)) as u64;
        Duration::from_millis(rounds.saturating_mul(self.pool.producer.max_duration_ms))
    }

    /// Whether queued tasks could expire before a worker reaches them
    pub fn ttl_may_expire_tasks(&self) -> bool {
        self.estimated_run_time() >= self.pool.task_ttl
    }

    /// Store address for display
    pub fn store_display(&self) -> String {
        match self.store {
            StoreKind::Redis => self.redis.display_url(),
            StoreKind::Memory => "in-memory".to_string(),
        }
    }
}
