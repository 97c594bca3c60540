//! Progress reporting for a run
//!
//! The spinner follows the task-completed channel. Those events are
//! best-effort, so the count shown may trail the real one; the summary is
//! built from the joined worker stats instead.

use crate::bus::{CompletionEvent, EventStream};
use crate::pool::RunReport;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Spinner showing completed tasks
pub struct ProgressReporter {
    bar: ProgressBar,
    total: u64,
    follower: Option<JoinHandle<()>>,
}

impl ProgressReporter {
    /// Create a reporter for a run of `total` tasks
    pub fn new(total: u64) -> Self {
        let bar = ProgressBar::new_spinner();

        if let Ok(spinner) = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
        {
            bar.set_style(spinner.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
        }
        bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            bar,
            total,
            follower: None,
        }
    }

    /// Count completion events from `events` until the run ends
    pub fn follow(&mut self, mut events: EventStream<CompletionEvent>) {
        let bar = self.bar.clone();
        let total = self.total;

        self.follower = Some(tokio::spawn(async move {
            let mut done = 0u64;
            while let Some(event) = events.next().await {
                done += 1;
                let worker = event
                    .worker_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "?".to_string());
                bar.set_message(format!(
                    "Tasks: {}/{} | Last: {} (worker {})",
                    format_number(done),
                    format_number(total),
                    event.task_id,
                    worker
                ));
            }
        }));
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&mut self, message: &str) {
        self.stop_following();
        self.bar.finish_with_message(message.to_string());
    }

    fn stop_following(&mut self) {
        if let Some(follower) = self.follower.take() {
            follower.abort();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.stop_following();
    }
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Print a header at the start of the run
pub fn print_header(store: &str, workers: usize, tasks: usize) {
    println!();
    println!(
        "{} {}",
        style("worker-pattern").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Store:").bold(), store);
    println!("  {} {}", style("Workers:").bold(), workers);
    println!("  {} {}", style("Tasks:").bold(), format_number(tasks as u64));
    println!();
}

/// Print a summary of the run
pub fn print_summary(report: &RunReport) {
    let secs = report.elapsed.as_secs_f64();
    let completed = report.tasks_completed();
    let rate = if secs > 0.0 {
        completed as f64 / secs
    } else {
        0.0
    };

    let title = if report.is_complete() {
        style("Run Complete").green().bold()
    } else {
        style("Run Incomplete").yellow().bold()
    };

    println!();
    println!("{}", title);
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Run:").bold(), report.run_id);
    println!(
        "  {} {}",
        style("Started:").bold(),
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "  {} {} of {}",
        style("Enqueued:").bold(),
        format_number(report.populate.enqueued as u64),
        format_number(report.populate.requested as u64)
    );
    println!("  {} {}", style("Completed:").bold(), format_number(completed));
    println!(
        "  {} {:.1}s ({:.0} tasks/sec)",
        style("Duration:").bold(),
        secs,
        rate
    );
    println!(
        "  {} {:.1}s",
        style("Busy time:").bold(),
        report.busy_time().as_secs_f64()
    );

    for worker in &report.workers {
        println!(
            "    worker {:>3}: {} tasks, {} ms ({})",
            worker.worker_id,
            format_number(worker.tasks_completed),
            worker.busy_time.as_millis(),
            worker.finish_reason
        );
    }

    if report.populate.failed > 0 {
        println!(
            "  {} {}",
            style("Not enqueued:").yellow().bold(),
            format_number(report.populate.failed as u64)
        );
    }
    let skipped = report.tasks_skipped();
    if skipped > 0 {
        println!("  {} {}", style("Skipped:").yellow().bold(), format_number(skipped));
    }
    let publish_failures = report.publish_failures();
    if publish_failures > 0 {
        println!(
            "  {} {}",
            style("Unpublished:").yellow().bold(),
            format_number(publish_failures)
        );
    }
    for failure in &report.worker_failures {
        println!("  {} {}", style("Failed:").red().bold(), failure);
    }

    match &report.coordinator {
        Ok(coordinator) => println!(
            "  {} {}/{} finished",
            style("Coordinator:").bold(),
            coordinator.observed(),
            coordinator.expected
        ),
        Err(e) => println!("  {} {}", style("Coordinator:").red().bold(), e),
    }
    if let Some(len) = report.final_queue_len {
        println!("  {} {}", style("Queue left:").bold(), format_number(len));
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
        assert_eq!(format_number(1234567890), "1,234,567,890");
    }
}
