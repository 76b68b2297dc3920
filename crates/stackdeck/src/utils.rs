use crate::display;
use colored::Colorize;
use stackdeck_cloud::{LogLine, LogSink, PollLog, PollOptions};
use stackdeck_config::Settings;
use stackdeck_provision::{ChainOutcome, ChainReport};
use std::future::Future;
use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedReceiver;

/// Prints the core's log stream while commands run
pub struct Console {
    rx: UnboundedReceiver<LogLine>,
}

impl Console {
    pub fn new() -> (LogSink, Self) {
        let (log, rx) = LogSink::channel();
        (log, Self { rx })
    }

    /// Drive `fut` to completion, printing log lines as they arrive.
    pub async fn run<F: Future>(&mut self, fut: F) -> F::Output {
        tokio::pin!(fut);
        let output = loop {
            tokio::select! {
                biased;
                Some(line) = self.rx.recv() => display::print_log_line(&line),
                output = &mut fut => break output,
            }
        };
        self.drain();
        output
    }

    /// Print whatever is already queued.
    pub fn drain(&mut self) {
        while let Ok(line) = self.rx.try_recv() {
            display::print_log_line(&line);
        }
    }
}

/// Settings from `.env` and the environment, with an optional data dir override
pub fn load_settings(data_dir: Option<PathBuf>) -> anyhow::Result<Settings> {
    let mut settings = Settings::from_env()?;
    if let Some(dir) = data_dir {
        settings.data_dir = dir;
    }
    tracing::debug!("Data directory: {}", settings.data_dir.display());
    Ok(settings)
}

/// Quiet polls always get an audit file; verbose ones only when asked.
pub fn poll_options(settings: &Settings, quiet: bool, poll_log: Option<PathBuf>) -> PollOptions {
    let audit_path = match (quiet, poll_log) {
        (_, Some(path)) => Some(path),
        (true, None) => Some(settings.poll_log_path()),
        (false, None) => None,
    };
    PollOptions {
        verbose: !quiet,
        audit_log: audit_path.map(PollLog::new),
        ..Default::default()
    }
}

/// Print a chain summary; error if the chain did not get its primary resource.
pub fn finish_report(report: &ChainReport) -> anyhow::Result<()> {
    println!();
    let outcome = match report.outcome {
        ChainOutcome::Completed => "✓ completed".green().bold(),
        ChainOutcome::CompletedWithWarnings => "✓ completed with warnings".yellow().bold(),
        ChainOutcome::Rejected => "✗ rejected".red().bold(),
        ChainOutcome::Failed => "✗ failed".red().bold(),
    };
    let step = match report.failed_at {
        Some(state) => format!("stopped at: {}", state),
        None => format!("last step: {}", report.reached),
    };
    println!(
        "{} chain {} ({} ms, {})",
        report.kind.to_string().cyan(),
        outcome,
        report.duration_ms,
        step
    );
    for created in &report.created {
        println!("  • {} {}", created.collection, created.id.cyan());
    }
    if let Some(address) = &report.floating_ip_address {
        println!("  • floating ip {}", address.cyan());
    }
    for warning in &report.warnings {
        println!("  {} {}", "⚠".yellow(), warning);
    }

    if report.is_success() {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "{} chain did not complete: {}",
            report.kind,
            report.error.as_deref().unwrap_or("unknown error")
        ))
    }
}
