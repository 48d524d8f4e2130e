//! Log subscriber setup.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use clap::Args;
use tracing_subscriber::EnvFilter;

/// Logging flags shared with the other container tools.
#[derive(Args, Debug, Default)]
pub struct LogArgs {
    /// Append log messages to FILE instead of standard error.
    #[arg(short = 'o', long = "logfile", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Log priority: TRACE, DEBUG, INFO, NOTICE, WARN, ERROR, CRIT, ALERT or FATAL.
    #[arg(short = 'l', long = "logpriority", value_name = "LEVEL", value_parser = parse_priority)]
    pub log_priority: Option<&'static str>,

    /// Do not log anything.
    #[arg(short, long)]
    pub quiet: bool,
}

/// Maps a container tool log priority onto a tracing level directive.
///
/// # Errors
///
/// Returns an error for an unknown priority name.
pub fn parse_priority(priority: &str) -> Result<&'static str, String> {
    match priority.to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" | "notice" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" | "crit" | "alert" | "fatal" => Ok("error"),
        _ => Err(format!("unknown log priority {priority:?}")),
    }
}

/// Builds the level filter from the flags, falling back to `RUST_LOG`.
fn filter(args: &LogArgs) -> EnvFilter {
    if args.quiet {
        return EnvFilter::new("off");
    }
    match args.log_priority {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

/// Installs the global `tracing` subscriber.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened.
pub fn init(args: &LogArgs) -> anyhow::Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(args))
        .with_target(false);

    match &args.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}
