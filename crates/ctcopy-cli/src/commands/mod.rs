//! Command-line definition and dispatch.

use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Parser};
use ctcopy_common::config::CopyConfig;
use ctcopy_common::constants::{APP_NAME, CONFIG_ENV};
use ctcopy_common::types::{Task, parse_fssize};
use ctcopy_core::mount::MountTable;
use ctcopy_runtime::engine::{Engine, Invocation};

use crate::logging::LogArgs;
use crate::output;

/// Copy, snapshot or rename a container, or start an ephemeral copy of it.
///
/// Trailing arguments are handed to the clone hooks, or run inside an
/// ephemeral container once it is up.
#[derive(Parser, Debug)]
#[command(name = APP_NAME, version, about, long_about = None)]
#[command(group(ArgGroup::new("task").args(["rename", "snapshot", "ephemeral"])))]
#[command(group(ArgGroup::new("start_mode").args(["foreground", "daemon"])))]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Name of the source container.
    #[arg(short = 'n', long)]
    pub name: String,

    /// Directory holding the containers.
    #[arg(short = 'P', long = "lxcpath", env = "LXCPATH", value_name = "PATH")]
    pub lxc_path: Option<PathBuf>,

    /// Name of the new container; ephemeral copies get a random one if omitted.
    #[arg(short = 'N', long = "newname", value_name = "NEWNAME")]
    pub new_name: Option<String>,

    /// Directory for the new container.
    #[arg(short = 'p', long = "newpath", value_name = "NEWPATH")]
    pub new_path: Option<PathBuf>,

    /// Rename the container.
    #[arg(short = 'R', long)]
    pub rename: bool,

    /// Create a snapshot instead of a full copy.
    #[arg(short = 's', long)]
    pub snapshot: bool,

    /// Start an ephemeral copy of the container.
    #[arg(short = 'e', long)]
    pub ephemeral: bool,

    /// Start the ephemeral copy in the foreground.
    #[arg(short = 'F', long)]
    pub foreground: bool,

    /// Start the ephemeral copy as a daemon (default).
    #[arg(short = 'd', long)]
    pub daemon: bool,

    /// Keep the ephemeral copy after it stops.
    #[arg(short = 'D', long = "keepdata")]
    pub keep_data: bool,

    /// Keep the hostname of the source container.
    #[arg(short = 'K', long = "keepname")]
    pub keep_name: bool,

    /// Keep the MAC addresses of the source container.
    #[arg(short = 'M', long = "keepmac")]
    pub keep_mac: bool,

    /// Extra mounts for an ephemeral copy:
    /// {bind,aufs,overlay}=/src[:/dest[:ro|rw]][,...]
    #[arg(short = 'm', long = "mount", value_name = "MOUNTS")]
    pub mounts: Vec<String>,

    /// Backing store of the new root filesystem (dir, overlay).
    #[arg(short = 'B', long = "backingstorage", value_name = "TYPE")]
    pub backing_store: Option<String>,

    /// Size of a new block device, e.g. 512M or 2G (default unit MiB).
    #[arg(short = 'L', long = "fssize", value_name = "SIZE", value_parser = parse_fssize)]
    pub fssize: Option<u64>,

    /// JSON file with default settings.
    #[arg(long, env = CONFIG_ENV, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Logging options.
    #[command(flatten)]
    pub log: LogArgs,

    /// Clone hook arguments, or the command to run in an ephemeral copy.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
    pub args: Vec<String>,
}

impl Cli {
    /// Returns the task selected by the flags.
    pub const fn task(&self) -> Task {
        if self.rename {
            Task::Rename
        } else if self.ephemeral {
            Task::Ephemeral
        } else if self.snapshot {
            Task::Snapshot
        } else {
            Task::Copy
        }
    }

    /// Builds the invocation, taking defaults from `config`.
    fn invocation(self, config: CopyConfig) -> Invocation {
        let task = self.task();
        let shutdown_timeout = config.shutdown_timeout();
        let lxc_path = self.lxc_path.unwrap_or(config.lxc_path);
        Invocation {
            new_name: self.new_name,
            new_path: self.new_path,
            backing_store: self.backing_store.or(config.backing_store),
            fssize: self.fssize.unwrap_or_default(),
            keep_name: self.keep_name,
            keep_mac: self.keep_mac,
            keep_data: self.keep_data,
            foreground: self.foreground && !self.daemon,
            args: self.args,
            shutdown_timeout,
            ..Invocation::new(task, self.name, lxc_path)
        }
    }
}

/// Runs the invocation described by the command line.
///
/// # Errors
///
/// Returns an error if the configuration or mounts are invalid, or if the
/// task fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = CopyConfig::load_or_default(cli.config.as_deref()).context("loading configuration")?;

    let task = cli.task();
    if task != Task::Ephemeral && !cli.mounts.is_empty() {
        tracing::warn!("mounts are only applied to ephemeral containers, ignoring -m");
    }
    let mounts = if task == Task::Ephemeral {
        MountTable::from_directives(&cli.mounts)?
    } else {
        MountTable::new()
    };
    if let Some(size) = cli.fssize {
        tracing::debug!(size = %output::format_bytes(size), "requested filesystem size");
    }

    let invocation = cli.invocation(config);
    let engine = Engine::new();
    if !engine.is_available() {
        tracing::debug!("container tools not found on PATH");
    }

    let outcome = engine.execute(&invocation, mounts)?;
    tracing::debug!(outcome = %output::describe(&outcome), "done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("ctcopy").chain(args.iter().copied())).expect("parse")
    }

    #[test]
    fn default_task_is_copy() {
        let cli = parse(&["-n", "base", "-N", "copy"]);
        assert_eq!(cli.task(), Task::Copy);
        assert_eq!(cli.new_name.as_deref(), Some("copy"));
    }

    #[test]
    fn task_flags_are_exclusive() {
        assert_eq!(parse(&["-n", "a", "-N", "b", "-R"]).task(), Task::Rename);
        assert_eq!(parse(&["-n", "a", "-N", "b", "-s"]).task(), Task::Snapshot);
        assert_eq!(parse(&["-n", "a", "-e"]).task(), Task::Ephemeral);
        assert!(Cli::try_parse_from(["ctcopy", "-n", "a", "-e", "-s"]).is_err());
        assert!(Cli::try_parse_from(["ctcopy", "-n", "a", "-e", "-F", "-d"]).is_err());
    }

    #[test]
    fn mounts_and_trailing_command() {
        let cli = parse(&[
            "-n", "base", "-e", "-m", "bind=/data,overlay=/lower:/merged", "-m", "aufs=/x", "--", "ls", "-l",
        ]);
        assert_eq!(cli.mounts, ["bind=/data,overlay=/lower:/merged", "aufs=/x"]);
        assert_eq!(cli.args, ["ls", "-l"]);

        let table = MountTable::from_directives(&cli.mounts).expect("mounts");
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn fssize_is_parsed_at_the_edge() {
        assert_eq!(parse(&["-n", "a", "-N", "b", "-L", "2G"]).fssize, Some(2 << 30));
        assert_eq!(parse(&["-n", "a", "-N", "b", "-L", "512"]).fssize, Some(512 << 20));
        assert!(Cli::try_parse_from(["ctcopy", "-n", "a", "-N", "b", "-L", "big"]).is_err());
    }

    #[test]
    fn flags_override_config() {
        let cli = parse(&["-n", "base", "-P", "/srv/lxc", "-N", "copy", "-K"]);
        let config = CopyConfig {
            lxc_path: PathBuf::from("/var/lib/lxc"),
            backing_store: Some("overlay".into()),
            shutdown_timeout_secs: 5,
        };

        let invocation = cli.invocation(config);
        assert_eq!(invocation.lxc_path, Path::new("/srv/lxc"));
        assert_eq!(invocation.target_path(), Path::new("/srv/lxc"));
        assert_eq!(invocation.backing_store.as_deref(), Some("overlay"));
        assert_eq!(invocation.shutdown_timeout.as_secs(), 5);
        assert!(invocation.keep_name);
        assert!(!invocation.flags().snapshot);
    }
}
