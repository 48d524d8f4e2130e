//! Human-readable descriptions for log output.

use ctcopy_runtime::engine::TaskOutcome;

/// Formats a byte count into a human-readable string (e.g., "128.0 MiB").
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;
    const TIB: u64 = GIB * 1024;

    match bytes {
        b if b >= TIB => format!("{:.1} TiB", b as f64 / TIB as f64),
        b if b >= GIB => format!("{:.1} GiB", b as f64 / GIB as f64),
        b if b >= MIB => format!("{:.1} MiB", b as f64 / MIB as f64),
        b if b >= KIB => format!("{:.1} KiB", b as f64 / KIB as f64),
        b => format!("{b} B"),
    }
}

/// Summarizes what a task did.
#[must_use]
pub fn describe(outcome: &TaskOutcome) -> String {
    match outcome {
        TaskOutcome::Cloned { name } => format!("created {name}"),
        TaskOutcome::Renamed { name } => format!("renamed to {name}"),
        TaskOutcome::Ephemeral(run) if run.self_destructed => {
            format!("{} stopped and removed itself during start", run.name)
        }
        TaskOutcome::Ephemeral(run) => match run.exit_status {
            Some(status) => format!("{} ran command, exit status {status}", run.name),
            None => format!("{} started", run.name),
        },
    }
}
