//! Running a command with its output mirrored into the run log.

use std::io;

use chrono::Local;

use super::{ExecError, Executor, ProcessExecutor};

const TARGET: &str = "netbackup::execute";

/// Runs `argv` with all output going to the log and no spam filtering.
///
/// # Errors
///
/// Returns the [`ExecError`] of the executed program.
pub fn run(tag: &str, argv: &[String]) -> Result<(), ExecError> {
    run_command(tag, argv, None, &[], &[])
}

/// Runs `argv` through `executor` (or a fresh [`ProcessExecutor`]).
///
/// The command line, start and finish times and the outcome are logged
/// under `tag`. Every output line is logged with a `HH:MM:SS` prefix unless
/// it contains one of the substrings in `stdout_spam` or `stderr_spam`.
///
/// # Errors
///
/// Returns the [`ExecError`] of the executor unchanged.
pub fn run_command(
    tag: &str,
    argv: &[String],
    executor: Option<&dyn Executor>,
    stdout_spam: &[&str],
    stderr_spam: &[&str],
) -> Result<(), ExecError> {
    log::info!(target: TARGET, "{tag}: Running command: {}", argv.join(" "));
    log::debug!(target: TARGET, "{tag}: Starting at {}", Local::now().to_rfc2822());

    let mut stdout = |line: &str| -> io::Result<()> {
        log_line(tag, line, stdout_spam);
        Ok(())
    };
    let mut stderr = |line: &str| -> io::Result<()> {
        log_line(tag, line, stderr_spam);
        Ok(())
    };

    let res = match executor {
        Some(executor) => executor.exec(argv, &mut stdout, &mut stderr),
        None => ProcessExecutor.exec(argv, &mut stdout, &mut stderr),
    };

    log::debug!(target: TARGET, "{tag}: Finished at {}", Local::now().to_rfc2822());
    match &res {
        Ok(()) => log::info!(target: TARGET, "{tag}: Command returned: OK"),
        Err(e) => log::info!(target: TARGET, "{tag}: Command returned: {e}"),
    }

    res
}

fn log_line(tag: &str, line: &str, spam: &[&str]) {
    if is_spam(line, spam) {
        return;
    }
    log::trace!(target: TARGET, "{tag}: {} {line}", Local::now().format("%H:%M:%S"));
}

/// Returns true if `line` contains any of the substrings in `spam`.
pub(crate) fn is_spam(line: &str, spam: &[&str]) -> bool {
    spam.iter().any(|s| line.contains(s))
}
