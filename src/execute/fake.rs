//! Recording executor and log capture used by the transport and backup
//! tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::{Mutex, Once, PoisonError};

use log::{LevelFilter, Log, Metadata, Record};

use super::{ExecError, Executor, LineCallback};

/// Remembers every command instead of running it.
///
/// Exit codes are replayed from a script, one per call; once the script is
/// exhausted every command succeeds. Scripted output lines are handed to the
/// stdout and stderr callbacks on every call.
#[derive(Debug, Default)]
pub(crate) struct FakeExecutor {
    commands: RefCell<Vec<Vec<String>>>,
    exit_codes: RefCell<VecDeque<i32>>,
    stdout: Vec<String>,
    stderr: Vec<String>,
}

impl FakeExecutor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_exit_codes(self, codes: impl IntoIterator<Item = i32>) -> Self {
        self.exit_codes.borrow_mut().extend(codes);
        self
    }

    pub(crate) fn with_stdout(mut self, lines: &[&str]) -> Self {
        self.stdout = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    pub(crate) fn with_stderr(mut self, lines: &[&str]) -> Self {
        self.stderr = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    /// All commands executed so far.
    pub(crate) fn commands(&self) -> Vec<Vec<String>> {
        self.commands.borrow().clone()
    }

    /// All commands executed so far, joined with spaces.
    pub(crate) fn command_lines(&self) -> Vec<String> {
        self.commands().iter().map(|c| c.join(" ")).collect()
    }
}

impl Executor for FakeExecutor {
    fn exec(
        &self,
        argv: &[String],
        stdout: LineCallback<'_>,
        stderr: LineCallback<'_>,
    ) -> Result<(), ExecError> {
        if argv.is_empty() {
            return Err(ExecError::EmptyCommand);
        }
        self.commands.borrow_mut().push(argv.to_vec());

        for line in &self.stdout {
            stdout(line).map_err(|source| ExecError::Callback {
                stream: "stdout",
                source,
            })?;
        }

        for line in &self.stderr {
            stderr(line).map_err(|source| ExecError::Callback {
                stream: "stderr",
                source,
            })?;
        }

        match self.exit_codes.borrow_mut().pop_front() {
            None | Some(0) => Ok(()),
            Some(code) => Err(ExecError::Exit(ExitStatus::from_raw(code << 8))),
        }
    }
}

static CAPTURED: Mutex<Vec<String>> = Mutex::new(Vec::new());

/// Logger keeping every message in memory.
struct LogCapture;

impl Log for LogCapture {
    fn enabled(&self, _: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        CAPTURED
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.args().to_string());
    }

    fn flush(&self) {}
}

/// Routes all log output of the test binary into memory, at trace level.
pub(crate) fn capture_logs() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        log::set_logger(&LogCapture).expect("no other logger in unit tests");
        log::set_max_level(LevelFilter::Trace);
    });
}

/// Messages logged so far by any test, containing `needle`.
pub(crate) fn logged(needle: &str) -> Vec<String> {
    CAPTURED
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .filter(|msg| msg.contains(needle))
        .cloned()
        .collect()
}
