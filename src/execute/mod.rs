//! Running external programs and capturing their output line by line.
//!
//! Every program netbackup starts (transports, hooks, `mount`, `cryptsetup`,
//! ...) goes through an [`Executor`]. The real implementation is
//! [`ProcessExecutor`]; tests swap in a recording fake.

mod command;
#[cfg(test)]
pub(crate) mod fake;

pub use command::{run, run_command};

use std::env;
use std::io::{self, BufRead, BufReader, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;

use derive_more::{Display, Error};

const DEFAULT_SHELL: &str = "/bin/sh";

/// Exit code reported when the real one can't be recovered.
pub const UNKNOWN_EXIT_CODE: u8 = 255;

/// Callback receiving every complete line of one output stream.
pub type LineCallback<'a> = &'a mut (dyn FnMut(&str) -> io::Result<()> + Send);

/// Errors while running an external program.
#[derive(Debug, Display, Error)]
pub enum ExecError {
    /// The argument vector was empty.
    #[display("empty command line")]
    EmptyCommand,
    /// The program could not be started.
    #[display("unable to start {program:?}: {source}")]
    Spawn { program: String, source: io::Error },
    /// Reading one of the program's output streams failed.
    #[display("error reading program's {stream}: {source}")]
    Stream {
        stream: &'static str,
        source: io::Error,
    },
    /// An output callback refused a line.
    #[display("error processing program's {stream}: {source}")]
    Callback {
        stream: &'static str,
        source: io::Error,
    },
    /// Waiting for the program failed.
    #[display("error waiting for program: {_0}")]
    Wait(io::Error),
    /// The program terminated unsuccessfully.
    #[display("{_0}")]
    Exit(#[error(ignore)] ExitStatus),
}

impl ExecError {
    /// Exit code of the failed program.
    ///
    /// Failures that never produced an exit status (spawn errors, signals,
    /// ...) map to [`UNKNOWN_EXIT_CODE`].
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Exit(status) => status
                .code()
                .and_then(|code| u8::try_from(code).ok())
                .unwrap_or(UNKNOWN_EXIT_CODE),
            _ => UNKNOWN_EXIT_CODE,
        }
    }
}

/// Converts the outcome of [`Executor::exec`] into a numeric exit code.
pub fn exit_code(result: &Result<(), ExecError>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(e) => e.exit_code(),
    }
}

/// Wraps `command` into an argument vector running it through the user's shell.
///
/// The shell is taken from `$SHELL` and defaults to `/bin/sh`.
pub fn with_shell(command: &str) -> Vec<String> {
    let shell = env::var("SHELL")
        .ok()
        .filter(|shell| !shell.is_empty())
        .unwrap_or_else(|| DEFAULT_SHELL.to_string());
    shell_argv(shell, command)
}

fn shell_argv(shell: String, command: &str) -> Vec<String> {
    vec![shell, "-c".into(), "--".into(), command.into()]
}

/// Something able to run a program to completion.
pub trait Executor {
    /// Runs `argv[0]` with the remaining elements as arguments.
    ///
    /// Every line the program prints is handed to `stdout` or `stderr`
    /// respectively. A failing callback aborts the run and its error is
    /// returned instead of the exit status.
    fn exec(
        &self,
        argv: &[String],
        stdout: LineCallback<'_>,
        stderr: LineCallback<'_>,
    ) -> Result<(), ExecError>;
}

impl<E: Executor + ?Sized> Executor for &E {
    fn exec(
        &self,
        argv: &[String],
        stdout: LineCallback<'_>,
        stderr: LineCallback<'_>,
    ) -> Result<(), ExecError> {
        (**self).exec(argv, stdout, stderr)
    }
}

/// [`Executor`] spawning real child processes.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessExecutor;

impl Executor for ProcessExecutor {
    fn exec(
        &self,
        argv: &[String],
        stdout: LineCallback<'_>,
        stderr: LineCallback<'_>,
    ) -> Result<(), ExecError> {
        let (program, args) = argv.split_first().ok_or(ExecError::EmptyCommand)?;

        let mut child = Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExecError::Spawn {
                program: program.clone(),
                source,
            })?;

        let out_pipe = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let err_pipe = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        // Both streams have to be drained concurrently, otherwise a chatty
        // child blocks on a full pipe.
        let (out_res, err_res) = thread::scope(|s| {
            let out = s.spawn(move || stream(out_pipe, stdout, "stdout"));
            let err = s.spawn(move || stream(err_pipe, stderr, "stderr"));
            (
                out.join().unwrap_or_else(|p| std::panic::resume_unwind(p)),
                err.join().unwrap_or_else(|p| std::panic::resume_unwind(p)),
            )
        });

        if let Err(e) = out_res.and(err_res) {
            // The readers are gone, make sure the child doesn't linger.
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }

        let status = child.wait().map_err(ExecError::Wait)?;
        if status.success() {
            Ok(())
        } else {
            Err(ExecError::Exit(status))
        }
    }
}

fn missing_pipe(stream: &'static str) -> ExecError {
    ExecError::Stream {
        stream,
        source: io::Error::other("stream was not captured"),
    }
}

/// Feeds every line of `reader` to `callback` until end of stream.
///
/// A trailing line without newline is delivered as well. Invalid UTF-8 is
/// replaced, file names in transport output are not guaranteed to be UTF-8.
fn stream(
    reader: impl Read,
    callback: LineCallback<'_>,
    name: &'static str,
) -> Result<(), ExecError> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .map_err(|source| ExecError::Stream {
                stream: name,
                source,
            })?;
        if read == 0 {
            return Ok(());
        }

        if buf.ends_with(b"\n") {
            buf.pop();
            if buf.ends_with(b"\r") {
                buf.pop();
            }
        }

        let line = String::from_utf8_lossy(&buf);
        callback(&*line).map_err(|source| ExecError::Callback {
            stream: name,
            source,
        })?;
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::process::ExitStatusExt;

    use rstest::rstest;

    use super::*;

    fn discard(_: &str) -> io::Result<()> {
        Ok(())
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into()]
    }

    /// Runs `script` and returns the result together with the captured lines.
    fn capture(script: &str) -> (Result<(), ExecError>, Vec<String>, Vec<String>) {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let res = ProcessExecutor.exec(
            &sh(script),
            &mut |line: &str| -> io::Result<()> {
                out.push(line.to_string());
                Ok(())
            },
            &mut |line: &str| -> io::Result<()> {
                err.push(line.to_string());
                Ok(())
            },
        );
        (res, out, err)
    }

    #[test]
    fn captures_both_streams_line_by_line() {
        let (res, out, err) = capture("echo one; echo two; echo oops 1>&2");

        assert!(res.is_ok());
        assert_eq!(out, ["one", "two"]);
        assert_eq!(err, ["oops"]);
    }

    #[test]
    fn delivers_unterminated_last_line() {
        let (res, out, _) = capture("printf 'first\\nlast'");

        assert!(res.is_ok());
        assert_eq!(out, ["first", "last"]);
    }

    #[test]
    fn captures_large_interleaved_output() {
        let (res, out, err) = capture(
            "for i in $(seq 1 500); do echo out-$i; echo err-$i 1>&2; done",
        );

        assert!(res.is_ok());
        assert_eq!(out.len(), 500);
        assert_eq!(err.len(), 500);
        assert_eq!(out.last().map(String::as_str), Some("out-500"));
        assert_eq!(err.first().map(String::as_str), Some("err-1"));
    }

    #[rstest]
    #[case("exit 0", 0)]
    #[case("exit 1", 1)]
    #[case("exit 24", 24)]
    #[case("kill -9 $$", UNKNOWN_EXIT_CODE)]
    fn reports_exit_code(#[case] script: &str, #[case] expected: u8) {
        let (res, _, _) = capture(script);

        assert_eq!(exit_code(&res), expected);
    }

    #[test]
    fn callback_failure_wins_over_exit_status() {
        let res = ProcessExecutor.exec(
            &sh("echo boom; exit 3"),
            &mut |_: &str| -> io::Result<()> { Err(io::Error::other("log is gone")) },
            &mut discard,
        );

        match res {
            Err(ExecError::Callback { stream, .. }) => assert_eq!(stream, "stdout"),
            other => panic!("expected callback error, got {other:?}"),
        }
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let res = ProcessExecutor.exec(
            &["netbackup-no-such-binary".to_string()],
            &mut discard,
            &mut discard,
        );

        assert!(matches!(res, Err(ExecError::Spawn { .. })));
        assert_eq!(exit_code(&res), UNKNOWN_EXIT_CODE);
    }

    #[test]
    fn empty_command_is_rejected() {
        let res = ProcessExecutor.exec(&[], &mut discard, &mut discard);

        assert!(matches!(res, Err(ExecError::EmptyCommand)));
    }

    #[test]
    fn exit_code_of_raw_status() {
        let err = ExecError::Exit(ExitStatus::from_raw(23 << 8));

        assert_eq!(err.exit_code(), 23);
        assert_eq!(exit_code(&Ok(())), 0);
    }

    #[test]
    fn shell_wrapper_layout() {
        assert_eq!(
            shell_argv("/bin/bash".into(), "foo --bar"),
            ["/bin/bash", "-c", "--", "foo --bar"]
        );

        let argv = with_shell("true");
        assert_eq!(argv.len(), 4);
        assert_eq!(argv[1..], ["-c", "--", "true"]);
    }
}
