//! Transports: the external programs doing the actual copy.
//!
//! Each transport turns a [`BackupSpec`] into one or more command lines for
//! its program. They share a [`TransportBase`] with the spec, the
//! [`Executor`] and the dry-run flag. In dry-run mode the command lines are
//! only logged.
//!
//! Currently the following transports are implemented:
//!
//! - [`Rsync`]
//! - [`Rclone`]
//! - [`RdiffBackup`]
//! - [`Restic`]
//! - [`Custom`]: an arbitrary shell command.

pub mod custom;
pub mod filter;
pub mod rclone;
pub mod rdiff_backup;
pub mod restic;
pub mod rsync;

pub use custom::Custom;
pub use rclone::Rclone;
pub use rdiff_backup::RdiffBackup;
pub use restic::Restic;
pub use rsync::Rsync;

use std::io;

use derive_more::{Display, Error, From};

use crate::config::{BackupSpec, TransportKind};
use crate::execute::{self, ExecError, Executor};

/// A backup program that can be run once.
pub trait Transport {
    /// Runs the backup.
    ///
    /// # Dry Run
    ///
    /// On a dry run the command lines are assembled and logged, but nothing
    /// is executed.
    fn run(&mut self) -> Result<(), TransportError>;
}

/// Errors of a [`Transport`].
#[derive(Debug, Display, Error, From)]
pub enum TransportError {
    /// The spec can't be handled by this transport.
    #[display("config error: {_0}")]
    Config(#[error(ignore)] &'static str),
    /// A filter or pattern file couldn't be written.
    #[from]
    #[display("error creating pattern file: {_0}")]
    PatternFile(io::Error),
    /// The transport program failed.
    #[from]
    #[display("{_0}")]
    Exec(ExecError),
}

/// Creates the transport selected by `spec.transport`.
///
/// # Errors
///
/// Returns [`TransportError::Config`] when the transport rejects the spec.
pub fn new_transport<'a, E: Executor + 'a>(
    spec: &'a BackupSpec,
    executor: E,
    dry_run: bool,
) -> Result<Box<dyn Transport + 'a>, TransportError> {
    Ok(match spec.transport {
        TransportKind::Rsync => Box::new(Rsync::new(spec, executor, dry_run)?),
        TransportKind::Rclone => Box::new(Rclone::new(spec, executor, dry_run)?),
        TransportKind::RdiffBackup => Box::new(RdiffBackup::new(spec, executor, dry_run)?),
        TransportKind::Restic => Box::new(Restic::new(spec, executor, dry_run)?),
        TransportKind::Custom => Box::new(Custom::new(spec, executor, dry_run)?),
    })
}

/// State and helpers shared by all transports.
#[derive(Debug)]
pub struct TransportBase<'a, E> {
    spec: &'a BackupSpec,
    executor: E,
    dry_run: bool,
}

impl<'a, E: Executor> TransportBase<'a, E> {
    pub fn new(spec: &'a BackupSpec, executor: E, dry_run: bool) -> Self {
        Self {
            spec,
            executor,
            dry_run,
        }
    }

    pub fn spec(&self) -> &'a BackupSpec {
        self.spec
    }

    /// Source in the form `[source_host<separator>]source_dir`.
    pub fn build_source(&self, separator: &str) -> String {
        join_host(&self.spec.source_host, separator, &self.spec.source_dir)
    }

    /// Destination in the form `[dest_host<separator>]dest_dir`.
    pub fn build_dest(&self, separator: &str) -> String {
        join_host(&self.spec.dest_host, separator, &self.spec.dest_dir)
    }

    /// Leading tokens of the command line, honouring `custom_bin`.
    pub fn executable(&self, default: &str) -> Vec<String> {
        let custom: Vec<String> = self
            .spec
            .custom_bin
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if custom.is_empty() {
            vec![default.to_string()]
        } else {
            custom
        }
    }

    /// Both `source_dir` and `dest_dir` have to be set.
    pub fn require_dirs(&self) -> Result<(), TransportError> {
        if self.spec.source_dir.is_empty() {
            return Err(TransportError::Config("source_dir is empty"));
        }
        if self.spec.dest_dir.is_empty() {
            return Err(TransportError::Config("dest_dir is empty"));
        }
        Ok(())
    }

    /// At most one side of the copy may be remote.
    pub fn forbid_two_hosts(&self) -> Result<(), TransportError> {
        if !self.spec.source_host.is_empty() && !self.spec.dest_host.is_empty() {
            return Err(TransportError::Config("cannot have source & dest host set"));
        }
        Ok(())
    }

    /// Logs the command lines and runs them in order unless in dry-run mode.
    ///
    /// The chain stops at the first failing command.
    pub fn run_chain(
        &self,
        tag: &str,
        target: &str,
        cmds: &[Vec<String>],
        spam: &[&str],
    ) -> Result<(), ExecError> {
        if let [cmd] = cmds {
            log::info!(target: target, "Command: {}", cmd.join(" "));
        } else {
            for (i, cmd) in cmds.iter().enumerate() {
                log::info!(target: target, "Command({}/{}): {}", i + 1, cmds.len(), cmd.join(" "));
            }
        }

        if self.dry_run {
            return Ok(());
        }

        cmds.iter().try_for_each(|cmd| {
            execute::run_command(tag, cmd, Some(&self.executor), spam, spam)
        })
    }
}

fn join_host(host: &str, separator: &str, path: &str) -> String {
    if host.is_empty() {
        path.to_string()
    } else {
        format!("{host}{separator}{path}")
    }
}
