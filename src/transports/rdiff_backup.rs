//! [rdiff-backup](https://rdiff-backup.net/) transport.

use crate::config::BackupSpec;
use crate::execute::Executor;

use super::filter::write_list;
use super::{Transport, TransportBase, TransportError};

const RDIFF_BACKUP_BIN: &str = "rdiff-backup";
const TARGET: &str = "netbackup::transport::rdiff-backup";

/// Harmless messages rdiff-backup prints on every run.
const SPAM: &[&str] = &[
    "POSIX ACLs not supported",
    "Unable to import win32security module",
    "not supported by filesystem at",
    "escape_dos_devices not required by filesystem at",
    "Reading globbing filelist",
    "Updated mirror temp file.* does not match source",
    "/.gvfs",
];

/// Reverse incremental backups, optionally pruning old increments.
#[derive(Debug)]
pub struct RdiffBackup<'a, E> {
    base: TransportBase<'a, E>,
}

impl<'a, E: Executor> RdiffBackup<'a, E> {
    pub fn new(spec: &'a BackupSpec, executor: E, dry_run: bool) -> Result<Self, TransportError> {
        let base = TransportBase::new(spec, executor, dry_run);
        base.require_dirs()?;
        base.forbid_two_hosts()?;
        Ok(Self { base })
    }
}

impl<E: Executor> Transport for RdiffBackup<'_, E> {
    fn run(&mut self) -> Result<(), TransportError> {
        let spec = self.base.spec();

        let exclude_file = if spec.exclude.is_empty() {
            None
        } else {
            Some(write_list("exclude", &spec.exclude)?)
        };
        let include_file = if spec.include.is_empty() {
            None
        } else {
            Some(write_list("include", &spec.include)?)
        };

        let mut cmd = self.base.executable(RDIFF_BACKUP_BIN);
        cmd.extend(
            [
                "--verbosity=5",
                "--terminal-verbosity=5",
                "--preserve-numerical-ids",
                "--exclude-sockets",
                "--force",
            ]
            .map(String::from),
        );
        if let Some(file) = &exclude_file {
            cmd.push(format!("--exclude-globbing-filelist={}", file.path().display()));
        }
        if let Some(file) = &include_file {
            cmd.push(format!("--include-globbing-filelist={}", file.path().display()));
        }
        cmd.extend(spec.extra_args.iter().cloned());

        // rdiff-backup separates host and path with a double colon.
        let dest = self.base.build_dest("::");
        cmd.push(self.base.build_source("::"));
        cmd.push(dest.clone());

        let mut cmds = vec![cmd];
        if spec.expire_days > 0 {
            let mut expire = self.base.executable(RDIFF_BACKUP_BIN);
            expire.push(format!("--remove-older-than={}D", spec.expire_days));
            expire.push("--force".into());
            expire.push(dest);
            cmds.push(expire);
        }

        Ok(self.base.run_chain("RDIFF-BACKUP", TARGET, &cmds, SPAM)?)
    }
}
