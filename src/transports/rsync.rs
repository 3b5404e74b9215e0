//! [rsync](https://rsync.samba.org/) transport.

use crate::config::BackupSpec;
use crate::execute::Executor;

use super::filter::create_filter_file;
use super::{Transport, TransportBase, TransportError};

const RSYNC_BIN: &str = "rsync";
const TARGET: &str = "netbackup::transport::rsync";

/// "Some files vanished before they could be transferred", harmless for a
/// backup of a live system.
const EXIT_VANISHED: u8 = 24;

/// Mirrors the source into the destination, at most one side remote.
#[derive(Debug)]
pub struct Rsync<'a, E> {
    base: TransportBase<'a, E>,
}

impl<'a, E: Executor> Rsync<'a, E> {
    pub fn new(spec: &'a BackupSpec, executor: E, dry_run: bool) -> Result<Self, TransportError> {
        let base = TransportBase::new(spec, executor, dry_run);
        base.require_dirs()?;
        base.forbid_two_hosts()?;
        Ok(Self { base })
    }
}

impl<E: Executor> Transport for Rsync<'_, E> {
    fn run(&mut self) -> Result<(), TransportError> {
        let spec = self.base.spec();

        let mut cmd = self.base.executable(RSYNC_BIN);
        cmd.extend(["-avAXH", "--delete", "--numeric-ids"].map(String::from));

        let filter = create_filter_file(&spec.include, &spec.exclude)?;
        if let Some(filter) = &filter {
            cmd.push(format!("--filter=merge {}", filter.path().display()));
        }
        if !spec.exclude.is_empty() {
            cmd.push("--delete-excluded".into());
        }
        cmd.extend(spec.extra_args.iter().cloned());

        // Without the trailing slash rsync creates the source directory
        // inside the destination.
        let mut src = self.base.build_source(":");
        if !src.ends_with('/') {
            src.push('/');
        }
        cmd.push(src);
        cmd.push(self.base.build_dest(":"));

        match self.base.run_chain("RSYNC", TARGET, &[cmd], &[]) {
            Err(e) if e.exit_code() == EXIT_VANISHED => {
                log::info!(target: TARGET, "Ignoring rsync exit code {EXIT_VANISHED} (vanished source files)");
                Ok(())
            }
            res => res.map_err(TransportError::from),
        }
    }
}
