//! [rclone](https://rclone.org/) transport.

use crate::config::BackupSpec;
use crate::execute::Executor;

use super::filter::create_filter_file;
use super::{Transport, TransportBase, TransportError};

const RCLONE_BIN: &str = "rclone";
const TARGET: &str = "netbackup::transport::rclone";

/// Syncs source and destination, both of which may be remote.
#[derive(Debug)]
pub struct Rclone<'a, E> {
    base: TransportBase<'a, E>,
}

impl<'a, E: Executor> Rclone<'a, E> {
    pub fn new(spec: &'a BackupSpec, executor: E, dry_run: bool) -> Result<Self, TransportError> {
        let base = TransportBase::new(spec, executor, dry_run);
        base.require_dirs()?;
        Ok(Self { base })
    }
}

impl<E: Executor> Transport for Rclone<'_, E> {
    fn run(&mut self) -> Result<(), TransportError> {
        let spec = self.base.spec();

        let mut cmd = self.base.executable(RCLONE_BIN);
        cmd.extend(["sync", "-v"].map(String::from));

        let filter = create_filter_file(&spec.include, &spec.exclude)?;
        if let Some(filter) = &filter {
            cmd.push(format!("--filter-from={}", filter.path().display()));
        }
        cmd.extend(spec.extra_args.iter().cloned());
        cmd.push(self.base.build_source(":"));
        cmd.push(self.base.build_dest(":"));

        Ok(self.base.run_chain("RCLONE", TARGET, &[cmd], &[])?)
    }
}
