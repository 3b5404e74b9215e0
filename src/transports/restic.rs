//! [restic](https://restic.net/) transport.
//!
//! Restic backs up into a repository, so the destination is a repository
//! location and the source has to be local.

use crate::config::BackupSpec;
use crate::execute::Executor;

use super::filter::write_list;
use super::{Transport, TransportBase, TransportError};

const RESTIC_BIN: &str = "restic";
const TARGET: &str = "netbackup::transport::restic";

#[derive(Debug)]
pub struct Restic<'a, E> {
    base: TransportBase<'a, E>,
}

impl<'a, E: Executor> Restic<'a, E> {
    pub fn new(spec: &'a BackupSpec, executor: E, dry_run: bool) -> Result<Self, TransportError> {
        let base = TransportBase::new(spec, executor, dry_run);
        base.require_dirs()?;
        if !spec.include.is_empty() {
            return Err(TransportError::Config(
                "include is not supported by the restic transport",
            ));
        }
        if !spec.source_host.is_empty() {
            return Err(TransportError::Config(
                "cannot have source host set (push mode only)",
            ));
        }
        Ok(Self { base })
    }

    /// `<exe> -v -v [extra_args...] --repo <dest>`, the common prefix of
    /// every restic invocation.
    fn repo_command(&self, extra: &[String]) -> Vec<String> {
        let mut cmd = self.base.executable(RESTIC_BIN);
        cmd.extend(["-v", "-v"].map(String::from));
        cmd.extend(extra.iter().cloned());
        cmd.extend(self.base.spec().extra_args.iter().cloned());
        cmd.push("--repo".into());
        cmd.push(self.base.build_dest(":"));
        cmd
    }
}

impl<E: Executor> Transport for Restic<'_, E> {
    fn run(&mut self) -> Result<(), TransportError> {
        let spec = self.base.spec();

        let exclude_file = if spec.exclude.is_empty() {
            None
        } else {
            Some(write_list("exclude", &spec.exclude)?)
        };
        let exclude_arg: Vec<String> = exclude_file
            .iter()
            .map(|f| format!("--exclude-file={}", f.path().display()))
            .collect();

        let mut backup = self.repo_command(&exclude_arg);
        backup.push("backup".into());
        backup.push(spec.source_dir.clone());

        let mut cmds = vec![backup];
        if spec.expire_days > 0 {
            let mut forget = self.repo_command(&[]);
            forget.push("forget".into());
            forget.push(format!("--keep-within={}d", spec.expire_days));
            forget.push("--prune".into());
            cmds.push(forget);
        }

        Ok(self.base.run_chain("RESTIC", TARGET, &cmds, &[])?)
    }
}
