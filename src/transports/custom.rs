//! Runs an arbitrary command line through the user's shell.

use crate::config::BackupSpec;
use crate::execute::{self, Executor};

use super::{Transport, TransportBase, TransportError};

const TARGET: &str = "netbackup::transport::custom";

#[derive(Debug)]
pub struct Custom<'a, E> {
    base: TransportBase<'a, E>,
}

impl<'a, E: Executor> Custom<'a, E> {
    pub fn new(spec: &'a BackupSpec, executor: E, dry_run: bool) -> Result<Self, TransportError> {
        if spec.custom_cmd.is_empty() {
            return Err(TransportError::Config("custom_cmd is empty"));
        }
        Ok(Self {
            base: TransportBase::new(spec, executor, dry_run),
        })
    }
}

impl<E: Executor> Transport for Custom<'_, E> {
    fn run(&mut self) -> Result<(), TransportError> {
        let cmd = execute::with_shell(&self.base.spec().custom_cmd);
        Ok(self.base.run_chain("CUSTOM", TARGET, &[cmd], &[])?)
    }
}
