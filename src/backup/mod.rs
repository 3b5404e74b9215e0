//! One backup run, from preparing the destination to releasing it again.
//!
//! [`Backup::run`] walks through the following stages, each one optional
//! depending on the [`BackupSpec`]:
//!
//! 1. check that the source directory is a mountpoint
//! 2. open the LUKS destination device
//! 3. fsck the destination device
//! 4. mount the destination device on a temporary directory
//! 5. run the pre hook, the transport and the post or fail hook
//!
//! Everything acquired on the way registers a teardown step. The steps run
//! in reverse order once the run is over, whether it succeeded or not.
//!
//! # Dry Run
//!
//! On a dry run the destination is left alone and no hooks run. Placeholder
//! device and directory names are filled in so the transport can still log
//! a complete command line.

pub mod device;
pub mod signals;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use derive_more::{Display, Error};

use crate::config::{BackupSpec, TransportKind};
use crate::execute::{self, ExecError, Executor};
use crate::transports::{self, TransportError};
use crate::util::mounts::{self, PROC_MOUNTS};

pub use signals::SignalWindow;

const TARGET: &str = "netbackup::backup";

const DEV_MAPPER_DIR: &str = "/dev/mapper";

/// Pause before unmounting or closing a device. Right after the transport
/// exits the kernel sometimes still reports the filesystem as busy.
pub const SETTLE_DELAY: Duration = Duration::from_secs(2);

const DUMMY_DEST_DEV: &str = "dummy_dest_dev";
const DUMMY_DEST_DIR: &str = "dummy_dest_dir";

/// Errors aborting a backup run.
#[derive(Debug, Display, Error)]
pub enum BackupError {
    #[display("unable to verify if source_dir is mounted: {_0}")]
    MountCheck(io::Error),
    #[display("source dir ({_0}) should be a mountpoint, but is not mounted")]
    SourceNotMounted(#[error(ignore)] String),
    #[display("device mapper file {} already exists", _0.display())]
    MapperExists(#[error(ignore)] PathBuf),
    #[display("error opening LUKS device {dev:?}: {source}")]
    LuksOpen { dev: String, source: ExecError },
    #[display("error performing pre-backup cleanup on {dev:?}: {source}")]
    FsCleanup { dev: String, source: ExecError },
    #[display("unable to create temp directory: {_0}")]
    MountDir(io::Error),
    #[display("error opening destination device {dev:?}: {source}")]
    Mount { dev: String, source: ExecError },
    #[display("error creating {kind} transport: {source}")]
    TransportSetup {
        kind: TransportKind,
        source: TransportError,
    },
    #[display("error running pre-command: {_0}")]
    PreCommand(ExecError),
    #[display("unable to set up signal handling: {_0}")]
    Signals(io::Error),
    /// The transport failed. The fail hook, if any, has already run.
    #[display("{kind} backup failed: {source}")]
    Transport {
        kind: TransportKind,
        source: TransportError,
    },
    #[display("error running post-command (possible backup failure): {_0}")]
    PostCommand(ExecError),
}

/// Release of something acquired during the run.
#[derive(Debug, PartialEq, Eq)]
enum Teardown {
    /// Wait for the kernel to let go of the device.
    Settle,
    CloseLuks(String),
    Unmount(String),
    RemoveMountDir(PathBuf),
}

/// A single backup run.
#[derive(Debug)]
pub struct Backup<E> {
    spec: BackupSpec,
    executor: E,
    dry_run: bool,
    settle_delay: Duration,
    mounts_file: PathBuf,
    devmapper_dir: PathBuf,
}

impl<E: Executor> Backup<E> {
    pub fn new(spec: BackupSpec, executor: E, dry_run: bool) -> Self {
        Self {
            spec,
            executor,
            dry_run,
            settle_delay: SETTLE_DELAY,
            mounts_file: PathBuf::from(PROC_MOUNTS),
            devmapper_dir: PathBuf::from(DEV_MAPPER_DIR),
        }
    }

    /// Replaces the [`SETTLE_DELAY`].
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Reads mountpoints from `path` instead of `/proc/mounts`.
    pub fn with_mounts_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.mounts_file = path.into();
        self
    }

    /// Looks for LUKS mapper devices in `dir` instead of `/dev/mapper`.
    pub fn with_devmapper_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.devmapper_dir = dir.into();
        self
    }

    /// The spec as seen by the transport, with the effective `dest_dev`
    /// and `dest_dir` once the destination is prepared.
    pub fn spec(&self) -> &BackupSpec {
        &self.spec
    }

    /// Runs the backup and releases everything acquired for it.
    ///
    /// # Errors
    ///
    /// Returns the first failure. Failing teardown steps are logged only.
    pub fn run(&mut self) -> Result<(), BackupError> {
        let mut teardown = Vec::new();
        let res = self.prepare(&mut teardown).and_then(|()| self.transfer());

        while let Some(step) = teardown.pop() {
            self.release(step);
        }
        res
    }

    fn prepare(&mut self, teardown: &mut Vec<Teardown>) -> Result<(), BackupError> {
        if self.dry_run {
            if !self.spec.luks_dest_dev.is_empty() {
                self.spec.dest_dev = DUMMY_DEST_DEV.into();
            }
            if !self.spec.dest_dev.is_empty() {
                self.spec.dest_dir = DUMMY_DEST_DIR.into();
            }
            return Ok(());
        }

        // Backing up an unmounted, empty source would wipe the destination.
        if self.spec.source_is_mountpoint {
            let mounted = mounts::is_mounted(&self.spec.source_dir, &self.mounts_file)
                .map_err(BackupError::MountCheck)?;
            if !mounted {
                return Err(BackupError::SourceNotMounted(self.spec.source_dir.clone()));
            }
        }

        if !self.spec.luks_dest_dev.is_empty() {
            let mapper_dev = self.open_luks()?;
            teardown.push(Teardown::CloseLuks(mapper_dev.clone()));
            teardown.push(Teardown::Settle);
            self.spec.dest_dev = mapper_dev;
        }

        if self.spec.fs_cleanup {
            device::fs_cleanup(&self.executor, &self.spec.dest_dev).map_err(|source| {
                BackupError::FsCleanup {
                    dev: self.spec.dest_dev.clone(),
                    source,
                }
            })?;
        }

        if !self.spec.dest_dev.is_empty() {
            let dir = device::create_mount_dir().map_err(BackupError::MountDir)?;
            teardown.push(Teardown::RemoveMountDir(dir.clone()));

            device::mount(&self.executor, &self.spec.dest_dev, &dir).map_err(|source| {
                BackupError::Mount {
                    dev: self.spec.dest_dev.clone(),
                    source,
                }
            })?;
            teardown.push(Teardown::Unmount(self.spec.dest_dev.clone()));
            teardown.push(Teardown::Settle);

            self.spec.dest_dir = dir.display().to_string();
        }
        Ok(())
    }

    /// Opens the LUKS device and returns the path of the mapper device.
    fn open_luks(&self) -> Result<String, BackupError> {
        let name = device::mapper_name(&self.spec.name);
        let mapper_dev = self.devmapper_dir.join(&name);
        if mapper_dev.exists() {
            return Err(BackupError::MapperExists(mapper_dev));
        }

        device::luks_open(
            &self.executor,
            &self.spec.luks_dest_dev,
            self.spec.luks_keyfile.as_deref(),
            &name,
        )
        .map_err(|source| BackupError::LuksOpen {
            dev: self.spec.luks_dest_dev.clone(),
            source,
        })?;
        Ok(mapper_dev.display().to_string())
    }

    fn transfer(&self) -> Result<(), BackupError> {
        let spec = &self.spec;
        let kind = spec.transport;

        let mut transport = transports::new_transport(spec, &self.executor, self.dry_run)
            .map_err(|source| BackupError::TransportSetup { kind, source })?;

        if let Some(cmd) = self.hook(&spec.pre_command) {
            self.run_hook("PRE-COMMAND", cmd)
                .map_err(BackupError::PreCommand)?;
        }

        let res = {
            let _window = SignalWindow::open().map_err(BackupError::Signals)?;
            transport.run()
        };

        if let Err(source) = res {
            log::info!(target: TARGET, "Error running backup: {source}");
            if let Some(cmd) = self.hook(&spec.fail_command) {
                log::info!(target: TARGET, "Running fail-command on backup error: {cmd:?}");
                if let Err(e) = self.run_hook("FAIL-COMMAND", cmd) {
                    log::info!(target: TARGET, "Error running fail-command: {e}");
                }
            }
            return Err(BackupError::Transport { kind, source });
        }

        if let Some(cmd) = self.hook(&spec.post_command) {
            self.run_hook("POST-COMMAND", cmd)
                .map_err(BackupError::PostCommand)?;
        }
        Ok(())
    }

    /// Hooks never run on a dry run.
    fn hook<'s>(&self, cmd: &'s str) -> Option<&'s str> {
        (!self.dry_run && !cmd.is_empty()).then_some(cmd)
    }

    fn run_hook(&self, tag: &str, cmd: &str) -> Result<(), ExecError> {
        execute::run_command(tag, &execute::with_shell(cmd), Some(&self.executor), &[], &[])
    }

    fn release(&self, step: Teardown) {
        match step {
            Teardown::Settle => {
                log::debug!(target: TARGET, "Waiting {:?} for the device to settle", self.settle_delay);
                thread::sleep(self.settle_delay);
            }
            Teardown::CloseLuks(dev) => {
                if let Err(e) = device::luks_close(&self.executor, &dev) {
                    log::error!(target: TARGET, "Unable to close LUKS device {dev:?}: {e}");
                }
            }
            Teardown::Unmount(dev) => {
                if let Err(e) = device::umount(&self.executor, &dev) {
                    log::error!(target: TARGET, "Unable to unmount {dev:?}: {e}");
                }
            }
            Teardown::RemoveMountDir(dir) => remove_mount_dir(&dir),
        }
    }
}

/// Removes the temporary mountpoint. A directory still mounted is not empty
/// and stays untouched.
fn remove_mount_dir(dir: &Path) {
    if let Err(e) = fs::remove_dir(dir) {
        log::warn!(target: TARGET, "Unable to remove mount point {}: {e}", dir.display());
    }
}
