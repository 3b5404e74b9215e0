//! Preparing a destination block device: LUKS, fsck and mounting.

use std::io;
use std::path::{Path, PathBuf};

use crate::execute::{self, ExecError, Executor};

const CRYPTSETUP_BIN: &str = "cryptsetup";
const FSCK_BIN: &str = "fsck";
const TUNE2FS_BIN: &str = "tune2fs";
const MOUNT_BIN: &str = "mount";
const UMOUNT_BIN: &str = "umount";

/// Name of the `/dev/mapper` device opened for the backup `name`.
pub fn mapper_name(name: &str) -> String {
    format!("netbackup_{name}")
}

fn run(executor: &dyn Executor, tag: &str, argv: Vec<String>) -> Result<(), ExecError> {
    execute::run_command(tag, &argv, Some(executor), &[], &[])
}

/// `cryptsetup [--key-file=<keyfile>] luksOpen <dev> <mapper_name>`
pub fn luks_open(
    executor: &dyn Executor,
    dev: &str,
    keyfile: Option<&Path>,
    mapper_name: &str,
) -> Result<(), ExecError> {
    let mut cmd = vec![CRYPTSETUP_BIN.to_string()];
    if let Some(keyfile) = keyfile {
        cmd.push(format!("--key-file={}", keyfile.display()));
    }
    cmd.extend(["luksOpen", dev, mapper_name].map(String::from));
    run(executor, "LUKS_OPEN", cmd)
}

/// `cryptsetup luksClose <mapper_dev>`
pub fn luks_close(executor: &dyn Executor, mapper_dev: &str) -> Result<(), ExecError> {
    run(
        executor,
        "LUKS_CLOSE",
        [CRYPTSETUP_BIN, "luksClose", mapper_dev].map(String::from).to_vec(),
    )
}

/// Read-only fsck of `dev`, then resets its mount count and last check time.
///
/// Only meaningful for ext filesystems.
pub fn fs_cleanup(executor: &dyn Executor, dev: &str) -> Result<(), ExecError> {
    run(
        executor,
        "FS_CLEANUP",
        [FSCK_BIN, "-n", dev].map(String::from).to_vec(),
    )?;
    run(
        executor,
        "FS_CLEANUP",
        [TUNE2FS_BIN, "-C", "0", "-T", "now", dev]
            .map(String::from)
            .to_vec(),
    )
}

/// Creates a fresh directory to mount the destination device on.
///
/// The directory is not removed automatically; call
/// [`std::fs::remove_dir`] once it's unmounted.
pub fn create_mount_dir() -> io::Result<PathBuf> {
    Ok(tempfile::Builder::new()
        .prefix("netbackup_mount")
        .tempdir()?
        .keep())
}

/// `mount <dev> <dir>`
///
/// The `mount` binary is used instead of the syscall so `/etc/fstab`
/// options apply.
pub fn mount(executor: &dyn Executor, dev: &str, dir: &Path) -> Result<(), ExecError> {
    run(
        executor,
        "MOUNT",
        vec![MOUNT_BIN.into(), dev.into(), dir.display().to_string()],
    )
}

/// `umount <dev>`
pub fn umount(executor: &dyn Executor, dev: &str) -> Result<(), ExecError> {
    run(executor, "UMOUNT", [UMOUNT_BIN, dev].map(String::from).to_vec())
}
