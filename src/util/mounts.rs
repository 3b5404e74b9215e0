use std::fs;
use std::io;
use std::path::Path;

/// Kernel's view of the mounted filesystems.
pub const PROC_MOUNTS: &str = "/proc/mounts";

/// Checks whether `dir` is a mountpoint according to `mounts_file`.
///
/// `mounts_file` is in `/proc/mounts` format; the second field of every line
/// is a mountpoint.
pub fn is_mounted(dir: &str, mounts_file: &Path) -> io::Result<bool> {
    let mounts = fs::read_to_string(mounts_file)?;
    Ok(mounts
        .lines()
        .any(|line| line.split_whitespace().nth(1) == Some(dir)))
}
