//! Success records for the Prometheus node-exporter textfile collector.
//!
//! The textfile holds one line per backup name:
//!
//! ```text
//! backup{name="home", job="netbackup", status="success"} 1700000000
//! ```
//!
//! Several backups may share one textfile, so updates are serialized with an
//! advisory lock on `<textfile>.lock` and the new content replaces the old
//! one by an atomic rename.

use std::ffi::OsString;
use std::fs::{self, OpenOptions, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use derive_more::{Display, Error, From};
use fs4::fs_std::FileExt;
use regex::Regex;

const TARGET: &str = "netbackup::prometheus";

#[derive(Debug, Display, Error, From)]
pub enum TextfileError {
    #[display("error locking {}: {source}", path.display())]
    Lock { path: PathBuf, source: io::Error },
    #[display("error reading textfile: {_0}")]
    Read(io::Error),
    #[from]
    #[display("invalid backup name: {_0}")]
    Name(regex::Error),
    #[display("error writing textfile: {_0}")]
    Write(io::Error),
}

/// Records a successful run of backup `name` in the textfile at `path`.
///
/// A previous record for `name` is replaced, every other line is kept.
pub fn write_textfile(path: &Path, name: &str) -> Result<(), TextfileError> {
    let lock_path = lock_path(path);
    let lock = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .and_then(|file| file.lock_exclusive().map(|()| file))
        .map_err(|source| TextfileError::Lock {
            path: lock_path.clone(),
            source,
        })?;

    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(TextfileError::Read(e)),
    };

    let quoted = format!("{name:?}");
    let own_record = Regex::new(&format!(r"^backup\s*\{{.*name={}.*", regex::escape(&quoted)))?;

    let mut output: String = contents
        .lines()
        .filter(|line| !line.is_empty() && !own_record.is_match(line))
        .flat_map(|line| [line, "\n"])
        .collect();
    output.push_str(&format!(
        "backup{{name={quoted}, job=\"netbackup\", status=\"success\"}} {}\n",
        Utc::now().timestamp()
    ));

    replace(path, &output).map_err(TextfileError::Write)?;
    log::debug!(target: TARGET, "Updated {} for {name:?}", path.display());

    // Lock is released on close.
    drop(lock);
    Ok(())
}

fn lock_path(path: &Path) -> PathBuf {
    let mut lock = OsString::from(path.as_os_str());
    lock.push(".lock");
    PathBuf::from(lock)
}

/// Atomically replaces `path` with `contents`, world readable.
fn replace(path: &Path, contents: &str) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let prefix = path.file_name().unwrap_or_else(|| "textfile".as_ref());

    let mut temp = tempfile::Builder::new().prefix(prefix).tempfile_in(dir)?;
    temp.write_all(contents.as_bytes())?;
    temp.as_file().set_permissions(Permissions::from_mode(0o644))?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
