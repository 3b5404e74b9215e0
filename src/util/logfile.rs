//! Per-run log file.
//!
//! Every run appends to a log file named after the backup and the current
//! date. Everything logged is mirrored to standard error as well.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use derive_more::{Display, Error};

/// `<log_dir>/<name>/netbackup-<name>-YYYY-MM-DD.log`
pub fn log_path(name: &str, log_dir: &Path, date: NaiveDate) -> PathBuf {
    log_dir
        .join(name)
        .join(format!("netbackup-{name}-{}.log", date.format("%Y-%m-%d")))
}

#[derive(Debug, Display, Error)]
#[display("unable to open log file {}: {source}", path.display())]
pub struct LogFileError {
    path: PathBuf,
    source: io::Error,
}

/// Opens `path` for appending, creating it and its parent directories if
/// needed.
pub fn open_log(path: &Path) -> Result<File, LogFileError> {
    let open = || {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(path)
    };
    open().map_err(|source| LogFileError {
        path: path.to_path_buf(),
        source,
    })
}

/// Writer duplicating everything into two writers.
#[derive(Debug)]
pub struct Tee<A, B> {
    first: A,
    second: B,
}

impl<A: Write, B: Write> Tee<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: Write, B: Write> Write for Tee<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.first.write_all(buf)?;
        self.second.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.first.flush()?;
        self.second.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_layout() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).expect("date should be valid");

        assert_eq!(
            log_path("home", Path::new("/var/log/netbackup"), date),
            Path::new("/var/log/netbackup/home/netbackup-home-2024-03-09.log")
        );
    }

    #[test]
    fn open_creates_directories_and_appends() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().join("a/b/run.log");

        writeln!(open_log(&path).expect("log should open"), "first").expect("write should work");
        writeln!(open_log(&path).expect("log should reopen"), "second").expect("write should work");

        assert_eq!(
            fs::read_to_string(&path).expect("log should be readable"),
            "first\nsecond\n"
        );
    }

    #[test]
    fn open_reports_path_on_failure() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let blocker = dir.path().join("file");
        fs::write(&blocker, "").expect("blocker should be written");

        let err = open_log(&blocker.join("run.log")).expect_err("parent is a file");

        assert!(err.to_string().contains("run.log"), "{err}");
    }

    #[test]
    fn tee_writes_both() {
        let mut tee = Tee::new(Vec::new(), Vec::new());
        write!(tee, "hello").expect("write to vec should work");
        tee.flush().expect("flush should work");

        assert_eq!(tee.first, b"hello");
        assert_eq!(tee.second, b"hello");
    }
}
