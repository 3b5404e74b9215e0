//! Temporary pattern files handed to the transports.
//!
//! The files live in the system temporary directory and are removed when
//! the returned [`NamedTempFile`] is dropped, so keeping it alive for the
//! duration of the transport run is all the cleanup needed.

use std::io::{self, Write};

use tempfile::NamedTempFile;

const TARGET: &str = "netbackup::transport::filter";

/// Writes one pattern per line into a fresh temporary file named `<prefix>*`.
pub fn write_list(prefix: &str, patterns: &[String]) -> io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new().prefix(prefix).tempfile()?;
    for pattern in patterns {
        writeln!(file, "{pattern}")?;
    }
    file.flush()?;

    log::trace!(target: TARGET, "Contents of {:?} file:", file.path());
    for pattern in patterns {
        log::trace!(target: TARGET, "{pattern}");
    }
    Ok(file)
}

/// Writes an rsync/rclone style filter file.
///
/// Includes come first as `+ <pattern>`, then excludes as `- <pattern>`.
/// Returns `None` when there is nothing to filter.
pub fn create_filter_file(
    include: &[String],
    exclude: &[String],
) -> io::Result<Option<NamedTempFile>> {
    if include.is_empty() && exclude.is_empty() {
        return Ok(None);
    }

    let rules: Vec<String> = include
        .iter()
        .map(|p| format!("+ {p}"))
        .chain(exclude.iter().map(|p| format!("- {p}")))
        .collect();

    let file = write_list("filter", &rules)?;
    log::debug!(target: TARGET, "Filter file: {:?}", file.path());
    Ok(Some(file))
}
