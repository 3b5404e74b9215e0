//! The backup specification and its configuration file.
//!
//! A backup is described by a small TOML file, for example:
//!
//! ```toml
//! name = "home"
//! transport = "rsync"
//! source_dir = "/home"
//! luks_dest_dev = "/dev/disk/by-uuid/1234"
//! luks_keyfile = "/etc/netbackup/home.key"
//! exclude = ["/home/*/.cache"]
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use derive_more::{Display, Error};
use serde::{Deserialize, Deserializer};

/// Base directory for run logs when neither `log_dir` nor `log_file` is set.
pub const DEFAULT_LOG_DIR: &str = "/var/log/netbackup";

/// External program performing the actual copy.
#[derive(Copy, Clone, Debug, Default, Display, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    #[default]
    #[display("rsync")]
    Rsync,
    #[display("rclone")]
    Rclone,
    #[display("rdiff-backup")]
    RdiffBackup,
    #[display("restic")]
    Restic,
    #[display("custom")]
    Custom,
}

/// Everything needed to run one backup.
///
/// Host, directory and device fields use the empty string for "unset", as
/// they are glued together into transport arguments.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackupSpec {
    /// Name of the backup, used in log paths and the metrics record.
    pub name: String,
    pub transport: TransportKind,

    #[serde(default)]
    pub source_host: String,
    pub source_dir: String,
    #[serde(default)]
    pub dest_host: String,
    #[serde(default)]
    pub dest_dir: String,
    /// Block device mounted as destination.
    #[serde(default)]
    pub dest_dev: String,
    /// LUKS encrypted block device opened and mounted as destination.
    #[serde(default)]
    pub luks_dest_dev: String,
    #[serde(default)]
    pub luks_keyfile: Option<PathBuf>,

    #[serde(default, deserialize_with = "words")]
    pub include: Vec<String>,
    #[serde(default, deserialize_with = "words")]
    pub exclude: Vec<String>,
    /// Appended verbatim to the transport command line.
    #[serde(default, deserialize_with = "words")]
    pub extra_args: Vec<String>,

    /// Replaces the transport executable (and may add leading arguments).
    #[serde(default)]
    pub custom_bin: String,
    /// Shell command run by the `custom` transport.
    #[serde(default)]
    pub custom_cmd: String,

    #[serde(default)]
    pub pre_command: String,
    #[serde(default)]
    pub post_command: String,
    #[serde(default)]
    pub fail_command: String,

    /// Refuse to run unless `source_dir` is a mount point.
    #[serde(default)]
    pub source_is_mountpoint: bool,
    /// Check and tune the destination filesystem before mounting it.
    #[serde(default)]
    pub fs_cleanup: bool,
    /// Drop history older than this many days (0 keeps everything).
    #[serde(default)]
    pub expire_days: u32,

    #[serde(default)]
    pub prometheus_textfile: Option<PathBuf>,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

/// Errors while loading a [`BackupSpec`].
#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("unable to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[display("error loading config: {_0}")]
    Parse(toml::de::Error),
    #[display("{_0}")]
    Invalid(#[error(ignore)] String),
}

fn invalid(msg: impl Into<String>) -> Result<(), ConfigError> {
    Err(ConfigError::Invalid(msg.into()))
}

/// Accepts either a list of strings or a single whitespace separated string.
fn words<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Words {
        List(Vec<String>),
        Line(String),
    }

    Ok(match Words::deserialize(deserializer)? {
        Words::List(list) => list,
        Words::Line(line) => line.split_whitespace().map(str::to_string).collect(),
    })
}

impl BackupSpec {
    /// Reads, parses and validates the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse()
    }

    /// Fills in defaults that depend on other fields.
    fn apply_defaults(&mut self) {
        if self.log_file.is_none() && self.log_dir.is_none() {
            self.log_dir = Some(PathBuf::from(DEFAULT_LOG_DIR));
        }
    }

    /// Checks the combination of fields, naming the offending one on error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let dests = [&self.dest_dir, &self.dest_dev, &self.luks_dest_dev]
            .iter()
            .filter(|d| !d.is_empty())
            .count();
        let has_dev = !self.dest_dev.is_empty() || !self.luks_dest_dev.is_empty();

        if self.name.is_empty() {
            return invalid("name cannot be empty");
        }
        if self.source_dir.is_empty() {
            return invalid("source_dir cannot be empty");
        }
        if self.log_file.is_some() && self.log_dir.is_some() {
            return invalid("either log_dir or log_file can be set");
        }
        if dests == 0 {
            return invalid("no destination set (dest_dir, dest_dev or luks_dest_dev)");
        }
        if dests > 1 {
            return invalid("only one destination (dest_dir, dest_dev, or luks_dest_dev) may be set");
        }
        if has_dev && !self.dest_host.is_empty() {
            return invalid("cannot have dest_dev and dest_host set, remote mounting not supported");
        }
        if !has_dev && self.fs_cleanup {
            return invalid("fs_cleanup can only be used when destination is a device");
        }
        if !self.source_host.is_empty() && self.source_is_mountpoint {
            return invalid("source_is_mountpoint cannot be validated with a source_host");
        }
        if self.source_host.is_empty() && !is_absolute(&self.source_dir) {
            return invalid("source_dir must be an absolute path");
        }
        if self.dest_host.is_empty() && !self.dest_dir.is_empty() && !is_absolute(&self.dest_dir) {
            return invalid("dest_dir must be an absolute path");
        }
        if !self.dest_dev.is_empty() && !is_absolute(&self.dest_dev) {
            return invalid("dest_dev must be an absolute path");
        }
        if !self.luks_dest_dev.is_empty() && !is_absolute(&self.luks_dest_dev) {
            return invalid("luks_dest_dev must be an absolute path");
        }
        if !self.luks_dest_dev.is_empty() && self.luks_keyfile.is_none() {
            return invalid("luks_dest_dev requires luks_keyfile");
        }
        if !self.custom_cmd.is_empty() && self.transport != TransportKind::Custom {
            return invalid("custom_cmd can only be used with the custom transport");
        }
        Ok(())
    }
}

impl std::str::FromStr for BackupSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut spec: Self = toml::from_str(s).map_err(ConfigError::Parse)?;
        spec.apply_defaults();
        spec.validate()?;
        Ok(spec)
    }
}

fn is_absolute(path: &str) -> bool {
    Path::new(path).is_absolute()
}
