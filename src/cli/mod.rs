use std::path::PathBuf;

use clap::{ArgAction, Parser};
use log::LevelFilter;

/// Frontend to simplify periodic backups.
///
/// Runs rsync, rclone, rdiff-backup, restic or a custom command as
/// described by a backup configuration file, optionally onto a LUKS
/// encrypted and/or temporarily mounted destination device.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Backup configuration file.
    #[arg(long, short = 'c')]
    pub config: PathBuf,

    /// Only log the commands that would run.
    #[arg(long, short = 'n')]
    pub dry_run: bool,

    /// Verbose mode (repeat to increase verbosity).
    #[arg(long, short = 'v', action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Log level selected by the number of `-v` flags.
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use rstest::rstest;

    use super::*;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[rstest]
    #[case(&[], LevelFilter::Warn)]
    #[case(&["-v"], LevelFilter::Info)]
    #[case(&["-vv"], LevelFilter::Debug)]
    #[case(&["-v", "--verbose", "-v"], LevelFilter::Trace)]
    #[case(&["-vvvvv"], LevelFilter::Trace)]
    fn verbosity(#[case] flags: &[&str], #[case] level: LevelFilter) {
        let args = ["netbackup", "-c", "backup.toml"].iter().chain(flags);
        let cli = Cli::try_parse_from(args).expect("flags should parse");

        assert_eq!(cli.log_level(), level);
    }

    #[test]
    fn short_and_long_flags() {
        let cli = Cli::try_parse_from(["netbackup", "--config", "/etc/netbackup/home.toml", "-n"])
            .expect("flags should parse");

        assert_eq!(cli.config, PathBuf::from("/etc/netbackup/home.toml"));
        assert!(cli.dry_run);
    }

    #[test]
    fn config_is_required() {
        let err = Cli::try_parse_from(["netbackup", "-n"]).expect_err("config is missing");

        assert_eq!(err.exit_code(), 2);
    }
}
