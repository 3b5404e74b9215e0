use std::io;
use std::process::ExitCode;

use clap::Parser;
use env_logger::{Target, WriteStyle};
use log::LevelFilter;

use netbackup_lib::backup::Backup;
use netbackup_lib::cli::Cli;
use netbackup_lib::config::{BackupSpec, DEFAULT_LOG_DIR};
use netbackup_lib::execute::ProcessExecutor;
use netbackup_lib::prometheus;
use netbackup_lib::util::logfile::{self, Tee};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let spec = match BackupSpec::load(&cli.config) {
        Ok(spec) => spec,
        Err(e) => {
            init_logger(cli.log_level(), Target::Stderr);
            log::error!("Reading the config file {} failed: {e}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };

    let log_path = spec.log_file.clone().unwrap_or_else(|| {
        let log_dir = spec.log_dir.as_deref().unwrap_or(DEFAULT_LOG_DIR.as_ref());
        logfile::log_path(&spec.name, log_dir, chrono::Local::now().date_naive())
    });
    let log_file = match logfile::open_log(&log_path) {
        Ok(file) => file,
        Err(e) => {
            init_logger(cli.log_level(), Target::Stderr);
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    init_logger(
        cli.log_level(),
        Target::Pipe(Box::new(Tee::new(io::stderr(), log_file))),
    );

    let dry_run = cli.dry_run;
    if dry_run {
        log::warn!("Dry-run mode: no commands will be executed");
    }
    log::debug!("Logging to {}", log_path.display());

    let mut backup = Backup::new(spec, ProcessExecutor, dry_run);
    if let Err(e) = backup.run() {
        log::error!("*** Backup Result: Failure ({e})");
        return ExitCode::FAILURE;
    }

    if let Some(textfile) = &backup.spec().prometheus_textfile {
        if dry_run {
            log::info!("Not updating {} on a dry run", textfile.display());
        } else if let Err(e) = prometheus::write_textfile(textfile, &backup.spec().name) {
            log::warn!("Unable to update Prometheus textfile {}: {e}", textfile.display());
        }
    }

    log::info!("*** Backup Result: Success");
    ExitCode::SUCCESS
}

fn init_logger(level: LevelFilter, target: Target) {
    let mut env_logger = env_logger::builder();
    env_logger
        .filter_level(level)
        .format_timestamp_secs()
        .write_style(WriteStyle::Never)
        .target(target);
    if let Err(e) = env_logger.try_init() {
        eprintln!("Unable to initialize logging: {e}");
    }
}
