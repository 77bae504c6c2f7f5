//! The configuration driven physical backup workflow.
//!
//! A run is a fixed sequence of stages:
//!
//! 1. [xtrabackup]: the backup itself,
//! 2. [archive]: packing it into a `.tar.gz` (optional),
//! 3. [remote]: copying it to another host (optional),
//! 4. [retention](crate::util::retention): removing expired backups (optional),
//! 5. [notify](crate::notify): reporting the outcome (optional).
//!
//! The first failing stage ends the run. Its error is reported by a failure
//! notification and returned.

pub mod archive;
pub mod remote;
pub mod xtrabackup;

use std::fs;
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use derive_more::{Display, Error, From};

use crate::cli::BackupArgs;
use crate::command::{CommandError, Runner};
use crate::config::{BackupConfig, ConfigError};
use crate::notify::{self, Notifier, Report};
use crate::util::name_timestamp;
use crate::util::retention::{Retention, RetentionError};
use crate::util::runlog::RunLog;

/// The backup created by a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupResult {
    /// `<prefix>_<full|incr>_<timestamp>`
    pub backup_name: String,
    /// Directory xtrabackup writes to.
    pub target_dir: PathBuf,
    /// The final artifact: the archive, or [`target_dir`](Self::target_dir) if not archived.
    pub archive_path: PathBuf,
    pub log_path: PathBuf,
}

impl BackupResult {
    /// Names the backup of a run started at `now`.
    pub fn new(config: &BackupConfig, now: DateTime<Local>) -> Self {
        let backup_name = format!(
            "{}_{}_{}",
            config.backup_prefix,
            config.backup_type.token(),
            name_timestamp(&now)
        );
        let target_dir = config.backup_dir.join(&backup_name);
        let log_path = config.log_dir.join(format!("{backup_name}.log"));

        Self {
            archive_path: target_dir.clone(),
            backup_name,
            target_dir,
            log_path,
        }
    }
}

#[derive(Debug, Display, Error, From)]
/// Errors ending a backup run.
pub enum BackupError {
    /// The configuration can't be loaded or is invalid.
    #[display("{_0}")]
    #[from]
    Config(ConfigError),
    /// A directory can't be created.
    #[display("create {} failed: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },
    /// The log file of the run can't be opened.
    #[display("open log file {} failed: {source}", path.display())]
    LogFile { path: PathBuf, source: io::Error },
    /// Writing to the log file of the run failed.
    #[display("writing run log failed: {_0}")]
    RunLog(io::Error),
    /// The backup directory can't be listed.
    #[display("read backup_dir {} failed: {source}", path.display())]
    ReadBackupDir { path: PathBuf, source: io::Error },
    /// An incremental backup was requested without any full backup to base it on.
    #[display("no full backup found in {}, run a full backup first", _0.display())]
    NoFullBackup(#[error(ignore)] PathBuf),
    /// xtrabackup failed.
    #[display("xtrabackup: {source} (see log {})", log.display())]
    Engine { log: PathBuf, source: CommandError },
    /// The backup to archive can't be inspected.
    #[display("stat {} failed: {source}", path.display())]
    Stat { path: PathBuf, source: io::Error },
    /// Creating the archive failed.
    #[display("tar archive failed: {_0}")]
    Archive(CommandError),
    /// Copying to the remote host failed.
    #[display("scp failed: {_0}")]
    Transfer(CommandError),
    /// Removing expired backups failed.
    #[from]
    Retention(RetentionError),
}

/// A single run of the backup workflow.
pub struct Workflow<'a> {
    config: &'a BackupConfig,
    runner: &'a dyn Runner,
    notifier: Option<&'a dyn Notifier>,
    skip_remote: bool,
    dry_run: bool,
    echo: bool,
}

impl<'a> Workflow<'a> {
    /// Workflow for an already validated `config`.
    pub fn new(config: &'a BackupConfig, runner: &'a dyn Runner) -> Self {
        Self {
            config,
            runner,
            notifier: None,
            skip_remote: false,
            dry_run: false,
            echo: true,
        }
    }

    /// Receiver of the outcome of the run.
    pub fn notifier(mut self, notifier: Option<&'a dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Don't ship the backup even if remote shipping is enabled.
    pub fn skip_remote(mut self, skip_remote: bool) -> Self {
        self.skip_remote = skip_remote;
        self
    }

    /// Only report expired backups instead of removing them.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Echo the run log to the console.
    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Runs all stages and notifies about the outcome exactly once.
    pub fn run(&self) -> Result<BackupResult, BackupError> {
        let mut known = None;
        let outcome = self.stages(&mut known);

        if let Some(notifier) = self.notifier {
            let report = match &outcome {
                Ok(result) => Report::success(result),
                Err(e) => Report::failure(known.as_ref(), e),
            };
            notify::send(notifier, &report);
        }

        outcome
    }

    fn stages(&self, known: &mut Option<BackupResult>) -> Result<BackupResult, BackupError> {
        let config = self.config;

        for dir in [&config.backup_dir, &config.log_dir] {
            fs::create_dir_all(dir).map_err(|source| BackupError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }

        let mut result = BackupResult::new(config, Local::now());
        // no artifact until the engine succeeded
        *known = Some(BackupResult {
            archive_path: PathBuf::new(),
            ..result.clone()
        });

        let mut log = RunLog::open(&result.log_path).map_err(|source| BackupError::LogFile {
            path: result.log_path.clone(),
            source,
        })?;
        if !self.echo {
            log = log.quiet();
        }
        log.line(format_args!("starting backup: {}", result.backup_name))
            .map_err(BackupError::RunLog)?;

        xtrabackup::execute(config, &result, self.runner, &mut log)?;
        *known = Some(result.clone());

        if config.tar_archive {
            result.archive_path = archive::archive(&result.target_dir, self.runner, &mut log)?;
            *known = Some(result.clone());
        }
        log.line("backup finished").map_err(BackupError::RunLog)?;

        if config.remote.enabled {
            if self.skip_remote {
                log::info!(target: "backup::remote", "Skip sending to {}", remote::destination(&config.remote));
            } else {
                remote::ship(&config.remote, &result.archive_path, self.runner, &mut log)?;
            }
        }

        if config.retention_days > 0 {
            let swept = Retention::from_config(config).sweep(Local::now(), self.dry_run)?;
            log::debug!(
                target: "util::retention",
                "Removed {} backups and {} logs",
                swept.backups.len(),
                swept.logs.len()
            );
        }

        Ok(result)
    }
}

/// Runs the workflow configured by the file of `args`.
///
/// `notifier` selects the receiver from the loaded configuration. From then
/// on every outcome, including an invalid configuration, is reported exactly
/// once.
pub fn run_configured<'n, F>(
    args: &BackupArgs,
    runner: &dyn Runner,
    dry_run: bool,
    notifier: F,
) -> Result<BackupResult, BackupError>
where
    F: FnOnce(&BackupConfig) -> Option<Box<dyn Notifier + 'n>>,
{
    let mut config = BackupConfig::load(&args.config)?;
    config.apply_overrides(args.backup_type);
    let notifier = notifier(&config);

    if let Err(e) = config.validate_with(|program| runner.locate(program)) {
        if let Some(notifier) = &notifier {
            notify::send(&**notifier, &Report::failure(None, &e));
        }
        return Err(e.into());
    }

    Workflow::new(&config, runner)
        .notifier(notifier.as_deref())
        .skip_remote(args.skip_remote)
        .dry_run(dry_run)
        .run()
}
