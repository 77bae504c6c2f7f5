//! Physical backups with [Percona XtraBackup](https://docs.percona.com/percona-xtrabackup/).

use std::fs;
use std::path::{Path, PathBuf};

use crate::backup::{BackupError, BackupResult};
use crate::command::{Invocation, Runner};
use crate::config::{BackupConfig, BackupType};
use crate::util::runlog::RunLog;

/// Seconds xtrabackup waits for `FLUSH TABLES WITH READ LOCK` and backup locks.
pub const LOCK_WAIT_TIMEOUT: u32 = 300;

/// Returns the most recent full backup directory below `backup_dir`.
///
/// Backup names embed a timestamp that sorts chronologically, so the
/// lexicographically greatest `<prefix>_full_*` directory is the newest.
pub fn latest_full(backup_dir: &Path, prefix: &str) -> Result<PathBuf, BackupError> {
    let full_prefix = format!("{prefix}_{}_", BackupType::Full.token());

    let entries = fs::read_dir(backup_dir).map_err(|source| BackupError::ReadBackupDir {
        path: backup_dir.to_path_buf(),
        source,
    })?;

    entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with(&full_prefix))
        .max()
        .map(|name| backup_dir.join(name))
        .ok_or_else(|| BackupError::NoFullBackup(backup_dir.to_path_buf()))
}

/// Arguments of the xtrabackup invocation writing into `target_dir`.
pub fn arguments(config: &BackupConfig, target_dir: &Path, basedir: Option<&Path>) -> Vec<String> {
    let mysql = &config.mysql;
    let xtrabackup = &config.xtrabackup;

    let mut args = vec![
        format!("--defaults-file={}", mysql.defaults_file.display()),
        format!("--user={}", mysql.user),
        format!("--password={}", mysql.password),
        "--backup".to_string(),
        format!("--target-dir={}", target_dir.display()),
        format!("--parallel={}", xtrabackup.parallel),
        format!("--ftwrl-wait-timeout={LOCK_WAIT_TIMEOUT}"),
        format!("--backup-lock-timeout={LOCK_WAIT_TIMEOUT}"),
    ];

    if mysql.socket.as_os_str().is_empty() {
        args.push(format!("--host={}", mysql.host));
        args.push(format!("--port={}", mysql.port));
    } else {
        args.push(format!("--socket={}", mysql.socket.display()));
    }

    if xtrabackup.compress {
        args.push("--compress".to_string());
        args.push(format!("--compress-threads={}", xtrabackup.compress_threads));
    }

    if let Some(basedir) = basedir {
        args.push(format!("--incremental-basedir={}", basedir.display()));
    }

    args.extend(xtrabackup.extra_args.iter().cloned());
    args
}

/// Runs xtrabackup for the backup described by `result`.
///
/// Incremental backups need a previous full backup; without one the engine
/// is never started.
pub fn execute(
    config: &BackupConfig,
    result: &BackupResult,
    runner: &dyn Runner,
    log: &mut RunLog,
) -> Result<(), BackupError> {
    let basedir = match config.backup_type {
        BackupType::Full => None,
        BackupType::Incremental => {
            let basedir = latest_full(&config.backup_dir, &config.backup_prefix)?;
            log.line(format_args!("incremental basedir: {}", basedir.display()))
                .map_err(BackupError::RunLog)?;
            Some(basedir)
        }
    };

    fs::create_dir_all(&result.target_dir).map_err(|source| BackupError::CreateDir {
        path: result.target_dir.clone(),
        source,
    })?;

    let invocation = Invocation::new(&config.xtrabackup.bin).args(arguments(
        config,
        &result.target_dir,
        basedir.as_deref(),
    ));
    log::info!(target: "backup::xtrabackup", "Create {} backup {}", config.backup_type, result.backup_name);
    log.line(format_args!("exec: {invocation}"))
        .map_err(BackupError::RunLog)?;

    runner
        .run(&invocation, log)
        .map_err(|source| BackupError::Engine {
            log: result.log_path.clone(),
            source,
        })?;

    log::info!(target: "backup::xtrabackup", "Finished backup {}", result.backup_name);
    Ok(())
}
