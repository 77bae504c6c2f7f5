use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Days, Local};
use derive_more::{Display, Error};

use crate::config::BackupConfig;

/// Age based retention of backups and their logs.
///
/// There is no minimum number of backups that is kept: everything older than
/// the cutoff goes.
#[derive(Copy, Clone, Debug)]
pub struct Retention<'a> {
    backup_dir: &'a Path,
    log_dir: &'a Path,
    prefix: &'a str,
    days: u32,
}

#[derive(Debug, Display, Error)]
/// Errors on sweeping old backups.
pub enum RetentionError {
    /// The backup directory can't be listed.
    #[display("cleanup read dir {} failed: {source}", path.display())]
    ReadDir { path: PathBuf, source: io::Error },
    /// An expired backup can't be removed.
    #[display("cleanup remove {} failed: {source}", path.display())]
    Remove { path: PathBuf, source: io::Error },
}

/// What a sweep removed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Swept {
    pub backups: Vec<PathBuf>,
    pub logs: Vec<PathBuf>,
}

impl<'a> Retention<'a> {
    pub fn new(backup_dir: &'a Path, log_dir: &'a Path, prefix: &'a str, days: u32) -> Self {
        Self {
            backup_dir,
            log_dir,
            prefix,
            days,
        }
    }

    pub fn from_config(config: &'a BackupConfig) -> Self {
        Self::new(
            &config.backup_dir,
            &config.log_dir,
            &config.backup_prefix,
            config.retention_days,
        )
    }

    /// Entries modified before the cutoff are expired.
    pub fn cutoff(&self, now: DateTime<Local>) -> DateTime<Local> {
        now.checked_sub_days(Days::new(self.days.into()))
            .unwrap_or(DateTime::<Local>::MIN_UTC.into())
    }

    /// Removes expired backups and log files.
    ///
    /// Failing to remove a backup aborts the sweep, a half deleted backup
    /// needs attention. Log files are removed best effort.
    /// On a `dry_run` nothing is removed, only reported.
    pub fn sweep(&self, now: DateTime<Local>, dry_run: bool) -> Result<Swept, RetentionError> {
        let cutoff = self.cutoff(now);
        let name_prefix = format!("{}_", self.prefix);
        log::debug!(target: "util::retention", "Removing backups modified before {cutoff}");

        let mut swept = Swept::default();

        let entries = fs::read_dir(self.backup_dir).map_err(|source| RetentionError::ReadDir {
            path: self.backup_dir.to_path_buf(),
            source,
        })?;
        for entry in entries.filter_map(Result::ok) {
            if !entry.file_name().to_string_lossy().starts_with(&name_prefix) {
                continue;
            }
            let Some(modified) = modified(&entry) else {
                continue;
            };
            if modified >= cutoff {
                continue;
            }

            let path = entry.path();
            if !dry_run {
                remove(&path).map_err(|source| RetentionError::Remove {
                    path: path.clone(),
                    source,
                })?;
            }
            log::info!(target: "util::retention", "Cleaned old backup {}", path.display());
            swept.backups.push(path);
        }

        // logs are not worth failing the run for
        let log_entries = fs::read_dir(self.log_dir).into_iter().flatten();
        for entry in log_entries.filter_map(Result::ok) {
            if !entry.file_type().is_ok_and(|t| t.is_file()) {
                continue;
            }
            if !modified(&entry).is_some_and(|modified| modified < cutoff) {
                continue;
            }

            let path = entry.path();
            if dry_run || fs::remove_file(&path).is_ok() {
                log::debug!(target: "util::retention", "Cleaned old log {}", path.display());
                swept.logs.push(path);
            } else {
                log::warn!(target: "util::retention", "Could not remove old log {}", path.display());
            }
        }

        Ok(swept)
    }
}

fn modified(entry: &fs::DirEntry) -> Option<DateTime<Local>> {
    let modified = entry.metadata().and_then(|m| m.modified()).ok()?;
    Some(modified.into())
}

fn remove(path: &Path) -> io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}
