//! Packs a finished backup directory into a `.tar.gz` archive using `tar`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::backup::BackupError;
use crate::command::{Invocation, Runner};
use crate::util::runlog::RunLog;

const TAR: &str = "tar";
const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// Path of the archive created for `dir`: a sibling named `<dir>.tar.gz`.
pub fn archive_path(dir: &Path) -> PathBuf {
    let mut archive = dir.as_os_str().to_owned();
    archive.push(ARCHIVE_SUFFIX);
    PathBuf::from(archive)
}

/// Archives `dir` next to itself and returns the archive path.
///
/// Anything but a directory already is a single file and is returned as is.
pub fn archive(dir: &Path, runner: &dyn Runner, log: &mut RunLog) -> Result<PathBuf, BackupError> {
    let metadata = fs::metadata(dir).map_err(|source| BackupError::Stat {
        path: dir.to_path_buf(),
        source,
    })?;
    if !metadata.is_dir() {
        log::debug!(target: "backup::archive", "Not a directory, skip archiving: {}", dir.display());
        return Ok(dir.to_path_buf());
    }

    let tar = runner.locate(TAR).map_err(BackupError::Archive)?;
    let parent = dir.parent().unwrap_or(Path::new("."));
    let base = dir.file_name().unwrap_or(dir.as_os_str());
    let archive = archive_path(dir);

    log::info!(target: "backup::archive", "Archive {} to {}", dir.display(), archive.display());
    log.line(format_args!("tar {} -> {}", dir.display(), archive.display()))
        .map_err(BackupError::RunLog)?;

    let invocation = Invocation::new(tar)
        .arg("-czf")
        .arg(archive.to_string_lossy())
        .arg("-C")
        .arg(parent.to_string_lossy())
        .arg(base.to_string_lossy());
    runner.run(&invocation, log).map_err(BackupError::Archive)?;

    Ok(archive)
}
