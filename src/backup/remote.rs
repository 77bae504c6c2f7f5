//! Ships the backup artifact to another host with `scp`.

use std::path::Path;

use crate::backup::BackupError;
use crate::command::{Invocation, Runner};
use crate::config::RemoteConfig;
use crate::util::runlog::RunLog;

/// `user@host:dest_dir`
pub fn destination(remote: &RemoteConfig) -> String {
    format!("{}@{}:{}", remote.user, remote.host, remote.dest_dir)
}

/// The scp invocation copying `artifact` to the remote destination.
///
/// Unarchived backups are directories and get copied recursively.
pub fn invocation(remote: &RemoteConfig, artifact: &Path) -> Invocation {
    let mut invocation = Invocation::new(&remote.bin)
        .arg("-P")
        .arg(remote.port.to_string());
    if artifact.is_dir() {
        invocation = invocation.arg("-r");
    }
    invocation
        .arg(artifact.to_string_lossy())
        .arg(destination(remote))
}

/// Copies `artifact` to the configured remote destination.
pub fn ship(
    remote: &RemoteConfig,
    artifact: &Path,
    runner: &dyn Runner,
    log: &mut RunLog,
) -> Result<(), BackupError> {
    let invocation = invocation(remote, artifact);
    log::info!(target: "backup::remote", "Send {} to {}", artifact.display(), destination(remote));
    log.line(format_args!("exec: {invocation}"))
        .map_err(BackupError::RunLog)?;

    runner.run(&invocation, log).map_err(BackupError::Transfer)
}
