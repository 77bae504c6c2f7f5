use std::process::ExitCode;

use db_backup_lib::backends;
use db_backup_lib::backup;
use db_backup_lib::cli::{Action, BackupArgs, Cli, DumpArgs};
use db_backup_lib::command::{DryRunRunner, Runner, SystemRunner};
use db_backup_lib::config::BackupConfig;
use db_backup_lib::notify::{FeishuWebhook, Notifier};

use clap::Parser;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // init logger
    let mut env_logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = cli.verbose {
        env_logger.filter_level(level);
    }
    if env_logger.try_init().is_err() {
        eprintln!("logger already initialized");
    }

    let dry_run = cli.dry_run;
    if dry_run {
        log::warn!("Running in dry-run mode");
    }
    let runner: &dyn Runner = if dry_run { &DryRunRunner } else { &SystemRunner };

    match cli.action {
        Action::Backup(args) => backup(args, runner, dry_run),
        Action::Dump(args) => dump(args, runner),
    }
}

fn backup(args: BackupArgs, runner: &dyn Runner, dry_run: bool) -> ExitCode {
    let notifier = |config: &BackupConfig| {
        if dry_run {
            log::debug!(target: "notify", "Notifications are not sent on a dry run");
            return None;
        }
        FeishuWebhook::from_config(&config.feishu)
            .map(|webhook| Box::new(webhook) as Box<dyn Notifier>)
    };

    match backup::run_configured(&args, runner, dry_run, notifier) {
        Ok(result) => {
            log::info!(
                "Backup finished. name={} local={} archive={} log={}",
                result.backup_name,
                result.target_dir.display(),
                result.archive_path.display(),
                result.log_path.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!(target: "backup", "backup failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn dump(args: DumpArgs, runner: &dyn Runner) -> ExitCode {
    let outcome = args
        .backend()
        .and_then(|backend| backends::dump(backend.as_ref(), runner, &args.out));

    match outcome {
        Ok(artifact) => {
            log::info!(target: "backends", "{} backup completed successfully: {}", args.engine, artifact.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!(target: "backends", "{} backup failed: {e}", args.engine);
            ExitCode::FAILURE
        }
    }
}
