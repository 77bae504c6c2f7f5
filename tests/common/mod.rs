#![allow(dead_code)]

use std::cell::RefCell;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use db_backup_lib::command::{CommandError, Invocation, Runner};
use db_backup_lib::config::BackupConfig;
use db_backup_lib::notify::{Notifier, NotifyError, Report, Status};

/// Records invocations, optionally failing for one program.
#[derive(Default)]
pub struct FakeRunner {
    pub invocations: RefCell<Vec<Invocation>>,
    pub failing: Option<&'static str>,
    /// Side effect of every run, in place of the work of the real tool.
    pub effect: Option<Box<dyn Fn(&Invocation)>>,
}

impl FakeRunner {
    pub fn failing(program: &'static str) -> Self {
        Self {
            failing: Some(program),
            ..Default::default()
        }
    }

    pub fn programs(&self) -> Vec<String> {
        self.invocations.borrow().iter().map(Invocation::name).collect()
    }

    pub fn invocation_of(&self, program: &str) -> Option<Invocation> {
        self.invocations
            .borrow()
            .iter()
            .find(|invocation| invocation.name() == program)
            .cloned()
    }
}

impl Runner for FakeRunner {
    fn locate(&self, program: &str) -> Result<PathBuf, CommandError> {
        Ok(PathBuf::from("/usr/bin").join(program))
    }

    fn run(
        &self,
        invocation: &Invocation,
        output: &mut (dyn Write + Send),
    ) -> Result<(), CommandError> {
        self.invocations.borrow_mut().push(invocation.clone());
        if let Some(effect) = &self.effect {
            effect(invocation);
        }
        let program = invocation.name();
        writeln!(output, "{program} output").map_err(|source| CommandError::Relay {
            program: program.clone(),
            source,
        })?;

        if self.failing == Some(program.as_str()) {
            return Err(CommandError::Spawn {
                program,
                source: io::Error::other("simulated failure"),
            });
        }
        Ok(())
    }
}

/// A notification as received.
#[derive(Debug, Clone)]
pub struct Received {
    pub status: Status,
    pub backup_name: Option<String>,
    pub error: Option<String>,
    pub text: String,
}

#[derive(Default)]
pub struct FakeNotifier {
    pub received: RefCell<Vec<Received>>,
}

impl Notifier for FakeNotifier {
    fn notify(&self, report: &Report<'_>) -> Result<(), NotifyError> {
        self.received.borrow_mut().push(Received {
            status: report.status,
            backup_name: report.result.map(|result| result.backup_name.clone()),
            error: report.error.clone(),
            text: report.text("backup-bot"),
        });
        Ok(())
    }
}

/// A validated configuration storing backups below `backup_dir`.
pub fn config(backup_dir: &Path) -> BackupConfig {
    let mut config: BackupConfig = serde_json::from_value(serde_json::json!({
        "backup_dir": backup_dir,
        "mysql": {
            "defaults_file": "/etc/mysql/my.cnf",
            "user": "backup",
            "password": "pa55-w0rd-xyz",
        },
        "feishu": {
            "enabled": true,
            "webhook": "https://open.feishu.cn/open-apis/bot/v2/hook/test",
            "keyword": "backup-bot",
        },
    }))
    .unwrap();
    config
        .validate_with(|program| Ok(PathBuf::from("/usr/bin").join(program)))
        .unwrap();
    config
}

/// Sets the modification time of `path` to `days` days ago.
pub fn age(path: &Path, days: u64) {
    let modified = SystemTime::now() - Duration::from_secs(days * 24 * 60 * 60);
    File::open(path).unwrap().set_modified(modified).unwrap();
}
