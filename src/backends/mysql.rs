//! MySQL dumps with `mysqldump` and physical copies with `xtrabackup`.

use std::path::{Path, PathBuf};

use clap::ValueEnum;

use super::{locate, run, timestamp, Backup, Connection, DumpError};
use crate::command::{Invocation, Runner};

const MYSQLDUMP: &str = "mysqldump";
const XTRABACKUP: &str = "xtrabackup";

/// Tool used to back up MySQL.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum MySqlTool {
    /// Logical SQL dump.
    #[default]
    Mysqldump,
    /// Physical copy of the data files.
    Xtrabackup,
}

/// SQL dump of MySQL databases using `mysqldump`.
#[derive(Debug, Clone)]
pub struct MySqlDump {
    pub connection: Connection,
    /// Database to dump, ignored when dumping all databases.
    pub database: Option<String>,
    pub all_databases: bool,
}

impl MySqlDump {
    fn generate_dump_filename(out_dir: &Path) -> PathBuf {
        out_dir.join(format!("mysql_{}.sql", timestamp()))
    }

    pub fn arguments(&self) -> Vec<String> {
        let Connection {
            host,
            port,
            user,
            password,
        } = &self.connection;

        let mut args = vec![
            format!("--host={host}"),
            format!("--port={port}"),
            format!("--user={user}"),
            format!("--password={password}"),
            "--single-transaction".to_string(),
            "--routines".to_string(),
            "--triggers".to_string(),
            // avoids needing the PROCESS privilege
            "--no-tablespaces".to_string(),
        ];

        match (&self.database, self.all_databases) {
            (Some(database), false) => args.push(database.clone()),
            _ => args.push("--all-databases".to_string()),
        }

        args
    }
}

impl Backup for MySqlDump {
    fn backup(&self, runner: &dyn Runner, out_dir: &Path) -> Result<PathBuf, DumpError> {
        log::info!(target: "backends::mysql", "Starting MySQL backup with mysqldump");
        let mysqldump = locate(runner, MYSQLDUMP, "the MySQL client tools")?;

        let dump_file = Self::generate_dump_filename(out_dir);
        log::debug!(target: "backends::mysql", "Save MySQL dump at: {}", dump_file.display());

        let invocation = Invocation::new(mysqldump)
            .args(self.arguments())
            .stdout_to(&dump_file);
        run(runner, MYSQLDUMP, &invocation)?;

        log::info!(target: "backends::mysql", "MySQL backup with mysqldump completed: {}", dump_file.display());
        Ok(dump_file)
    }
}

/// Physical copy of a MySQL server using `xtrabackup`.
#[derive(Debug, Clone)]
pub struct XtraBackupCopy {
    pub connection: Connection,
    /// Data directory of the server.
    pub datadir: PathBuf,
}

impl XtraBackupCopy {
    pub fn arguments(&self, target_dir: &Path) -> Vec<String> {
        let Connection {
            host,
            port,
            user,
            password,
        } = &self.connection;

        vec![
            "--backup".to_string(),
            format!("--datadir={}", self.datadir.display()),
            format!("--target-dir={}", target_dir.display()),
            format!("--host={host}"),
            format!("--port={port}"),
            format!("--user={user}"),
            format!("--password={password}"),
        ]
    }
}

impl Backup for XtraBackupCopy {
    fn backup(&self, runner: &dyn Runner, out_dir: &Path) -> Result<PathBuf, DumpError> {
        log::info!(target: "backends::mysql", "Starting MySQL backup with XtraBackup");
        let xtrabackup = locate(runner, XTRABACKUP, "Percona XtraBackup")?;

        let target_dir = out_dir.join(format!("xtrabackup_{}", timestamp()));
        std::fs::create_dir_all(&target_dir).map_err(|source| DumpError::OutputDir {
            path: target_dir.clone(),
            source,
        })?;

        let invocation = Invocation::new(xtrabackup).args(self.arguments(&target_dir));
        run(runner, XTRABACKUP, &invocation)?;

        log::info!(target: "backends::mysql", "MySQL backup with XtraBackup completed: {}", target_dir.display());
        Ok(target_dir)
    }
}
