//! Backend modules for one-off logical dumps.
//!
//! Currently the following backends are implemented:
//!
//! - [MySqlDump]: SQL dump of one or all MySQL databases with `mysqldump`.
//! - [XtraBackupCopy]: physical copy of a MySQL server with `xtrabackup`.
//! - [PgDump]: SQL dump of one or all PostgreSQL databases.
//! - [MongoDump]: BSON dump of one or all MongoDB databases.

pub mod mongodb;
pub mod mysql;
pub mod postgres;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use clap::ValueEnum;
use derive_more::{Display, Error};

pub use mongodb::MongoDump;
pub use mysql::{MySqlDump, XtraBackupCopy};
pub use postgres::PgDump;

use crate::command::{CommandError, Runner};
use crate::util::name_timestamp;

/// Generic backup backend.
pub trait Backup {
    /// Dumps into `out_dir` and returns the created file or directory.
    fn backup(&self, runner: &dyn Runner, out_dir: &Path) -> Result<PathBuf, DumpError>;
}

/// Supported database engines.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Engine {
    Mysql,
    #[value(alias = "postgres")]
    Postgresql,
    #[value(alias = "mongo")]
    Mongodb,
}

impl Engine {
    /// Port the engine listens on by default.
    pub fn default_port(self) -> u16 {
        match self {
            Self::Mysql => 3306,
            Self::Postgresql => 5432,
            Self::Mongodb => 27017,
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mysql => f.write_str("mysql"),
            Self::Postgresql => f.write_str("postgresql"),
            Self::Mongodb => f.write_str("mongodb"),
        }
    }
}

/// How to reach the database server.
#[derive(Clone, PartialEq, Eq)]
pub struct Connection {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Display, Error)]
/// Errors on dumping a database.
pub enum DumpError {
    /// The output directory can't be created.
    #[display("creating output directory {} failed: {source}", path.display())]
    OutputDir { path: PathBuf, source: io::Error },
    /// The engine needs a database name.
    #[display("--db is required for {_0}")]
    MissingDatabase(#[error(ignore)] Engine),
    /// The dump tool isn't installed.
    #[display("{tool} command not found, please install {package}: {source}")]
    NotInstalled {
        tool: &'static str,
        package: &'static str,
        source: CommandError,
    },
    /// The dump tool failed.
    #[display("{tool} failed: {source}")]
    Tool {
        tool: &'static str,
        source: CommandError,
    },
}

/// Creates `out_dir` and runs `backend` in it.
pub fn dump(backend: &dyn Backup, runner: &dyn Runner, out_dir: &Path) -> Result<PathBuf, DumpError> {
    std::fs::create_dir_all(out_dir).map_err(|source| DumpError::OutputDir {
        path: out_dir.to_path_buf(),
        source,
    })?;

    backend.backup(runner, out_dir)
}

/// Timestamp suffix of dump names.
pub(crate) fn timestamp() -> String {
    name_timestamp(&Local::now())
}

/// Resolves `tool`, pointing at `package` if it is missing.
pub(crate) fn locate(
    runner: &dyn Runner,
    tool: &'static str,
    package: &'static str,
) -> Result<PathBuf, DumpError> {
    runner.locate(tool).map_err(|source| DumpError::NotInstalled {
        tool,
        package,
        source,
    })
}

/// Runs `invocation`, relaying tool output to stdout.
pub(crate) fn run(
    runner: &dyn Runner,
    tool: &'static str,
    invocation: &crate::command::Invocation,
) -> Result<(), DumpError> {
    log::info!(target: "backends", "Executing: {invocation}");
    runner
        .run(invocation, &mut io::stdout())
        .map_err(|source| DumpError::Tool { tool, source })
}
