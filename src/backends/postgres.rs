//! PostgreSQL dumps with `pg_dump` and `pg_dumpall`.

use std::path::{Path, PathBuf};

use super::{locate, run, timestamp, Backup, Connection, DumpError, Engine};
use crate::command::{Invocation, Runner};

const PG_DUMP: &str = "pg_dump";
const PG_DUMPALL: &str = "pg_dumpall";
const CLIENT_TOOLS: &str = "the PostgreSQL client tools";

/// SQL dump of a single PostgreSQL database, or of all with `pg_dumpall`.
///
/// Credentials are handed over in the `PG*` environment variables.
#[derive(Debug, Clone)]
pub struct PgDump {
    pub connection: Connection,
    pub database: Option<String>,
    pub all_databases: bool,
}

impl PgDump {
    fn environment(&self, invocation: Invocation) -> Invocation {
        let Connection {
            host,
            port,
            user,
            password,
        } = &self.connection;

        invocation
            .env("PGHOST", host)
            .env("PGPORT", port.to_string())
            .env("PGUSER", user)
            .env("PGPASSWORD", password)
    }

    /// Tool, output file and invocation of the dump.
    fn plan(&self, runner: &dyn Runner, out_dir: &Path) -> Result<(&'static str, Invocation), DumpError> {
        let (tool, file_name, database) = if self.all_databases {
            (PG_DUMPALL, format!("postgresql_all_{}.sql", timestamp()), None)
        } else {
            let database = self
                .database
                .as_deref()
                .ok_or(DumpError::MissingDatabase(Engine::Postgresql))?;
            (
                PG_DUMP,
                format!("postgresql_{database}_{}.sql", timestamp()),
                Some(database),
            )
        };

        let program = locate(runner, tool, CLIENT_TOOLS)?;
        let invocation = Invocation::new(program)
            .args(["--verbose", "--clean", "--no-owner", "--no-acl"])
            .args(database)
            .stdout_to(out_dir.join(file_name));

        Ok((tool, self.environment(invocation)))
    }
}

impl Backup for PgDump {
    fn backup(&self, runner: &dyn Runner, out_dir: &Path) -> Result<PathBuf, DumpError> {
        match &self.database {
            Some(database) if !self.all_databases => {
                log::info!(target: "backends::postgres", "Starting PostgreSQL backup of database '{database}'")
            }
            _ => log::info!(target: "backends::postgres", "Starting PostgreSQL backup of all databases"),
        }

        let (tool, invocation) = self.plan(runner, out_dir)?;
        let dump_file = invocation
            .stdout_path()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        run(runner, tool, &invocation)?;

        log::info!(target: "backends::postgres", "PostgreSQL backup completed: {}", dump_file.display());
        Ok(dump_file)
    }
}
