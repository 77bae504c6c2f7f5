//! MongoDB dumps with `mongodump`.

use std::path::{Path, PathBuf};

use super::{locate, run, timestamp, Backup, Connection, DumpError, Engine};
use crate::command::{Invocation, Runner};

const MONGODUMP: &str = "mongodump";
/// Authentication database if none is given.
pub const DEFAULT_AUTH_DATABASE: &str = "admin";

/// BSON dump of one or all MongoDB databases into a directory.
#[derive(Debug, Clone)]
pub struct MongoDump {
    pub connection: Connection,
    pub database: Option<String>,
    pub all_databases: bool,
    /// Defaults to [DEFAULT_AUTH_DATABASE].
    pub auth_database: Option<String>,
    /// Additional `mongodump` options, appended verbatim.
    pub options: Vec<String>,
}

impl MongoDump {
    /// Splits a space separated option string into single options.
    pub fn split_options(options: &str) -> Vec<String> {
        options.split_whitespace().map(str::to_string).collect()
    }

    pub fn arguments(&self, database: Option<&str>, out: &Path) -> Vec<String> {
        let Connection {
            host,
            port,
            user,
            password,
        } = &self.connection;

        let mut args = vec![
            format!("--host={host}:{port}"),
            format!("--username={user}"),
            format!("--password={password}"),
        ];
        if let Some(database) = database {
            args.push(format!("--db={database}"));
        }
        args.push(format!("--out={}", out.display()));

        let auth_database = self
            .auth_database
            .as_deref()
            .filter(|db| !db.is_empty())
            .unwrap_or(DEFAULT_AUTH_DATABASE);
        args.push(format!("--authenticationDatabase={auth_database}"));
        args.extend(self.options.iter().cloned());

        args
    }
}

impl Backup for MongoDump {
    fn backup(&self, runner: &dyn Runner, out_dir: &Path) -> Result<PathBuf, DumpError> {
        let database = if self.all_databases {
            log::info!(target: "backends::mongodb", "Starting MongoDB backup of all databases");
            None
        } else {
            let database = self
                .database
                .as_deref()
                .ok_or(DumpError::MissingDatabase(Engine::Mongodb))?;
            log::info!(target: "backends::mongodb", "Starting MongoDB backup of database '{database}'");
            Some(database)
        };

        let mongodump = locate(runner, MONGODUMP, "the MongoDB database tools")?;
        let out = out_dir.join(format!(
            "mongodb_{}_{}",
            database.unwrap_or("all"),
            timestamp()
        ));

        let invocation = Invocation::new(mongodump).args(self.arguments(database, &out));
        run(runner, MONGODUMP, &invocation)?;

        log::info!(target: "backends::mongodb", "MongoDB backup completed: {}", out.display());
        Ok(out)
    }
}
