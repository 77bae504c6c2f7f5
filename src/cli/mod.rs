use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use log::LevelFilter;

use crate::backends::mysql::MySqlTool;
use crate::backends::{
    Backup, Connection, DumpError, Engine, MongoDump, MySqlDump, PgDump, XtraBackupCopy,
};
use crate::config::BackupType;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Verbosity of the command output.
    #[arg(long, global = true)]
    pub verbose: Option<LevelFilter>,

    /// Print the external commands instead of running them.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub action: Action,
}

#[derive(Subcommand, Debug)]
pub enum Action {
    /// Physical backup with xtrabackup, configured by a config file.
    Backup(BackupArgs),
    /// One-off logical dump of a MySQL, PostgreSQL or MongoDB database.
    #[command(disable_help_flag = true)]
    Dump(DumpArgs),
}

#[derive(Args, Debug)]
pub struct BackupArgs {
    /// Path to the config file (JSON, or TOML if it ends in `.toml`).
    #[arg(long, short = 'c', default_value = "config/mysql_backup.json")]
    pub config: PathBuf,

    /// Override the backup type of the config file.
    #[arg(long = "type", value_enum)]
    pub backup_type: Option<BackupType>,

    /// Skip sending to remote storage even if enabled.
    #[arg(long)]
    pub skip_remote: bool,
}

#[derive(Args, Debug)]
pub struct DumpArgs {
    /// Database type.
    #[arg(short = 't', long = "type", value_enum)]
    pub engine: Engine,

    /// Database host.
    #[arg(short = 'h', long, default_value = "localhost")]
    pub host: String,

    /// Database port. Defaults to the default port of the database type.
    #[arg(short = 'P', long)]
    pub port: Option<u16>,

    /// Database username.
    #[arg(short = 'u', long)]
    pub user: String,

    /// Database password.
    #[arg(
        short = 'p',
        long = "pass",
        alias = "password",
        env = "DB_PASSWORD",
        hide_env_values = true,
        default_value = ""
    )]
    pub password: String,

    /// Database name.
    #[arg(long)]
    pub db: Option<String>,

    /// Backup output directory.
    #[arg(long, default_value = "./backups")]
    pub out: PathBuf,

    /// Additional MongoDB options, separated by spaces.
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    pub mongo_options: String,

    /// MongoDB authentication database.
    #[arg(long)]
    pub mongo_auth_db: Option<String>,

    /// MongoDB: back up all databases.
    #[arg(long)]
    pub mongo_all: bool,

    /// MySQL backup tool.
    #[arg(long, value_enum, default_value_t)]
    pub mysql_tool: MySqlTool,

    /// MySQL data directory (used by xtrabackup).
    #[arg(long, default_value = "/var/lib/mysql")]
    pub mysql_datadir: PathBuf,

    /// MySQL: back up all databases.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub mysql_all: bool,

    /// PostgreSQL: back up all databases (pg_dumpall).
    #[arg(long)]
    pub postgres_all: bool,

    /// Print help.
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

impl DumpArgs {
    fn connection(&self) -> Connection {
        Connection {
            host: self.host.clone(),
            port: self.port.unwrap_or(self.engine.default_port()),
            user: self.user.clone(),
            password: self.password.clone(),
        }
    }

    fn database(&self) -> Option<String> {
        self.db.clone().filter(|db| !db.is_empty())
    }

    /// The backend performing the requested dump.
    pub fn backend(&self) -> Result<Box<dyn Backup>, DumpError> {
        let connection = self.connection();
        let database = self.database();

        let backend: Box<dyn Backup> = match self.engine {
            Engine::Mysql => match self.mysql_tool {
                MySqlTool::Mysqldump => {
                    if !self.mysql_all && database.is_none() {
                        return Err(DumpError::MissingDatabase(Engine::Mysql));
                    }
                    Box::new(MySqlDump {
                        connection,
                        database,
                        all_databases: self.mysql_all,
                    })
                }
                MySqlTool::Xtrabackup => Box::new(XtraBackupCopy {
                    connection,
                    datadir: self.mysql_datadir.clone(),
                }),
            },
            Engine::Postgresql => {
                if !self.postgres_all && database.is_none() {
                    return Err(DumpError::MissingDatabase(Engine::Postgresql));
                }
                Box::new(PgDump {
                    connection,
                    database,
                    all_databases: self.postgres_all,
                })
            }
            Engine::Mongodb => {
                if !self.mongo_all && database.is_none() {
                    return Err(DumpError::MissingDatabase(Engine::Mongodb));
                }
                Box::new(MongoDump {
                    connection,
                    database,
                    all_databases: self.mongo_all,
                    auth_database: self.mongo_auth_db.clone(),
                    options: MongoDump::split_options(&self.mongo_options),
                })
            }
        };

        Ok(backend)
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    fn dump_args(args: &[&str]) -> DumpArgs {
        let cli = Cli::try_parse_from([&["db_backup", "dump"][..], args].concat()).unwrap();
        match cli.action {
            Action::Dump(args) => args,
            other => panic!("expected dump, got {other:?}"),
        }
    }

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn backup_defaults_and_overrides() {
        let cli = Cli::try_parse_from(["db_backup", "backup"]).unwrap();
        let Action::Backup(args) = cli.action else {
            panic!("expected backup");
        };
        assert_eq!(args.config, PathBuf::from("config/mysql_backup.json"));
        assert_eq!(args.backup_type, None);
        assert!(!args.skip_remote);

        let cli = Cli::try_parse_from([
            "db_backup",
            "--dry-run",
            "backup",
            "--config",
            "/etc/db_backup.toml",
            "--type",
            "incr",
            "--skip-remote",
        ])
        .unwrap();
        assert!(cli.dry_run);
        let Action::Backup(args) = cli.action else {
            panic!("expected backup");
        };
        assert_eq!(args.backup_type, Some(BackupType::Incremental));
        assert!(args.skip_remote);
    }

    #[test]
    fn short_and_long_flags_are_aliases() {
        let short = dump_args(&["-t", "postgresql", "-h", "pg", "-P", "6432", "-u", "app", "-p", "pw"]);
        let long = dump_args(&[
            "--type", "postgresql", "--host", "pg", "--port", "6432", "--user", "app", "--pass", "pw",
        ]);

        for args in [short, long] {
            assert_eq!(args.engine, Engine::Postgresql);
            assert_eq!(args.connection().host, "pg");
            assert_eq!(args.connection().port, 6432);
            assert_eq!(args.connection().user, "app");
            assert_eq!(args.connection().password, "pw");
        }
    }

    #[test]
    fn port_defaults_per_engine() {
        let mysql = dump_args(&["-t", "mysql", "-u", "root"]);
        let postgres = dump_args(&["-t", "postgres", "-u", "postgres", "--db", "app"]);
        let mongo = dump_args(&["-t", "mongodb", "-u", "root", "--mongo-all"]);

        assert_eq!(mysql.connection().port, 3306);
        assert_eq!(mysql.connection().host, "localhost");
        assert_eq!(postgres.connection().port, 5432);
        assert_eq!(mongo.connection().port, 27017);
        assert_eq!(mysql.out, PathBuf::from("./backups"));
        assert!(mysql.mysql_all);
        assert_eq!(mysql.mysql_tool, MySqlTool::Mysqldump);
    }

    #[test]
    fn database_is_required_unless_dumping_everything() {
        assert!(dump_args(&["-t", "mysql", "-u", "root"]).backend().is_ok());
        assert!(matches!(
            dump_args(&["-t", "mysql", "-u", "root", "--mysql-all", "false"]).backend(),
            Err(DumpError::MissingDatabase(Engine::Mysql))
        ));
        assert!(matches!(
            dump_args(&["-t", "postgresql", "-u", "postgres"]).backend(),
            Err(DumpError::MissingDatabase(Engine::Postgresql))
        ));
        assert!(dump_args(&["-t", "postgresql", "-u", "postgres", "--postgres-all"])
            .backend()
            .is_ok());
        assert!(matches!(
            dump_args(&["-t", "mongodb", "-u", "root"]).backend(),
            Err(DumpError::MissingDatabase(Engine::Mongodb))
        ));
        assert!(dump_args(&["-t", "mongodb", "-u", "root", "--db", "events"])
            .backend()
            .is_ok());
    }

    #[test]
    fn type_and_user_are_required() {
        assert!(Cli::try_parse_from(["db_backup", "dump", "-u", "root"]).is_err());
        assert!(Cli::try_parse_from(["db_backup", "dump", "-t", "mysql"]).is_err());
        assert!(Cli::try_parse_from(["db_backup", "dump", "-t", "oracle", "-u", "x"]).is_err());
    }
}
