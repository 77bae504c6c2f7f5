//! Configuration of the physical backup workflow.
//!
//! The configuration is read from a JSON document (or TOML, if the file ends
//! in `.toml`), command line overrides are applied on top and the result is
//! validated once with [BackupConfig::validate_with]. Validation also fills in
//! every default, afterwards the configuration is treated as immutable.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use derive_more::{Display, Error};

use crate::command::{self, CommandError};

/// Prefix of backup names if none is configured.
pub const DEFAULT_PREFIX: &str = "mysql";
/// Name of the log directory below the backup directory if none is configured.
pub const DEFAULT_LOG_DIR: &str = "log";
pub const DEFAULT_MYSQL_HOST: &str = "127.0.0.1";
pub const DEFAULT_MYSQL_PORT: u16 = 3306;
pub const DEFAULT_PARALLEL: u32 = 2;
pub const DEFAULT_COMPRESS_THREADS: u32 = 2;
pub const DEFAULT_SSH_PORT: u16 = 22;

const XTRABACKUP: &str = "xtrabackup";
const SCP: &str = "scp";

/// Kind of physical backup.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    /// Copy of all data files.
    #[default]
    Full,
    /// Changes since the most recent full backup.
    #[serde(alias = "incr")]
    #[value(alias = "incr")]
    Incremental,
}

impl BackupType {
    /// Token used in backup names, e.g. `mysql_incr_20240103_000000`.
    pub fn token(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incr",
        }
    }
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => f.write_str("full"),
            Self::Incremental => f.write_str("incremental"),
        }
    }
}

/// The whole configuration document.
///
/// Empty strings, empty paths and zero numbers mean "not set".
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Full or incremental backup.
    pub backup_type: BackupType,
    /// Root directory all backups are stored in.
    pub backup_dir: PathBuf,
    /// Prefix of every backup name. Defaults to [DEFAULT_PREFIX].
    pub backup_prefix: String,
    /// Backups and logs older than this many days are deleted. `0` keeps everything.
    pub retention_days: u32,
    /// Pack the backup directory into a `.tar.gz` archive.
    pub tar_archive: bool,
    /// Directory of the per-run log files. Defaults to `<backup_dir>/log`.
    pub log_dir: PathBuf,

    pub mysql: MySqlConfig,
    pub xtrabackup: XtraBackupConfig,
    pub remote: RemoteConfig,
    pub feishu: FeishuConfig,
}

/// Connection to the MySQL server.
#[derive(Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MySqlConfig {
    /// `my.cnf` passed as `--defaults-file`.
    pub defaults_file: PathBuf,
    /// Unix socket, preferred over host and port.
    pub socket: PathBuf,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for MySqlConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MySqlConfig")
            .field("defaults_file", &self.defaults_file)
            .field("socket", &self.socket)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Tuning of the `xtrabackup` invocation.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct XtraBackupConfig {
    /// Path to the binary, looked up on `PATH` if not set.
    pub bin: PathBuf,
    /// `--parallel`
    pub parallel: u32,
    /// `--compress`
    pub compress: bool,
    /// `--compress-threads`
    pub compress_threads: u32,
    /// Passed through verbatim after all other arguments.
    pub extra_args: Vec<String>,
}

/// Copy of the finished backup to another host with `scp`.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub enabled: bool,
    pub user: String,
    pub host: String,
    /// SSH port, defaults to [DEFAULT_SSH_PORT].
    pub port: u16,
    pub dest_dir: String,
    /// Path to `scp`, looked up on `PATH` if not set.
    pub bin: PathBuf,
}

/// Feishu bot notified about the outcome of every run.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FeishuConfig {
    pub enabled: bool,
    pub webhook: String,
    /// Security keyword of the bot, every message has to contain it.
    pub keyword: String,
}

#[derive(Debug, Display, Error)]
/// Errors on loading or validating the [BackupConfig].
pub enum ConfigError {
    /// The configuration file can't be read.
    #[display("reading config {} failed: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    /// The configuration file is no valid JSON document.
    #[display("parsing config {} failed: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// The configuration file is no valid TOML document.
    #[display("parsing config {} failed: {source}", path.display())]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// A required field is not set.
    #[display("{_0} is required")]
    Missing(#[error(ignore)] &'static str),
    /// A field required by an enabled section is not set.
    #[display("{field} is required when {section}.enabled=true")]
    MissingWhenEnabled {
        section: &'static str,
        field: &'static str,
    },
    /// A required external tool is not available.
    #[display("{_0}")]
    Prerequisite(CommandError),
}

impl BackupConfig {
    /// Reads the configuration document at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&content).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            })
        } else {
            serde_json::from_str(&content).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    /// Applies command line overrides.
    pub fn apply_overrides(&mut self, backup_type: Option<BackupType>) {
        if let Some(backup_type) = backup_type {
            log::debug!(target: "config", "Backup type overridden: {backup_type}");
            self.backup_type = backup_type;
        }
    }

    /// Validates the configuration, resolving tools on `PATH`.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.validate_with(command::locate)
    }

    /// Validates the configuration and fills in defaults.
    ///
    /// Binaries that aren't configured are resolved with `locate`.
    /// Validating an already validated configuration changes nothing.
    pub fn validate_with<F>(&mut self, locate: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Result<PathBuf, CommandError>,
    {
        if is_unset(&self.backup_dir) {
            return Err(ConfigError::Missing("backup_dir"));
        }
        if self.backup_prefix.is_empty() {
            self.backup_prefix = DEFAULT_PREFIX.to_string();
        }
        if is_unset(&self.log_dir) {
            self.log_dir = self.backup_dir.join(DEFAULT_LOG_DIR);
        }

        let mysql = &mut self.mysql;
        if is_unset(&mysql.defaults_file) {
            return Err(ConfigError::Missing("mysql.defaults_file"));
        }
        if mysql.user.is_empty() || mysql.password.is_empty() {
            return Err(ConfigError::Missing("mysql.user and mysql.password"));
        }
        if is_unset(&mysql.socket) {
            if mysql.host.is_empty() {
                mysql.host = DEFAULT_MYSQL_HOST.to_string();
            }
            if mysql.port == 0 {
                mysql.port = DEFAULT_MYSQL_PORT;
            }
        }

        let xtrabackup = &mut self.xtrabackup;
        if is_unset(&xtrabackup.bin) {
            xtrabackup.bin = locate(XTRABACKUP).map_err(ConfigError::Prerequisite)?;
            log::debug!(target: "config", "Using {}", xtrabackup.bin.display());
        }
        if xtrabackup.parallel == 0 {
            xtrabackup.parallel = DEFAULT_PARALLEL;
        }
        if xtrabackup.compress && xtrabackup.compress_threads == 0 {
            xtrabackup.compress_threads = DEFAULT_COMPRESS_THREADS;
        }

        let remote = &mut self.remote;
        if remote.enabled {
            for (field, value) in [
                ("remote.user", &remote.user),
                ("remote.host", &remote.host),
                ("remote.dest_dir", &remote.dest_dir),
            ] {
                if value.is_empty() {
                    return Err(ConfigError::MissingWhenEnabled {
                        section: "remote",
                        field,
                    });
                }
            }
            if remote.port == 0 {
                remote.port = DEFAULT_SSH_PORT;
            }
            if is_unset(&remote.bin) {
                remote.bin = locate(SCP).map_err(ConfigError::Prerequisite)?;
            }
        }

        let feishu = &self.feishu;
        if feishu.enabled {
            if feishu.webhook.is_empty() {
                return Err(ConfigError::MissingWhenEnabled {
                    section: "feishu",
                    field: "feishu.webhook",
                });
            }
            if feishu.keyword.is_empty() {
                return Err(ConfigError::MissingWhenEnabled {
                    section: "feishu",
                    field: "feishu.keyword",
                });
            }
        }

        Ok(())
    }
}

fn is_unset(path: &Path) -> bool {
    path.as_os_str().is_empty()
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    fn fake_locate(program: &str) -> Result<PathBuf, CommandError> {
        Ok(PathBuf::from("/usr/bin").join(program))
    }

    fn minimal() -> BackupConfig {
        serde_json::from_str(
            r#"{
                "backup_dir": "/data/backup",
                "mysql": {
                    "defaults_file": "/etc/my.cnf",
                    "user": "backup",
                    "password": "secret"
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn defaults_are_filled_in() {
        let mut config = minimal();
        config.validate_with(fake_locate).unwrap();

        assert_eq!(config.backup_type, BackupType::Full);
        assert_eq!(config.backup_prefix, "mysql");
        assert_eq!(config.log_dir, PathBuf::from("/data/backup/log"));
        assert_eq!(config.mysql.host, "127.0.0.1");
        assert_eq!(config.mysql.port, 3306);
        assert_eq!(config.xtrabackup.bin, PathBuf::from("/usr/bin/xtrabackup"));
        assert_eq!(config.xtrabackup.parallel, 2);
        assert_eq!(config.xtrabackup.compress_threads, 0);
    }

    #[test]
    fn validation_is_idempotent() {
        let mut config = minimal();
        config.xtrabackup.compress = true;
        config.remote = RemoteConfig {
            enabled: true,
            user: "backup".into(),
            host: "vault.example.com".into(),
            dest_dir: "/srv/backups".into(),
            ..Default::default()
        };
        config.feishu = FeishuConfig {
            enabled: true,
            webhook: "https://open.feishu.cn/hook/abc".into(),
            keyword: "backup".into(),
        };
        config.validate_with(fake_locate).unwrap();
        let once = config.clone();

        let lookups = RefCell::new(Vec::new());
        config
            .validate_with(|program| {
                lookups.borrow_mut().push(program.to_string());
                fake_locate(program)
            })
            .unwrap();

        assert_eq!(config, once);
        assert!(lookups.borrow().is_empty());
        assert_eq!(config.xtrabackup.compress_threads, 2);
        assert_eq!(config.remote.port, 22);
        assert_eq!(config.remote.bin, PathBuf::from("/usr/bin/scp"));
    }

    #[test]
    fn socket_skips_host_defaults() {
        let mut config = minimal();
        config.mysql.socket = "/run/mysqld/mysqld.sock".into();
        config.validate_with(fake_locate).unwrap();

        assert!(config.mysql.host.is_empty());
        assert_eq!(config.mysql.port, 0);
    }

    #[test]
    fn required_fields() {
        let mut config = minimal();
        config.backup_dir = PathBuf::new();
        let err = config.validate_with(fake_locate).unwrap_err();
        assert_eq!(err.to_string(), "backup_dir is required");

        let mut config = minimal();
        config.mysql.defaults_file = PathBuf::new();
        let err = config.validate_with(fake_locate).unwrap_err();
        assert_eq!(err.to_string(), "mysql.defaults_file is required");

        let mut config = minimal();
        config.mysql.password.clear();
        let err = config.validate_with(fake_locate).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("mysql.user and mysql.password")));
    }

    #[test]
    fn enabled_sections_require_their_fields() {
        let mut config = minimal();
        config.remote.enabled = true;
        config.remote.user = "backup".into();
        let err = config.validate_with(fake_locate).unwrap_err();
        assert_eq!(
            err.to_string(),
            "remote.host is required when remote.enabled=true"
        );

        let mut config = minimal();
        config.feishu.enabled = true;
        config.feishu.webhook = "https://open.feishu.cn/hook/abc".into();
        let err = config.validate_with(fake_locate).unwrap_err();
        assert_eq!(
            err.to_string(),
            "feishu.keyword is required when feishu.enabled=true"
        );
    }

    #[test]
    fn missing_binary_is_fatal() {
        let mut config = minimal();
        let err = config
            .validate_with(|program| command::locate(&format!("{program}-not-installed-anywhere")))
            .unwrap_err();

        assert!(matches!(err, ConfigError::Prerequisite(CommandError::NotFound { .. })));
    }

    #[test]
    fn backup_type_accepts_short_alias() {
        let config: BackupConfig = serde_json::from_str(r#"{"backup_type": "incr"}"#).unwrap();
        assert_eq!(config.backup_type, BackupType::Incremental);

        let config: BackupConfig =
            serde_json::from_str(r#"{"backup_type": "incremental"}"#).unwrap();
        assert_eq!(config.backup_type, BackupType::Incremental);
        assert_eq!(config.backup_type.token(), "incr");

        assert!(serde_json::from_str::<BackupConfig>(r#"{"backup_type": "delta"}"#).is_err());
    }

    #[test]
    fn override_replaces_backup_type() {
        let mut config = minimal();
        config.apply_overrides(None);
        assert_eq!(config.backup_type, BackupType::Full);
        config.apply_overrides(Some(BackupType::Incremental));
        assert_eq!(config.backup_type, BackupType::Incremental);
    }

    #[test]
    fn load_json_and_toml() {
        let dir = tempfile::tempdir().unwrap();

        let json = dir.path().join("mysql_backup.json");
        fs::write(
            &json,
            r#"{"backup_dir": "/data/backup", "retention_days": 7, "xtrabackup": {"extra_args": ["--no-lock"]}}"#,
        )
        .unwrap();
        let config = BackupConfig::load(&json).unwrap();
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.xtrabackup.extra_args, vec!["--no-lock"]);

        let toml_path = dir.path().join("mysql_backup.toml");
        fs::write(
            &toml_path,
            "backup_dir = \"/data/backup\"\ntar_archive = true\n\n[remote]\nenabled = true\nhost = \"vault\"\n",
        )
        .unwrap();
        let config = BackupConfig::load(&toml_path).unwrap();
        assert!(config.tar_archive);
        assert!(config.remote.enabled);
        assert_eq!(config.remote.host, "vault");

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{").unwrap();
        assert!(matches!(
            BackupConfig::load(&broken),
            Err(ConfigError::Json { .. })
        ));
        assert!(matches!(
            BackupConfig::load(&dir.path().join("missing.json")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn password_is_not_debug_printed() {
        let config = minimal();
        assert!(!format!("{config:?}").contains("secret"));
    }
}
