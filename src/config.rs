//! Run configuration: CLI flags layered over an optional config.toml.
//!
//! Everything is validated once into an immutable [`Settings`]; engines only
//! ever see borrowed option structs.

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::Cli;
use crate::error::{Error, Result};
use crate::resolve;
use crate::session::{RetryPolicy, FLAG_DELETED, FLAG_FLAGGED};

pub const DEFAULT_INBOX: &str = "INBOX";
pub const DEFAULT_SPAM_FOLDER: &str = "INBOX.Spam";

/// Transport security for the IMAP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    Tls,
    StartTls,
    Plain,
}

impl Security {
    pub fn default_port(self) -> u16 {
        match self {
            Security::Tls => 993,
            Security::StartTls | Security::Plain => 143,
        }
    }
}

/// Account and folder names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub security: Security,
    pub inbox: String,
    pub spam_folder: String,
    pub learn_spam_folder: Option<String>,
    pub learn_ham_folder: Option<String>,
}

impl MailboxSettings {
    pub fn new(host: &str, user: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            user: user.to_string(),
            security: Security::Tls,
            inbox: DEFAULT_INBOX.to_string(),
            spam_folder: DEFAULT_SPAM_FOLDER.to_string(),
            learn_spam_folder: None,
            learn_ham_folder: None,
        }
    }

    /// Stable per-account digest of (host, user, port), used to namespace
    /// cache files.
    pub fn identity_hash(&self) -> String {
        identity_hash(&self.host, &self.user, self.port)
    }
}

pub fn identity_hash(host: &str, user: &str, port: u16) -> String {
    let mut ctx = md5::Context::new();
    ctx.consume(host.as_bytes());
    ctx.consume(user.as_bytes());
    ctx.consume(port.to_string().as_bytes());
    format!("{:x}", ctx.compute())
}

/// Password sources that don't need the secret store or a prompt.
#[derive(Clone, Default)]
pub struct Credentials {
    pub password: Option<String>,
    pub password_cmd: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("password", &self.password.as_ref().map(|_| "xxxxxxxx"))
            .field("password_cmd", &self.password_cmd)
            .finish()
    }
}

/// Where a saved password lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecretBackend {
    /// Obfuscated JSON file at `Settings::password_file`.
    #[default]
    File,
    /// OS keyring entry.
    Keyring,
}

/// Inbox scanning options.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOptions {
    /// Only messages smaller than this many bytes are examined.
    pub max_size: u64,
    /// Cap on messages examined per run; `None` is unbounded.
    pub partial_run: Option<usize>,
    /// Flags stored on spam left in the inbox.
    pub spam_flags: Vec<String>,
    pub delete: bool,
    pub gmail: bool,
    pub expunge: bool,
    pub delete_higher_than: Option<f32>,
    pub no_report: bool,
    pub dry_run: bool,
    pub verbose_mails: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            max_size: 120_000,
            partial_run: Some(50),
            spam_flags: vec![],
            delete: false,
            gmail: false,
            expunge: false,
            delete_higher_than: None,
            no_report: false,
            dry_run: false,
            verbose_mails: false,
        }
    }
}

/// Training options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LearnOptions {
    pub partial_run: Option<usize>,
    pub learn_flagged: bool,
    pub learn_unflagged: bool,
    pub then_destroy: bool,
    pub then_flag: bool,
    pub move_ham_to: Option<String>,
    pub gmail: bool,
    pub dry_run: bool,
    pub verbose_mails: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LockOptions {
    pub path: PathBuf,
    pub grace: Duration,
    pub ignore: bool,
}

/// Fully validated run configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub mailbox: MailboxSettings,
    pub credentials: Credentials,
    pub process: ProcessOptions,
    pub learn: LearnOptions,
    pub lock: LockOptions,
    pub track_prefix: PathBuf,
    pub password_file: PathBuf,
    pub secret_backend: SecretBackend,
    pub save_password: bool,
    pub interactive: bool,
    pub teach_only: bool,
    pub list_folders: bool,
    pub no_stats: bool,
    pub exit_codes: bool,
    pub spamc: bool,
    pub retry: RetryPolicy,
}

/// `[imap]` section of config.toml. Every key is optional; CLI flags win.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImapFileConfig {
    pub host: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
    #[serde(default)]
    pub nossl: bool,
    #[serde(default)]
    pub starttls: bool,
    pub password: Option<String>,
    pub password_cmd: Option<String>,
    pub inbox: Option<String>,
    pub spam_folder: Option<String>,
    pub learn_spam_folder: Option<String>,
    pub learn_ham_folder: Option<String>,
    pub move_ham_to: Option<String>,
    #[serde(default)]
    pub keyring: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub imap: ImapFileConfig,
}

/// Load config.toml.
///
/// An explicit path must exist; the default path is optional.
pub fn load_file_config(path: Option<&Path>) -> Result<FileConfig> {
    let (path, explicit) = match path {
        Some(p) => (PathBuf::from(p), true),
        None => (resolve::config_file(), false),
    };
    if !path.exists() {
        if explicit {
            return Err(Error::config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        return Ok(FileConfig::default());
    }
    let content = std::fs::read_to_string(&path)?;
    let config: FileConfig = toml::from_str(&content)?;
    Ok(config)
}

impl Settings {
    /// Build settings from parsed flags, reading config.toml as a fallback.
    pub fn from_cli(cli: &Cli, interactive: bool) -> Result<Settings> {
        let file = load_file_config(cli.config.as_deref())?;
        Settings::from_parts(cli, file.imap, interactive)
    }

    pub fn from_parts(cli: &Cli, file: ImapFileConfig, interactive: bool) -> Result<Settings> {
        let host = cli
            .imap_host
            .clone()
            .or(file.host)
            .ok_or_else(|| Error::config("--imaphost is required"))?;
        let user = cli
            .imap_user
            .clone()
            .or(file.user)
            .ok_or_else(|| Error::config("--imapuser is required"))?;

        let security = if cli.nossl || (file.nossl && !cli.starttls) {
            Security::Plain
        } else if cli.starttls || file.starttls {
            Security::StartTls
        } else {
            Security::Tls
        };
        let port = cli
            .imap_port
            .or(file.port)
            .unwrap_or_else(|| security.default_port());

        if let Some(score) = cli.delete_higher_than {
            if !score.is_finite() || score < 1.0 {
                return Err(Error::config(format!("score {} is too small", score)));
            }
        }
        if cli.max_size < 1 {
            return Err(Error::config(format!("size {} is too small", cli.max_size)));
        }
        if !cli.lock_grace.is_finite() || cli.lock_grace < 0.0 {
            return Err(Error::config(format!(
                "lock file grace {} must be 0 or higher",
                cli.lock_grace
            )));
        }

        let mailbox = MailboxSettings {
            host,
            port,
            user,
            security,
            inbox: cli
                .inbox
                .clone()
                .or(file.inbox)
                .unwrap_or_else(|| DEFAULT_INBOX.to_string()),
            spam_folder: cli
                .spam_folder
                .clone()
                .or(file.spam_folder)
                .unwrap_or_else(|| DEFAULT_SPAM_FOLDER.to_string()),
            learn_spam_folder: cli.learn_spam_folder.clone().or(file.learn_spam_folder),
            learn_ham_folder: cli.learn_ham_folder.clone().or(file.learn_ham_folder),
        };
        let hash = mailbox.identity_hash();

        let partial_run = match cli.partial_run {
            0 => None,
            n => Some(n),
        };

        let mut spam_flags = Vec::new();
        if cli.flag {
            spam_flags.push(FLAG_FLAGGED.to_string());
        }
        if cli.delete && !cli.gmail {
            spam_flags.push(FLAG_DELETED.to_string());
        }

        let process = ProcessOptions {
            max_size: cli.max_size,
            partial_run,
            spam_flags,
            delete: cli.delete,
            gmail: cli.gmail,
            expunge: cli.expunge,
            delete_higher_than: cli.delete_higher_than,
            no_report: cli.no_report,
            dry_run: cli.dry_run,
            verbose_mails: cli.verbose_mails,
        };

        let learn = LearnOptions {
            partial_run,
            learn_flagged: cli.learn_flagged,
            learn_unflagged: cli.learn_unflagged,
            then_destroy: cli.learn_then_destroy,
            then_flag: cli.learn_then_flag,
            move_ham_to: cli.move_ham_to.clone().or(file.move_ham_to),
            gmail: cli.gmail,
            dry_run: cli.dry_run,
            verbose_mails: cli.verbose_mails,
        };

        let lock = LockOptions {
            path: cli.lock_file.clone().unwrap_or_else(resolve::lock_file),
            grace: Duration::try_from_secs_f64(cli.lock_grace * 60.0).map_err(|_| {
                Error::config(format!("lock file grace {} is too large", cli.lock_grace))
            })?,
            ignore: cli.ignore_lock,
        };

        Ok(Settings {
            mailbox,
            credentials: Credentials {
                password: cli.imap_password.clone().or(file.password),
                password_cmd: file.password_cmd,
            },
            process,
            learn,
            lock,
            track_prefix: cli
                .track_file
                .clone()
                .unwrap_or_else(|| resolve::track_prefix(&hash)),
            password_file: cli
                .password_file
                .clone()
                .unwrap_or_else(|| resolve::password_file(&hash)),
            secret_backend: if cli.keyring || file.keyring {
                SecretBackend::Keyring
            } else {
                SecretBackend::File
            },
            save_password: cli.save_password,
            interactive: interactive && !cli.non_interactive,
            teach_only: cli.teach_only,
            list_folders: cli.list_folders,
            no_stats: cli.no_stats,
            exit_codes: cli.exit_codes,
            spamc: cli.spamc,
            retry: RetryPolicy::default(),
        })
    }
}
