//! Error taxonomy and process exit codes.

use std::path::PathBuf;

use thiserror::Error;

use crate::classify::ClassifierError;

pub type Result<T> = std::result::Result<T, Error>;

/// Process exit codes.
///
/// `NewMsgs`, `NewSpam` and `NewMsgSpam` are only returned with
/// `--exitcodes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Ok = 0,
    NewMsgs = 1,
    NewSpam = 2,
    NewMsgSpam = 3,
    Flags = 10,
    Imap = 11,
    Spamc = 12,
    Tty = 20,
    Locked = 30,
    Error = -1,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("option processing failed: {0}")]
    Config(String),

    #[error("{command} returned {response}")]
    Protocol { command: String, response: String },

    #[error("cannot connect to {host}:{port} after {attempts} attempt(s): {reason}")]
    Connect {
        host: String,
        port: u16,
        attempts: u32,
        reason: String,
    },

    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    #[error("lock file {} is present, guessing another run is active", .0.display())]
    Locked(PathBuf),

    #[error("you need to specify your imap password and save it with --savepw")]
    NoPassword,

    #[error("secret store: {0}")]
    Secret(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn protocol(command: impl Into<String>, response: impl ToString) -> Self {
        Error::Protocol {
            command: command.into(),
            response: response.to_string(),
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        match self {
            Error::Config(_) | Error::Toml(_) => ExitCode::Flags,
            Error::Protocol { .. } | Error::Connect { .. } => ExitCode::Imap,
            Error::Classifier(_) => ExitCode::Spamc,
            Error::Locked(_) => ExitCode::Locked,
            Error::NoPassword => ExitCode::Tty,
            Error::Secret(_) | Error::Io(_) | Error::Json(_) => ExitCode::Error,
        }
    }
}
