//! Mailbox session: the protocol surface both engines drive.
//!
//! Every folder-scoped operation names its folder explicitly. Implementations
//! select (or examine) the folder on demand, so callers never depend on
//! whichever folder a previous call happened to leave selected.

pub mod client;

use std::fmt;
use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::error::Result;

pub use self::client::{login, ImapSession};

/// Server-assigned message UID, stable within one folder epoch.
pub type Uid = u32;

/// Flag command used for every STORE we issue.
pub const ADD_FLAGS_SILENT: &str = "+FLAGS.SILENT";

/// Gmail does not expunge on `\Deleted`; deletion means a copy here.
pub const GMAIL_TRASH: &str = "[Gmail]/Trash";

pub const FLAG_DELETED: &str = "\\Deleted";
pub const FLAG_FLAGGED: &str = "\\Flagged";

/// UID SEARCH criteria we need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchQuery {
    All,
    Smaller(u64),
    Flagged,
    Unflagged,
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchQuery::All => write!(f, "ALL"),
            SearchQuery::Smaller(size) => write!(f, "SMALLER {}", size),
            SearchQuery::Flagged => write!(f, "FLAGGED"),
            SearchQuery::Unflagged => write!(f, "UNFLAGGED"),
        }
    }
}

/// Subset of a STATUS response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FolderStatus {
    pub uid_validity: Option<u32>,
    pub messages: Option<u32>,
}

/// Remote mailbox operations.
///
/// Any non-OK server response surfaces as [`crate::error::Error::Protocol`]
/// carrying the failed command (credentials redacted) and the response.
/// None of the mutating calls are transactional.
pub trait Session {
    /// Select `folder`; `read_only` uses EXAMINE.
    fn select(&mut self, folder: &str, read_only: bool) -> Result<()>;

    /// UIDs matching `query`, in ascending order.
    fn search(&mut self, folder: &str, query: SearchQuery) -> Result<Vec<Uid>>;

    /// Full raw message (`BODY.PEEK[]`). `None` when the server returned no
    /// body, e.g. the message was expunged under us.
    fn fetch(&mut self, folder: &str, uid: Uid) -> Result<Option<Vec<u8>>>;

    fn store(&mut self, folder: &str, uid: Uid, command: &str, flags: &[&str]) -> Result<()>;

    fn copy(&mut self, folder: &str, uid: Uid, dest: &str) -> Result<()>;

    fn append(&mut self, folder: &str, body: &[u8]) -> Result<()>;

    fn expunge(&mut self, folder: &str) -> Result<()>;

    fn status(&mut self, folder: &str) -> Result<FolderStatus>;

    fn list(&mut self) -> Result<Vec<String>>;

    fn logout(&mut self) -> Result<()>;

    /// The folder's UIDVALIDITY, or 0 when it cannot be obtained.
    fn uid_validity(&mut self, folder: &str) -> u32 {
        match self.status(folder) {
            Ok(status) => status.uid_validity.unwrap_or(0),
            Err(e) => {
                warn!(folder, error = %e, "cannot read UIDVALIDITY");
                0
            }
        }
    }
}

/// Bounded retry of connection establishment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay: Duration::from_millis(600),
        }
    }
}

impl RetryPolicy {
    /// Run `connect` until it succeeds or the attempts are exhausted.
    ///
    /// Each failure is logged; the last one is returned with the number of
    /// attempts made.
    pub fn run<T, E, F>(&self, mut connect: F) -> std::result::Result<T, (E, u32)>
    where
        E: fmt::Display,
        F: FnMut() -> std::result::Result<T, E>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match connect() {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!("error in IMAP connection: {} ... retry {} of {}", e, attempt, attempts);
                    if attempt >= attempts {
                        return Err((e, attempt));
                    }
                    attempt += 1;
                    thread::sleep(self.delay);
                }
            }
        }
    }
}
