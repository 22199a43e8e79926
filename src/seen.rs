//! Seen-UID tracking: which messages of a folder were already handled.
//!
//! One JSON file per folder role, tagged with the folder's UIDVALIDITY. A
//! file written under another UIDVALIDITY reads back as empty, so a recreated
//! folder is scanned from scratch.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;
use crate::session::Uid;

/// Which folder a seen-set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Inbox,
    LearnSpam,
    LearnHam,
}

impl Role {
    pub fn suffix(self) -> &'static str {
        match self {
            Role::Inbox => "inbox",
            Role::LearnSpam => "spam",
            Role::LearnHam => "ham",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// On-disk form: `{"uidvalidity": N, "uids": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenFile {
    pub uidvalidity: u32,
    #[serde(default)]
    pub uids: BTreeSet<Uid>,
}

pub fn load_seen(data: &[u8]) -> Result<SeenFile> {
    let file: SeenFile = serde_json::from_slice(data)?;
    Ok(file)
}

/// Seen-set files sharing one path prefix (one account).
#[derive(Debug, Clone)]
pub struct SeenStore {
    prefix: PathBuf,
}

impl SeenStore {
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn path(&self, role: Role) -> PathBuf {
        let mut name = self.prefix.clone().into_os_string();
        name.push(role.suffix());
        PathBuf::from(name)
    }

    /// UIDs seen under `uidvalidity`.
    ///
    /// Missing, unreadable or corrupt files and a UIDVALIDITY mismatch all
    /// yield an empty set.
    pub fn read(&self, uidvalidity: u32, role: Role) -> BTreeSet<Uid> {
        let path = self.path(role);
        let data = match std::fs::read(&path) {
            Ok(d) => d,
            Err(_) => return BTreeSet::new(),
        };
        match load_seen(&data) {
            Ok(file) if file.uidvalidity == uidvalidity => file.uids,
            Ok(file) => {
                debug!(
                    role = %role,
                    stored = file.uidvalidity,
                    current = uidvalidity,
                    "UIDVALIDITY changed, forgetting seen UIDs"
                );
                BTreeSet::new()
            }
            Err(e) => {
                debug!(role = %role, error = %e, "ignoring unreadable seen file");
                BTreeSet::new()
            }
        }
    }

    /// Persist `orig ∪ new` under `uidvalidity`.
    ///
    /// The file is replaced atomically and readable by the owner only.
    /// Writing the same sets twice produces identical bytes.
    pub fn write(
        &self,
        uidvalidity: u32,
        orig: &BTreeSet<Uid>,
        new: &BTreeSet<Uid>,
        role: Role,
    ) -> Result<()> {
        let file = SeenFile {
            uidvalidity,
            uids: orig.union(new).copied().collect(),
        };
        debug!(
            role = %role,
            orig = orig.len(),
            new = new.len(),
            "writing seen UIDs"
        );
        let path = self.path(role);
        write_atomic(&path, &serde_json::to_vec(&file)?)
    }

    /// Write `retained ∪ new` unless it equals what was `previous`ly read.
    ///
    /// Returns whether the file was written.
    pub fn update(
        &self,
        uidvalidity: u32,
        previous: &BTreeSet<Uid>,
        retained: &BTreeSet<Uid>,
        new: &BTreeSet<Uid>,
        role: Role,
    ) -> Result<bool> {
        let merged: BTreeSet<Uid> = retained.union(new).copied().collect();
        if &merged == previous {
            debug!(role = %role, "seen UIDs unchanged, not writing");
            return Ok(false);
        }
        self.write(uidvalidity, retained, new, role)?;
        Ok(true)
    }
}

pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    restrict_permissions(tmp.path())?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Owner-only access for files holding account state.
pub(crate) fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
