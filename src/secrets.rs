//! Saved IMAP credentials and password resolution.
//!
//! Two stores are available. [`SecretFile`] obfuscates values, it does not
//! encrypt them: they are XORed with a keystream derived from the account
//! identity so the file does not hold the password in clear text, and
//! protection comes from the owner-only file mode. [`SecretKeyring`] hands
//! values to the OS keyring.

use std::cell::RefCell;
use std::collections::hash_map::Entry as Slot;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use tracing::{debug, info};

use crate::config::{MailboxSettings, SecretBackend, Settings};
use crate::error::{Error, Result};
use crate::seen::write_atomic;

/// Keystream length; also the longest value that can be stored.
pub const KEY_LEN: usize = 256;

pub const PASSWORD_KEY: &str = "password";

/// Keyring service name every entry is filed under.
pub const KEYRING_SERVICE: &str = "spamsweep";

/// Key/value secret storage for one account.
pub trait SecretStore {
    /// Stored value for `key`; `None` when nothing is stored.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`. Fails when `key` exists and `overwrite`
    /// is false.
    fn set(&self, key: &str, value: &str, overwrite: bool) -> Result<()>;

    /// Remove `key`. Fails when nothing is stored under it.
    fn delete(&self, key: &str) -> Result<()>;

    /// Human readable location, for logging.
    fn describe(&self) -> String;
}

/// Open the store selected in `settings`.
pub fn open_store(settings: &Settings) -> Box<dyn SecretStore> {
    match settings.secret_backend {
        SecretBackend::File => Box::new(SecretFile::new(&settings.password_file, &settings.mailbox)),
        SecretBackend::Keyring => Box::new(SecretKeyring::new(&settings.mailbox)),
    }
}

/// A JSON file of obfuscated key/value pairs.
pub struct SecretFile {
    path: PathBuf,
    key: Vec<u8>,
}

impl SecretFile {
    pub fn new(path: impl Into<PathBuf>, mailbox: &MailboxSettings) -> Self {
        Self {
            path: path.into(),
            key: keystream(mailbox),
        }
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        let data = std::fs::read(&self.path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    fn store(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        write_atomic(&self.path, &serde_json::to_vec(entries)?)
    }

    /// The whole keystream with `value` XORed over its head, hex encoded.
    fn obfuscate(&self, value: &str) -> Result<String> {
        let bytes = value.as_bytes();
        if bytes.len() > KEY_LEN {
            return Err(Error::Secret(format!(
                "value of length {} is too long to store (max accepted is {})",
                bytes.len(),
                KEY_LEN
            )));
        }
        let mut out = self.key.clone();
        for (o, b) in out.iter_mut().zip(bytes) {
            *o ^= b;
        }
        Ok(hex::encode(out))
    }

    fn deobfuscate(&self, value: &str) -> Result<String> {
        let bytes = hex::decode(value)
            .map_err(|e| Error::Secret(format!("stored value is not hex: {}", e)))?;
        let plain: Vec<u8> = bytes
            .iter()
            .zip(&self.key)
            .map(|(b, k)| b ^ k)
            .take_while(|&c| c != 0)
            .collect();
        String::from_utf8(plain).map_err(|_| Error::Secret("stored value is not UTF-8".to_string()))
    }
}

impl SecretStore for SecretFile {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let data = match std::fs::read(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entries: BTreeMap<String, String> = serde_json::from_slice(&data)?;
        entries
            .get(key)
            .map(|value| self.deobfuscate(value))
            .transpose()
    }

    // An unreadable file is replaced.
    fn set(&self, key: &str, value: &str, overwrite: bool) -> Result<()> {
        let mut entries = self.load().unwrap_or_default();
        if !overwrite && entries.contains_key(key) {
            return Err(Error::Secret(format!("key '{}' exists", key)));
        }
        entries.insert(key.to_string(), self.obfuscate(value)?);
        self.store(&entries)
    }

    // The file goes away with its last key.
    fn delete(&self, key: &str) -> Result<()> {
        let not_found = || Error::Secret(format!("key '{}' not found and cannot be deleted", key));
        let mut entries = self.load().map_err(|_| not_found())?;
        if entries.remove(key).is_none() {
            return Err(not_found());
        }
        if entries.is_empty() {
            std::fs::remove_file(&self.path)?;
            Ok(())
        } else {
            self.store(&entries)
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Secrets held in the OS keyring, one entry per key.
///
/// Entries are filed under [`KEYRING_SERVICE`] with the account identity
/// hash prefixed to the key, so several accounts can share a keyring.
pub struct SecretKeyring {
    prefix: String,
    entries: RefCell<HashMap<String, keyring::Entry>>,
}

impl SecretKeyring {
    pub fn new(mailbox: &MailboxSettings) -> Self {
        Self {
            prefix: mailbox.identity_hash(),
            entries: RefCell::new(HashMap::new()),
        }
    }

    fn account(&self, key: &str) -> String {
        format!("{}-{}", self.prefix, key)
    }

    fn with_entry<T>(
        &self,
        key: &str,
        f: impl FnOnce(&keyring::Entry) -> keyring::Result<T>,
    ) -> Result<std::result::Result<T, keyring::Error>> {
        let account = self.account(key);
        let mut entries = self.entries.borrow_mut();
        let entry = match entries.entry(account.clone()) {
            Slot::Occupied(e) => e.into_mut(),
            Slot::Vacant(v) => {
                let built = keyring::Entry::new(KEYRING_SERVICE, &account).map_err(|e| {
                    Error::Secret(format!("cannot build keyring entry for '{}': {}", key, e))
                })?;
                v.insert(built)
            }
        };
        Ok(f(entry))
    }
}

impl SecretStore for SecretKeyring {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.with_entry(key, |e| e.get_password())? {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(Error::Secret(format!("cannot read '{}' from keyring: {}", key, e))),
        }
    }

    fn set(&self, key: &str, value: &str, overwrite: bool) -> Result<()> {
        if !overwrite && self.get(key)?.is_some() {
            return Err(Error::Secret(format!("key '{}' exists", key)));
        }
        self.with_entry(key, |e| e.set_password(value))?
            .map_err(|e| Error::Secret(format!("cannot store '{}' in keyring: {}", key, e)))
    }

    fn delete(&self, key: &str) -> Result<()> {
        match self.with_entry(key, |e| e.delete_credential())? {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Err(Error::Secret(format!(
                "key '{}' not found and cannot be deleted",
                key
            ))),
            Err(e) => Err(Error::Secret(format!("cannot delete '{}' from keyring: {}", key, e))),
        }
    }

    fn describe(&self) -> String {
        format!("keyring service {}", KEYRING_SERVICE)
    }
}

/// Chained MD5 over the account identity, `KEY_LEN` bytes long.
fn keystream(mailbox: &MailboxSettings) -> Vec<u8> {
    let mut ctx = md5::Context::new();
    ctx.consume(mailbox.host.as_bytes());
    ctx.consume(mailbox.user.as_bytes());
    ctx.consume(mailbox.port.to_string().as_bytes());
    ctx.consume(mailbox.identity_hash().as_bytes());
    let mut digest = ctx.compute();

    let mut out = Vec::with_capacity(KEY_LEN);
    while out.len() < KEY_LEN {
        out.extend_from_slice(&digest.0);
        let mut next = md5::Context::new();
        next.consume(digest.0);
        next.consume(format!("{:x}", digest).as_bytes());
        digest = next.compute();
    }
    out.truncate(KEY_LEN);
    out
}

/// Resolve the IMAP password.
///
/// Order: explicit password, `password_cmd`, saved secret (not when about to
/// save a new one), interactive prompt.
pub fn resolve_password(settings: &Settings) -> Result<String> {
    if let Some(password) = &settings.credentials.password {
        return Ok(password.clone());
    }
    if let Some(cmd) = &settings.credentials.password_cmd {
        return run_password_cmd(cmd);
    }
    if !settings.save_password {
        let store = open_store(settings);
        match store.get(PASSWORD_KEY) {
            Ok(Some(password)) => {
                debug!("successfully read password from {}", store.describe());
                return Ok(password);
            }
            Ok(None) => {}
            Err(e) => tracing::error!(error = %e, "error reading saved password"),
        }
    }
    if !settings.interactive {
        return Err(Error::NoPassword);
    }
    let prompt = format!(
        "IMAP password for {}@{}: ",
        settings.mailbox.user, settings.mailbox.host
    );
    Ok(rpassword::prompt_password(prompt)?)
}

fn run_password_cmd(cmd: &str) -> Result<String> {
    let output = std::process::Command::new("sh").arg("-c").arg(cmd).output()?;
    if !output.status.success() {
        return Err(Error::Secret(format!(
            "password_cmd failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Save `password` for later runs. Failures are logged only.
pub fn save_password(settings: &Settings, password: &str) {
    let store = open_store(settings);
    match store.set(PASSWORD_KEY, password, true) {
        Ok(()) => info!("password saved to {}", store.describe()),
        Err(e) => tracing::error!(error = %e, "error saving password"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mailbox() -> MailboxSettings {
        MailboxSettings::new("imap.example.com", "alice", 993)
    }

    #[test]
    fn test_keystream_is_stable_and_account_specific() {
        let a = keystream(&mailbox());
        assert_eq!(a.len(), KEY_LEN);
        assert_eq!(a, keystream(&mailbox()));
        let other = MailboxSettings::new("imap.example.com", "bob", 993);
        assert_ne!(a, keystream(&other));
    }

    #[test]
    fn test_obfuscation_hides_value() {
        let dir = tempfile::tempdir().unwrap();
        let secret = SecretFile::new(dir.path().join("pw"), &mailbox());
        let stored = secret.obfuscate("hunter2").unwrap();
        assert_eq!(stored.len(), KEY_LEN * 2);
        assert!(!stored.contains(&hex::encode(b"hunter2")));
        assert_eq!(secret.deobfuscate(&stored).unwrap(), "hunter2");
    }

    #[test]
    fn test_too_long_value() {
        let dir = tempfile::tempdir().unwrap();
        let secret = SecretFile::new(dir.path().join("pw"), &mailbox());
        assert!(secret.obfuscate(&"x".repeat(KEY_LEN + 1)).is_err());
    }

    #[test]
    fn test_deobfuscate_rejects_non_hex() {
        let dir = tempfile::tempdir().unwrap();
        let secret = SecretFile::new(dir.path().join("pw"), &mailbox());
        assert!(matches!(secret.deobfuscate("zz"), Err(Error::Secret(_))));
        assert!(matches!(secret.deobfuscate("abc"), Err(Error::Secret(_))));
    }

    fn mock_keyring() {
        keyring::set_default_credential_builder(keyring::mock::default_credential_builder());
    }

    #[test]
    fn test_keyring_account_is_prefixed_with_identity() {
        let store = SecretKeyring::new(&mailbox());
        assert_eq!(
            store.account(PASSWORD_KEY),
            format!("{}-password", mailbox().identity_hash())
        );
    }

    #[test]
    fn test_keyring_get_set_delete() {
        mock_keyring();
        let store = SecretKeyring::new(&mailbox());
        assert_eq!(store.get(PASSWORD_KEY).unwrap(), None);

        store.set(PASSWORD_KEY, "hunter2", true).unwrap();
        assert_eq!(store.get(PASSWORD_KEY).unwrap().as_deref(), Some("hunter2"));
        assert!(matches!(
            store.set(PASSWORD_KEY, "other", false),
            Err(Error::Secret(_))
        ));

        store.delete(PASSWORD_KEY).unwrap();
        assert_eq!(store.get(PASSWORD_KEY).unwrap(), None);
        assert!(matches!(store.delete(PASSWORD_KEY), Err(Error::Secret(_))));
    }
}
