//! Shared test fixtures: an in-memory IMAP server and a scripted classifier.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use clap::Parser;

use spamsweep::classify::{
    Classifier, ClassifierError, LearnKind, LearnOutcome, LearnStatus, Verdict,
};
use spamsweep::cli::Cli;
use spamsweep::config::{ImapFileConfig, Settings};
use spamsweep::error::{Error, Result};
use spamsweep::session::{FolderStatus, SearchQuery, Session, Uid, ADD_FLAGS_SILENT};

/// A minimal RFC 2822 message whose subject doubles as its test marker.
pub fn mail(subject: &str) -> Vec<u8> {
    format!(
        "From: sender@example.com\r\nTo: alice@example.com\r\nSubject: {subject}\r\n\r\nThis is {subject}.\r\n"
    )
    .into_bytes()
}

pub fn has_marker(mail: &[u8], marker: &str) -> bool {
    String::from_utf8_lossy(mail).contains(&format!("Subject: {}\r\n", marker))
}

/// A SpamAssassin report wrapping `original`.
pub fn wrapped(original: &[u8]) -> Vec<u8> {
    let mut out = b"From: spamd@example.com\r\n\
Subject: *****SPAM***** report\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"----------=_61A2B3C4\"\r\n\
\r\n\
------------=_61A2B3C4\r\n\
Content-Type: text/plain; charset=iso-8859-1\r\n\
\r\n\
Spam detection software has identified this incoming email as possible spam.\r\n\
\r\n\
------------=_61A2B3C4\r\n\
Content-Type: message/rfc822; x-spam-type=original\r\n\
Content-Description: original message before SpamAssassin\r\n\
Content-Transfer-Encoding: 8bit\r\n\
\r\n"
        .to_vec();
    out.extend_from_slice(original);
    out.extend_from_slice(b"\r\n------------=_61A2B3C4--\r\n");
    out
}

#[derive(Debug, Clone, Default)]
pub struct FakeMessage {
    pub body: Vec<u8>,
    pub flags: BTreeSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeFolder {
    pub uid_validity: u32,
    pub next_uid: Uid,
    pub messages: BTreeMap<Uid, FakeMessage>,
}

impl FakeFolder {
    fn insert(&mut self, message: FakeMessage) -> Uid {
        self.next_uid += 1;
        self.messages.insert(self.next_uid, message);
        self.next_uid
    }
}

/// In-memory mailbox server.
#[derive(Debug, Default)]
pub struct FakeSession {
    pub folders: BTreeMap<String, FakeFolder>,
    /// Every command issued, e.g. `STORE INBOX 2 +FLAGS.SILENT (\Flagged)`.
    pub log: Vec<String>,
    pub fail_append: bool,
    /// Reject STATUS on the selected mailbox, as strict servers do.
    pub strict_status: bool,
    pub selected: Option<(String, bool)>,
    pub logged_out: bool,
}

impl FakeSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_folder(mut self, name: &str, uid_validity: u32) -> Self {
        self.folders.insert(
            name.to_string(),
            FakeFolder {
                uid_validity,
                ..Default::default()
            },
        );
        self
    }

    pub fn add_message(&mut self, folder: &str, body: Vec<u8>) -> Uid {
        self.folder_mut(folder)
            .unwrap()
            .insert(FakeMessage {
                body,
                flags: BTreeSet::new(),
            })
    }

    pub fn add_flagged(&mut self, folder: &str, body: Vec<u8>) -> Uid {
        let uid = self.add_message(folder, body);
        self.folder_mut(folder)
            .unwrap()
            .messages
            .get_mut(&uid)
            .unwrap()
            .flags
            .insert("\\Flagged".to_string());
        uid
    }

    pub fn folder(&self, name: &str) -> &FakeFolder {
        &self.folders[name]
    }

    pub fn messages(&self, folder: &str) -> Vec<Vec<u8>> {
        self.folder(folder)
            .messages
            .values()
            .map(|m| m.body.clone())
            .collect()
    }

    pub fn has_flag(&self, folder: &str, uid: Uid, flag: &str) -> bool {
        self.folder(folder)
            .messages
            .get(&uid)
            .map(|m| m.flags.contains(flag))
            .unwrap_or(false)
    }

    /// Commands that changed server state.
    pub fn mutations(&self) -> Vec<String> {
        self.log
            .iter()
            .filter(|c| {
                ["STORE", "COPY", "APPEND", "EXPUNGE"]
                    .iter()
                    .any(|p| c.starts_with(p))
            })
            .cloned()
            .collect()
    }

    fn folder_mut(&mut self, name: &str) -> Result<&mut FakeFolder> {
        self.folders
            .get_mut(name)
            .ok_or_else(|| Error::protocol(format!("SELECT {}", name), "NO [NONEXISTENT] unknown mailbox"))
    }
}

impl Session for FakeSession {
    fn select(&mut self, folder: &str, read_only: bool) -> Result<()> {
        self.folder_mut(folder)?;
        let verb = if read_only { "EXAMINE" } else { "SELECT" };
        self.log.push(format!("{} {}", verb, folder));
        self.selected = Some((folder.to_string(), !read_only));
        Ok(())
    }

    fn search(&mut self, folder: &str, query: SearchQuery) -> Result<Vec<Uid>> {
        self.log.push(format!("SEARCH {} {}", folder, query));
        let f = self.folder_mut(folder)?;
        Ok(f.messages
            .iter()
            .filter(|(_, m)| match query {
                SearchQuery::All => true,
                SearchQuery::Smaller(size) => (m.body.len() as u64) < size,
                SearchQuery::Flagged => m.flags.contains("\\Flagged"),
                SearchQuery::Unflagged => !m.flags.contains("\\Flagged"),
            })
            .map(|(uid, _)| *uid)
            .collect())
    }

    fn fetch(&mut self, folder: &str, uid: Uid) -> Result<Option<Vec<u8>>> {
        self.log.push(format!("FETCH {} {}", folder, uid));
        let f = self.folder_mut(folder)?;
        Ok(f.messages.get(&uid).map(|m| m.body.clone()))
    }

    fn store(&mut self, folder: &str, uid: Uid, command: &str, flags: &[&str]) -> Result<()> {
        assert_eq!(command, ADD_FLAGS_SILENT);
        self.log.push(format!(
            "STORE {} {} {} ({})",
            folder,
            uid,
            command,
            flags.join(" ")
        ));
        let f = self.folder_mut(folder)?;
        let message = f
            .messages
            .get_mut(&uid)
            .ok_or_else(|| Error::protocol(format!("UID STORE {}", uid), "NO no such message"))?;
        message.flags.extend(flags.iter().map(|s| s.to_string()));
        Ok(())
    }

    fn copy(&mut self, folder: &str, uid: Uid, dest: &str) -> Result<()> {
        self.log.push(format!("COPY {} {} {}", folder, uid, dest));
        let message = self
            .folder_mut(folder)?
            .messages
            .get(&uid)
            .cloned()
            .ok_or_else(|| Error::protocol(format!("UID COPY {}", uid), "NO no such message"))?;
        self.folder_mut(dest)
            .map_err(|_| Error::protocol(format!("UID COPY {} {}", uid, dest), "NO [TRYCREATE]"))?
            .insert(FakeMessage {
                body: message.body,
                flags: BTreeSet::new(),
            });
        Ok(())
    }

    fn append(&mut self, folder: &str, body: &[u8]) -> Result<()> {
        self.log.push(format!("APPEND {}", folder));
        if self.fail_append {
            return Err(Error::protocol(format!("APPEND {}", folder), "NO [OVERQUOTA] quota exceeded"));
        }
        self.folder_mut(folder)?.insert(FakeMessage {
            body: body.to_vec(),
            flags: BTreeSet::new(),
        });
        Ok(())
    }

    fn expunge(&mut self, folder: &str) -> Result<()> {
        self.log.push(format!("EXPUNGE {}", folder));
        self.folder_mut(folder)?
            .messages
            .retain(|_, m| !m.flags.contains("\\Deleted"));
        Ok(())
    }

    fn status(&mut self, folder: &str) -> Result<FolderStatus> {
        self.log.push(format!("STATUS {}", folder));
        if self.strict_status && self.selected.as_ref().is_some_and(|(f, _)| f == folder) {
            return Err(Error::protocol(
                format!("STATUS {}", folder),
                "BAD STATUS not allowed on the selected mailbox",
            ));
        }
        let f = self.folder_mut(folder)?;
        Ok(FolderStatus {
            uid_validity: Some(f.uid_validity),
            messages: Some(f.messages.len() as u32),
        })
    }

    fn list(&mut self) -> Result<Vec<String>> {
        Ok(self.folders.keys().cloned().collect())
    }

    fn logout(&mut self) -> Result<()> {
        self.logged_out = true;
        Ok(())
    }
}

/// Scripted classifier keyed by subject markers. Unknown mail is ham.
#[derive(Debug, Default)]
pub struct FakeClassifier {
    spam: Vec<(String, String)>,
    broken: Vec<String>,
    learn: Vec<(String, LearnStatus, i32)>,
    learn_broken: Vec<String>,
    pub feed_fails: bool,
    pub tested: RefCell<Vec<Vec<u8>>>,
    pub fed: RefCell<Vec<Vec<u8>>>,
    pub learned: RefCell<Vec<(LearnKind, Vec<u8>)>>,
}

impl FakeClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mail with this subject is spam with `score`.
    pub fn spam(mut self, marker: &str, score: &str) -> Self {
        self.spam.push((marker.to_string(), score.to_string()));
        self
    }

    /// Testing mail with this subject fails like an unreachable spamd.
    pub fn broken(mut self, marker: &str) -> Self {
        self.broken.push(marker.to_string());
        self
    }

    /// Learning mail with this subject reports `status`.
    pub fn learn_status(mut self, marker: &str, status: LearnStatus, code: i32) -> Self {
        self.learn.push((marker.to_string(), status, code));
        self
    }

    /// Learning mail with this subject fails like an unreachable spamd.
    pub fn learn_broken(mut self, marker: &str) -> Self {
        self.learn_broken.push(marker.to_string());
        self
    }

    pub fn tested_count(&self) -> usize {
        self.tested.borrow().len()
    }

    pub fn learned_markers(&self, markers: &[&str]) -> Vec<String> {
        self.learned
            .borrow()
            .iter()
            .filter_map(|(_, m)| {
                markers
                    .iter()
                    .find(|marker| has_marker(m, marker))
                    .map(|s| s.to_string())
            })
            .collect()
    }
}

impl Classifier for FakeClassifier {
    fn test(&self, mail: &[u8]) -> std::result::Result<Verdict, ClassifierError> {
        self.tested.borrow_mut().push(mail.to_vec());
        if self.broken.iter().any(|m| has_marker(mail, m)) {
            return Err(ClassifierError::Degenerate);
        }
        match self.spam.iter().find(|(m, _)| has_marker(mail, m)) {
            Some((_, score)) => Ok(Verdict::new(score.clone(), 1)),
            None => Ok(Verdict::new("1.0/5.0", 0)),
        }
    }

    fn feed(&self, mail: &[u8]) -> std::result::Result<Vec<u8>, ClassifierError> {
        self.fed.borrow_mut().push(mail.to_vec());
        if self.feed_fails {
            return Err(ClassifierError::EmptyReport {
                cmd: "spamassassin".to_string(),
            });
        }
        let mut out = b"X-Spam-Flag: YES\r\n".to_vec();
        out.extend_from_slice(mail);
        Ok(out)
    }

    fn learn(
        &self,
        mail: &[u8],
        kind: LearnKind,
    ) -> std::result::Result<LearnOutcome, ClassifierError> {
        if self.learn_broken.iter().any(|m| has_marker(mail, m)) {
            return Err(ClassifierError::Spawn {
                cmd: "spamc".to_string(),
                source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
            });
        }
        self.learned.borrow_mut().push((kind, mail.to_vec()));
        let (status, code) = self
            .learn
            .iter()
            .find(|(m, _, _)| has_marker(mail, m))
            .map(|(_, s, c)| (*s, *c))
            .unwrap_or((LearnStatus::Learned, 0));
        Ok(LearnOutcome {
            status,
            exit_code: code,
            output: String::new(),
        })
    }
}

/// Settings parsed from `spamsweep --imaphost ... <extra>` with cache files
/// under `dir`.
pub fn settings(dir: &Path, extra: &[&str]) -> Settings {
    let track = dir.join("track");
    let lock = dir.join("lock");
    let pw = dir.join("pw");
    let mut args = vec![
        "spamsweep".to_string(),
        "--imaphost".to_string(),
        "imap.example.com".to_string(),
        "--imapuser".to_string(),
        "alice".to_string(),
        "--trackfile".to_string(),
        track.display().to_string(),
        "--lockfilename".to_string(),
        lock.display().to_string(),
        "--passwdfilename".to_string(),
        pw.display().to_string(),
    ];
    args.extend(extra.iter().map(|s| s.to_string()));
    let cli = Cli::parse_from(args);
    Settings::from_parts(&cli, ImapFileConfig::default(), false).unwrap()
}
