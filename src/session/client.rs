//! IMAP session over the `imap` crate.

use std::io::{Read, Write};
use std::net::TcpStream;

use tracing::{debug, warn};

use super::{FolderStatus, RetryPolicy, SearchQuery, Session, Uid};
use crate::config::{MailboxSettings, Security};
use crate::error::{Error, Result};
use crate::util::{imap_flags, shorten};

/// Connect and authenticate.
///
/// Connection establishment (TCP, TLS handshake, greeting) is retried per
/// `retry`; an authentication failure is returned immediately.
pub fn login(
    mailbox: &MailboxSettings,
    password: &str,
    retry: &RetryPolicy,
) -> Result<Box<dyn Session>> {
    let host = mailbox.host.as_str();
    let port = mailbox.port;
    let connect_failed = |(e, attempts): (imap::error::Error, u32)| Error::Connect {
        host: host.to_string(),
        port,
        attempts,
        reason: e.to_string(),
    };

    match mailbox.security {
        Security::Plain => {
            let client = retry.run(|| connect_plain(host, port)).map_err(connect_failed)?;
            warn!("using insecure IMAP connection without TLS");
            let session = authenticate(client, &mailbox.user, password)?;
            Ok(Box::new(ImapSession::new(session)))
        }
        Security::Tls | Security::StartTls => {
            let starttls = mailbox.security == Security::StartTls;
            let tls = tls_connector(host).map_err(|e| Error::Connect {
                host: host.to_string(),
                port,
                attempts: 0,
                reason: e.to_string(),
            })?;
            let client = retry
                .run(|| {
                    if starttls {
                        imap::connect_starttls((host, port), host, &tls)
                    } else {
                        imap::connect((host, port), host, &tls)
                    }
                })
                .map_err(connect_failed)?;
            let session = authenticate(client, &mailbox.user, password)?;
            Ok(Box::new(ImapSession::new(session)))
        }
    }
}

fn tls_connector(host: &str) -> std::result::Result<native_tls::TlsConnector, native_tls::Error> {
    let mut tls_builder = native_tls::TlsConnector::builder();

    // Local bridges (e.g. ProtonMail Bridge) present self-signed certificates.
    if host == "127.0.0.1" || host == "localhost" {
        tls_builder.danger_accept_invalid_certs(true);
        tls_builder.danger_accept_invalid_hostnames(true);
    }

    tls_builder.build()
}

fn connect_plain(host: &str, port: u16) -> imap::error::Result<imap::Client<TcpStream>> {
    let stream = TcpStream::connect((host, port))?;
    let mut client = imap::Client::new(stream);
    client.read_greeting()?;
    Ok(client)
}

fn authenticate<T: Read + Write>(
    client: imap::Client<T>,
    user: &str,
    password: &str,
) -> Result<imap::Session<T>> {
    let mut session = client
        .login(user, password)
        .map_err(|(e, _)| Error::protocol(format!("LOGIN {} xxxxxxxx", user), e))?;
    debug!("LOGIN {} xxxxxxxx = OK", user);
    if let Ok(caps) = session.capabilities() {
        let caps: Vec<String> = caps.iter().map(|c| format!("{:?}", c)).collect();
        debug!("server capabilities: {}", caps.join(" "));
    }
    Ok(session)
}

/// Live IMAP session.
pub struct ImapSession<T: Read + Write> {
    inner: imap::Session<T>,
    /// Currently selected folder and whether it was EXAMINEd.
    selected: Option<(String, bool)>,
}

impl<T: Read + Write> ImapSession<T> {
    pub fn new(inner: imap::Session<T>) -> Self {
        Self {
            inner,
            selected: None,
        }
    }

    fn ensure_selected(&mut self, folder: &str, writable: bool) -> Result<()> {
        if let Some((current, read_only)) = &self.selected {
            if current == folder && (!writable || !read_only) {
                return Ok(());
            }
        }
        self.select(folder, !writable)
    }
}

fn checked<V, E: std::fmt::Display>(command: String, res: std::result::Result<V, E>) -> Result<V> {
    match res {
        Ok(v) => {
            debug!("{} = OK", shorten(&command, 140));
            Ok(v)
        }
        Err(e) => {
            debug!("{} = {}", shorten(&command, 140), e);
            Err(Error::protocol(command, e))
        }
    }
}

impl<T: Read + Write> Session for ImapSession<T> {
    fn select(&mut self, folder: &str, read_only: bool) -> Result<()> {
        self.selected = None;
        if read_only {
            checked(format!("EXAMINE {}", folder), self.inner.examine(folder))?;
        } else {
            checked(format!("SELECT {}", folder), self.inner.select(folder))?;
        }
        self.selected = Some((folder.to_string(), read_only));
        Ok(())
    }

    fn search(&mut self, folder: &str, query: SearchQuery) -> Result<Vec<Uid>> {
        self.ensure_selected(folder, false)?;
        let found = checked(
            format!("UID SEARCH {}", query),
            self.inner.uid_search(query.to_string()),
        )?;
        let mut uids: Vec<Uid> = found.into_iter().collect();
        uids.sort_unstable();
        Ok(uids)
    }

    fn fetch(&mut self, folder: &str, uid: Uid) -> Result<Option<Vec<u8>>> {
        self.ensure_selected(folder, false)?;
        let fetches = checked(
            format!("UID FETCH {} BODY.PEEK[]", uid),
            self.inner.uid_fetch(uid.to_string(), "BODY.PEEK[]"),
        )?;
        Ok(fetches.iter().find_map(|f| f.body().map(|b| b.to_vec())))
    }

    fn store(&mut self, folder: &str, uid: Uid, command: &str, flags: &[&str]) -> Result<()> {
        self.ensure_selected(folder, true)?;
        let query = format!("{} {}", command, imap_flags(flags));
        checked(
            format!("UID STORE {} {}", uid, query),
            self.inner.uid_store(uid.to_string(), &query),
        )?;
        Ok(())
    }

    fn copy(&mut self, folder: &str, uid: Uid, dest: &str) -> Result<()> {
        self.ensure_selected(folder, false)?;
        checked(
            format!("UID COPY {} {}", uid, dest),
            self.inner.uid_copy(uid.to_string(), dest),
        )
    }

    fn append(&mut self, folder: &str, body: &[u8]) -> Result<()> {
        checked(format!("APPEND {}", folder), self.inner.append(folder, body))
    }

    fn expunge(&mut self, folder: &str) -> Result<()> {
        self.ensure_selected(folder, true)?;
        checked("EXPUNGE".to_string(), self.inner.expunge())?;
        Ok(())
    }

    fn status(&mut self, folder: &str) -> Result<FolderStatus> {
        let mailbox = checked(
            format!("STATUS {} (UIDVALIDITY MESSAGES)", folder),
            self.inner.status(folder, "(UIDVALIDITY MESSAGES)"),
        )?;
        Ok(FolderStatus {
            uid_validity: mailbox.uid_validity,
            messages: Some(mailbox.exists),
        })
    }

    fn list(&mut self) -> Result<Vec<String>> {
        let names = checked(
            "LIST \"\" \"*\"".to_string(),
            self.inner.list(Some(""), Some("*")),
        )?;
        Ok(names.iter().map(|n| n.name().to_string()).collect())
    }

    fn logout(&mut self) -> Result<()> {
        self.selected = None;
        checked("LOGOUT".to_string(), self.inner.logout())
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_command_is_not_logged_as_error() {
        let out = Captured::default();
        let writer = out.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .finish();

        let res: Result<()> = tracing::subscriber::with_default(subscriber, || {
            checked("APPEND INBOX.Spam".to_string(), Err::<(), _>("NO [OVERQUOTA]"))
        });

        let err = res.unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
        assert_eq!(err.to_string(), "APPEND INBOX.Spam returned NO [OVERQUOTA]");
        let logged = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("DEBUG"));
        assert!(!logged.contains("ERROR"));
        assert!(!logged.contains("aborting"));
    }
}
