//! Inbox scan: classify unseen mail and move spam aside.
//!
//! Classification happens first, one message at a time. Flagging, deletion
//! and trash moves on the inbox are deferred to a second pass over the
//! collected lists, so a failure there cannot change any verdict.

use std::collections::BTreeSet;

use tracing::{debug, error, info, warn};

use crate::batch::{self, Order};
use crate::classify::{Classifier, Verdict};
use crate::config::{MailboxSettings, ProcessOptions};
use crate::error::Result;
use crate::seen::{Role, SeenStore};
use crate::session::{
    SearchQuery, Session, Uid, ADD_FLAGS_SILENT, FLAG_DELETED, GMAIL_TRASH,
};
use crate::unwrap::original_or_self;
use crate::util::mail_preview;

/// Outcome of one inbox scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessStats {
    /// Messages that got a verdict.
    pub nummsg: usize,
    /// Spam found, including `spamdeleted`.
    pub numspam: usize,
    /// Spam over the delete threshold.
    pub spamdeleted: usize,
    /// Messages skipped after a classifier or append failure.
    pub failed: usize,
    /// Unseen messages left for a later run by the batch limit.
    pub deferred: usize,
    /// UIDs marked seen by this run.
    pub seen: BTreeSet<Uid>,
    pub spam: Vec<Uid>,
    pub deleted: Vec<Uid>,
}

pub struct Processor<'a> {
    options: &'a ProcessOptions,
    inbox: &'a str,
    spam_folder: &'a str,
    classifier: &'a dyn Classifier,
}

impl<'a> Processor<'a> {
    pub fn new(
        options: &'a ProcessOptions,
        mailbox: &'a MailboxSettings,
        classifier: &'a dyn Classifier,
    ) -> Self {
        Self {
            options,
            inbox: &mailbox.inbox,
            spam_folder: &mailbox.spam_folder,
            classifier,
        }
    }

    /// Scan the inbox once.
    ///
    /// Protocol errors abort the scan. Classifier failures and spam-folder
    /// append failures only skip the message, which stays unseen.
    pub fn run(&self, session: &mut dyn Session, store: &SeenStore) -> Result<ProcessStats> {
        let opts = self.options;

        // The spam folder must exist before anything is classified.
        session.select(self.spam_folder, true)?;
        // STATUS is not allowed on the selected mailbox.
        let uidvalidity = session.uid_validity(self.inbox);
        session.select(self.inbox, true)?;

        let seen = store.read(uidvalidity, Role::Inbox);
        let found = session.search(self.inbox, SearchQuery::Smaller(opts.max_size))?;
        let batch = batch::select(&found, &seen, opts.partial_run, Order::Search);
        debug!(
            found = found.len(),
            seen = seen.len(),
            "got {} mails to check",
            batch.candidates.len()
        );

        let mut stats = ProcessStats {
            deferred: batch.deferred,
            ..Default::default()
        };

        for &uid in &batch.candidates {
            let Some(body) = session.fetch(self.inbox, uid)? else {
                warn!(uid, "server returned no body, skipping");
                stats.failed += 1;
                continue;
            };
            let mail = original_or_self(body);
            debug!(uid, mail = %mail_preview(&mail, opts.verbose_mails), "testing");

            let verdict = match self.classifier.test(&mail) {
                Ok(v) => v,
                Err(e) => {
                    error!(uid, error = %e, "classifier error, will retry next run");
                    stats.failed += 1;
                    continue;
                }
            };
            stats.nummsg += 1;
            debug!(uid, score = %verdict.score, "score");

            if !verdict.is_spam {
                stats.seen.insert(uid);
                continue;
            }

            debug!(uid, "is spam");
            match self.handle_spam(session, uid, &verdict, &mail)? {
                SpamDisposition::Delete => stats.deleted.push(uid),
                SpamDisposition::Keep => stats.spam.push(uid),
                SpamDisposition::Retry => {
                    stats.failed += 1;
                    continue;
                }
            }
            stats.seen.insert(uid);
        }

        stats.spamdeleted = stats.deleted.len();
        stats.numspam = stats.spam.len() + stats.spamdeleted;

        if stats.numspam > 0 {
            if opts.dry_run {
                info!("skipping labelling/expunging of mails because of --dryrun");
            } else {
                self.apply_mutations(session, &stats)?;
            }
        }

        if opts.dry_run {
            debug!("not writing seen UIDs because of --dryrun");
        } else {
            store.update(uidvalidity, &seen, &batch.retained, &stats.seen, Role::Inbox)?;
        }
        Ok(stats)
    }

    fn handle_spam(
        &self,
        session: &mut dyn Session,
        uid: Uid,
        verdict: &Verdict,
        mail: &[u8],
    ) -> Result<SpamDisposition> {
        let opts = self.options;

        if let (Some(limit), Some(score)) = (opts.delete_higher_than, verdict.score_value()) {
            if score > limit {
                debug!(uid, score, limit, "over delete threshold");
                return Ok(SpamDisposition::Delete);
            }
        }

        if opts.no_report {
            if opts.dry_run {
                info!(uid, "skipping copy to spam folder because of --dryrun");
            } else {
                session.copy(self.inbox, uid, self.spam_folder)?;
            }
            return Ok(SpamDisposition::Keep);
        }

        if opts.dry_run {
            info!(uid, "skipping report because of --dryrun");
            return Ok(SpamDisposition::Keep);
        }

        let report = match self.classifier.feed(mail) {
            Ok(r) => r,
            Err(e) => {
                error!(uid, error = %e, "cannot build spam report, leaving original message alone");
                return Ok(SpamDisposition::Retry);
            }
        };
        if let Err(e) = session.append(self.spam_folder, &report) {
            error!(
                uid,
                folder = self.spam_folder,
                error = %e,
                "append failed, leaving original message alone"
            );
            return Ok(SpamDisposition::Retry);
        }
        Ok(SpamDisposition::Keep)
    }

    fn apply_mutations(&self, session: &mut dyn Session, stats: &ProcessStats) -> Result<()> {
        let opts = self.options;
        session.select(self.inbox, false)?;

        if !opts.spam_flags.is_empty() {
            let flags: Vec<&str> = opts.spam_flags.iter().map(String::as_str).collect();
            for &uid in &stats.spam {
                session.store(self.inbox, uid, ADD_FLAGS_SILENT, &flags)?;
            }
        }
        // Gmail ignores \Deleted; deleting there means a copy to the trash.
        if opts.delete && opts.gmail {
            for &uid in &stats.spam {
                session.copy(self.inbox, uid, GMAIL_TRASH)?;
            }
        }
        for &uid in &stats.deleted {
            if opts.gmail {
                session.copy(self.inbox, uid, GMAIL_TRASH)?;
            } else {
                session.store(self.inbox, uid, ADD_FLAGS_SILENT, &[FLAG_DELETED])?;
            }
        }
        if opts.expunge {
            session.expunge(self.inbox)?;
        }
        Ok(())
    }
}

enum SpamDisposition {
    /// Stays in the inbox, gets the spam flags.
    Keep,
    /// Over the score threshold.
    Delete,
    /// Could not be filed; leave it unseen.
    Retry,
}
