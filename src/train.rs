//! Teach the classifier from the learn-spam and learn-ham folders.

use std::collections::BTreeSet;

use tracing::{debug, error, info, warn};

use crate::batch::{self, Order};
use crate::classify::{Classifier, ClassifierError, LearnKind, LearnStatus};
use crate::config::{LearnOptions, MailboxSettings};
use crate::error::Result;
use crate::seen::{Role, SeenStore};
use crate::session::{
    SearchQuery, Session, Uid, ADD_FLAGS_SILENT, FLAG_DELETED, FLAG_FLAGGED, GMAIL_TRASH,
};
use crate::unwrap::original_or_self;
use crate::util::mail_preview;

/// Counters for one training folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LearnStats {
    pub tolearn: usize,
    pub learned: usize,
    pub already_learned: usize,
    pub too_big: usize,
    /// Messages skipped after a classifier failure; they stay unseen.
    pub failed: usize,
    /// UIDs handled by this run.
    pub uids: BTreeSet<Uid>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrainingSummary {
    pub spam: Option<LearnStats>,
    pub ham: Option<LearnStats>,
}

pub struct Trainer<'a> {
    options: &'a LearnOptions,
    classifier: &'a dyn Classifier,
}

impl<'a> Trainer<'a> {
    pub fn new(options: &'a LearnOptions, classifier: &'a dyn Classifier) -> Self {
        Self {
            options,
            classifier,
        }
    }

    /// Learn from every configured training folder, spam first.
    pub fn run(
        &self,
        session: &mut dyn Session,
        store: &SeenStore,
        mailbox: &MailboxSettings,
    ) -> Result<TrainingSummary> {
        let mut summary = TrainingSummary::default();
        if let Some(folder) = mailbox.learn_spam_folder.as_deref() {
            summary.spam =
                Some(self.learn_folder(session, store, folder, LearnKind::Spam, Role::LearnSpam)?);
        }
        if let Some(folder) = mailbox.learn_ham_folder.as_deref() {
            summary.ham =
                Some(self.learn_folder(session, store, folder, LearnKind::Ham, Role::LearnHam)?);
        }
        Ok(summary)
    }

    /// Learn the unseen messages of one folder as `kind`.
    ///
    /// Newest messages go first so a batch limit favours recent mail. An
    /// engine that refuses learning aborts the whole run.
    pub fn learn_folder(
        &self,
        session: &mut dyn Session,
        store: &SeenStore,
        folder: &str,
        kind: LearnKind,
        role: Role,
    ) -> Result<LearnStats> {
        let opts = self.options;
        debug!(folder, %kind, "teaching classifier");

        let uidvalidity = session.uid_validity(folder);
        let seen = store.read(uidvalidity, role);

        let query = if opts.learn_unflagged {
            SearchQuery::Unflagged
        } else if opts.learn_flagged {
            SearchQuery::Flagged
        } else {
            SearchQuery::All
        };
        let found = session.search(folder, query)?;
        let batch = batch::select(&found, &seen, opts.partial_run, Order::NewestFirst);

        let move_to = match kind {
            LearnKind::Ham => opts.move_ham_to.as_deref(),
            _ => None,
        };

        let mut stats = LearnStats {
            tolearn: batch.candidates.len(),
            ..Default::default()
        };

        for &uid in &batch.candidates {
            let Some(body) = session.fetch(folder, uid)? else {
                warn!(uid, folder, "server returned no body, skipping");
                stats.failed += 1;
                continue;
            };
            let mail = original_or_self(body);
            debug!(uid, mail = %mail_preview(&mail, opts.verbose_mails), "learning");

            if opts.dry_run {
                info!(uid, "skipping learn because of --dryrun");
                stats.uids.insert(uid);
                continue;
            }

            let outcome = match self.classifier.learn(&mail, kind) {
                Ok(o) => o,
                Err(e) => {
                    error!(uid, error = %e, "classifier error, will retry next run");
                    stats.failed += 1;
                    continue;
                }
            };
            match outcome.status {
                LearnStatus::Learned => {
                    stats.learned += 1;
                    debug!(uid, code = outcome.exit_code, "learned");
                }
                LearnStatus::AlreadyLearned => {
                    stats.already_learned += 1;
                    debug!(uid, code = outcome.exit_code, "already learned");
                }
                LearnStatus::TooBig => {
                    stats.too_big += 1;
                    warn!(uid, code = outcome.exit_code, "too big to learn");
                }
                LearnStatus::Misconfigured => {
                    return Err(ClassifierError::Misconfigured {
                        code: outcome.exit_code,
                    }
                    .into());
                }
                LearnStatus::Unknown => {
                    return Err(ClassifierError::UnknownLearnCode {
                        code: outcome.exit_code,
                        output: outcome.output,
                    }
                    .into());
                }
            }
            stats.uids.insert(uid);
            self.dispose(session, folder, uid, move_to)?;
        }

        if opts.dry_run {
            debug!(folder, "not writing seen UIDs because of --dryrun");
        } else {
            store.update(uidvalidity, &seen, &batch.retained, &stats.uids, role)?;
        }
        Ok(stats)
    }

    /// First match wins: destroy, move, flag.
    fn dispose(
        &self,
        session: &mut dyn Session,
        folder: &str,
        uid: Uid,
        move_to: Option<&str>,
    ) -> Result<()> {
        let opts = self.options;
        if opts.then_destroy {
            if opts.gmail {
                session.copy(folder, uid, GMAIL_TRASH)
            } else {
                session.store(folder, uid, ADD_FLAGS_SILENT, &[FLAG_DELETED])
            }
        } else if let Some(dest) = move_to {
            session.copy(folder, uid, dest)?;
            session.store(folder, uid, ADD_FLAGS_SILENT, &[FLAG_DELETED])
        } else if opts.then_flag {
            session.store(folder, uid, ADD_FLAGS_SILENT, &[FLAG_FLAGGED])
        } else {
            Ok(())
        }
    }
}
