//! One complete run: lock, log in, train, scan, log out.

use tracing::{info, warn};

use crate::classify::{Classifier, SpamAssassin};
use crate::config::Settings;
use crate::error::{ExitCode, Result};
use crate::lock;
use crate::process::{ProcessStats, Processor};
use crate::secrets;
use crate::seen::SeenStore;
use crate::session::{self, Session};
use crate::train::{Trainer, TrainingSummary};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Set when the run only listed folders.
    pub folders: Option<Vec<String>>,
    pub training: TrainingSummary,
    /// `None` with `--teachonly` or `--imaplist`.
    pub process: Option<ProcessStats>,
}

impl RunSummary {
    /// Exit code for a finished run. Scan outcomes are only reported when
    /// `report_counts` is set.
    pub fn exit_code(&self, report_counts: bool) -> ExitCode {
        let Some(stats) = self.process.as_ref().filter(|_| report_counts) else {
            return ExitCode::Ok;
        };
        if stats.nummsg == 0 {
            ExitCode::Ok
        } else if stats.numspam == 0 {
            ExitCode::NewMsgs
        } else if stats.numspam == stats.nummsg {
            ExitCode::NewSpam
        } else {
            ExitCode::NewMsgSpam
        }
    }

    pub fn log_stats(&self) {
        if let Some(spam) = &self.training.spam {
            info!("{}/{} spams learned", spam.learned, spam.tolearn);
        }
        if let Some(ham) = &self.training.ham {
            info!("{}/{} hams learned", ham.learned, ham.tolearn);
        }
        if let Some(stats) = &self.process {
            info!("{} spams found in {} messages", stats.numspam, stats.nummsg);
            info!("{}/{} was automatically deleted", stats.spamdeleted, stats.numspam);
        }
    }
}

/// Run against the configured server with SpamAssassin.
///
/// The lock is held for the whole run and released on every exit path.
pub fn run(settings: &Settings) -> Result<RunSummary> {
    let _lock = lock::acquire(&settings.lock)?;

    let password = secrets::resolve_password(settings)?;
    let mut session = session::login(&settings.mailbox, &password, &settings.retry)?;
    if settings.save_password {
        secrets::save_password(settings, &password);
    }

    let classifier = SpamAssassin::new(settings.spamc);
    let result = run_session(settings, session.as_mut(), &classifier);
    if let Err(e) = session.logout() {
        warn!(error = %e, "logout failed");
    }
    result
}

/// Everything after login, on an already authenticated session.
pub fn run_session(
    settings: &Settings,
    session: &mut dyn Session,
    classifier: &dyn Classifier,
) -> Result<RunSummary> {
    if settings.list_folders {
        let folders = session.list()?;
        for folder in &folders {
            println!("{}", folder);
        }
        return Ok(RunSummary {
            folders: Some(folders),
            ..Default::default()
        });
    }

    let store = SeenStore::new(&settings.track_prefix);
    let training = Trainer::new(&settings.learn, classifier).run(session, &store, &settings.mailbox)?;
    let process = if settings.teach_only {
        None
    } else {
        Some(Processor::new(&settings.process, &settings.mailbox, classifier).run(session, &store)?)
    };

    let summary = RunSummary {
        folders: None,
        training,
        process,
    };
    if !settings.no_stats {
        summary.log_stats();
    }
    Ok(summary)
}
