//! Spam classifier adapter.
//!
//! The engines only see the [`Classifier`] trait. [`SpamAssassin`] drives the
//! real `spamassassin`/`spamc` binaries, one subprocess per message with the
//! raw mail on stdin.

use std::fmt;
use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::debug;

use crate::util::score_from_report;

/// Exit codes spamc uses when spamd refuses TELL (learning disabled).
pub const MISCONFIGURED_CODES: [i32; 2] = [69, 74];
/// spamc EX_TOOBIG.
pub const TOO_BIG_CODE: i32 = 98;

const ALREADY_LEARNED: &str = "Message was already un/learned";
const LEARNED: &str = "Message successfully un/learned";

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("cannot run {cmd}: {source}")]
    Spawn {
        cmd: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{cmd} failed: {source}")]
    Io {
        cmd: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{cmd} was terminated by a signal")]
    NoExitCode { cmd: String },
    #[error("no score found in {cmd} output")]
    NoScore { cmd: String },
    #[error("spamc -> spamd error (score 0/0)")]
    Degenerate,
    #[error("{cmd} returned an empty message")]
    EmptyReport { cmd: String },
    #[error("spamassassin is misconfigured, exit code {code} (use --allow-tell)")]
    Misconfigured { code: i32 },
    #[error("unknown return code {code} from spamc: {output}")]
    UnknownLearnCode { code: i32, output: String },
}

/// Test-mode result for one message.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// `score/required` as reported, e.g. `8.0/5.0`.
    pub score: String,
    pub exit_code: i32,
    pub is_spam: bool,
}

impl Verdict {
    /// A non-zero exit code means spam.
    pub fn new(score: impl Into<String>, exit_code: i32) -> Self {
        Self {
            score: score.into(),
            exit_code,
            is_spam: exit_code != 0,
        }
    }

    pub fn score_value(&self) -> Option<f32> {
        crate::util::parse_score(&self.score)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnKind {
    Spam,
    Ham,
    Forget,
}

impl LearnKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LearnKind::Spam => "spam",
            LearnKind::Ham => "ham",
            LearnKind::Forget => "forget",
        }
    }
}

impl fmt::Display for LearnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnStatus {
    Learned,
    AlreadyLearned,
    /// spamd does not accept learning; fatal for the whole run.
    Misconfigured,
    TooBig,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearnOutcome {
    pub status: LearnStatus,
    pub exit_code: i32,
    /// Trimmed stdout, kept for diagnostics.
    pub output: String,
}

pub trait Classifier {
    /// Classify without modifying the message.
    fn test(&self, mail: &[u8]) -> Result<Verdict, ClassifierError>;

    /// Return the message rewritten with the classifier's report embedded.
    fn feed(&self, mail: &[u8]) -> Result<Vec<u8>, ClassifierError>;

    /// Teach the classifier.
    fn learn(&self, mail: &[u8], kind: LearnKind) -> Result<LearnOutcome, ClassifierError>;
}

/// SpamAssassin via `spamassassin` (standalone) or `spamc` (daemon client).
#[derive(Debug, Clone, Copy, Default)]
pub struct SpamAssassin {
    pub spamc: bool,
}

impl SpamAssassin {
    pub fn new(spamc: bool) -> Self {
        Self { spamc }
    }

    pub fn test_command(&self) -> Vec<String> {
        if self.spamc {
            vec!["spamc".into(), "-c".into()]
        } else {
            vec!["spamassassin".into(), "--exit-code".into()]
        }
    }

    pub fn feed_command(&self) -> Vec<String> {
        if self.spamc {
            vec!["spamc".into()]
        } else {
            vec!["spamassassin".into()]
        }
    }

    pub fn learn_command(&self, kind: LearnKind) -> Vec<String> {
        vec!["spamc".into(), format!("--learntype={}", kind)]
    }
}

impl Classifier for SpamAssassin {
    fn test(&self, mail: &[u8]) -> Result<Verdict, ClassifierError> {
        let cmd = self.test_command();
        let (stdout, code) = pipe(&cmd, mail)?;
        parse_test_output(&cmd.join(" "), self.spamc, &String::from_utf8_lossy(&stdout), code)
    }

    fn feed(&self, mail: &[u8]) -> Result<Vec<u8>, ClassifierError> {
        let cmd = self.feed_command();
        let (stdout, code) = pipe(&cmd, mail)?;
        if stdout.is_empty() {
            return Err(ClassifierError::EmptyReport { cmd: cmd.join(" ") });
        }
        debug!(code, "fed message through {}", cmd.join(" "));
        Ok(stdout)
    }

    fn learn(&self, mail: &[u8], kind: LearnKind) -> Result<LearnOutcome, ClassifierError> {
        let cmd = self.learn_command(kind);
        let (stdout, code) = pipe(&cmd, mail)?;
        Ok(parse_learn_output(code, &String::from_utf8_lossy(&stdout)))
    }
}

/// Turn test-mode output into a verdict.
///
/// `spamc -c` prints `score/required`; `spamassassin --exit-code` prints the
/// annotated message, whose `X-Spam-Status` carries the score.
pub fn parse_test_output(
    cmd: &str,
    spamc: bool,
    stdout: &str,
    code: i32,
) -> Result<Verdict, ClassifierError> {
    let score = if spamc {
        let s = stdout.trim();
        if s.is_empty() {
            return Err(ClassifierError::NoScore { cmd: cmd.to_string() });
        }
        s.to_string()
    } else {
        score_from_report(stdout).ok_or_else(|| ClassifierError::NoScore {
            cmd: cmd.to_string(),
        })?
    };
    if score == "0/0" {
        return Err(ClassifierError::Degenerate);
    }
    Ok(Verdict::new(score, code))
}

pub fn parse_learn_output(code: i32, stdout: &str) -> LearnOutcome {
    let output = stdout.trim().to_string();
    let status = match code {
        0 if output == ALREADY_LEARNED => LearnStatus::AlreadyLearned,
        0 if output == LEARNED => LearnStatus::Learned,
        c if MISCONFIGURED_CODES.contains(&c) => LearnStatus::Misconfigured,
        TOO_BIG_CODE => LearnStatus::TooBig,
        _ => LearnStatus::Unknown,
    };
    LearnOutcome {
        status,
        exit_code: code,
        output,
    }
}

/// Run `cmd` with `input` on stdin; return (stdout, exit code).
///
/// stdin is written from a helper thread so a child that starts answering
/// before it has read everything cannot deadlock us.
pub fn pipe<S: AsRef<str>>(cmd: &[S], input: &[u8]) -> Result<(Vec<u8>, i32), ClassifierError> {
    let cmd_str = cmd.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join(" ");
    let (program, args) = match cmd.split_first() {
        Some((p, rest)) => (p.as_ref(), rest),
        None => {
            return Err(ClassifierError::Spawn {
                cmd: cmd_str,
                source: std::io::Error::new(ErrorKind::InvalidInput, "empty command"),
            });
        }
    };
    debug!("$ {}", cmd_str);

    let mut child = Command::new(program)
        .args(args.iter().map(|a| a.as_ref()))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ClassifierError::Spawn {
            cmd: cmd_str.clone(),
            source,
        })?;

    let mut stdin = child.stdin.take();
    let (output, written) = std::thread::scope(|s| {
        let writer = s.spawn(move || match stdin.as_mut() {
            Some(pipe) => pipe.write_all(input),
            None => Ok(()),
        });
        let output = child.wait_with_output();
        (output, writer.join())
    });

    let output = output.map_err(|source| ClassifierError::Io {
        cmd: cmd_str.clone(),
        source,
    })?;
    if let Ok(Err(e)) = written {
        // The child may exit without draining stdin; that is its call.
        if e.kind() != ErrorKind::BrokenPipe {
            return Err(ClassifierError::Io {
                cmd: cmd_str,
                source: e,
            });
        }
    }

    let code = output
        .status
        .code()
        .ok_or_else(|| ClassifierError::NoExitCode {
            cmd: cmd_str.clone(),
        })?;
    if !output.stderr.is_empty() {
        debug!(code, stderr = %String::from_utf8_lossy(&output.stderr).trim(), "{} stderr", cmd_str);
    }
    Ok((output.stdout, code))
}
