use once_cell::sync::Lazy;
use regex::Regex;

static SCORE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"score=(-?\d+(?:\.\d+)?) required=(-?\d+(?:\.\d+)?)").unwrap());

/// Extract `score/required` from a SpamAssassin-annotated message.
///
/// Looks for the `score=X required=Y` fragment SpamAssassin writes into
/// `X-Spam-Status`. Returns `None` when the message carries no such line.
pub fn score_from_report(report: &str) -> Option<String> {
    let cap = SCORE_RE.captures(report)?;
    Some(format!("{}/{}", &cap[1], &cap[2]))
}

/// Parse the numeric score out of a `score/required` string.
pub fn parse_score(raw: &str) -> Option<f32> {
    raw.trim().split('/').next()?.trim().parse().ok()
}

/// Render a flag list the way IMAP STORE expects it: `(\Seen \Flagged)`.
pub fn imap_flags<S: AsRef<str>>(flags: &[S]) -> String {
    let joined: Vec<&str> = flags.iter().map(|f| f.as_ref()).collect();
    format!("({})", joined.join(" "))
}

/// Truncate text to `len` characters, appending an ellipsis when cut.
///
/// Used to keep protocol responses and mail bodies readable in debug logs.
pub fn shorten(text: &str, len: usize) -> String {
    let len = len.max(1);
    if text.chars().count() <= len {
        return text.to_string();
    }
    let mut out: String = text.chars().take(len - 1).collect();
    out.push('\u{2026}');
    out
}

/// Lossy, shortened rendering of a raw mail for debug logging.
pub fn mail_preview(mail: &[u8], full: bool) -> String {
    let text = String::from_utf8_lossy(mail);
    if full {
        text.into_owned()
    } else {
        shorten(&text, 140)
    }
}
