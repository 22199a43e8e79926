//! Recover original mails from SpamAssassin report wrappers.
//!
//! When SpamAssassin is configured to wrap spam, it sends a multipart report
//! whose original message travels as a `message/rfc822` part carrying the
//! `x-spam-type=original` content-type parameter.

use std::io::Read;

use mailparse::{MailParseError, ParsedMail};

const SPAM_TYPE_PARAM: &str = "x-spam-type";
const ORIGINAL: &str = "original";

/// Original mails embedded in a parsed report, or `None` when `mail` is not
/// a report wrapper.
pub fn unwrap_parsed(mail: &ParsedMail) -> Option<Vec<Vec<u8>>> {
    if mail.subparts.is_empty() {
        return None;
    }
    let originals: Vec<Vec<u8>> = mail
        .subparts
        .iter()
        .filter(|part| is_original(part))
        .filter_map(|part| part.get_body_raw().ok())
        .collect();
    if originals.is_empty() {
        None
    } else {
        Some(originals)
    }
}

fn is_original(part: &ParsedMail) -> bool {
    part.ctype
        .params
        .iter()
        .any(|(k, v)| k.eq_ignore_ascii_case(SPAM_TYPE_PARAM) && v.trim() == ORIGINAL)
}

pub fn try_unwrap(mail: &[u8]) -> Result<Option<Vec<Vec<u8>>>, MailParseError> {
    let parsed = mailparse::parse_mail(mail)?;
    Ok(unwrap_parsed(&parsed))
}

/// Like [`try_unwrap`], treating unparseable input as not wrapped.
pub fn unwrap(mail: &[u8]) -> Option<Vec<Vec<u8>>> {
    try_unwrap(mail).ok().flatten()
}

/// Read a whole mail from `reader` and unwrap it.
pub fn unwrap_reader<R: Read>(mut reader: R) -> anyhow::Result<Option<Vec<Vec<u8>>>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok(try_unwrap(&buf)?)
}

/// The mail to classify: the first embedded original, or `mail` itself.
pub fn original_or_self(mail: Vec<u8>) -> Vec<u8> {
    match unwrap(&mail) {
        Some(mut originals) => originals.swap_remove(0),
        None => mail,
    }
}
