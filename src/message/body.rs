//! Body text extraction for content comparison and body hashing.

use encoding_rs::Encoding;
use mailparse::{body::Body, ParsedMail};
use thiserror::Error;

use crate::mailbox::MailboxError;

/// Errors raised while reading a message body as text.
#[derive(Debug, Error)]
pub enum BodyError {
    /// Deferred body could not be re-read from its mailbox.
    #[error(transparent)]
    Mailbox(#[from] MailboxError),

    /// The MIME structure could not be parsed.
    #[error("malformed MIME structure: {0}")]
    Parse(#[from] mailparse::MailParseError),

    /// A text part is not valid in its declared charset.
    #[error("text part is not valid {charset}")]
    Charset { charset: String },
}

impl BodyError {
    /// Whether this error is a decoding problem rather than an I/O one.
    #[must_use]
    pub fn is_encoding(&self) -> bool {
        matches!(self, Self::Charset { .. })
    }
}

/// Collect the body lines of every leaf MIME part.
///
/// Text parts are transfer-decoded then decoded strictly in their declared
/// charset. Other parts contribute their encoded form untouched.
///
/// # Errors
///
/// Returns `BodyError::Parse` for broken MIME and `BodyError::Charset` when a
/// text part cannot be decoded.
pub fn body_lines(message: &[u8]) -> Result<Vec<String>, BodyError> {
    let parsed = mailparse::parse_mail(message)?;
    let mut lines = Vec::new();
    collect_lines(&parsed, &mut lines)?;
    Ok(lines)
}

fn collect_lines(part: &ParsedMail<'_>, lines: &mut Vec<String>) -> Result<(), BodyError> {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            collect_lines(sub, lines)?;
        }
        return Ok(());
    }

    let text = if part.ctype.mimetype.starts_with("text") {
        decode_text(&part.get_body_raw()?, &part.ctype.charset)?
    } else {
        let encoded = match part.get_body_encoded() {
            Body::Base64(body) | Body::QuotedPrintable(body) => body.get_raw().to_vec(),
            Body::SevenBit(body) | Body::EightBit(body) => body.get_raw().to_vec(),
            Body::Binary(body) => body.get_raw().to_vec(),
        };
        match String::from_utf8(encoded) {
            Ok(text) => text,
            Err(e) => e.as_bytes().escape_ascii().to_string(),
        }
    };

    lines.extend(text.lines().map(str::to_string));
    Ok(())
}

fn decode_text(bytes: &[u8], charset: &str) -> Result<String, BodyError> {
    let label = charset.trim().to_ascii_lowercase();
    if label.is_empty() || label == "us-ascii" || label == "ascii" || label == "utf-8" {
        return std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| BodyError::Charset { charset: label });
    }
    Encoding::for_label(label.as_bytes())
        .and_then(|encoding| encoding.decode_without_bom_handling_and_without_replacement(bytes))
        .map(|text| text.into_owned())
        .or_else(|| std::str::from_utf8(bytes).ok().map(str::to_string))
        .ok_or(BodyError::Charset { charset: label })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_body_lines() {
        let raw = b"Subject: x\r\n\r\nline one\r\nline two\r\n";
        assert_eq!(body_lines(raw).unwrap(), vec!["line one", "line two"]);
    }

    #[test]
    fn test_quoted_printable_latin1() {
        let raw = b"Content-Type: text/plain; charset=iso-8859-1\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\r\ncaf=E9\r\n";
        assert_eq!(body_lines(raw).unwrap(), vec!["café"]);
    }

    #[test]
    fn test_multipart_walks_leaves() {
        let raw = b"Content-Type: multipart/mixed; boundary=XX\r\n\r\n\
--XX\r\nContent-Type: text/plain\r\n\r\nhello\r\n\
--XX\r\nContent-Type: application/octet-stream\r\n\
Content-Transfer-Encoding: base64\r\n\r\nAAEC\r\n--XX--\r\n";
        let lines = body_lines(raw).unwrap();
        assert_eq!(lines[0], "hello");
        assert!(lines.iter().any(|l| l.contains("AAEC")));
    }

    #[test]
    fn test_invalid_utf8_text_is_charset_error() {
        let raw = b"Content-Type: text/plain; charset=utf-8\r\n\r\ncaf\xe9\r\n";
        let err = body_lines(raw).unwrap_err();
        assert!(err.is_encoding());
    }
}
