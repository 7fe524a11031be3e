//! Header canonicalization.
//!
//! Turns the raw values of the configured hash headers into comparable
//! strings. Volatile details that legitimately differ between copies of the
//! same mail are normalized away:
//!
//! - runs of whitespace collapse to one space, surrounding space is trimmed
//! - `Subject`: mailing-list tags such as `[list] ` (with leading `Re: `) are removed
//! - `Content-Type`: parameters after the first `;` are dropped
//! - `Date`: reduced to the UTC calendar day (`YYYY-MM-DD`)
//! - address headers: double quotes are removed
//! - `To` and `Message-ID`: a single `<...>` wrapper is stripped
//!
//! Values are decoded with a strict chain (UTF-8, then each configured
//! fallback charset). When every decoding fails the value is hashed through
//! its escaped byte representation and a [`HeaderDecodeWarning`] is raised.

use std::sync::OnceLock;

use encoding_rs::Encoding;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use super::headers::{parse_date, RawHeaders};
use crate::config::ConfigError;

/// Headers hashed when none are configured.
pub const DEFAULT_HASH_HEADERS: &[&str] = &[
    "Date",
    "From",
    "To",
    "Subject",
    "MIME-Version",
    "Content-Type",
    "Content-Disposition",
    "User-Agent",
    "X-Priority",
    "Message-ID",
];

/// Headers holding addresses, whose quoting varies between copies.
pub const ADDRESS_HEADERS: &[&str] = &[
    "from",
    "to",
    "cc",
    "bcc",
    "reply-to",
    "sender",
    "return-path",
];

/// Joins the canonical values of a repeated header.
pub const VALUE_SEPARATOR: &str = "\n";

/// A header value that no configured charset could decode.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("undecodable {header} header, hashing escaped bytes {escaped:?}")]
pub struct HeaderDecodeWarning {
    /// Lower-cased header name.
    pub header: String,
    /// Escaped representation that was hashed instead.
    pub escaped: String,
}

/// One canonical `(name, value)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalHeader {
    /// Lower-cased header name.
    pub name: String,
    /// Normalized value; repeated headers are joined with [`VALUE_SEPARATOR`].
    pub value: String,
}

/// Output of [`Canonicalizer::canonicalize`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Canonicalized {
    pub headers: Vec<CanonicalHeader>,
    pub warnings: Vec<HeaderDecodeWarning>,
}

impl Canonicalized {
    /// Whether any value had to fall back to its escaped bytes.
    #[must_use]
    pub fn encoding_suspect(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Header canonicalizer bound to a header list and a charset chain.
#[derive(Debug, Clone)]
pub struct Canonicalizer {
    requested: Vec<String>,
    fallbacks: Vec<&'static Encoding>,
}

impl Canonicalizer {
    /// Build a canonicalizer.
    ///
    /// Header names are matched case-insensitively; repeated names are
    /// ignored after their first occurrence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownCharset` for an unrecognized charset label.
    pub fn new<S: AsRef<str>>(headers: &[S], fallback_charsets: &[S]) -> Result<Self, ConfigError> {
        let mut requested: Vec<String> = Vec::with_capacity(headers.len());
        for name in headers {
            let name = name.as_ref().trim().to_ascii_lowercase();
            if !name.is_empty() && !requested.contains(&name) {
                requested.push(name);
            }
        }

        let fallbacks = fallback_charsets
            .iter()
            .map(|label| {
                Encoding::for_label(label.as_ref().as_bytes())
                    .ok_or_else(|| ConfigError::UnknownCharset(label.as_ref().to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            requested,
            fallbacks,
        })
    }

    /// Canonicalizer over [`DEFAULT_HASH_HEADERS`] with a UTF-8-only chain.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            requested: DEFAULT_HASH_HEADERS
                .iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
            fallbacks: Vec::new(),
        }
    }

    /// Lower-cased, de-duplicated header names, in hashing order.
    #[must_use]
    pub fn requested(&self) -> &[String] {
        &self.requested
    }

    /// Canonicalize the requested headers of one message.
    ///
    /// Headers that are absent, or whose every value normalizes to an empty
    /// string, do not appear in the output.
    #[must_use]
    pub fn canonicalize(&self, headers: &RawHeaders) -> Canonicalized {
        let mut out = Canonicalized::default();

        for name in &self.requested {
            let mut values = Vec::new();
            for raw in headers.get_all(name) {
                let text = match self.decode(raw) {
                    Some(text) => text,
                    None => {
                        let escaped = raw.escape_ascii().to_string();
                        log::warn!("Cannot decode {name} header value {escaped:?}");
                        out.warnings.push(HeaderDecodeWarning {
                            header: name.clone(),
                            escaped: escaped.clone(),
                        });
                        escaped
                    }
                };
                let value = normalize_value(name, &decode_encoded_words(&text));
                if !value.is_empty() {
                    values.push(value);
                }
            }
            if !values.is_empty() {
                out.headers.push(CanonicalHeader {
                    name: name.clone(),
                    value: values.join(VALUE_SEPARATOR),
                });
            }
        }

        out
    }

    fn decode(&self, raw: &[u8]) -> Option<String> {
        if let Ok(text) = std::str::from_utf8(raw) {
            return Some(text.to_string());
        }
        self.fallbacks.iter().find_map(|encoding| {
            encoding
                .decode_without_bom_handling_and_without_replacement(raw)
                .map(|text| text.into_owned())
        })
    }
}

/// Decode RFC 2047 encoded words (`=?charset?B?...?=`), if any.
fn decode_encoded_words(text: &str) -> String {
    if !text.contains("=?") {
        return text.to_string();
    }
    let line = format!("X: {text}");
    match mailparse::parse_header(line.as_bytes()) {
        Ok((header, _)) => header.get_value(),
        Err(_) => text.to_string(),
    }
}

fn subject_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^(?:[Rr]e: )*(?:\[\w[\w_-]+\w\] )+(.+)$").expect("valid subject tag regex")
    })
}

fn bracketed_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^<[^<>,]+>$").expect("valid bracket regex"))
}

/// Normalize one decoded value of the (lower-cased) header `name`.
#[must_use]
pub fn normalize_value(name: &str, value: &str) -> String {
    let mut value = value.split_whitespace().collect::<Vec<_>>().join(" ");

    match name {
        "subject" => {
            while let Some(rest) = subject_tag_regex()
                .captures(&value)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
            {
                value = rest;
            }
            return value;
        }
        "content-type" => {
            if let Some(idx) = value.find(';') {
                value.truncate(idx);
            }
            return value;
        }
        "date" => {
            return match parse_date(&value) {
                Some(date) => date.format("%Y-%m-%d").to_string(),
                None => value,
            };
        }
        _ => {}
    }

    if ADDRESS_HEADERS.contains(&name) {
        value = value.replace('"', "");
    }

    if (name == "to" || name == "message-id") && bracketed_regex().is_match(&value) {
        value = value[1..value.len() - 1].to_string();
    }

    value
}
