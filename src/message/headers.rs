//! Raw header block of a message.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// The header block could not be split from the message.
#[derive(Debug, Error)]
#[error("malformed header block: {0}")]
pub struct HeaderParseError(#[from] mailparse::MailParseError);

/// Ordered header fields, exactly as found in the source.
///
/// Names are matched case-insensitively; a name may repeat and the order of
/// repeated values is preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawHeaders {
    entries: Vec<(String, Vec<u8>)>,
}

impl RawHeaders {
    /// Split the header block off `message`.
    ///
    /// Returns the headers and the byte offset where the body starts.
    ///
    /// # Errors
    ///
    /// Returns `HeaderParseError` if the header block is malformed.
    pub fn parse(message: &[u8]) -> Result<(Self, usize), HeaderParseError> {
        let (headers, body_offset) = mailparse::parse_headers(message)?;
        let entries = headers
            .iter()
            .map(|h| (h.get_key(), h.get_value_raw().to_vec()))
            .collect();
        Ok((Self { entries }, body_offset.min(message.len())))
    }

    /// Build headers from `(name, value)` pairs.
    #[must_use]
    pub fn from_pairs<N: Into<String>, V: Into<Vec<u8>>>(
        pairs: impl IntoIterator<Item = (N, V)>,
    ) -> Self {
        Self {
            entries: pairs
                .into_iter()
                .map(|(n, v)| (n.into(), v.into()))
                .collect(),
        }
    }

    /// All raw values of `name`, in source order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.entries
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_slice())
    }

    /// First raw value of `name`.
    #[must_use]
    pub fn first<'a>(&'a self, name: &'a str) -> Option<&'a [u8]> {
        self.get_all(name).next()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.first(name).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

/// Parse a `Date` header value.
///
/// RFC 2822 is tried first. The lenient parser handles obsolete forms but
/// yields the epoch for input it cannot read, so a zero result counts as a
/// failure.
#[must_use]
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.with_timezone(&Utc));
    }
    match mailparse::dateparse(value) {
        Ok(ts) if ts != 0 => DateTime::from_timestamp(ts, 0),
        _ => None,
    }
}
