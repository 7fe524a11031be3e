//! Fingerprint hashing.
//!
//! A fingerprint is the BLAKE3 digest of the canonical headers, each name
//! and value length-prefixed so that `("AB", "C")` and `("A", "BC")` never
//! collide, optionally followed by a canonical form of the body.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use super::canonical::CanonicalHeader;

/// Default minimum number of hash headers a message must carry.
pub const DEFAULT_MINIMAL_HEADERS: usize = 4;

/// 256-bit message fingerprint.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Full lowercase hexadecimal form (64 characters).
    #[must_use]
    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }

    /// First 12 hex characters, for log lines.
    #[must_use]
    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// How the body takes part in the fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BodyHashing {
    /// Headers only
    #[default]
    Skip,
    /// Body lines joined with newlines
    Raw,
    /// Body with all whitespace removed
    Normalized,
}

impl fmt::Display for BodyHashing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyHashing::Skip => write!(f, "skip"),
            BodyHashing::Raw => write!(f, "raw"),
            BodyHashing::Normalized => write!(f, "normalized"),
        }
    }
}

impl BodyHashing {
    /// Canonical body bytes fed to the hasher, `None` when the body is skipped.
    #[must_use]
    pub fn canonical_body(self, lines: &[String]) -> Option<Vec<u8>> {
        match self {
            BodyHashing::Skip => None,
            BodyHashing::Raw => Some(lines.join("\n").into_bytes()),
            BodyHashing::Normalized => Some(
                lines
                    .iter()
                    .flat_map(|line| line.chars().filter(|c| !c.is_whitespace()))
                    .collect::<String>()
                    .into_bytes(),
            ),
        }
    }
}

/// The record cannot be fingerprinted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FingerprintError {
    /// Too few of the requested headers are present.
    #[error("only {found} of the required {required} hash headers present")]
    TooFewHeaders { found: usize, required: usize },
}

/// Computes fingerprints from canonical headers.
#[derive(Debug, Clone, Copy)]
pub struct FingerprintHasher {
    minimal_headers: usize,
}

impl Default for FingerprintHasher {
    fn default() -> Self {
        Self {
            minimal_headers: DEFAULT_MINIMAL_HEADERS,
        }
    }
}

impl FingerprintHasher {
    #[must_use]
    pub fn new(minimal_headers: usize) -> Self {
        Self { minimal_headers }
    }

    #[must_use]
    pub fn minimal_headers(&self) -> usize {
        self.minimal_headers
    }

    /// Hash canonical headers and an optional canonical body.
    ///
    /// # Errors
    ///
    /// Returns `FingerprintError::TooFewHeaders` when fewer than
    /// `minimal_headers` headers are present.
    pub fn fingerprint(
        &self,
        headers: &[CanonicalHeader],
        body: Option<&[u8]>,
    ) -> Result<Fingerprint, FingerprintError> {
        if headers.len() < self.minimal_headers {
            return Err(FingerprintError::TooFewHeaders {
                found: headers.len(),
                required: self.minimal_headers,
            });
        }

        let mut hasher = blake3::Hasher::new();
        for header in headers {
            update_field(&mut hasher, header.name.as_bytes());
            update_field(&mut hasher, header.value.as_bytes());
        }
        if let Some(body) = body {
            hasher.update(b"\0body");
            update_field(&mut hasher, body);
        }
        Ok(Fingerprint(*hasher.finalize().as_bytes()))
    }
}

fn update_field(hasher: &mut blake3::Hasher, field: &[u8]) {
    hasher.update(&(field.len() as u64).to_le_bytes());
    hasher.update(field);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(name: &str, value: &str) -> CanonicalHeader {
        CanonicalHeader {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_deterministic() {
        let headers = vec![header("from", "a"), header("to", "b")];
        let hasher = FingerprintHasher::new(2);
        assert_eq!(
            hasher.fingerprint(&headers, None).unwrap(),
            hasher.fingerprint(&headers, None).unwrap()
        );
    }

    #[test]
    fn test_length_prefix_prevents_concatenation_collision() {
        let hasher = FingerprintHasher::new(1);
        let a = hasher.fingerprint(&[header("x", "AB"), header("y", "C")], None).unwrap();
        let b = hasher.fingerprint(&[header("x", "A"), header("y", "BC")], None).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_too_few_headers() {
        let hasher = FingerprintHasher::default();
        let result = hasher.fingerprint(&[header("from", "a")], None);
        assert_eq!(
            result,
            Err(FingerprintError::TooFewHeaders {
                found: 1,
                required: 4
            })
        );
    }

    #[test]
    fn test_body_changes_fingerprint() {
        let hasher = FingerprintHasher::new(1);
        let headers = [header("from", "a")];
        let without = hasher.fingerprint(&headers, None).unwrap();
        let with = hasher.fingerprint(&headers, Some(b"hello")).unwrap();
        let empty = hasher.fingerprint(&headers, Some(b"")).unwrap();
        assert_ne!(without, with);
        assert_ne!(without, empty);
    }

    #[test]
    fn test_canonical_body_modes() {
        let lines = vec!["a b".to_string(), " c".to_string()];
        assert_eq!(BodyHashing::Skip.canonical_body(&lines), None);
        assert_eq!(BodyHashing::Raw.canonical_body(&lines), Some(b"a b\n c".to_vec()));
        assert_eq!(
            BodyHashing::Normalized.canonical_body(&lines),
            Some(b"abc".to_vec())
        );
    }

    #[test]
    fn test_hex_display() {
        let fp = Fingerprint::from_bytes([0xab; 32]);
        assert_eq!(fp.to_hex().len(), 64);
        assert_eq!(fp.short(), "abababababab");
        assert_eq!(serde_json::to_string(&fp).unwrap(), format!("\"{}\"", fp.to_hex()));
    }
}
