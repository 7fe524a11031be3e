//! Application configuration management.
//!
//! Settings are merged from, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. the TOML config file (`--config`, or `config.toml` in the platform
//!    config directory)
//! 3. `MAILDEDUP_*` environment variables (`__` separates nested keys)
//! 4. command-line flags, passed as [`ConfigOverrides`]
//!
//! The merged [`Config`] is checked by [`Config::validate`] before any
//! mailbox is opened.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::duplicates::strategy::{Strategy, UnknownStrategy};
use crate::duplicates::validator::{
    EncodingPolicy, SimilarityValidator, Threshold, DEFAULT_CONTENT_THRESHOLD,
    DEFAULT_SIZE_THRESHOLD,
};
use crate::mailbox::BoxFormat;
use crate::message::{
    BodyHashing, Canonicalizer, TimeSource, DEFAULT_HASH_HEADERS, DEFAULT_MINIMAL_HEADERS,
};

/// Prefix of environment variables read by [`Config::load`].
pub const ENV_PREFIX: &str = "MAILDEDUP_";

/// Errors in the merged configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file given with `--config` does not exist.
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// A provider could not be read or a value has the wrong type.
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// The config file could not be written.
    #[error("failed to write configuration to {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The selected strategy needs a parameter that is not set.
    #[error("strategy {strategy} requires the --{parameter} parameter")]
    MissingParameter {
        strategy: String,
        parameter: &'static str,
    },

    #[error("invalid {name} threshold {value}: use -1 to disable or a byte count")]
    InvalidThreshold { name: &'static str, value: i64 },

    #[error("invalid regular expression {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error(transparent)]
    UnknownStrategy(#[from] UnknownStrategy),

    #[error("unknown charset {0:?}")]
    UnknownCharset(String),

    #[error("minimal_headers must be between 1 and the number of hash headers ({headers})")]
    InvalidMinimalHeaders { value: usize, headers: usize },

    #[error("at least one hash header is required")]
    NoHashHeaders,

    #[error("threads must be at least 1")]
    InvalidThreads,
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Headers taking part in the fingerprint, in hashing order.
    pub hash_headers: Vec<String>,
    /// Minimum number of hash headers a message must carry.
    pub minimal_headers: usize,
    pub hash_body: BodyHashing,
    /// Maximum body size difference inside a set, `-1` to disable.
    pub size_threshold: i64,
    /// Maximum unified diff length inside a set, `-1` to disable.
    pub content_threshold: i64,
    pub time_source: TimeSource,
    pub encoding_policy: EncodingPolicy,
    /// Charsets tried in order when a header value is not UTF-8.
    pub fallback_charsets: Vec<String>,
    pub strategy: Option<Strategy>,
    /// Path pattern for the path strategies.
    pub regexp: Option<String>,
    /// Log the diff of every compared pair.
    pub show_diff: bool,
    /// Worker threads for hashing and validation.
    pub threads: usize,
    /// Keep only headers in memory and re-read bodies on demand.
    pub lazy_bodies: bool,
    /// Force the input format instead of detecting it.
    pub input_format: Option<BoxFormat>,
    /// Remove stale mbox lock files.
    pub force_unlock: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hash_headers: DEFAULT_HASH_HEADERS.iter().map(|h| (*h).to_string()).collect(),
            minimal_headers: DEFAULT_MINIMAL_HEADERS,
            hash_body: BodyHashing::default(),
            size_threshold: DEFAULT_SIZE_THRESHOLD,
            content_threshold: DEFAULT_CONTENT_THRESHOLD,
            time_source: TimeSource::default(),
            encoding_policy: EncodingPolicy::default(),
            fallback_charsets: Vec::new(),
            strategy: None,
            regexp: None,
            show_diff: false,
            threads: 4,
            lazy_bodies: true,
            input_format: None,
            force_unlock: false,
        }
    }
}

/// Values given on the command line. `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_headers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimal_headers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_body: Option<BodyHashing>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_threshold: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_threshold: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_source: Option<TimeSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding_policy: Option<EncodingPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_charsets: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regexp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_diff: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lazy_bodies: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_format: Option<BoxFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_unlock: Option<bool>,
}

impl Config {
    /// Build the provider stack without extracting it.
    ///
    /// # Arguments
    ///
    /// * `file` - Explicit config file; the platform default is used if `None`
    #[must_use]
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        match file.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => {
                log::debug!("Reading configuration from {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
            None => log::debug!("No configuration directory available"),
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load defaults, config file and environment.
    ///
    /// A missing default config file is not an error; a missing explicit
    /// one is.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::FileNotFound` for a missing explicit file and
    /// `ConfigError::Load` if the file is malformed or a value has the
    /// wrong type.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_overrides(file, &ConfigOverrides::default())
    }

    /// Load all layers and apply command-line overrides on top.
    ///
    /// # Errors
    ///
    /// Same as [`Config::load`].
    pub fn load_with_overrides(
        file: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        if let Some(path) = file.filter(|p| !p.exists()) {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        Self::figment(file)
            .merge(Serialized::defaults(overrides))
            .extract()
            .map_err(|e| ConfigError::Load(Box::new(e)))
    }

    /// Platform-specific config file location.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "maildedup", "maildedup")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Write the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Serialize` or `ConfigError::Save`.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Save {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, content).map_err(|source| ConfigError::Save {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check every setting before a run starts.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Counted after case folding and de-duplication, as hashed.
        let headers = self.canonicalizer()?.requested().len();
        if headers == 0 {
            return Err(ConfigError::NoHashHeaders);
        }
        if self.minimal_headers == 0 || self.minimal_headers > headers {
            return Err(ConfigError::InvalidMinimalHeaders {
                value: self.minimal_headers,
                headers,
            });
        }
        if self.threads == 0 {
            return Err(ConfigError::InvalidThreads);
        }
        Threshold::from_config("size", self.size_threshold)?;
        Threshold::from_config("content", self.content_threshold)?;

        if let Some(strategy) = self.strategy {
            if let Some(parameter) = strategy.required_parameter() {
                if self.regexp.is_none() {
                    return Err(ConfigError::MissingParameter {
                        strategy: strategy.to_string(),
                        parameter,
                    });
                }
            }
        }
        self.compiled_regexp()?;
        Ok(())
    }

    /// Compile the path pattern.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidRegex` if the pattern does not compile.
    pub fn compiled_regexp(&self) -> Result<Option<Regex>, ConfigError> {
        self.regexp
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| ConfigError::InvalidRegex {
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .transpose()
    }

    /// Header canonicalizer for the configured headers and charsets.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownCharset`.
    pub fn canonicalizer(&self) -> Result<Canonicalizer, ConfigError> {
        Canonicalizer::new(&self.hash_headers, &self.fallback_charsets)
    }

    /// Similarity validator for the configured thresholds.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidThreshold`.
    pub fn validator(&self) -> Result<SimilarityValidator, ConfigError> {
        Ok(SimilarityValidator::new(
            Threshold::from_config("size", self.size_threshold)?,
            Threshold::from_config("content", self.content_threshold)?,
        )
        .with_encoding_policy(self.encoding_policy)
        .with_show_diff(self.show_diff))
    }
}
