//! Issuance configuration.
//!
//! A [`Config`] value is built once (defaults, then an optional TOML file,
//! then `CERTIFY_*` environment overrides) and passed explicitly into the
//! [`Issuer`](crate::batch::Issuer). Nothing in the pipeline reads ambient
//! global state.
//!
//! # Example
//!
//! ```toml
//! certificate_prefix = "CERT"
//! base_url = "https://example.com/verify"
//! default_hours = 40
//! organization = "Образовательный центр"
//! pdf_dir = "certificates"
//! qr_dir = "qr_codes"
//!
//! [qr]
//! error_correction = "M"
//! box_size = 8
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::verification::{QrSettings, MAX_BORDER, MAX_BOX_SIZE};

/// Top-level issuance configuration. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Short token prepended to every certificate ID (`CERT-…`).
    pub certificate_prefix: String,
    /// Base of the public verification URL; `/verify/<id>` is appended.
    pub base_url: String,
    /// Hours used when a roster row has none.
    pub default_hours: u32,
    /// Course used when a roster row has none.
    pub default_course: String,
    /// Issuing organization printed on every certificate.
    pub organization: String,
    /// Localized label leading every document file name.
    pub document_label: String,
    pub pdf_dir: PathBuf,
    /// Scratch directory for QR images.
    pub qr_dir: PathBuf,
    /// TrueType font embedded in documents. Without it the bundled font is
    /// used, which covers Latin, Greek and Cyrillic.
    pub font_path: Option<PathBuf>,
    pub qr: QrSettings,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            certificate_prefix: "CERT".to_string(),
            base_url: "https://example.com/verify".to_string(),
            default_hours: 40,
            default_course: "Основы Python".to_string(),
            organization: "Образовательный центр".to_string(),
            document_label: "Сертификат".to_string(),
            pdf_dir: PathBuf::from("certificates"),
            qr_dir: PathBuf::from("qr_codes"),
            font_path: None,
            qr: QrSettings::default(),
        }
    }
}

impl Config {
    /// Read and parse a TOML config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Config::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Config, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Overlay `CERTIFY_*` variables from `vars` onto this config.
    ///
    /// Takes the variables as an iterator so callers decide where they come
    /// from (`std::env::vars()` in the CLI, literal pairs in tests).
    pub fn apply_env<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            match key.as_str() {
                "CERTIFY_PREFIX" => self.certificate_prefix = value,
                "CERTIFY_BASE_URL" => self.base_url = value,
                "CERTIFY_ORGANIZATION" => self.organization = value,
                "CERTIFY_FONT_PATH" if !value.is_empty() => {
                    self.font_path = Some(PathBuf::from(value))
                }
                "CERTIFY_DEFAULT_HOURS" => {
                    self.default_hours = value
                        .trim()
                        .parse()
                        .map_err(|_| ConfigError::InvalidEnv {
                            key: key.clone(),
                            value: value.clone(),
                        })?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Check the values the pipeline relies on for well-formed output.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let prefix = &self.certificate_prefix;
        if prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "certificate_prefix must not be empty".to_string(),
            ));
        }
        if prefix.contains('-') || prefix.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid(format!(
                "certificate_prefix '{}' must not contain '-' or whitespace",
                prefix
            )));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "base_url '{}' must start with http:// or https://",
                self.base_url
            )));
        }
        if !(1..=MAX_BOX_SIZE).contains(&self.qr.box_size) {
            return Err(ConfigError::Invalid(format!(
                "qr.box_size must be between 1 and {}, got {}",
                MAX_BOX_SIZE, self.qr.box_size
            )));
        }
        if self.qr.border > MAX_BORDER {
            return Err(ConfigError::Invalid(format!(
                "qr.border must be at most {}, got {}",
                MAX_BORDER, self.qr.border
            )));
        }
        Ok(())
    }
}
