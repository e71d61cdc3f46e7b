//! Environment variable helpers shared by the service configs.
//!
//! Each binary reads its own prefixed variables (`STOREFRONT_*`, `ADMIN_*`)
//! through these helpers, so missing values, bad parses and weak secrets are
//! reported the same way everywhere.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

/// Shortest session secret accepted.
pub const MIN_SECRET_LENGTH: usize = 32;

/// Below this a secret is too repetitive to be random.
pub const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Fragments that give away a copied sample value, matched case-insensitively.
const PLACEHOLDERS: &[&str] = &[
    "your-", "changeme", "replace", "placeholder", "example", "secret", "password", "xxx",
    "todo", "fixme", "insert", "enter-", "put-your", "add-your",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// # Errors
///
/// `MissingEnvVar` when `key` is unset.
pub fn required(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_owned()))
}

/// Unset and empty both read as `None`.
#[must_use]
pub fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

/// Parse `key`, or `default` when it is unset.
///
/// # Errors
///
/// `InvalidEnvVar` naming `key` when the value does not parse.
pub fn parse_or<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    std::env::var(key)
        .as_deref()
        .unwrap_or(default)
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_owned(), e.to_string()))
}

/// Parse a required variable.
///
/// # Errors
///
/// `MissingEnvVar` or `InvalidEnvVar`.
pub fn parse_required<T>(key: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    required(key)?
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_owned(), e.to_string()))
}

/// The service's own database URL, else the shared `DATABASE_URL`.
///
/// # Errors
///
/// `MissingEnvVar` naming `key` when neither is set.
pub fn database_url(key: &str) -> Result<SecretString, ConfigError> {
    std::env::var(key)
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| ConfigError::MissingEnvVar(key.to_owned()))
}

/// A required secret that has passed [`check_secret`].
///
/// # Errors
///
/// `MissingEnvVar`, or `InsecureSecret` with the reason it was refused.
pub fn secret(key: &str) -> Result<SecretString, ConfigError> {
    let secret = SecretString::from(required(key)?);
    check_secret(&secret).map_err(|reason| ConfigError::InsecureSecret(key.to_owned(), reason))?;
    Ok(secret)
}

/// Refuses short values, copied placeholders and low-entropy strings.
///
/// # Errors
///
/// The reason, worded for a startup log line.
pub fn check_secret(secret: &SecretString) -> Result<(), String> {
    let value = secret.expose_secret();

    let lower = value.to_lowercase();
    if let Some(fragment) = PLACEHOLDERS.iter().find(|p| lower.contains(*p)) {
        return Err(format!("appears to be a placeholder (contains '{fragment}')"));
    }

    let len = value.chars().count();
    if len < MIN_SECRET_LENGTH {
        return Err(format!("must be at least {MIN_SECRET_LENGTH} characters (got {len})"));
    }

    let entropy = shannon_entropy(value);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(format!(
            "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
        ));
    }
    Ok(())
}

/// Bits per character.
#[must_use]
pub fn shannon_entropy(s: &str) -> f64 {
    let mut counts: HashMap<char, u32> = HashMap::new();
    let mut total = 0_u32;
    for c in s.chars() {
        *counts.entry(c).or_default() += 1;
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }

    let total = f64::from(total);
    counts
        .values()
        .map(|&n| {
            let p = f64::from(n) / total;
            -p * p.log2()
        })
        .sum()
}

/// Error tracking settings, read from the unprefixed `SENTRY_*` variables.
#[derive(Debug, Clone)]
pub struct SentryConfig {
    pub dsn: Option<String>,
    pub environment: String,
    pub sample_rate: f32,
    pub traces_sample_rate: f32,
}

impl Default for SentryConfig {
    fn default() -> Self {
        Self {
            dsn: None,
            environment: "development".to_owned(),
            sample_rate: 1.0,
            traces_sample_rate: 0.1,
        }
    }
}

impl SentryConfig {
    /// # Errors
    ///
    /// `InvalidEnvVar` for an unparseable sample rate.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            dsn: optional("SENTRY_DSN"),
            environment: optional("SENTRY_ENVIRONMENT").unwrap_or_else(|| "development".to_owned()),
            sample_rate: parse_or("SENTRY_SAMPLE_RATE", "1.0")?,
            traces_sample_rate: parse_or("SENTRY_TRACES_SAMPLE_RATE", "0.1")?,
        })
    }

    /// Debug-safe view: whether a DSN is set, not its key.
    #[must_use]
    pub const fn dsn_state(&self) -> &'static str {
        if self.dsn.is_some() { "[SET]" } else { "[UNSET]" }
    }
}
