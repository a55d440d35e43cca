//! Configuration loading and validation for the records service.
//!
//! All values are read from environment variables at startup. The process will
//! exit with a clear error message if any required variable is missing or invalid.

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::records::DecodeFailurePolicy;

/// Validated records service configuration.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// 256-bit field encryption key as 64 hex characters. **Required.**
    pub encryption_key: String,

    /// Label stamped on records encoded under `encryption_key`.
    #[serde(default = "default_key_id")]
    pub encryption_key_id: String,

    /// Decode-only keys from earlier rotations, as `id=hex` pairs joined by `;`.
    #[serde(default)]
    pub retired_keys: String,

    /// Port the HTTP server listens on.
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Optional YAML file overriding the built-in sensitive field lists.
    #[serde(default)]
    pub field_policy_path: Option<String>,

    /// `fallback` (serve undecodable fields raw) or `strict` (fail the read).
    #[serde(default)]
    pub decode_failure_policy: DecodeFailurePolicy,

    /// OTLP endpoint for span export. Spans are not exported when unset.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material is redacted.
        f.debug_struct("Config")
            .field("encryption_key", &"[REDACTED]")
            .field("encryption_key_id", &self.encryption_key_id)
            .field("retired_keys", &"[REDACTED]")
            .field("http_port", &self.http_port)
            .field("field_policy_path", &self.field_policy_path)
            .field("decode_failure_policy", &self.decode_failure_policy)
            .field("otel_exporter_otlp_endpoint", &self.otel_exporter_otlp_endpoint)
            .field("log_level", &self.log_level)
            .finish()
    }
}

fn default_key_id() -> String {
    "primary".into()
}
fn default_http_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.encryption_key, "ENCRYPTION_KEY")?;
        ensure_non_empty(&self.encryption_key_id, "ENCRYPTION_KEY_ID")?;

        if self.encryption_key.trim().len() != 64 {
            anyhow::bail!("ENCRYPTION_KEY must be 64 hex characters (256 bits)");
        }
        if self.http_port == 0 {
            anyhow::bail!("HTTP_PORT must be > 0");
        }
        if let Some(path) = &self.field_policy_path {
            ensure_non_empty(path, "FIELD_POLICY_PATH")?;
        }
        Ok(())
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    fn valid() -> Config {
        Config {
            encryption_key: KEY.into(),
            encryption_key_id: default_key_id(),
            retired_keys: String::new(),
            http_port: default_http_port(),
            field_policy_path: None,
            decode_failure_policy: DecodeFailurePolicy::default(),
            otel_exporter_otlp_endpoint: None,
            log_level: default_log_level(),
        }
    }

    #[test]
    fn defaults_are_correct() {
        assert_eq!(default_key_id(), "primary");
        assert_eq!(default_http_port(), 8080);
        assert_eq!(default_log_level(), "info");
        assert_eq!(DecodeFailurePolicy::default(), DecodeFailurePolicy::Fallback);
    }

    #[test]
    fn validate_accepts_minimal_config() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_key() {
        let cfg = Config {
            encryption_key: "".into(),
            ..valid()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_128_bit_key() {
        let cfg = Config {
            encryption_key: KEY[..32].into(),
            ..valid()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_blank_policy_path() {
        let cfg = Config {
            field_policy_path: Some(" ".into()),
            ..valid()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn debug_redacts_keys() {
        let printed = format!("{:?}", valid());
        assert!(!printed.contains(KEY));
        assert!(printed.contains("REDACTED"));
    }

    #[test]
    fn decode_policy_deserialises_lowercase() {
        let p: DecodeFailurePolicy = serde_json::from_str("\"strict\"").unwrap();
        assert_eq!(p, DecodeFailurePolicy::Strict);
    }
}
