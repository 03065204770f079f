//! Audit engine configuration.
//!
//! `AuditConfig` is deserialized from TOML. Every field has a default, so an
//! empty document is a valid configuration:
//!
//! ```toml
//! log_level = "low"
//! buffer_size = 200
//! storage_path = "/var/lib/raxol/audit"
//!
//! [keys]
//! source = "file"
//! path = "/etc/raxol/audit.key"
//!
//! [siem_integration]
//! type = "splunk"
//! endpoint = "https://splunk.example.com:8088/services/collector"
//! token = "..."
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AuditError, AuditResult};
use crate::event::Severity;

/// Where the logger's signing and encryption keys come from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum KeySource {
    /// Random keys generated at startup. Signatures and ciphertexts written
    /// under these keys cannot be verified or opened after a restart.
    #[default]
    Ephemeral,

    /// Keys given inline as 64 hex characters (32 bytes) each.
    Hex {
        signing_key: String,
        encryption_key: String,
    },

    /// A file holding 64 raw bytes: the signing key followed by the
    /// encryption key. Created with fresh random keys when missing.
    File { path: PathBuf },
}

/// The SIEM vendor a forwarder talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiemKind {
    Splunk,
    Elasticsearch,
    Qradar,
    Sentinel,
    Webhook,
}

/// Connection settings for SIEM forwarding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiemConfig {
    #[serde(rename = "type")]
    pub kind: SiemKind,

    /// Full URL the adapter posts to.
    pub endpoint: String,

    /// Bearer / HEC / shared-key token, depending on `kind`.
    #[serde(default)]
    pub token: Option<String>,

    /// Target index (Splunk, Elasticsearch) or log type (Sentinel).
    #[serde(default)]
    pub index: Option<String>,

    #[serde(default = "default_siem_timeout_ms")]
    pub timeout_ms: u64,

    /// Extra headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Top-level configuration for the logger, storage engine and exporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Master switch. When false every `log_*` call is a no-op.
    pub enabled: bool,

    /// Events strictly below this severity are dropped.
    pub log_level: Severity,

    /// Buffered event count that forces an inline flush.
    pub buffer_size: usize,

    pub flush_interval_ms: u64,
    pub retention_days: u32,
    pub encrypt_events: bool,
    pub sign_events: bool,
    pub alert_on_critical: bool,

    /// Enables SIEM auto-forwarding of flushed batches.
    pub export_enabled: bool,

    pub siem_integration: Option<SiemConfig>,
    pub storage_path: PathBuf,

    /// Gzip rotated log files.
    pub compress_logs: bool,

    /// Size in bytes after which the current file is rotated before the
    /// next append.
    pub max_file_size: u64,

    // ── Enrichment ───────────────────────────────────────────────────────────
    pub node: String,
    pub environment: String,
    pub version: String,

    // ── Maintenance schedule ─────────────────────────────────────────────────
    pub rotation_interval_ms: u64,
    pub retention_interval_ms: u64,
    pub integrity_interval_ms: u64,

    /// How far back the periodic integrity check looks.
    pub integrity_window_ms: u64,

    pub keys: KeySource,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_level: Severity::Info,
            buffer_size: 100,
            flush_interval_ms: 5_000,
            retention_days: 90,
            encrypt_events: false,
            sign_events: true,
            alert_on_critical: true,
            export_enabled: true,
            siem_integration: None,
            storage_path: PathBuf::from("data/audit"),
            compress_logs: true,
            max_file_size: 100 * 1024 * 1024,
            node: "raxol@localhost".to_string(),
            environment: "development".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            rotation_interval_ms: 3_600_000,
            retention_interval_ms: 86_400_000,
            integrity_interval_ms: 86_400_000,
            integrity_window_ms: 86_400_000,
            keys: KeySource::Ephemeral,
        }
    }
}

impl AuditConfig {
    /// Parse `s` as TOML and validate the result.
    ///
    /// Returns `AuditError::ConfigError` if the TOML is malformed, does not
    /// match the schema, or fails validation.
    pub fn from_toml_str(s: &str) -> AuditResult<Self> {
        let config: AuditConfig = toml::from_str(s).map_err(|e| AuditError::ConfigError {
            reason: format!("failed to parse audit config TOML: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read the file at `path` and parse it with `from_toml_str`.
    pub fn from_file(path: &Path) -> AuditResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| AuditError::ConfigError {
            reason: format!("failed to read audit config '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// A default configuration rooted at `storage_path`.
    pub fn with_storage_path(storage_path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: storage_path.into(),
            ..Self::default()
        }
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> AuditResult<()> {
        let fail = |reason: &str| {
            Err(AuditError::ConfigError {
                reason: reason.to_string(),
            })
        };

        if self.buffer_size == 0 {
            return fail("buffer_size must be at least 1");
        }
        if self.flush_interval_ms == 0 {
            return fail("flush_interval_ms must be positive");
        }
        if self.retention_days == 0 {
            return fail("retention_days must be at least 1");
        }
        if self.max_file_size == 0 {
            return fail("max_file_size must be positive");
        }
        if self.rotation_interval_ms == 0
            || self.retention_interval_ms == 0
            || self.integrity_interval_ms == 0
        {
            return fail("maintenance intervals must be positive");
        }
        if self.storage_path.as_os_str().is_empty() {
            return fail("storage_path must not be empty");
        }
        if let Some(siem) = &self.siem_integration {
            if !(siem.endpoint.starts_with("http://") || siem.endpoint.starts_with("https://")) {
                return Err(AuditError::ConfigError {
                    reason: format!("siem endpoint '{}' is not an http(s) URL", siem.endpoint),
                });
            }
        }
        if let KeySource::Hex { signing_key, encryption_key } = &self.keys {
            for (name, key) in [("signing_key", signing_key), ("encryption_key", encryption_key)] {
                if key.len() != 64 || !key.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(AuditError::ConfigError {
                        reason: format!("{} must be 64 hex characters", name),
                    });
                }
            }
        }
        Ok(())
    }

    /// Retention horizon in milliseconds.
    pub fn retention_millis(&self) -> i64 {
        i64::from(self.retention_days) * 86_400_000
    }
}

fn default_siem_timeout_ms() -> u64 {
    10_000
}
