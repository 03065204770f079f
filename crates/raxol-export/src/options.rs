//! Export format selection and per-export options.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use raxol_contracts::AuditError;
use raxol_core::crypto::KEY_LEN;

/// Every encoding the exporter can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
    Cef,
    Leef,
    Syslog,
    Xml,
    Pdf,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 7] = [
        ExportFormat::Json,
        ExportFormat::Csv,
        ExportFormat::Cef,
        ExportFormat::Leef,
        ExportFormat::Syslog,
        ExportFormat::Xml,
        ExportFormat::Pdf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Cef => "cef",
            ExportFormat::Leef => "leef",
            ExportFormat::Syslog => "syslog",
            ExportFormat::Xml => "xml",
            ExportFormat::Pdf => "pdf",
        }
    }

    /// Conventional file extension, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Cef | ExportFormat::Leef | ExportFormat::Syslog => "log",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExportFormat::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AuditError::UnsupportedFormat {
                format: s.to_string(),
            })
    }
}

/// Layout used for PDF output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdfTemplate {
    /// Summary plus a table of every event.
    #[default]
    Default,
    /// Counts and highlights only; no per-event rows.
    Executive,
    /// Every field of every event, including integrity metadata.
    Technical,
}

impl FromStr for PdfTemplate {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(PdfTemplate::Default),
            "executive" => Ok(PdfTemplate::Executive),
            "technical" => Ok(PdfTemplate::Technical),
            other => Err(AuditError::UnsupportedFormat {
                format: format!("pdf template '{}'", other),
            }),
        }
    }
}

/// Options for a single export.
///
/// The three post-processing steps are independent and always applied in
/// the order compress, encrypt, sign.
#[derive(Clone)]
pub struct ExportOptions {
    /// When false, the `metadata` map is stripped from JSON and CSV output.
    pub include_metadata: bool,
    pub template: PdfTemplate,
    pub compress: bool,
    pub encrypt: bool,
    pub sign: bool,
    /// Key for `encrypt`. When `None`, a one-off key is generated and handed
    /// back in `ExportArtifact::key_custody`.
    pub encryption_key: Option<[u8; KEY_LEN]>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_metadata: true,
            template: PdfTemplate::Default,
            compress: false,
            encrypt: false,
            sign: false,
            encryption_key: None,
        }
    }
}

impl fmt::Debug for ExportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportOptions")
            .field("include_metadata", &self.include_metadata)
            .field("template", &self.template)
            .field("compress", &self.compress)
            .field("encrypt", &self.encrypt)
            .field("sign", &self.sign)
            .field("encryption_key", &self.encryption_key.map(|_| "<redacted>"))
            .finish()
    }
}

impl ExportOptions {
    pub fn without_metadata(mut self) -> Self {
        self.include_metadata = false;
        self
    }

    pub fn template(mut self, template: PdfTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn compressed(mut self) -> Self {
        self.compress = true;
        self
    }

    pub fn encrypted(mut self, key: Option<[u8; KEY_LEN]>) -> Self {
        self.encrypt = true;
        self.encryption_key = key;
        self
    }

    pub fn signed(mut self) -> Self {
        self.sign = true;
        self
    }
}
