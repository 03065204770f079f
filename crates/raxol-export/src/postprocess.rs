//! Export post-processing: gzip, AES-256-GCM and HMAC envelopes.
//!
//! Each step wraps the output of the previous one, always in the order
//! compress → encrypt → sign. Reversing an artifact means peeling the layers
//! in the opposite order: `open_signed`, `open_encrypted`, `gunzip`.
//!
//! The encryption key is never written into the payload. When the caller
//! did not supply one, the generated key is returned once in
//! `ExportArtifact::key_custody` and it is up to the caller to store it.

use std::fmt;
use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use raxol_contracts::{AuditError, AuditResult};
use raxol_core::crypto::{random_bytes, KEY_LEN};
use raxol_core::{EventCipher, EventSigner};

use crate::options::{ExportFormat, ExportOptions};

pub const ENCRYPTION_ALGORITHM: &str = "aes-256-gcm";
pub const SIGNATURE_ALGORITHM: &str = "hmac-sha256";

/// The result of one export.
#[derive(Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub format: ExportFormat,
    pub payload: Vec<u8>,
    pub event_count: usize,
    pub exported_at: i64,
    pub compressed: bool,
    pub encrypted: bool,
    /// Base64 HMAC tag over the payload as it was before signing.
    pub signature: Option<String>,
    /// Hex key for a generated export key. `None` when the caller supplied
    /// the key or nothing was encrypted.
    pub key_custody: Option<String>,
}

impl fmt::Debug for ExportArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportArtifact")
            .field("format", &self.format)
            .field("payload_len", &self.payload.len())
            .field("event_count", &self.event_count)
            .field("exported_at", &self.exported_at)
            .field("compressed", &self.compressed)
            .field("encrypted", &self.encrypted)
            .field("signature", &self.signature)
            .field("key_custody", &self.key_custody.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    pub encrypted: bool,
    pub algorithm: String,
    pub iv: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    pub signed: bool,
    pub algorithm: String,
    pub signature: String,
    pub data: String,
}

/// Apply the post-processing steps `opts` enables to an encoded payload.
///
/// `signer` is required only when `opts.sign` is set.
pub fn apply(
    format: ExportFormat,
    payload: Vec<u8>,
    event_count: usize,
    exported_at: i64,
    opts: &ExportOptions,
    signer: Option<&EventSigner>,
) -> AuditResult<ExportArtifact> {
    let mut artifact = ExportArtifact {
        format,
        payload,
        event_count,
        exported_at,
        compressed: false,
        encrypted: false,
        signature: None,
        key_custody: None,
    };

    if opts.compress {
        artifact.payload = gzip(&artifact.payload)?;
        artifact.compressed = true;
    }

    if opts.encrypt {
        let (key, generated) = match opts.encryption_key {
            Some(key) => (key, false),
            None => (random_bytes::<KEY_LEN>(), true),
        };
        artifact.payload = seal(&key, &artifact.payload)?;
        artifact.encrypted = true;
        if generated {
            artifact.key_custody = Some(hex::encode(key));
        }
    }

    if opts.sign {
        let signer = signer.ok_or_else(|| AuditError::ExportFailed {
            reason: "signing requested but no signing key is configured".to_string(),
        })?;
        let (envelope, signature) = sign(signer, &artifact.payload)?;
        artifact.payload = envelope;
        artifact.signature = Some(signature);
    }

    Ok(artifact)
}

pub fn gzip(bytes: &[u8]) -> AuditResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

pub fn gunzip(bytes: &[u8]) -> AuditResult<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(bytes).read_to_end(&mut out)?;
    Ok(out)
}

fn seal(key: &[u8; KEY_LEN], plaintext: &[u8]) -> AuditResult<Vec<u8>> {
    let (iv, ciphertext) = EventCipher::new(*key).encrypt(plaintext)?;
    let envelope = EncryptedEnvelope {
        encrypted: true,
        algorithm: ENCRYPTION_ALGORITHM.to_string(),
        iv: STANDARD.encode(iv),
        data: STANDARD.encode(ciphertext),
    };
    Ok(serde_json::to_vec(&envelope)?)
}

fn sign(signer: &EventSigner, payload: &[u8]) -> AuditResult<(Vec<u8>, String)> {
    let signature = STANDARD.encode(signer.tag(payload)?);
    let envelope = SignedEnvelope {
        signed: true,
        algorithm: SIGNATURE_ALGORITHM.to_string(),
        signature: signature.clone(),
        data: STANDARD.encode(payload),
    };
    Ok((serde_json::to_vec(&envelope)?, signature))
}

fn crypto_err(reason: impl fmt::Display) -> AuditError {
    AuditError::Crypto {
        reason: reason.to_string(),
    }
}

/// Verify a signed envelope and return the payload it wraps.
pub fn open_signed(signer: &EventSigner, bytes: &[u8]) -> AuditResult<Vec<u8>> {
    let envelope: SignedEnvelope = serde_json::from_slice(bytes)?;
    if envelope.algorithm != SIGNATURE_ALGORITHM {
        return Err(crypto_err(format!("unsupported signature algorithm '{}'", envelope.algorithm)));
    }
    let data = STANDARD.decode(&envelope.data).map_err(crypto_err)?;
    if !signer.verify_tag(&data, &envelope.signature) {
        return Err(crypto_err("export signature does not verify"));
    }
    Ok(data)
}

/// Decrypt an encrypted envelope with `key`.
pub fn open_encrypted(key: &[u8; KEY_LEN], bytes: &[u8]) -> AuditResult<Vec<u8>> {
    let envelope: EncryptedEnvelope = serde_json::from_slice(bytes)?;
    if envelope.algorithm != ENCRYPTION_ALGORITHM {
        return Err(crypto_err(format!("unsupported cipher '{}'", envelope.algorithm)));
    }
    let iv = STANDARD.decode(&envelope.iv).map_err(crypto_err)?;
    let data = STANDARD.decode(&envelope.data).map_err(crypto_err)?;
    EventCipher::new(*key).decrypt(&iv, &data)
}

/// Parse a hex key as returned in `key_custody`.
pub fn parse_key(hex_key: &str) -> AuditResult<[u8; KEY_LEN]> {
    let bytes = hex::decode(hex_key.trim()).map_err(crypto_err)?;
    bytes
        .try_into()
        .map_err(|_| crypto_err(format!("export key must be {} bytes", KEY_LEN)))
}
