//! Event signing and encryption primitives.
//!
//! Signatures are HMAC-SHA256 over `AuditEvent::canonical_bytes()`, encoded
//! as lowercase hex. Encryption is AES-256-GCM with a fresh 96-bit IV per
//! message; IVs and ciphertexts are standard base64.
//!
//! Signing always happens before encryption, so the sealed plaintext carries
//! its own signature and a key holder can check it after opening.

use std::fmt;
use std::path::Path;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use raxol_contracts::record::SEALED_ALGORITHM;
use raxol_contracts::{AuditError, AuditEvent, AuditResult, KeySource, SealedEvent};

type HmacSha256 = Hmac<Sha256>;

/// Key length for both HMAC-SHA256 and AES-256-GCM.
pub const KEY_LEN: usize = 32;

/// AES-GCM nonce length.
pub const IV_LEN: usize = 12;

fn crypto_err(reason: impl fmt::Display) -> AuditError {
    AuditError::Crypto {
        reason: reason.to_string(),
    }
}

/// Fill a fresh array from the thread-local CSPRNG.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

// ── KeyMaterial ───────────────────────────────────────────────────────────────

/// The signing and encryption keys the logger holds for its lifetime.
///
/// Constructed once at startup from a `KeySource` and handed to the logger
/// and exporter explicitly.
#[derive(Clone)]
pub struct KeyMaterial {
    signing: [u8; KEY_LEN],
    encryption: [u8; KEY_LEN],
    ephemeral: bool,
}

impl KeyMaterial {
    /// Load or generate keys according to `source`.
    pub fn from_source(source: &KeySource) -> AuditResult<Self> {
        match source {
            KeySource::Ephemeral => {
                warn!(
                    "audit keys are ephemeral: signatures and encrypted events written \
                     by this process cannot be verified or opened after a restart; \
                     configure [keys] with source = \"file\" or \"hex\""
                );
                Ok(Self::generate())
            }
            KeySource::Hex { signing_key, encryption_key } => Ok(Self {
                signing: decode_hex_key("signing_key", signing_key)?,
                encryption: decode_hex_key("encryption_key", encryption_key)?,
                ephemeral: false,
            }),
            KeySource::File { path } => Self::from_file(path),
        }
    }

    /// Fresh random keys, flagged as ephemeral.
    pub fn generate() -> Self {
        Self {
            signing: random_bytes(),
            encryption: random_bytes(),
            ephemeral: true,
        }
    }

    /// Keys from explicit bytes. Intended for tests and key-management
    /// integrations that hand over raw key material.
    pub fn from_bytes(signing: [u8; KEY_LEN], encryption: [u8; KEY_LEN]) -> Self {
        Self {
            signing,
            encryption,
            ephemeral: false,
        }
    }

    /// Read 64 bytes (signing key then encryption key) from `path`, creating
    /// the file with random keys when it does not exist.
    pub fn from_file(path: &Path) -> AuditResult<Self> {
        if !path.exists() {
            let keys = Self {
                ephemeral: false,
                ..Self::generate()
            };
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut raw = Vec::with_capacity(KEY_LEN * 2);
            raw.extend_from_slice(&keys.signing);
            raw.extend_from_slice(&keys.encryption);
            std::fs::write(path, &raw)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
            }
            info!(path = %path.display(), fingerprint = %keys.fingerprint(), "generated audit key file");
            return Ok(keys);
        }

        let raw = std::fs::read(path)?;
        if raw.len() != KEY_LEN * 2 {
            return Err(AuditError::ConfigError {
                reason: format!(
                    "key file '{}' must hold exactly {} bytes, found {}",
                    path.display(),
                    KEY_LEN * 2,
                    raw.len()
                ),
            });
        }
        let mut signing = [0u8; KEY_LEN];
        let mut encryption = [0u8; KEY_LEN];
        signing.copy_from_slice(&raw[..KEY_LEN]);
        encryption.copy_from_slice(&raw[KEY_LEN..]);
        Ok(Self {
            signing,
            encryption,
            ephemeral: false,
        })
    }

    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    /// A short, non-secret identifier for the signing key: the first eight
    /// bytes of its SHA-256, hex encoded.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.signing);
        hex::encode(&digest[..8])
    }

    pub fn signer(&self) -> EventSigner {
        EventSigner { key: self.signing }
    }

    pub fn cipher(&self) -> EventCipher {
        EventCipher { key: self.encryption }
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("fingerprint", &self.fingerprint())
            .field("ephemeral", &self.ephemeral)
            .finish()
    }
}

fn decode_hex_key(name: &str, s: &str) -> AuditResult<[u8; KEY_LEN]> {
    let bytes = hex::decode(s).map_err(|e| AuditError::ConfigError {
        reason: format!("{} is not valid hex: {}", name, e),
    })?;
    bytes.try_into().map_err(|_| AuditError::ConfigError {
        reason: format!("{} must decode to {} bytes", name, KEY_LEN),
    })
}

// ── Signing ───────────────────────────────────────────────────────────────────

/// The result of checking one event's signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    Valid,
    Invalid,
    Unsigned,
}

/// HMAC-SHA256 signer for events and export payloads.
#[derive(Clone)]
pub struct EventSigner {
    key: [u8; KEY_LEN],
}

impl EventSigner {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    fn mac(&self) -> AuditResult<HmacSha256> {
        <HmacSha256 as Mac>::new_from_slice(&self.key).map_err(crypto_err)
    }

    /// Raw HMAC tag over `bytes`.
    pub fn tag(&self, bytes: &[u8]) -> AuditResult<Vec<u8>> {
        let mut mac = self.mac()?;
        mac.update(bytes);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Hex signature over the event's canonical form.
    pub fn sign(&self, event: &AuditEvent) -> AuditResult<String> {
        Ok(hex::encode(self.tag(&event.canonical_bytes()?)?))
    }

    /// Compute and attach the signature.
    pub fn sign_in_place(&self, event: &mut AuditEvent) -> AuditResult<()> {
        let signature = self.sign(event)?;
        event.signature = Some(signature);
        Ok(())
    }

    /// Recompute the signature and compare it with the stored one in constant
    /// time.
    pub fn verify(&self, event: &AuditEvent) -> SignatureCheck {
        let Some(stored) = event.signature.as_deref() else {
            return SignatureCheck::Unsigned;
        };
        let Ok(expected) = hex::decode(stored) else {
            return SignatureCheck::Invalid;
        };
        let Ok(canonical) = event.canonical_bytes() else {
            return SignatureCheck::Invalid;
        };
        let Ok(mut mac) = self.mac() else {
            return SignatureCheck::Invalid;
        };
        mac.update(&canonical);
        match mac.verify_slice(&expected) {
            Ok(()) => SignatureCheck::Valid,
            Err(_) => SignatureCheck::Invalid,
        }
    }

    /// Check a base64 tag produced by `tag` over `bytes`.
    pub fn verify_tag(&self, bytes: &[u8], tag_b64: &str) -> bool {
        let Ok(tag) = STANDARD.decode(tag_b64) else {
            return false;
        };
        let Ok(mut mac) = self.mac() else {
            return false;
        };
        mac.update(bytes);
        mac.verify_slice(&tag).is_ok()
    }
}

// ── Encryption ────────────────────────────────────────────────────────────────

/// AES-256-GCM cipher for events and export payloads.
#[derive(Clone)]
pub struct EventCipher {
    key: [u8; KEY_LEN],
}

impl EventCipher {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    fn aead(&self) -> AuditResult<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.key).map_err(crypto_err)
    }

    /// Encrypt `plaintext` under a fresh random IV. Returns `(iv, ciphertext)`.
    pub fn encrypt(&self, plaintext: &[u8]) -> AuditResult<([u8; IV_LEN], Vec<u8>)> {
        let iv: [u8; IV_LEN] = random_bytes();
        let ciphertext = self
            .aead()?
            .encrypt(Nonce::from_slice(&iv), plaintext)
            .map_err(|_| crypto_err("AES-256-GCM encryption failed"))?;
        Ok((iv, ciphertext))
    }

    pub fn decrypt(&self, iv: &[u8], ciphertext: &[u8]) -> AuditResult<Vec<u8>> {
        if iv.len() != IV_LEN {
            return Err(crypto_err(format!("IV must be {} bytes, got {}", IV_LEN, iv.len())));
        }
        self.aead()?
            .decrypt(Nonce::from_slice(iv), ciphertext)
            .map_err(|_| crypto_err("AES-256-GCM authentication failed"))
    }

    /// Encrypt a (normally already signed) event into its sealed form.
    pub fn seal(&self, event: &AuditEvent) -> AuditResult<SealedEvent> {
        let plaintext = serde_json::to_vec(event)?;
        let (iv, ciphertext) = self.encrypt(&plaintext)?;
        Ok(SealedEvent {
            event_id: event.event_id.clone(),
            timestamp: event.timestamp,
            encrypted: true,
            algorithm: SEALED_ALGORITHM.to_string(),
            iv: STANDARD.encode(iv),
            data: STANDARD.encode(ciphertext),
        })
    }

    /// Decrypt a sealed record back into the event it wraps.
    pub fn open(&self, sealed: &SealedEvent) -> AuditResult<AuditEvent> {
        if sealed.algorithm != SEALED_ALGORITHM {
            return Err(crypto_err(format!("unsupported algorithm '{}'", sealed.algorithm)));
        }
        let iv = STANDARD.decode(&sealed.iv).map_err(crypto_err)?;
        let data = STANDARD.decode(&sealed.data).map_err(crypto_err)?;
        let plaintext = self.decrypt(&iv, &data)?;
        let event: AuditEvent = serde_json::from_slice(&plaintext)?;
        if event.event_id != sealed.event_id {
            return Err(crypto_err(format!(
                "sealed record id '{}' does not match its contents '{}'",
                sealed.event_id, event.event_id
            )));
        }
        Ok(event)
    }
}
