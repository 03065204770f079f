//! # raxol-core
//!
//! The pieces every audit component shares but that are not plain data:
//!
//! - the boundary traits for external collaborators (`EventStore`,
//!   `AlertHandler`, `HttpTransport`, `PdfRenderer`)
//! - event cryptography (`KeyMaterial`, `EventSigner`, `EventCipher`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use raxol_core::crypto::KeyMaterial;
//!
//! let keys = KeyMaterial::from_source(&config.keys)?;
//! let signer = keys.signer();
//! signer.sign_in_place(&mut event)?;
//! let sealed = keys.cipher().seal(&event)?;
//! ```

pub mod crypto;
pub mod traits;

pub use crypto::{EventCipher, EventSigner, KeyMaterial, SignatureCheck};
pub use traits::{AlertHandler, AppendOptions, EventStore, HttpRequest, HttpResponse, HttpTransport, PdfRenderer};

// ── Tests ─────────────────────────────────────────────────────────────────────
