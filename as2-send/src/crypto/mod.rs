//! Crypto provider and certificate provider seams.
//!
//! The sender never touches cryptographic primitives directly: everything
//! S/MIME shaped goes through [`CryptoProvider`], and key material comes
//! from a [`CertificateProvider`]. Both are shared across messages and
//! must be stateless and thread-safe.
//!
//! MIC computation is fully specified by the protocol, so it lives here
//! as a concrete function ([`mic::calculate_mic`]) with a default trait
//! method delegating to it.

mod mic;
mod mock;

pub use mic::calculate_mic;
pub use mock::MockCryptoProvider;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;

use as2_types::{
    BodyPart, CompressionType, ContentTransferEncoding, EncryptionAlgorithm, Mic,
    SigningAlgorithm,
};

/// Crypto layer errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Producing the signed structure failed.
    #[error("signing failed: {0}")]
    Sign(String),

    /// Producing the encryption envelope failed.
    #[error("encryption failed: {0}")]
    Encrypt(String),

    /// Compressing the part failed.
    #[error("compression failed: {0}")]
    Compress(String),

    /// A signature did not verify or the structure is malformed.
    #[error("verification failed: {0}")]
    Verify(String),

    /// No key or certificate is stored under the alias.
    #[error("unknown key or certificate alias: '{0}'")]
    UnknownAlias(String),
}

/// An X.509 certificate, held as opaque DER bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
}

impl Certificate {
    /// Wrap DER-encoded certificate bytes.
    pub fn from_der(der: Vec<u8>) -> Self {
        Self { der }
    }

    /// The DER bytes.
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Certificate([{} bytes])", self.der.len())
    }
}

/// A private key, held as opaque DER bytes.
#[derive(Clone)]
pub struct PrivateKey {
    der: Vec<u8>,
}

impl PrivateKey {
    /// Wrap DER-encoded key bytes.
    pub fn from_der(der: Vec<u8>) -> Self {
        Self { der }
    }

    /// The DER bytes.
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }
}

// Never leak key material through Debug output.
impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PrivateKey([REDACTED])")
    }
}

/// The outcome of verifying a `multipart/signed` structure.
#[derive(Debug, Clone)]
pub struct Verified {
    /// The content part whose signature checked out.
    pub content: BodyPart,
    /// The certificate that actually verified the signature.
    pub certificate: Certificate,
}

/// Resolves certificate-store aliases to key material.
///
/// Alias resolution policy (keystore files, HSMs, ...) is an external
/// collaborator; the send path only consumes this interface.
pub trait CertificateProvider: Send + Sync {
    /// The certificate stored under `alias`.
    fn certificate(&self, alias: &str) -> Result<Certificate, CryptoError>;

    /// The private key stored under `alias`.
    fn private_key(&self, alias: &str) -> Result<PrivateKey, CryptoError>;
}

/// S/MIME operations on MIME body parts. Pure; no I/O.
pub trait CryptoProvider: Send + Sync {
    /// Wrap the part in a `multipart/signed` structure.
    #[allow(clippy::too_many_arguments)]
    fn sign(
        &self,
        part: &BodyPart,
        certificate: &Certificate,
        key: &PrivateKey,
        algorithm: SigningAlgorithm,
        include_certificate: bool,
        rfc3851_mic_names: bool,
        cte: ContentTransferEncoding,
    ) -> Result<BodyPart, CryptoError>;

    /// Envelope-encrypt the part to the receiver certificate.
    fn encrypt(
        &self,
        part: &BodyPart,
        certificate: &Certificate,
        algorithm: EncryptionAlgorithm,
        cte: ContentTransferEncoding,
    ) -> Result<BodyPart, CryptoError>;

    /// Compress the part into a compressed-data structure.
    fn compress(
        &self,
        part: &BodyPart,
        compression: CompressionType,
        cte: ContentTransferEncoding,
    ) -> Result<BodyPart, CryptoError>;

    /// Verify a `multipart/signed` structure against the expected signer
    /// certificate, returning the signed content.
    fn verify(&self, part: &BodyPart, certificate: &Certificate) -> Result<Verified, CryptoError>;

    /// Compute the Message Integrity Check over a body part.
    ///
    /// The default implementation is the protocol-defined digest over the
    /// part's canonical MIME bytes; providers normally leave it alone.
    fn calculate_mic(
        &self,
        part: &BodyPart,
        algorithm: SigningAlgorithm,
        include_headers: bool,
        rfc3851_mic_names: bool,
    ) -> Mic {
        mic::calculate_mic(part, algorithm, include_headers, rfc3851_mic_names)
    }
}

/// An in-memory certificate store, keyed by alias.
///
/// Backs tests and small deployments; production stores wrap a real
/// keystore behind the same trait.
#[derive(Default, Clone)]
pub struct MemoryCertificateStore {
    entries: Arc<Mutex<HashMap<String, (Option<Certificate>, Option<PrivateKey>)>>>,
}

impl MemoryCertificateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a certificate under an alias.
    pub fn add_certificate(&self, alias: &str, certificate: Certificate) {
        let mut entries = self.entries.lock().unwrap();
        entries.entry(alias.to_string()).or_default().0 = Some(certificate);
    }

    /// Store a private key under an alias.
    pub fn add_private_key(&self, alias: &str, key: PrivateKey) {
        let mut entries = self.entries.lock().unwrap();
        entries.entry(alias.to_string()).or_default().1 = Some(key);
    }
}

impl CertificateProvider for MemoryCertificateStore {
    fn certificate(&self, alias: &str) -> Result<Certificate, CryptoError> {
        self.entries
            .lock()
            .unwrap()
            .get(alias)
            .and_then(|(cert, _)| cert.clone())
            .ok_or_else(|| CryptoError::UnknownAlias(alias.to_string()))
    }

    fn private_key(&self, alias: &str) -> Result<PrivateKey, CryptoError> {
        self.entries
            .lock()
            .unwrap()
            .get(alias)
            .and_then(|(_, key)| key.clone())
            .ok_or_else(|| CryptoError::UnknownAlias(alias.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_resolves_aliases() {
        let store = MemoryCertificateStore::new();
        store.add_certificate("partner", Certificate::from_der(vec![1, 2, 3]));
        store.add_private_key("mykey", PrivateKey::from_der(vec![4, 5, 6]));

        assert_eq!(store.certificate("partner").unwrap().as_der(), &[1, 2, 3]);
        assert_eq!(store.private_key("mykey").unwrap().as_der(), &[4, 5, 6]);
    }

    #[test]
    fn memory_store_unknown_alias_fails() {
        let store = MemoryCertificateStore::new();
        assert!(matches!(
            store.certificate("nobody"),
            Err(CryptoError::UnknownAlias(_))
        ));
        assert!(matches!(
            store.private_key("nobody"),
            Err(CryptoError::UnknownAlias(_))
        ));
    }

    #[test]
    fn private_key_debug_is_redacted() {
        let key = PrivateKey::from_der(vec![0xDE, 0xAD]);
        assert_eq!(format!("{key:?}"), "PrivateKey([REDACTED])");
    }
}
