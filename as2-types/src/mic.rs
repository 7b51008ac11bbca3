//! Message Integrity Check values and signing algorithm identifiers.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::fmt;

use crate::As2Error;

/// A digest algorithm used for signing and MIC computation.
///
/// Each algorithm has two wire spellings: the legacy RFC 3851 form
/// (`sha1`) and the RFC 5751 form (`sha-1`). Parsing accepts either,
/// case-insensitively; rendering picks the form the partnership asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    /// SHA-1 (RFC 3851 default).
    Sha1,
    /// SHA-256 (RFC 5751 default).
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl SigningAlgorithm {
    /// The default when the partnership opted into RFC 3851 naming.
    pub const DEFAULT_RFC_3851: SigningAlgorithm = SigningAlgorithm::Sha1;
    /// The default for RFC 5751 naming.
    pub const DEFAULT_RFC_5751: SigningAlgorithm = SigningAlgorithm::Sha256;

    /// Parse an algorithm identifier in either spelling.
    pub fn from_id(id: &str) -> Result<Self, As2Error> {
        match id.to_ascii_lowercase().as_str() {
            "sha1" | "sha-1" => Ok(SigningAlgorithm::Sha1),
            "sha256" | "sha-256" => Ok(SigningAlgorithm::Sha256),
            "sha384" | "sha-384" => Ok(SigningAlgorithm::Sha384),
            "sha512" | "sha-512" => Ok(SigningAlgorithm::Sha512),
            _ => Err(As2Error::UnknownAlgorithm {
                kind: "signing",
                id: id.to_string(),
            }),
        }
    }

    /// The RFC 3851 identifier (no dash).
    pub fn rfc3851_id(&self) -> &'static str {
        match self {
            SigningAlgorithm::Sha1 => "sha1",
            SigningAlgorithm::Sha256 => "sha256",
            SigningAlgorithm::Sha384 => "sha384",
            SigningAlgorithm::Sha512 => "sha512",
        }
    }

    /// The RFC 5751 identifier (dashed).
    pub fn rfc5751_id(&self) -> &'static str {
        match self {
            SigningAlgorithm::Sha1 => "sha-1",
            SigningAlgorithm::Sha256 => "sha-256",
            SigningAlgorithm::Sha384 => "sha-384",
            SigningAlgorithm::Sha512 => "sha-512",
        }
    }

    /// The identifier under the given naming scheme.
    pub fn id(&self, rfc3851_names: bool) -> &'static str {
        if rfc3851_names {
            self.rfc3851_id()
        } else {
            self.rfc5751_id()
        }
    }

    /// Digest the given bytes with this algorithm.
    pub fn digest(&self, bytes: &[u8]) -> Vec<u8> {
        match self {
            SigningAlgorithm::Sha1 => Sha1::digest(bytes).to_vec(),
            SigningAlgorithm::Sha256 => Sha256::digest(bytes).to_vec(),
            SigningAlgorithm::Sha384 => Sha384::digest(bytes).to_vec(),
            SigningAlgorithm::Sha512 => Sha512::digest(bytes).to_vec(),
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.rfc5751_id())
    }
}

/// A Message Integrity Check: digest bytes plus the algorithm identifier
/// under which they were computed.
///
/// Two MICs are equal iff the digest bytes match AND the algorithm
/// identifiers are identical, including case. A receiver that echoes the
/// digest under a differently-spelled algorithm name did not confirm the
/// integrity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mic {
    digest: Vec<u8>,
    algorithm: String,
}

impl Mic {
    /// Create a MIC from digest bytes and an algorithm identifier.
    pub fn new(digest: Vec<u8>, algorithm: impl Into<String>) -> Self {
        Self {
            digest,
            algorithm: algorithm.into(),
        }
    }

    /// The digest bytes.
    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    /// The algorithm identifier as it appears on the wire.
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// The AS2 wire form: `base64(digest), algorithm`.
    pub fn as_as2_string(&self) -> String {
        format!("{}, {}", STANDARD.encode(&self.digest), self.algorithm)
    }

    /// Parse the AS2 wire form, as found in `Received-Content-MIC`.
    pub fn parse(value: &str) -> Result<Self, As2Error> {
        let (b64, alg) = value
            .split_once(',')
            .ok_or_else(|| As2Error::InvalidMic(value.to_string()))?;
        let digest = STANDARD
            .decode(b64.trim())
            .map_err(|_| As2Error::InvalidMic(value.to_string()))?;
        let algorithm = alg.trim();
        if digest.is_empty() || algorithm.is_empty() {
            return Err(As2Error::InvalidMic(value.to_string()));
        }
        Ok(Self {
            digest,
            algorithm: algorithm.to_string(),
        })
    }
}

impl fmt::Display for Mic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_as2_string())
    }
}
