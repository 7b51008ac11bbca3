//! Encryption, compression and transfer-encoding identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::As2Error;

/// Content encryption algorithms for the S/MIME envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptionAlgorithm {
    /// Triple-DES CBC (`3des`). Legacy, still the most interoperable.
    TripleDes,
    /// AES-128 CBC.
    Aes128Cbc,
    /// AES-192 CBC.
    Aes192Cbc,
    /// AES-256 CBC.
    Aes256Cbc,
    /// AES-128 GCM.
    Aes128Gcm,
    /// AES-256 GCM.
    Aes256Gcm,
}

impl EncryptionAlgorithm {
    /// Parse a partnership encryption algorithm identifier.
    pub fn from_id(id: &str) -> Result<Self, As2Error> {
        match id.to_ascii_lowercase().as_str() {
            "3des" => Ok(EncryptionAlgorithm::TripleDes),
            "aes128-cbc" | "aes128" => Ok(EncryptionAlgorithm::Aes128Cbc),
            "aes192-cbc" | "aes192" => Ok(EncryptionAlgorithm::Aes192Cbc),
            "aes256-cbc" | "aes256" => Ok(EncryptionAlgorithm::Aes256Cbc),
            "aes128-gcm" => Ok(EncryptionAlgorithm::Aes128Gcm),
            "aes256-gcm" => Ok(EncryptionAlgorithm::Aes256Gcm),
            _ => Err(As2Error::UnknownAlgorithm {
                kind: "encryption",
                id: id.to_string(),
            }),
        }
    }

    /// The canonical identifier.
    pub fn id(&self) -> &'static str {
        match self {
            EncryptionAlgorithm::TripleDes => "3des",
            EncryptionAlgorithm::Aes128Cbc => "aes128-cbc",
            EncryptionAlgorithm::Aes192Cbc => "aes192-cbc",
            EncryptionAlgorithm::Aes256Cbc => "aes256-cbc",
            EncryptionAlgorithm::Aes128Gcm => "aes128-gcm",
            EncryptionAlgorithm::Aes256Gcm => "aes256-gcm",
        }
    }
}

impl fmt::Display for EncryptionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// S/MIME compression algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionType {
    /// zlib (RFC 3274), the only algorithm AS2 defines.
    Zlib,
}

impl CompressionType {
    /// Parse a partnership compression identifier (case-insensitive).
    pub fn from_id(id: &str) -> Result<Self, As2Error> {
        match id.to_ascii_lowercase().as_str() {
            "zlib" => Ok(CompressionType::Zlib),
            _ => Err(As2Error::UnknownAlgorithm {
                kind: "compression",
                id: id.to_string(),
            }),
        }
    }

    /// The canonical identifier.
    pub fn id(&self) -> &'static str {
        match self {
            CompressionType::Zlib => "zlib",
        }
    }
}

impl fmt::Display for CompressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// MIME Content-Transfer-Encoding values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ContentTransferEncoding {
    /// `7bit`.
    SevenBit,
    /// `8bit`.
    EightBit,
    /// `binary` - the AS2 default; HTTP transports arbitrary octets.
    #[default]
    Binary,
    /// `base64`.
    Base64,
    /// `quoted-printable`.
    QuotedPrintable,
}

impl ContentTransferEncoding {
    /// Parse a CTE identifier; unknown values fall back to the given default.
    pub fn from_id_or(id: &str, default: ContentTransferEncoding) -> Self {
        match id.to_ascii_lowercase().as_str() {
            "7bit" => ContentTransferEncoding::SevenBit,
            "8bit" => ContentTransferEncoding::EightBit,
            "binary" => ContentTransferEncoding::Binary,
            "base64" => ContentTransferEncoding::Base64,
            "quoted-printable" => ContentTransferEncoding::QuotedPrintable,
            _ => default,
        }
    }

    /// The wire identifier.
    pub fn id(&self) -> &'static str {
        match self {
            ContentTransferEncoding::SevenBit => "7bit",
            ContentTransferEncoding::EightBit => "8bit",
            ContentTransferEncoding::Binary => "binary",
            ContentTransferEncoding::Base64 => "base64",
            ContentTransferEncoding::QuotedPrintable => "quoted-printable",
        }
    }
}

impl fmt::Display for ContentTransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}
