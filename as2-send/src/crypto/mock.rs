//! Mock crypto provider.
//!
//! Produces structurally faithful S/MIME shapes (`multipart/signed`,
//! `application/pkcs7-mime` envelopes) with deterministic, reversible
//! transforms instead of real CMS content. This is the provider the test
//! suites run against; production deployments plug a CMS-backed provider
//! into the same trait.

use as2_types::{
    BodyPart, CompressionType, ContentTransferEncoding, EncryptionAlgorithm, HeaderMap,
    SigningAlgorithm,
};

use super::{Certificate, CryptoError, CryptoProvider, PrivateKey, Verified};

const COMPRESSED_PREFIX: &[u8] = b"MOCK-COMPRESSED\r\n";
const ENCRYPTED_PREFIX: &[u8] = b"MOCK-ENCRYPTED:";
const CERT_MARKER: &str = "MOCK-CERT-INCLUDED";

/// A deterministic, reversible [`CryptoProvider`].
///
/// Signatures are a digest over the signed bytes and the signer
/// certificate, so tampering with either fails verification; the
/// compression and encryption wrappers are prefix-framed and can be
/// unwrapped with [`MockCryptoProvider::decompress`] /
/// [`MockCryptoProvider::decrypt`] to assert pipeline ordering.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockCryptoProvider;

impl MockCryptoProvider {
    /// Create a mock provider.
    pub fn new() -> Self {
        Self
    }

    fn signature_for(inner: &[u8], certificate: &Certificate, algorithm: SigningAlgorithm) -> String {
        let mut input = inner.to_vec();
        input.extend_from_slice(certificate.as_der());
        hex::encode(algorithm.digest(&input))
    }

    /// Unwrap a mock compressed-data part, restoring the original part.
    pub fn decompress(&self, part: &BodyPart) -> Result<BodyPart, CryptoError> {
        let content = part.content();
        let inner = content
            .strip_prefix(COMPRESSED_PREFIX)
            .ok_or_else(|| CryptoError::Compress("not a mock compressed part".into()))?;
        let (headers, offset) = HeaderMap::parse_block(inner)
            .map_err(|e| CryptoError::Compress(e.to_string()))?;
        Ok(BodyPart::from_parts(headers, inner[offset..].to_vec()))
    }

    /// Unwrap a mock enveloped-data part for the given recipient.
    pub fn decrypt(
        &self,
        part: &BodyPart,
        certificate: &Certificate,
    ) -> Result<BodyPart, CryptoError> {
        let content = part.content();
        let rest = content
            .strip_prefix(ENCRYPTED_PREFIX)
            .ok_or_else(|| CryptoError::Encrypt("not a mock enveloped part".into()))?;
        let line_end = rest
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| CryptoError::Encrypt("malformed envelope".into()))?;
        let header_line = String::from_utf8_lossy(&rest[..line_end]).trim().to_string();
        let (_, fingerprint) = header_line
            .rsplit_once(':')
            .ok_or_else(|| CryptoError::Encrypt("malformed envelope".into()))?;
        if fingerprint != Self::fingerprint(certificate) {
            return Err(CryptoError::Encrypt(
                "envelope is addressed to a different certificate".into(),
            ));
        }
        let inner = &rest[line_end + 1..];
        let (headers, offset) = HeaderMap::parse_block(inner)
            .map_err(|e| CryptoError::Encrypt(e.to_string()))?;
        Ok(BodyPart::from_parts(headers, inner[offset..].to_vec()))
    }

    fn fingerprint(certificate: &Certificate) -> String {
        hex::encode(&SigningAlgorithm::Sha256.digest(certificate.as_der())[..8])
    }
}

impl CryptoProvider for MockCryptoProvider {
    fn sign(
        &self,
        part: &BodyPart,
        certificate: &Certificate,
        _key: &PrivateKey,
        algorithm: SigningAlgorithm,
        include_certificate: bool,
        rfc3851_mic_names: bool,
        cte: ContentTransferEncoding,
    ) -> Result<BodyPart, CryptoError> {
        let inner = part.canonical_bytes(true);
        let signature = Self::signature_for(&inner, certificate, algorithm);
        let boundary = format!("mockbound{}", &hex::encode(algorithm.digest(&inner))[..16]);
        let micalg = algorithm.id(rfc3851_mic_names);

        let mut content = Vec::with_capacity(inner.len() + 512);
        content.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        content.extend_from_slice(&inner);
        content.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
        content.extend_from_slice(
            b"Content-Type: application/pkcs7-signature; name=\"smime.p7s\"\r\n\r\n",
        );
        content.extend_from_slice(signature.as_bytes());
        if include_certificate {
            content.extend_from_slice(format!("\r\n{CERT_MARKER}").as_bytes());
        }
        content.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let mut signed = BodyPart::new(
            content,
            &format!(
                "multipart/signed; protocol=\"application/pkcs7-signature\"; micalg={micalg}; boundary=\"{boundary}\""
            ),
        );
        signed.set_header(as2_types::headers::CONTENT_TRANSFER_ENCODING, cte.id());
        Ok(signed)
    }

    fn encrypt(
        &self,
        part: &BodyPart,
        certificate: &Certificate,
        algorithm: EncryptionAlgorithm,
        cte: ContentTransferEncoding,
    ) -> Result<BodyPart, CryptoError> {
        let inner = part.canonical_bytes(true);
        let mut content = Vec::with_capacity(inner.len() + 64);
        content.extend_from_slice(ENCRYPTED_PREFIX);
        content.extend_from_slice(algorithm.id().as_bytes());
        content.push(b':');
        content.extend_from_slice(Self::fingerprint(certificate).as_bytes());
        content.extend_from_slice(b"\r\n");
        content.extend_from_slice(&inner);

        let mut enveloped = BodyPart::new(
            content,
            "application/pkcs7-mime; smime-type=enveloped-data; name=\"smime.p7m\"",
        );
        enveloped.set_header(as2_types::headers::CONTENT_TRANSFER_ENCODING, cte.id());
        Ok(enveloped)
    }

    fn compress(
        &self,
        part: &BodyPart,
        _compression: CompressionType,
        cte: ContentTransferEncoding,
    ) -> Result<BodyPart, CryptoError> {
        let inner = part.canonical_bytes(true);
        let mut content = Vec::with_capacity(inner.len() + COMPRESSED_PREFIX.len());
        content.extend_from_slice(COMPRESSED_PREFIX);
        content.extend_from_slice(&inner);

        let mut compressed = BodyPart::new(
            content,
            "application/pkcs7-mime; smime-type=compressed-data; name=\"smime.p7z\"",
        );
        compressed.set_header(as2_types::headers::CONTENT_TRANSFER_ENCODING, cte.id());
        Ok(compressed)
    }

    fn verify(&self, part: &BodyPart, certificate: &Certificate) -> Result<Verified, CryptoError> {
        if !part.is_multipart_signed() {
            return Err(CryptoError::Verify("not a multipart/signed part".into()));
        }
        let algorithm = part
            .content_type_parameter("micalg")
            .and_then(|id| SigningAlgorithm::from_id(&id).ok())
            .ok_or_else(|| CryptoError::Verify("missing or unknown micalg parameter".into()))?;
        let parts = part
            .parts()
            .map_err(|e| CryptoError::Verify(e.to_string()))?;
        if parts.len() != 2 {
            return Err(CryptoError::Verify(format!(
                "expected content and signature parts, found {}",
                parts.len()
            )));
        }

        let inner = parts[0].canonical_bytes(true);
        let expected = Self::signature_for(&inner, certificate, algorithm);
        let signature_body = String::from_utf8_lossy(parts[1].content());
        let actual = signature_body.lines().next().unwrap_or("").trim();
        if actual != expected {
            return Err(CryptoError::Verify("signature mismatch".into()));
        }
        Ok(Verified {
            content: parts[0].clone(),
            certificate: certificate.clone(),
        })
    }
}
