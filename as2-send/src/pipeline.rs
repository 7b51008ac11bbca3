//! The compress/sign/encrypt pipeline.
//!
//! Transform order is protocol-mandated: compression either runs before
//! signing (the default, in which case the compressed part is what gets
//! signed and is therefore the MIC input) or after it; encryption always
//! wraps last. The caller learns the MIC input through a single-use
//! callback fired the moment those bytes are fixed.

use std::sync::Arc;

use as2_types::{
    headers, BodyPart, CompressionType, ContentTransferEncoding, EncryptionAlgorithm, Message,
    SigningAlgorithm,
};

use crate::crypto::{Certificate, CertificateProvider, CryptoProvider, PrivateKey};
use crate::error::SendError;

/// Applies the partnership's security policy to a message body.
///
/// Shared across messages; resolution of algorithms and key material
/// happens per call from the message's partnership snapshot.
#[derive(Clone)]
pub struct SecurityPipeline {
    crypto: Arc<dyn CryptoProvider>,
    certificates: Arc<dyn CertificateProvider>,
}

struct ResolvedPolicy {
    compression: Option<CompressionType>,
    compress_before_sign: bool,
    signing: Option<(SigningAlgorithm, Certificate, PrivateKey)>,
    include_certificate: bool,
    rfc3851_mic_names: bool,
    encryption: Option<(EncryptionAlgorithm, Certificate)>,
}

impl SecurityPipeline {
    /// Create a pipeline over the given providers.
    pub fn new(
        crypto: Arc<dyn CryptoProvider>,
        certificates: Arc<dyn CertificateProvider>,
    ) -> Self {
        Self {
            crypto,
            certificates,
        }
    }

    fn resolve(&self, msg: &Message) -> Result<ResolvedPolicy, SendError> {
        let partnership = &msg.partnership;

        let compression = partnership
            .compression_type
            .as_deref()
            .map(CompressionType::from_id)
            .transpose()
            .map_err(|e| SendError::Config(e.to_string()))?;

        let signing = match partnership.signing_algorithm.as_deref() {
            None => None,
            Some(id) => {
                let algorithm = SigningAlgorithm::from_id(id)
                    .map_err(|e| SendError::Config(e.to_string()))?;
                let alias = partnership.sender_x509_alias.as_deref().ok_or_else(|| {
                    SendError::Config(
                        "signing configured without a sender certificate alias".into(),
                    )
                })?;
                let certificate = self
                    .certificates
                    .certificate(alias)
                    .map_err(|e| SendError::Config(e.to_string()))?;
                let key = self
                    .certificates
                    .private_key(alias)
                    .map_err(|e| SendError::Config(e.to_string()))?;
                Some((algorithm, certificate, key))
            }
        };

        let encryption = match partnership.encryption_algorithm.as_deref() {
            None => None,
            Some(id) => {
                let algorithm = EncryptionAlgorithm::from_id(id)
                    .map_err(|e| SendError::Config(e.to_string()))?;
                let alias = partnership.receiver_x509_alias.as_deref().ok_or_else(|| {
                    SendError::Config(
                        "encryption configured without a receiver certificate alias".into(),
                    )
                })?;
                let certificate = self
                    .certificates
                    .certificate(alias)
                    .map_err(|e| SendError::Config(e.to_string()))?;
                Some((algorithm, certificate))
            }
        };

        Ok(ResolvedPolicy {
            compression,
            compress_before_sign: partnership.compress_before_sign,
            signing,
            include_certificate: partnership.include_certificate_in_signed_content,
            rfc3851_mic_names: partnership.rfc3851_mic_algorithms,
            encryption,
        })
    }

    /// Secure the message body per its partnership policy.
    ///
    /// `on_mic_source` fires at most once, with the part whose bytes the
    /// MIC must cover, and only when compress-before-sign replaced them;
    /// if it never fires the MIC input is the message's own body.
    ///
    /// Side effects on the message: the CTE header is set once; when
    /// compression or encryption is active the body part gets a CTE
    /// header too (needed to reproduce the plaintext on the far side);
    /// compression without signing or encryption marks the message
    /// `application/octet-stream`.
    pub fn secure<F>(
        &self,
        msg: &mut Message,
        cte: ContentTransferEncoding,
        on_mic_source: F,
    ) -> Result<BodyPart, SendError>
    where
        F: FnOnce(&BodyPart),
    {
        let policy = self.resolve(msg)?;

        msg.headers
            .set(headers::CONTENT_TRANSFER_ENCODING, cte.id());
        if policy.compression.is_some() || policy.encryption.is_some() {
            if let Some(body) = msg.body.as_mut() {
                if body.header(headers::CONTENT_TRANSFER_ENCODING).is_none() {
                    body.set_header(headers::CONTENT_TRANSFER_ENCODING, cte.id());
                }
            }
        }
        if policy.compression.is_some() && policy.signing.is_none() && policy.encryption.is_none()
        {
            msg.headers
                .set(headers::CONTENT_TYPE, "application/octet-stream");
        }

        let mut part = msg.body.clone().ok_or_else(|| SendError::InvalidParameter {
            field: "body",
            message_id: msg.message_id.clone(),
        })?;

        if let Some(compression) = policy.compression {
            if policy.compress_before_sign {
                tracing::debug!("compressing outbound message before signing");
                part = self.crypto.compress(&part, compression, cte)?;
                // The compressed bytes are what gets signed, so they are
                // the MIC input from here on.
                on_mic_source(&part);
            }
        }

        if let Some((algorithm, certificate, key)) = &policy.signing {
            tracing::debug!("signing outbound message with {}", algorithm);
            part = self.crypto.sign(
                &part,
                certificate,
                key,
                *algorithm,
                policy.include_certificate,
                policy.rfc3851_mic_names,
                cte,
            )?;
        }

        if let Some(compression) = policy.compression {
            if !policy.compress_before_sign {
                tracing::debug!("compressing outbound message after signing");
                part = self.crypto.compress(&part, compression, cte)?;
            }
        }

        if let Some((algorithm, certificate)) = &policy.encryption {
            tracing::debug!("encrypting outbound message with {}", algorithm);
            part = self.crypto.encrypt(&part, certificate, *algorithm, cte)?;
        }

        Ok(part)
    }
}
