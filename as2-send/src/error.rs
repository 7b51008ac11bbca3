//! Error taxonomy for the send path.
//!
//! The variants map one-to-one onto routing decisions: retryable errors
//! may trigger another HTTP attempt, everything else is terminal for the
//! message and sends its source file to the error directory.

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::pending::PendingError;
use crate::transport::TransportError;
use as2_types::As2Error;

/// Errors raised while sending an AS2 message.
#[derive(Debug, Error)]
pub enum SendError {
    /// A required message or partnership field is missing or empty.
    /// Fatal for the message.
    #[error("missing required field '{field}' for message {message_id}")]
    InvalidParameter {
        /// The field that failed validation.
        field: &'static str,
        /// The message the field belongs to.
        message_id: String,
    },

    /// Unsupported algorithm or missing credential. Fatal.
    #[error("configuration error: {0}")]
    Config(String),

    /// Signing, encryption, compression or verification failure. Fatal.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Filesystem fault. Retryable only when it occurred during
    /// transmission.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network fault during transmission. Retryable.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The receiver answered with a non-2xx status. Retryable.
    #[error("HTTP {code} {reason} from '{url}'")]
    HttpResponse {
        /// The URL that was posted to.
        url: String,
        /// HTTP status code.
        code: u16,
        /// Status reason phrase.
        reason: String,
    },

    /// The MDN carried an error disposition: the counterparty rejected
    /// the message. Never retried.
    #[error("MDN disposition error: {disposition}")]
    Disposition {
        /// The raw disposition string.
        disposition: String,
        /// Human-readable text from the MDN, if any.
        text: Option<String>,
    },

    /// The MDN signature did not verify. The payload was delivered;
    /// the failure is surfaced but not retried.
    #[error("MDN verification failed: {0}")]
    MdnVerify(String),

    /// The MDN could not be processed for a reason other than its
    /// signature or disposition. The payload was delivered.
    #[error("MDN processing failed: {0}")]
    Mdn(String),

    /// Writing or reading a pending-MDN record failed.
    #[error("pending store error: {0}")]
    Pending(#[from] PendingError),

    /// Malformed AS2 data (MIME, MIC or disposition parsing).
    #[error("invalid AS2 data: {0}")]
    Data(#[from] As2Error),
}

impl SendError {
    /// Whether another HTTP attempt may succeed.
    ///
    /// Only transmission-level faults qualify; rejections, configuration
    /// and crypto failures are final for the message.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SendError::Transport(_) | SendError::HttpResponse { .. } | SendError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transmission_errors_are_retryable() {
        assert!(SendError::HttpResponse {
            url: "http://x".into(),
            code: 500,
            reason: "Internal Server Error".into(),
        }
        .is_retryable());
        assert!(SendError::Transport(TransportError::Timeout).is_retryable());
        assert!(SendError::Io(std::io::Error::other("reset")).is_retryable());
    }

    #[test]
    fn rejections_are_not_retryable() {
        assert!(!SendError::InvalidParameter {
            field: "subject",
            message_id: "<x@a_b>".into(),
        }
        .is_retryable());
        assert!(!SendError::Config("bad algorithm".into()).is_retryable());
        assert!(!SendError::Disposition {
            disposition: "automatic-action/MDN-sent-automatically; failed".into(),
            text: None,
        }
        .is_retryable());
        assert!(!SendError::MdnVerify("bad signature".into()).is_retryable());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SendError>();
    }
}
