//! Error types for the AS2 data model.

use thiserror::Error;

/// Errors raised while parsing or validating AS2 data structures.
#[derive(Debug, Error)]
pub enum As2Error {
    /// MIME parsing failed.
    #[error("invalid MIME: {0}")]
    Mime(String),

    /// A multipart body was expected but no boundary parameter is present.
    #[error("content type '{0}' carries no boundary parameter")]
    MissingBoundary(String),

    /// An MDN disposition string could not be parsed.
    #[error("invalid disposition '{value}': {reason}")]
    InvalidDisposition {
        /// The raw disposition string.
        value: String,
        /// Why it could not be parsed.
        reason: String,
    },

    /// A `Received-Content-MIC` value could not be parsed.
    #[error("invalid MIC string: {0}")]
    InvalidMic(String),

    /// An algorithm identifier is not recognized.
    #[error("unknown {kind} algorithm: '{id}'")]
    UnknownAlgorithm {
        /// Algorithm family (signing, encryption, compression).
        kind: &'static str,
        /// The offending identifier.
        id: String,
    },

    /// A partnership snapshot violates one of its invariants.
    #[error("invalid partnership: {0}")]
    InvalidPartnership(String),
}
