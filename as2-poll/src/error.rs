//! Error types for the directory poller.

use thiserror::Error;

use as2_send::SendError;

/// Errors raised while polling and routing outbox files.
#[derive(Debug, Error)]
pub enum PollError {
    /// Filesystem fault.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A filename did not yield the attributes the format template names.
    #[error("filename '{filename}' does not match format '{format}'")]
    FormatMismatch {
        /// The filename that was parsed.
        filename: String,
        /// The format template in effect.
        format: String,
    },

    /// The partnership resolver could not produce a snapshot.
    #[error("partnership resolution failed: {0}")]
    Partnership(String),

    /// The sender rejected or failed the message.
    #[error(transparent)]
    Send(#[from] SendError),

    /// A post-send file move or copy failed.
    #[error("file routing failed: {0}")]
    Routing(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PollError>();
    }

    #[test]
    fn send_error_passes_through_transparently() {
        let err = PollError::from(SendError::Config("bad algorithm".into()));
        assert_eq!(err.to_string(), "configuration error: bad algorithm");
    }
}
