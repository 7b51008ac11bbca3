//! The AS2 message model.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::{BodyPart, HeaderMap, MdnMode, Partnership};

/// Lifecycle status of a message, carried in its attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    /// Sent; awaiting an asynchronous MDN.
    Pending,
}

/// Transient per-message state collected on the way through the send path.
///
/// These are the per-message values the send path records as it runs;
/// anything extracted from the source filename lands in `extra`.
#[derive(Debug, Clone, Default)]
pub struct MessageAttributes {
    /// Destination host, recorded when the connection is opened.
    pub destination_ip: Option<String>,
    /// Destination port, recorded when the connection is opened.
    pub destination_port: Option<u16>,
    /// Lifecycle status; `Pending` when an async MDN is outstanding.
    pub status: Option<MessageStatus>,
    /// Original filename of the polled source file.
    pub filename: Option<String>,
    /// Absolute path of the polled source file.
    pub filepath: Option<PathBuf>,
    /// Filename under which the payload should wait in the pending folder.
    pub pending_filename: Option<String>,
    /// Full path of the pending data copy, fixed when the pending record
    /// is written.
    pub pending_file: Option<PathBuf>,
    /// Path of the pending-info record written for async MDN matching.
    pub pending_info_file: Option<PathBuf>,
    /// AS2 string form of the MIC computed before transmission.
    pub mic: Option<String>,
    /// Attributes extracted from the source filename by the poller's
    /// format template.
    pub extra: BTreeMap<String, String>,
}

/// An outbound AS2 message and everything collected while sending it.
///
/// Owned by one processing path at a time; never shared across tasks.
#[derive(Debug, Clone)]
pub struct Message {
    /// Globally unique Message-ID, including the angle brackets.
    pub message_id: String,
    /// Subject line.
    pub subject: String,
    /// Current Content-Type; updated as the security pipeline transforms
    /// the body.
    pub content_type: String,
    /// Content-Disposition, set when the original filename travels along.
    pub content_disposition: Option<String>,
    /// The MIME payload. Non-`None` from the moment the source file is
    /// read until the message is discarded.
    pub body: Option<BodyPart>,
    /// Outbound HTTP headers accumulated for this message.
    pub headers: HeaderMap,
    /// Transient processing state.
    pub attributes: MessageAttributes,
    /// The effective partnership snapshot.
    pub partnership: Partnership,
    /// The disposition notification received for this message, if any.
    pub mdn: Option<Mdn>,
}

impl Message {
    /// Create an empty message bound to a partnership snapshot.
    pub fn new(message_id: String, partnership: Partnership) -> Self {
        Self {
            message_id,
            subject: String::new(),
            content_type: String::new(),
            content_disposition: None,
            body: None,
            headers: HeaderMap::new(),
            attributes: MessageAttributes::default(),
            partnership,
            mdn: None,
        }
    }

    /// Whether the partnership requests any MDN for this message.
    pub fn is_requesting_mdn(&self) -> bool {
        self.partnership.is_requesting_mdn()
    }

    /// Whether the requested MDN is asynchronous.
    pub fn is_requesting_async_mdn(&self) -> bool {
        self.partnership.mdn_mode() == MdnMode::Asynchronous
    }
}

/// A parsed Message Disposition Notification.
#[derive(Debug, Clone, Default)]
pub struct Mdn {
    /// HTTP headers of the MDN response or callback.
    pub headers: HeaderMap,
    /// The MDN MIME body (possibly `multipart/signed`).
    pub body: Option<BodyPart>,
    /// The raw disposition string.
    pub disposition: Option<String>,
    /// The `Received-Content-MIC` value echoed by the receiver.
    pub mic: Option<String>,
    /// Human-readable explanation from the text part.
    pub text: Option<String>,
    /// The `Original-Message-ID` field, naming the message this MDN
    /// answers.
    pub original_message_id: Option<String>,
}
