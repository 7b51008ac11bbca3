//! # as2-types
//!
//! Data model for the AS2 message sender: the types shared by the
//! security pipeline, the HTTP sender and the directory poller.
//!
//! This crate provides the foundational types used across all AS2 crates:
//! - [`Message`], [`Partnership`], [`Mdn`] - The message model
//! - [`BodyPart`], [`HeaderMap`] - MIME body parts and multipart parsing
//! - [`Mic`], [`SigningAlgorithm`] - Message Integrity Check handling
//! - [`DispositionType`] - MDN disposition parsing and validation
//! - [`MessageIdGenerator`] - Globally unique Message-ID generation
//! - [`As2Error`] - Error types
//!
//! Everything in here is pure data manipulation; no I/O.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod algorithms;
mod disposition;
mod error;
mod ids;
mod message;
mod mic;
mod mime;
mod partnership;

pub use algorithms::{CompressionType, ContentTransferEncoding, EncryptionAlgorithm};
pub use disposition::{DispositionCategory, DispositionType};
pub use error::As2Error;
pub use ids::{filesystem_safe_id, MessageIdGenerator};
pub use message::{Mdn, Message, MessageAttributes, MessageStatus};
pub use mic::{Mic, SigningAlgorithm};
pub use mime::{BodyPart, HeaderMap};
pub use partnership::{MdnMode, Partnership};

/// HTTP and MIME header names used throughout the sender.
pub mod headers {
    /// `AS2-Version` header.
    pub const AS2_VERSION: &str = "AS2-Version";
    /// `AS2-From` header.
    pub const AS2_FROM: &str = "AS2-From";
    /// `AS2-To` header.
    pub const AS2_TO: &str = "AS2-To";
    /// `Message-ID` header.
    pub const MESSAGE_ID: &str = "Message-ID";
    /// `Subject` header.
    pub const SUBJECT: &str = "Subject";
    /// `From` header.
    pub const FROM: &str = "From";
    /// `Date` header.
    pub const DATE: &str = "Date";
    /// `Connection` header.
    pub const CONNECTION: &str = "Connection";
    /// `User-Agent` header.
    pub const USER_AGENT: &str = "User-Agent";
    /// `Mime-Version` header.
    pub const MIME_VERSION: &str = "Mime-Version";
    /// `Content-Type` header.
    pub const CONTENT_TYPE: &str = "Content-Type";
    /// `Content-Length` header.
    pub const CONTENT_LENGTH: &str = "Content-Length";
    /// `Content-Transfer-Encoding` header.
    pub const CONTENT_TRANSFER_ENCODING: &str = "Content-Transfer-Encoding";
    /// `Content-Disposition` header.
    pub const CONTENT_DISPOSITION: &str = "Content-Disposition";
    /// `Recipient-Address` header.
    pub const RECIPIENT_ADDRESS: &str = "Recipient-Address";
    /// `Disposition-Notification-To` header.
    pub const DISPOSITION_NOTIFICATION_TO: &str = "Disposition-Notification-To";
    /// `Disposition-Notification-Options` header.
    pub const DISPOSITION_NOTIFICATION_OPTIONS: &str = "Disposition-Notification-Options";
    /// `Receipt-Delivery-Option` header, presence of which requests an
    /// asynchronous MDN.
    pub const RECEIPT_DELIVERY_OPTION: &str = "Receipt-Delivery-Option";
}
