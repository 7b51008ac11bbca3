//! Partnership snapshots: the per-exchange policy between two AS2 parties.

use serde::Deserialize;
use std::path::PathBuf;

use crate::As2Error;

/// How (and whether) the partnership requests a disposition notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MdnMode {
    /// No MDN requested.
    None,
    /// MDN expected on the same HTTP response as the POST.
    Synchronous,
    /// MDN delivered later by a separate POST to the receipt-delivery URL.
    Asynchronous,
}

/// An immutable snapshot of the configured relationship with a trading
/// partner, taken when the message enters the send path.
///
/// Partnership lookup itself is an external collaborator; the sender only
/// consumes snapshots.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Partnership {
    /// Our AS2 identifier (`AS2-From`).
    pub sender_as2_id: String,
    /// The partner's AS2 identifier (`AS2-To`).
    pub receiver_as2_id: String,
    /// Our email address (`From` header).
    pub sender_email: String,
    /// Destination URL for the HTTP POST.
    pub as2_url: String,
    /// Signing algorithm identifier; `None` disables signing.
    pub signing_algorithm: Option<String>,
    /// Encryption algorithm identifier; `None` disables encryption.
    pub encryption_algorithm: Option<String>,
    /// Compression type identifier; `None` disables compression.
    pub compression_type: Option<String>,
    /// Compress before signing (the protocol default) rather than after.
    #[serde(default = "default_true")]
    pub compress_before_sign: bool,
    /// Where the partner should send the MDN (`Disposition-Notification-To`).
    /// Presence of this field is what requests an MDN at all.
    pub mdn_to: Option<String>,
    /// Raw `Disposition-Notification-Options` value.
    pub mdn_options: Option<String>,
    /// Receipt delivery URL; presence switches the MDN to asynchronous.
    pub receipt_delivery_option: Option<String>,
    /// Content-Transfer-Encoding for outbound bodies (default `binary`).
    pub content_transfer_encoding: Option<String>,
    /// Certificate-store alias for our signing key and certificate.
    pub sender_x509_alias: Option<String>,
    /// Certificate-store alias for the partner's encryption certificate.
    pub receiver_x509_alias: Option<String>,
    /// Embed our certificate in the signed content.
    pub include_certificate_in_signed_content: bool,
    /// Use RFC 3851 MIC algorithm names (`sha1`) instead of RFC 5751
    /// (`sha-1`).
    pub rfc3851_mic_algorithms: bool,
    /// Transmission retry count override for this partnership.
    pub retry_count: Option<u32>,
    /// Directory that keeps copies of files awaiting an asynchronous MDN.
    pub pending_folder: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl Default for Partnership {
    fn default() -> Self {
        Self {
            sender_as2_id: String::new(),
            receiver_as2_id: String::new(),
            sender_email: String::new(),
            as2_url: String::new(),
            signing_algorithm: None,
            encryption_algorithm: None,
            compression_type: None,
            compress_before_sign: true,
            mdn_to: None,
            mdn_options: None,
            receipt_delivery_option: None,
            content_transfer_encoding: None,
            sender_x509_alias: None,
            receiver_x509_alias: None,
            include_certificate_in_signed_content: false,
            rfc3851_mic_algorithms: false,
            retry_count: None,
            pending_folder: None,
        }
    }
}

impl Partnership {
    /// Whether any MDN is requested.
    pub fn is_requesting_mdn(&self) -> bool {
        self.mdn_to.is_some()
    }

    /// The effective MDN mode.
    pub fn mdn_mode(&self) -> MdnMode {
        if !self.is_requesting_mdn() {
            MdnMode::None
        } else if self.receipt_delivery_option.is_some() {
            MdnMode::Asynchronous
        } else {
            MdnMode::Synchronous
        }
    }

    /// Check the snapshot's structural invariants.
    ///
    /// Certificate alias *resolution* is the certificate provider's
    /// concern; here only presence is enforced.
    pub fn validate(&self) -> Result<(), As2Error> {
        if self
            .receipt_delivery_option
            .as_deref()
            .is_some_and(str::is_empty)
        {
            return Err(As2Error::InvalidPartnership(
                "asynchronous MDN requested with an empty receipt-delivery URL".into(),
            ));
        }
        if self.signing_algorithm.is_some() && self.sender_x509_alias.is_none() {
            return Err(As2Error::InvalidPartnership(
                "signing configured without a sender certificate alias".into(),
            ));
        }
        if self.encryption_algorithm.is_some() && self.receiver_x509_alias.is_none() {
            return Err(As2Error::InvalidPartnership(
                "encryption configured without a receiver certificate alias".into(),
            ));
        }
        Ok(())
    }
}
