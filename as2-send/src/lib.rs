//! # as2-send
//!
//! The AS2 send path: security pipeline, HTTP transmission and MDN
//! reconciliation.
//!
//! # Architecture
//!
//! ```text
//! Message → Sender → SecurityPipeline → HttpTransport → receiver
//!              │            │                 │
//!              │       CryptoProvider    MdnReceiver ← sync MDN
//!              │
//!         PendingStore ← async MDN records
//! ```
//!
//! [`Sender`] orchestrates; the seams ([`crypto::CryptoProvider`],
//! [`crypto::CertificateProvider`], [`transport::HttpTransport`],
//! [`dumper::Dumper`], [`mdn::MicMatchingHandler`], [`mdn::MdnStore`])
//! are traits so deployments swap in their own crypto stack, transport
//! and persistence. Mock implementations of the transport and the crypto
//! provider ship with the crate and back the test suites.
//!
//! # Example
//!
//! ```ignore
//! use as2_send::{Sender, SenderConfig, PendingStore};
//! use as2_send::transport::{ReqwestTransport, TransportConfig};
//!
//! let transport = ReqwestTransport::new(&TransportConfig::default())?;
//! let sender = Sender::new(
//!     Arc::new(transport),
//!     crypto_provider,
//!     certificate_provider,
//!     PendingStore::new("data/pendinginfo"),
//!     SenderConfig::default(),
//! );
//! sender.send(&mut message).await?;
//! ```

#![warn(clippy::all)]

pub mod crypto;
pub mod dumper;
mod error;
mod headers;
pub mod mdn;
mod pending;
mod pipeline;
mod sender;
pub mod transport;

pub use dumper::{Dumper, FileDumper};
pub use error::SendError;
pub use headers::HeaderBuilder;
pub use mdn::{LoggingMicMatchingHandler, MdnReceiver, MdnStore, MicMatchingHandler};
pub use pending::{PendingError, PendingRecord, PendingStore};
pub use pipeline::SecurityPipeline;
pub use sender::{ErrorHook, LoggingErrorHook, Sender, SenderConfig};
