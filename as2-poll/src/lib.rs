//! # as2-poll
//!
//! Directory-polling ingress for the AS2 sender: watches an outbox for
//! dropped files, waits for their size to stabilize, builds messages and
//! submits them, then routes each file to the sent, error or pending
//! directory depending on the outcome.
//!
//! One [`DirectoryPoller`] per outbox, each on its own task via
//! [`spawn_poller`]; the sender and its providers are shared.

#![warn(clippy::all)]

mod error;
mod params;
mod poller;
mod tracker;

pub use error::PollError;
pub use params::{apply_parameter, parse_defaults, parse_filename, DEFAULT_DELIMITERS};
pub use poller::{
    spawn_poller, DirectoryPoller, PartnershipResolver, PollerConfig, SentMovePolicy,
    StaticPartnershipResolver,
};
pub use tracker::FileTracker;
