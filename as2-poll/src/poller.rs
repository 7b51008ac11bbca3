//! Directory polling ingress.
//!
//! Scans an outbox directory, waits for each file's size to stabilize,
//! builds an AS2 message from the file and submits it to the sender,
//! then routes the file to sent/error/pending per the outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::watch;
use tokio::time::interval;

use as2_send::Sender;
use as2_types::{
    BodyPart, ContentTransferEncoding, Message, MessageIdGenerator, MessageStatus, Partnership,
    headers,
};

use crate::params::{apply_parameter, parse_defaults, parse_filename, DEFAULT_DELIMITERS};
use crate::tracker::FileTracker;
use crate::PollError;

/// What to do when a successfully sent file cannot be moved to the sent
/// directory.
///
/// Neither answer is free: leaving the file risks a duplicate send,
/// failing it routes an already-delivered payload to the error
/// directory. Deployments choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum SentMovePolicy {
    /// Log and leave the file in the outbox. It will be picked up and
    /// re-sent on a later cycle - at-least-once delivery.
    #[default]
    LeaveInOutbox,
    /// Treat the message as failed and route the file to the error
    /// directory so an operator decides. No duplicate send.
    FailMessage,
}

/// Poller configuration (`outboxdir`, `errordir`, `sentdir`, `format`,
/// `delimiters`, `defaults`, `mimetype`, `sendfilename`).
#[derive(Debug, Clone, Deserialize)]
pub struct PollerConfig {
    /// Directory scanned for files to send.
    pub outbox_dir: PathBuf,
    /// Directory receiving files whose send failed.
    pub error_dir: PathBuf,
    /// Directory receiving successfully sent files; when absent, sent
    /// files are deleted instead.
    #[serde(default)]
    pub sent_dir: Option<PathBuf>,
    /// Format template matched against filenames to extract parameters.
    #[serde(default)]
    pub format: Option<String>,
    /// Delimiter characters for the format template.
    #[serde(default = "default_delimiters")]
    pub delimiters: String,
    /// Defaults string applied to every message before the filename
    /// parameters.
    #[serde(default)]
    pub defaults: Option<String>,
    /// Content-Type for read files (default `application/octet-stream`).
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Send a `Content-Disposition` naming the original file.
    #[serde(default)]
    pub send_filename: bool,
    /// Behavior when the post-send move to the sent directory fails.
    #[serde(default)]
    pub sent_move_policy: SentMovePolicy,
}

fn default_delimiters() -> String {
    DEFAULT_DELIMITERS.to_string()
}

/// Produces the effective partnership snapshot for a polled message.
///
/// Partnership lookup is an external concern; the poller hands over the
/// message with its filename-derived attributes filled in and expects
/// the snapshot (and optionally the subject) to be set on return.
pub trait PartnershipResolver: Send + Sync {
    /// Fill `msg.partnership` from the message's attributes.
    fn update_partnership(&self, msg: &mut Message) -> Result<(), PollError>;
}

/// Resolver that hands every message the same snapshot. Fits single-
/// partner pollers and tests.
#[derive(Debug, Clone)]
pub struct StaticPartnershipResolver {
    partnership: Partnership,
}

impl StaticPartnershipResolver {
    /// Create a resolver always yielding `partnership`.
    pub fn new(partnership: Partnership) -> Self {
        Self { partnership }
    }
}

impl PartnershipResolver for StaticPartnershipResolver {
    fn update_partnership(&self, msg: &mut Message) -> Result<(), PollError> {
        msg.partnership = self.partnership.clone();
        Ok(())
    }
}

/// Polls one outbox directory and drives its files through the sender.
///
/// One poller owns one tracked-file map and runs on one task; spawn a
/// poller per outbox.
pub struct DirectoryPoller {
    config: PollerConfig,
    sender: Arc<Sender>,
    resolver: Arc<dyn PartnershipResolver>,
    ids: Arc<MessageIdGenerator>,
    tracker: FileTracker,
}

impl DirectoryPoller {
    /// Create a poller; the outbox and error directories are created if
    /// missing.
    pub fn new(
        config: PollerConfig,
        sender: Arc<Sender>,
        resolver: Arc<dyn PartnershipResolver>,
        ids: Arc<MessageIdGenerator>,
    ) -> Result<Self, PollError> {
        std::fs::create_dir_all(&config.outbox_dir)?;
        std::fs::create_dir_all(&config.error_dir)?;
        if let Some(sent_dir) = &config.sent_dir {
            std::fs::create_dir_all(sent_dir)?;
        }
        Ok(Self {
            config,
            sender,
            resolver,
            ids,
            tracker: FileTracker::new(),
        })
    }

    /// Run one poll cycle: scan, refresh tracking, process every file
    /// that became stable. Returns how many files were processed.
    pub async fn poll(&mut self) -> usize {
        if let Err(error) = self.scan_directory() {
            tracing::error!(
                "failed to scan outbox {:?}: {}",
                self.config.outbox_dir,
                error
            );
            return 0;
        }

        let stable = self.tracker.take_stable(|path| probe_file(path));

        let mut processed = 0;
        for path in stable {
            processed += 1;
            if let Err(error) = self.process_file(&path).await {
                tracing::error!("failed to process {:?}: {}", path, error);
                self.route_to_error_dir(&path);
            }
        }
        processed
    }

    fn scan_directory(&mut self) -> std::io::Result<()> {
        for entry in std::fs::read_dir(&self.config.outbox_dir)? {
            let path = entry?.path();
            if let Some(size) = probe_file(&path) {
                self.tracker.observe(&path, size);
            }
        }
        Ok(())
    }

    async fn process_file(&self, path: &Path) -> Result<(), PollError> {
        tracing::info!("processing {:?}", path);

        let mut msg = self.build_message(path).await?;
        tracing::info!("file {:?} assigned to message {}", path, msg.message_id);

        self.sender.send(&mut msg).await?;

        // Async MDN outstanding: park a copy where the reconciliation
        // side expects to find it before the original leaves the outbox.
        if msg.attributes.status == Some(MessageStatus::Pending) {
            let pending_file = msg.attributes.pending_file.clone().ok_or_else(|| {
                PollError::Routing("pending status without a pending file path".into())
            })?;
            copy_to(path, &pending_file).await.map_err(|error| {
                PollError::Routing(format!(
                    "file was successfully sent but not copied to pending folder {:?}: {}",
                    pending_file, error
                ))
            })?;
            tracing::info!("copied {:?} to pending folder {:?}", path, pending_file);
        }

        match &self.config.sent_dir {
            Some(sent_dir) => {
                let dest = unique_path(sent_dir, &file_name(path), "");
                match move_file(path, &dest).await {
                    Ok(()) => {
                        tracing::info!("moved {:?} to {:?}", path, dest);
                    }
                    Err(error) => match self.config.sent_move_policy {
                        SentMovePolicy::LeaveInOutbox => {
                            tracing::error!(
                                "file was successfully sent but not moved to sent folder {:?}: {}; leaving in outbox, it will be re-sent",
                                dest,
                                error
                            );
                        }
                        SentMovePolicy::FailMessage => {
                            return Err(PollError::Routing(format!(
                                "file was successfully sent but not moved to sent folder {:?}: {}",
                                dest, error
                            )));
                        }
                    },
                }
            }
            None => {
                tokio::fs::remove_file(path).await.map_err(|error| {
                    PollError::Routing(format!(
                        "file was successfully sent but not deleted: {:?}: {}",
                        path, error
                    ))
                })?;
                tracing::info!("deleted {:?}", path);
            }
        }
        Ok(())
    }

    async fn build_message(&self, path: &Path) -> Result<Message, PollError> {
        let filename = file_name(path);

        let mut msg = Message::new(String::new(), Partnership::default());
        msg.attributes.filename = Some(filename.clone());
        msg.attributes.filepath = Some(path.to_path_buf());
        msg.attributes.pending_filename = Some(filename.clone());

        if let Some(defaults) = &self.config.defaults {
            for (key, value) in parse_defaults(defaults) {
                apply_parameter(&mut msg, &key, &value);
            }
        }
        if let Some(format) = &self.config.format {
            for (key, value) in parse_filename(format, &self.config.delimiters, &filename)? {
                apply_parameter(&mut msg, &key, &value);
            }
        }

        self.resolver.update_partnership(&mut msg)?;

        let data = tokio::fs::read(path).await?;
        let content_type = self
            .config
            .mime_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let mut body = BodyPart::new(data, &content_type);

        let cte = ContentTransferEncoding::from_id_or(
            msg.partnership
                .content_transfer_encoding
                .as_deref()
                .unwrap_or(ContentTransferEncoding::Binary.id()),
            ContentTransferEncoding::Binary,
        );
        body.set_header(headers::CONTENT_TRANSFER_ENCODING, cte.id());

        if self.config.send_filename {
            // Tells the receiver to store the payload under the name the
            // file had on our side.
            let disposition = format!("attachment; filename=\"{filename}\"");
            body.set_header(headers::CONTENT_DISPOSITION, disposition.clone());
            msg.content_disposition = Some(disposition);
        }

        msg.content_type = content_type;
        msg.body = Some(body);
        if msg.subject.is_empty() {
            msg.subject = filename;
        }
        msg.message_id = self.ids.next(
            &msg.partnership.sender_as2_id,
            &msg.partnership.receiver_as2_id,
        );

        Ok(msg)
    }

    fn route_to_error_dir(&self, path: &Path) {
        let dest = unique_path(&self.config.error_dir, &file_name(path), ".err");
        match std::fs::rename(path, &dest)
            .or_else(|_| std::fs::copy(path, &dest).and_then(|_| std::fs::remove_file(path)))
        {
            Ok(_) => tracing::info!("moved {:?} to {:?}", path, dest),
            Err(error) => {
                tracing::error!("failed to move {:?} to error directory: {}", path, error);
            }
        }
    }
}

/// Report a file's size, or `None` when it is missing, not a regular
/// file, or write-locked (probed with an exclusive append open).
fn probe_file(path: &Path) -> Option<u64> {
    let metadata = std::fs::metadata(path).ok()?;
    if !metadata.is_file() {
        return None;
    }
    std::fs::OpenOptions::new()
        .append(true)
        .open(path)
        .ok()?;
    Some(metadata.len())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".to_string())
}

/// First non-colliding path for `name` in `dir`, suffixing
/// `<tag>-NNN` as needed.
fn unique_path(dir: &Path, name: &str, tag: &str) -> PathBuf {
    let plain = dir.join(name);
    if !plain.exists() {
        return plain;
    }
    for n in 1.. {
        let candidate = dir.join(format!("{name}{tag}-{n:03}"));
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!()
}

async fn move_file(src: &Path, dest: &Path) -> std::io::Result<()> {
    match tokio::fs::rename(src, dest).await {
        Ok(()) => Ok(()),
        Err(_) => {
            // Rename fails across filesystems; fall back to copy+delete.
            tokio::fs::copy(src, dest).await?;
            tokio::fs::remove_file(src).await
        }
    }
}

async fn copy_to(src: &Path, dest: &Path) -> std::io::Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::copy(src, dest).await.map(|_| ())
}

/// Spawn a background poll loop.
///
/// Polls on the given interval until `shutdown` flips to `true`; the
/// cycle in flight finishes first, so in-flight sends complete.
pub fn spawn_poller(
    mut poller: DirectoryPoller,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(
            "poller started on {:?} (interval: {:?})",
            poller.config.outbox_dir,
            poll_interval
        );
        let mut timer = interval(poll_interval);
        loop {
            tokio::select! {
                _ = timer.tick() => {
                    poller.poll().await;
                }
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("poller stopped on {:?}", poller.config.outbox_dir);
    })
}
