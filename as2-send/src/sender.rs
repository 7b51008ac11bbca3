//! The send orchestrator.
//!
//! `Sender` drives one message through validation, the security
//! pipeline, MIC capture, pending-record persistence, transmission and
//! synchronous MDN reconciliation, with a bounded retry loop around the
//! transmission itself.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use as2_types::{
    filesystem_safe_id, BodyPart, ContentTransferEncoding, Message, MessageStatus, Mic,
    SigningAlgorithm,
};

use crate::crypto::{calculate_mic, CertificateProvider, CryptoProvider};
use crate::dumper::Dumper;
use crate::error::SendError;
use crate::headers::HeaderBuilder;
use crate::mdn::{MdnReceiver, MdnStore, MicMatchingHandler, VerificationCertificateConsumer};
use crate::pending::PendingStore;
use crate::pipeline::SecurityPipeline;
use crate::transport::{destination_of, HttpMethod, HttpRequest, HttpTransport};

/// Sender-level options.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Extra transmission attempts after a retryable failure, unless the
    /// partnership overrides it. 0 means a single attempt.
    pub retry_count: u32,
    /// Double-quote all outbound header values (`quoteheadervalues`).
    pub quote_header_values: bool,
    /// `User-Agent` header value.
    pub user_agent: String,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            retry_count: 0,
            quote_header_values: false,
            user_agent: format!("as2-send/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Notification hook invoked exactly once per terminal error.
///
/// "Terminal" covers errors that end processing of the message, and
/// MDN-phase failures that leave the payload delivered but are still
/// surfaced to operators.
pub trait ErrorHook: Send + Sync {
    /// Report a terminal error for a message.
    fn terminate(&self, msg: &Message, error: &SendError);
}

/// Default hook: logs the error.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingErrorHook;

impl ErrorHook for LoggingErrorHook {
    fn terminate(&self, msg: &Message, error: &SendError) {
        tracing::error!("terminal error for message {}: {}", msg.message_id, error);
    }
}

/// Sends AS2 messages.
///
/// Owns the security pipeline, the transport, the MDN receiver and the
/// pending store; shared across concurrent submissions.
pub struct Sender {
    transport: Arc<dyn HttpTransport>,
    pipeline: SecurityPipeline,
    mdn_receiver: MdnReceiver,
    pending: PendingStore,
    dumper: Option<Arc<dyn Dumper>>,
    error_hook: Arc<dyn ErrorHook>,
    header_builder: HeaderBuilder,
    config: SenderConfig,
}

impl Sender {
    /// Assemble a sender from its collaborators.
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        crypto: Arc<dyn CryptoProvider>,
        certificates: Arc<dyn CertificateProvider>,
        pending: PendingStore,
        config: SenderConfig,
    ) -> Self {
        let pipeline = SecurityPipeline::new(Arc::clone(&crypto), Arc::clone(&certificates));
        let mdn_receiver = MdnReceiver::new(crypto, certificates);
        let header_builder = HeaderBuilder {
            user_agent: config.user_agent.clone(),
            quote_header_values: config.quote_header_values,
        };
        Self {
            transport,
            pipeline,
            mdn_receiver,
            pending,
            dumper: None,
            error_hook: Arc::new(LoggingErrorHook),
            header_builder,
            config,
        }
    }

    /// Tee outgoing requests through a dumper.
    pub fn with_dumper(mut self, dumper: Arc<dyn Dumper>) -> Self {
        self.dumper = Some(dumper);
        self
    }

    /// Replace the terminal-error hook.
    pub fn with_error_hook(mut self, hook: Arc<dyn ErrorHook>) -> Self {
        self.error_hook = hook;
        self
    }

    /// Replace the MIC matching handler.
    pub fn with_mic_matching_handler(mut self, handler: Arc<dyn MicMatchingHandler>) -> Self {
        self.mdn_receiver = self.mdn_receiver.with_mic_matching_handler(handler);
        self
    }

    /// Register a consumer for the certificate that verified an MDN.
    pub fn with_verification_certificate_consumer(
        mut self,
        consumer: VerificationCertificateConsumer,
    ) -> Self {
        self.mdn_receiver = self
            .mdn_receiver
            .with_verification_certificate_consumer(consumer);
        self
    }

    /// Register an MDN persistence hook.
    pub fn with_mdn_store(mut self, store: Arc<dyn MdnStore>) -> Self {
        self.mdn_receiver = self.mdn_receiver.with_mdn_store(store);
        self
    }

    /// Tee incoming MDN responses through a dumper.
    pub fn with_incoming_dumper(mut self, dumper: Arc<dyn Dumper>) -> Self {
        self.mdn_receiver = self.mdn_receiver.with_incoming_dumper(dumper);
        self
    }

    /// Send one message, retrying transmission faults up to the
    /// configured count. The terminal-error hook fires exactly once if
    /// the message ultimately fails.
    pub async fn send(&self, msg: &mut Message) -> Result<(), SendError> {
        tracing::info!("submitting message {}", msg.message_id);
        let result = self.send_inner(msg).await;
        if let Err(error) = &result {
            self.error_hook.terminate(msg, error);
        }
        result
    }

    async fn send_inner(&self, msg: &mut Message) -> Result<(), SendError> {
        check_required(msg)?;

        let attempts = msg
            .partnership
            .retry_count
            .unwrap_or(self.config.retry_count)
            .saturating_add(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_send(msg).await {
                Ok(()) => return Ok(()),
                Err(error) if error.is_retryable() && attempt < attempts => {
                    tracing::warn!(
                        "attempt {}/{} for message {} failed: {}; retrying",
                        attempt,
                        attempts,
                        msg.message_id,
                        error
                    );
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn try_send(&self, msg: &mut Message) -> Result<(), SendError> {
        let cte = ContentTransferEncoding::from_id_or(
            msg.partnership
                .content_transfer_encoding
                .as_deref()
                .unwrap_or(ContentTransferEncoding::Binary.id()),
            ContentTransferEncoding::Binary,
        );

        // Secure the body; if compress-before-sign replaces the bytes that
        // get signed, the callback captures them as the MIC input.
        let mut mic_source: Option<BodyPart> = None;
        let secured = self
            .pipeline
            .secure(msg, cte, |part| mic_source = Some(part.clone()))?;

        // The MIC must be computed after the pipeline ran, because the
        // input may be the compressed part.
        let mic = if msg.is_requesting_mdn() {
            Some(self.calculate_and_store_mic(msg, mic_source).await?)
        } else {
            None
        };

        let content_type = secured
            .content_type()
            .ok_or_else(|| SendError::Config("secured body part has no content type".into()))?
            .to_string();
        tracing::debug!("setting message content type to '{}'", content_type);
        msg.content_type = content_type;

        let (host, port) = destination_of(&msg.partnership.as2_url);
        msg.attributes.destination_ip = host;
        msg.attributes.destination_port = port;

        let request = HttpRequest {
            url: msg.partnership.as2_url.clone(),
            method: HttpMethod::Post,
            headers: self.header_builder.build(msg, Utc::now()),
            body: secured.into_content(),
        };

        if let Some(dumper) = &self.dumper {
            if let Err(error) = dumper.dump_outgoing(&msg.message_id, &request) {
                tracing::warn!(
                    "failed to dump outgoing request for {}: {}",
                    msg.message_id,
                    error
                );
            }
        }

        tracing::info!("connecting to {} [{}]", request.url, msg.message_id);
        let body_bytes = request.body.len();
        let started = Instant::now();
        let response = self.transport.execute(request).await?;
        tracing::info!(
            "transferred {} bytes in {:?} [{}]",
            body_bytes,
            started.elapsed(),
            msg.message_id
        );

        if !response.is_accepted() {
            tracing::error!(
                "error URL '{}' - HTTP {} {}",
                msg.partnership.as2_url,
                response.status,
                response.reason
            );
            return Err(SendError::HttpResponse {
                url: msg.partnership.as2_url.clone(),
                code: response.status,
                reason: response.reason,
            });
        }

        if msg.is_requesting_mdn() && !msg.is_requesting_async_mdn() {
            if let Some(mic) = &mic {
                match self.mdn_receiver.receive(msg, &response, mic).await {
                    Ok(()) => {
                        tracing::info!("message sent [{}]", msg.message_id);
                    }
                    Err(error @ SendError::Disposition { .. }) => {
                        // The counterparty rejected the message.
                        return Err(error);
                    }
                    Err(error) => {
                        // The payload was delivered; a broken MDN must not
                        // trigger a duplicate send. Surface and move on.
                        tracing::error!(
                            "message was sent but an error occurred while receiving the MDN [{}]: {}",
                            msg.message_id,
                            error
                        );
                        self.error_hook.terminate(msg, &error);
                    }
                }
            }
        }

        Ok(())
    }

    async fn calculate_and_store_mic(
        &self,
        msg: &mut Message,
        mic_source: Option<BodyPart>,
    ) -> Result<Mic, SendError> {
        let partnership = &msg.partnership;
        // Headers belong in the MIC whenever any security layer is
        // active; see the rules quoted on `calculate_mic`.
        let include_headers = partnership.signing_algorithm.is_some()
            || partnership.encryption_algorithm.is_some()
            || partnership.compression_type.is_some();
        let rfc3851 = partnership.rfc3851_mic_algorithms;

        let algorithm = match partnership.signing_algorithm.as_deref() {
            Some(id) => SigningAlgorithm::from_id(id).unwrap_or_else(|_| {
                let default = default_mic_algorithm(rfc3851);
                tracing::warn!(
                    "the partnership signing algorithm name '{}' is unknown; falling back to the default '{}'",
                    id,
                    default.id(rfc3851)
                );
                default
            }),
            None => default_mic_algorithm(rfc3851),
        };

        let input = match mic_source {
            Some(part) => part,
            None => msg.body.clone().ok_or_else(|| SendError::InvalidParameter {
                field: "body",
                message_id: msg.message_id.clone(),
            })?,
        };
        let mic = calculate_mic(&input, algorithm, include_headers, rfc3851);
        tracing::debug!("original MIC is '{}' [{}]", mic.as_as2_string(), msg.message_id);
        msg.attributes.mic = Some(mic.as_as2_string());

        if msg.is_requesting_async_mdn() {
            // Keep the original MIC and the pending location until the
            // receiver's callback arrives.
            let name = msg
                .attributes
                .pending_filename
                .clone()
                .or_else(|| msg.attributes.filename.clone())
                .unwrap_or_else(|| filesystem_safe_id(&msg.message_id));
            let folder = msg
                .partnership
                .pending_folder
                .clone()
                .unwrap_or_else(|| PathBuf::from("data/pending"));
            let pending_file = folder.join(&name);

            tracing::info!(
                "saving original MIC and pending file info for message {} into {:?}",
                msg.message_id,
                self.pending.directory()
            );
            let record_path = self
                .pending
                .put(&msg.message_id, &mic.as_as2_string(), &pending_file)
                .await?;

            msg.attributes.pending_file = Some(pending_file);
            msg.attributes.pending_info_file = Some(record_path);
            msg.attributes.status = Some(MessageStatus::Pending);
        }

        Ok(mic)
    }
}

fn default_mic_algorithm(rfc3851: bool) -> SigningAlgorithm {
    if rfc3851 {
        SigningAlgorithm::DEFAULT_RFC_3851
    } else {
        SigningAlgorithm::DEFAULT_RFC_5751
    }
}

fn check_required(msg: &Message) -> Result<(), SendError> {
    fn required(field: &'static str, value: &str, msg: &Message) -> Result<(), SendError> {
        if value.trim().is_empty() {
            Err(SendError::InvalidParameter {
                field,
                message_id: msg.message_id.clone(),
            })
        } else {
            Ok(())
        }
    }

    required("Content-Type", &msg.content_type, msg)?;
    required("partnership AS2 URL", &msg.partnership.as2_url, msg)?;
    required("receiver AS2 id", &msg.partnership.receiver_as2_id, msg)?;
    required("sender AS2 id", &msg.partnership.sender_as2_id, msg)?;
    required("Subject", &msg.subject, msg)?;
    required("sender email", &msg.partnership.sender_email, msg)?;
    if msg.body.is_none() {
        return Err(SendError::InvalidParameter {
            field: "body",
            message_id: msg.message_id.clone(),
        });
    }
    msg.partnership
        .validate()
        .map_err(|e| SendError::Config(e.to_string()))?;
    Ok(())
}
