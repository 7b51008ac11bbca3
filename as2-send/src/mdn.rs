//! Synchronous MDN consumption.
//!
//! When the partnership asks for a synchronous receipt, the MDN rides on
//! the HTTP response of the original POST: parse it, verify its signature
//! when present, compare the echoed MIC against the one sent, and
//! validate the disposition.

use std::sync::Arc;

use async_trait::async_trait;

use as2_types::{
    headers, BodyPart, DispositionCategory, DispositionType, HeaderMap, Mdn, Message, Mic,
};

use crate::crypto::{Certificate, CertificateProvider, CryptoProvider};
use crate::dumper::Dumper;
use crate::error::SendError;
use crate::transport::HttpResponse;

/// Observer of the MIC comparison outcome.
///
/// Exactly one of the two callbacks fires per received MDN.
pub trait MicMatchingHandler: Send + Sync {
    /// The receiver echoed the MIC we sent.
    fn on_mic_match(&self, msg: &Message, returned: &str);

    /// The MICs differ, or one of them is missing or unparseable. The
    /// payload was transmitted; non-repudiation of receipt failed.
    fn on_mic_mismatch(&self, msg: &Message, original: Option<&str>, returned: Option<&str>);
}

/// Default handler: logs matches at info, mismatches at error.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMicMatchingHandler;

impl MicMatchingHandler for LoggingMicMatchingHandler {
    fn on_mic_match(&self, msg: &Message, returned: &str) {
        tracing::info!("MIC is matched, MIC: {} [{}]", returned, msg.message_id);
    }

    fn on_mic_mismatch(&self, msg: &Message, original: Option<&str>, returned: Option<&str>) {
        tracing::error!(
            "MIC is not matched, original MIC: {:?} received MIC: {:?} [{}]",
            original,
            returned,
            msg.message_id
        );
    }
}

/// Optional persistence hook for received MDNs.
///
/// Registering one is not required; without it the MDN only lives on the
/// message.
#[async_trait]
pub trait MdnStore: Send + Sync {
    /// Persist the MDN attached to the message.
    async fn store_mdn(&self, msg: &Message) -> Result<(), SendError>;
}

/// Callback receiving the certificate that actually verified an MDN
/// signature.
pub type VerificationCertificateConsumer = Arc<dyn Fn(&Certificate) + Send + Sync>;

/// Parses and validates synchronous MDN responses.
pub struct MdnReceiver {
    crypto: Arc<dyn CryptoProvider>,
    certificates: Arc<dyn CertificateProvider>,
    mic_handler: Arc<dyn MicMatchingHandler>,
    verification_certificate_consumer: Option<VerificationCertificateConsumer>,
    mdn_store: Option<Arc<dyn MdnStore>>,
    incoming_dumper: Option<Arc<dyn Dumper>>,
}

impl MdnReceiver {
    /// Create a receiver with the logging MIC handler and no extras.
    pub fn new(
        crypto: Arc<dyn CryptoProvider>,
        certificates: Arc<dyn CertificateProvider>,
    ) -> Self {
        Self {
            crypto,
            certificates,
            mic_handler: Arc::new(LoggingMicMatchingHandler),
            verification_certificate_consumer: None,
            mdn_store: None,
            incoming_dumper: None,
        }
    }

    /// Replace the MIC matching handler.
    pub fn with_mic_matching_handler(mut self, handler: Arc<dyn MicMatchingHandler>) -> Self {
        self.mic_handler = handler;
        self
    }

    /// Register a consumer for the certificate that verified the MDN.
    pub fn with_verification_certificate_consumer(
        mut self,
        consumer: VerificationCertificateConsumer,
    ) -> Self {
        self.verification_certificate_consumer = Some(consumer);
        self
    }

    /// Register an MDN persistence hook.
    pub fn with_mdn_store(mut self, store: Arc<dyn MdnStore>) -> Self {
        self.mdn_store = Some(store);
        self
    }

    /// Register a dumper for incoming MDN traffic.
    pub fn with_incoming_dumper(mut self, dumper: Arc<dyn Dumper>) -> Self {
        self.incoming_dumper = Some(dumper);
        self
    }

    /// Consume the synchronous MDN carried on `response`.
    ///
    /// On success the parsed MDN is attached to the message. An error
    /// disposition comes back as [`SendError::Disposition`]; a warning
    /// disposition is logged and treated as success.
    pub async fn receive(
        &self,
        msg: &mut Message,
        response: &HttpResponse,
        original_mic: &Mic,
    ) -> Result<(), SendError> {
        tracing::debug!("receiving synchronous MDN for message {}", msg.message_id);

        let body = bounded_body(response)?;

        if let Some(dumper) = &self.incoming_dumper {
            if let Err(e) = dumper.dump_incoming(&msg.message_id, response) {
                tracing::warn!("failed to dump incoming MDN for {}: {}", msg.message_id, e);
            }
        }

        let part = BodyPart::from_parts(response.headers.clone(), body.to_vec());

        let content = if part.is_multipart_signed() {
            // Cross-mapped aliases: the MDN's signer is the original
            // message's receiver.
            let alias = msg.partnership.receiver_x509_alias.as_deref().ok_or_else(|| {
                SendError::Mdn(
                    "signed MDN received but no receiver certificate alias is configured".into(),
                )
            })?;
            let certificate = self
                .certificates
                .certificate(alias)
                .map_err(|e| SendError::Mdn(e.to_string()))?;
            let verified = self
                .crypto
                .verify(&part, &certificate)
                .map_err(|e| SendError::MdnVerify(e.to_string()))?;
            if let Some(consumer) = &self.verification_certificate_consumer {
                consumer(&verified.certificate);
            }
            verified.content
        } else {
            part.clone()
        };

        let mut mdn = Mdn {
            headers: response.headers.clone(),
            ..Mdn::default()
        };
        extract_mdn_fields(&content, &mut mdn)?;
        mdn.body = Some(part);
        msg.mdn = Some(mdn);

        if let Some(store) = &self.mdn_store {
            store.store_mdn(msg).await?;
        }

        let disposition_raw = msg.mdn.as_ref().and_then(|m| m.disposition.clone());
        tracing::info!(
            "received MDN [{}] for message {}",
            disposition_raw.as_deref().unwrap_or("<no disposition>"),
            msg.message_id
        );

        // An absent or unparseable returned MIC counts as a mismatch: the
        // receipt does not prove what was received.
        let returned_raw = msg.mdn.as_ref().and_then(|m| m.mic.clone());
        let returned = returned_raw.as_deref().and_then(|s| Mic::parse(s).ok());
        match (&returned, &returned_raw) {
            (Some(returned), Some(raw)) if returned == original_mic => {
                self.mic_handler.on_mic_match(msg, raw);
            }
            _ => {
                self.mic_handler.on_mic_mismatch(
                    msg,
                    Some(&original_mic.as_as2_string()),
                    returned_raw.as_deref(),
                );
            }
        }

        let disposition_raw = disposition_raw
            .ok_or_else(|| SendError::Mdn("MDN carries no disposition".into()))?;
        let disposition = DispositionType::parse(&disposition_raw)?;
        match disposition.category() {
            DispositionCategory::Success => Ok(()),
            DispositionCategory::Warning => {
                tracing::warn!(
                    "MDN disposition warning for message {}: {}",
                    msg.message_id,
                    disposition_raw
                );
                Ok(())
            }
            DispositionCategory::Error => Err(SendError::Disposition {
                disposition: disposition_raw,
                text: msg.mdn.as_ref().and_then(|m| m.text.clone()),
            }),
        }
    }
}

/// Apply the Content-Length bound: exactly that many bytes must have
/// arrived, and extra bytes past the bound are not part of the MDN.
fn bounded_body(response: &HttpResponse) -> Result<&[u8], SendError> {
    match response
        .headers
        .get(headers::CONTENT_LENGTH)
        .and_then(|v| v.trim().parse::<usize>().ok())
    {
        Some(length) => {
            if response.body.len() < length {
                return Err(SendError::Mdn(format!(
                    "premature end of MDN body: Content-Length {} but only {} bytes read",
                    length,
                    response.body.len()
                )));
            }
            Ok(&response.body[..length])
        }
        None => Ok(&response.body),
    }
}

fn extract_mdn_fields(content: &BodyPart, mdn: &mut Mdn) -> Result<(), SendError> {
    let parts = if content.is_multipart_report() {
        content.parts()?
    } else {
        vec![content.clone()]
    };

    for part in &parts {
        match part.content_type_essence().as_deref() {
            Some("message/disposition-notification") => {
                let (fields, _) = HeaderMap::parse_block(part.content())?;
                mdn.disposition = fields.get("Disposition").map(str::to_string);
                mdn.mic = fields.get("Received-Content-MIC").map(str::to_string);
                mdn.original_message_id =
                    fields.get("Original-Message-ID").map(str::to_string);
            }
            Some("text/plain") | None => {
                if mdn.text.is_none() {
                    mdn.text = Some(String::from_utf8_lossy(part.content()).into_owned());
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{MemoryCertificateStore, MockCryptoProvider, PrivateKey};
    use crate::transport::HttpResponse;
    use as2_types::{ContentTransferEncoding, Partnership, SigningAlgorithm};
    use std::sync::Mutex;

    const BOUNDARY: &str = "mdnreport";

    #[derive(Default)]
    struct RecordingMicHandler {
        matches: Mutex<Vec<String>>,
        mismatches: Mutex<Vec<(Option<String>, Option<String>)>>,
    }

    impl MicMatchingHandler for RecordingMicHandler {
        fn on_mic_match(&self, _msg: &Message, returned: &str) {
            self.matches.lock().unwrap().push(returned.to_string());
        }

        fn on_mic_mismatch(
            &self,
            _msg: &Message,
            original: Option<&str>,
            returned: Option<&str>,
        ) {
            self.mismatches
                .lock()
                .unwrap()
                .push((original.map(String::from), returned.map(String::from)));
        }
    }

    fn receiver_cert() -> Certificate {
        Certificate::from_der(vec![3; 16])
    }

    fn setup(handler: Arc<RecordingMicHandler>) -> (MdnReceiver, Message, Mic) {
        let store = MemoryCertificateStore::new();
        store.add_certificate("partner", receiver_cert());
        store.add_private_key("partner", PrivateKey::from_der(vec![4; 16]));

        let receiver = MdnReceiver::new(
            Arc::new(MockCryptoProvider::new()),
            Arc::new(store),
        )
        .with_mic_matching_handler(handler);

        let partnership = Partnership {
            sender_as2_id: "A".into(),
            receiver_as2_id: "B".into(),
            mdn_to: Some("edi@a.example".into()),
            receiver_x509_alias: Some("partner".into()),
            ..Partnership::default()
        };
        let msg = Message::new("<AS2-1-0001-host@A_B>".into(), partnership);
        let original_mic = Mic::new(vec![1, 2, 3, 4], "sha-256");
        (receiver, msg, original_mic)
    }

    fn mdn_report_body(disposition: &str, mic: Option<&str>) -> Vec<u8> {
        let mut fields = format!(
            "Original-Message-ID: <AS2-1-0001-host@A_B>\r\nDisposition: {disposition}\r\n"
        );
        if let Some(mic) = mic {
            fields.push_str(&format!("Received-Content-MIC: {mic}\r\n"));
        }
        format!(
            "--{BOUNDARY}\r\n\
             Content-Type: text/plain\r\n\
             \r\n\
             The message was processed.\r\n\
             --{BOUNDARY}\r\n\
             Content-Type: message/disposition-notification\r\n\
             \r\n\
             {fields}\r\n\
             --{BOUNDARY}--\r\n"
        )
        .into_bytes()
    }

    fn mdn_response(disposition: &str, mic: Option<&str>) -> HttpResponse {
        let body = mdn_report_body(disposition, mic);
        let mut response = HttpResponse::ok();
        response.headers.set(
            headers::CONTENT_TYPE,
            format!("multipart/report; report-type=disposition-notification; boundary=\"{BOUNDARY}\""),
        );
        response
            .headers
            .set(headers::CONTENT_LENGTH, body.len().to_string());
        response.body = body;
        response
    }

    fn signed_mdn_response(disposition: &str, mic: Option<&str>) -> HttpResponse {
        let report = BodyPart::from_parts(
            {
                let mut h = HeaderMap::new();
                h.set(
                    headers::CONTENT_TYPE,
                    format!("multipart/report; report-type=disposition-notification; boundary=\"{BOUNDARY}\""),
                );
                h
            },
            mdn_report_body(disposition, mic),
        );
        let signed = MockCryptoProvider::new()
            .sign(
                &report,
                &receiver_cert(),
                &PrivateKey::from_der(vec![4; 16]),
                SigningAlgorithm::Sha256,
                false,
                false,
                ContentTransferEncoding::Binary,
            )
            .unwrap();
        let mut response = HttpResponse::ok();
        response
            .headers
            .set(headers::CONTENT_TYPE, signed.content_type().unwrap().to_string());
        response
            .headers
            .set(headers::CONTENT_LENGTH, signed.content().len().to_string());
        response.body = signed.content().to_vec();
        response
    }

    fn processed() -> String {
        "automatic-action/MDN-sent-automatically; processed".to_string()
    }

    #[tokio::test]
    async fn matching_mic_fires_on_mic_match_once() {
        let handler = Arc::new(RecordingMicHandler::default());
        let (receiver, mut msg, original) = setup(Arc::clone(&handler));
        let response = mdn_response(&processed(), Some(&original.as_as2_string()));

        receiver.receive(&mut msg, &response, &original).await.unwrap();

        assert_eq!(handler.matches.lock().unwrap().len(), 1);
        assert!(handler.mismatches.lock().unwrap().is_empty());
        let mdn = msg.mdn.as_ref().unwrap();
        assert_eq!(mdn.disposition.as_deref(), Some(processed().as_str()));
        assert_eq!(mdn.original_message_id.as_deref(), Some("<AS2-1-0001-host@A_B>"));
        assert_eq!(mdn.text.as_deref(), Some("The message was processed."));
    }

    #[tokio::test]
    async fn perturbed_mic_fires_on_mic_mismatch_once() {
        let handler = Arc::new(RecordingMicHandler::default());
        let (receiver, mut msg, original) = setup(Arc::clone(&handler));
        let perturbed = Mic::new(vec![9, 9, 9, 9], "sha-256");
        let response = mdn_response(&processed(), Some(&perturbed.as_as2_string()));

        // Still delivered: a MIC mismatch is surfaced, not an error.
        receiver.receive(&mut msg, &response, &original).await.unwrap();

        assert!(handler.matches.lock().unwrap().is_empty());
        let mismatches = handler.mismatches.lock().unwrap();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].0.as_deref(), Some("AQIDBA==, sha-256"));
        assert_eq!(mismatches[0].1.as_deref(), Some("CQkJCQ==, sha-256"));
    }

    #[tokio::test]
    async fn same_digest_different_algorithm_name_is_mismatch() {
        let handler = Arc::new(RecordingMicHandler::default());
        let (receiver, mut msg, original) = setup(Arc::clone(&handler));
        let renamed = Mic::new(original.digest().to_vec(), "sha256");
        let response = mdn_response(&processed(), Some(&renamed.as_as2_string()));

        receiver.receive(&mut msg, &response, &original).await.unwrap();

        assert_eq!(handler.mismatches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_mic_is_mismatch() {
        let handler = Arc::new(RecordingMicHandler::default());
        let (receiver, mut msg, original) = setup(Arc::clone(&handler));
        let response = mdn_response(&processed(), None);

        receiver.receive(&mut msg, &response, &original).await.unwrap();

        let mismatches = handler.mismatches.lock().unwrap();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].1, None);
    }

    #[tokio::test]
    async fn error_disposition_is_disposition_error() {
        let handler = Arc::new(RecordingMicHandler::default());
        let (receiver, mut msg, original) = setup(Arc::clone(&handler));
        let disposition =
            "automatic-action/MDN-sent-automatically; failed/failure: decryption-failed";
        let response = mdn_response(disposition, Some(&original.as_as2_string()));

        let result = receiver.receive(&mut msg, &response, &original).await;
        match result {
            Err(SendError::Disposition { disposition: d, .. }) => {
                assert_eq!(d, disposition);
            }
            other => panic!("expected disposition error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn warning_disposition_is_success() {
        let handler = Arc::new(RecordingMicHandler::default());
        let (receiver, mut msg, original) = setup(Arc::clone(&handler));
        let disposition =
            "automatic-action/MDN-sent-automatically; processed/warning: duplicate-document";
        let response = mdn_response(disposition, Some(&original.as_as2_string()));

        receiver.receive(&mut msg, &response, &original).await.unwrap();
        assert_eq!(handler.matches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn signed_mdn_verifies_and_reports_certificate() {
        let handler = Arc::new(RecordingMicHandler::default());
        let (receiver, mut msg, original) = setup(Arc::clone(&handler));
        let seen = Arc::new(Mutex::new(Vec::<Certificate>::new()));
        let seen_in_consumer = Arc::clone(&seen);
        let receiver = receiver.with_verification_certificate_consumer(Arc::new(move |cert| {
            seen_in_consumer.lock().unwrap().push(cert.clone());
        }));

        let response = signed_mdn_response(&processed(), Some(&original.as_as2_string()));
        receiver.receive(&mut msg, &response, &original).await.unwrap();

        assert_eq!(handler.matches.lock().unwrap().len(), 1);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], receiver_cert());
    }

    #[tokio::test]
    async fn tampered_signed_mdn_is_verify_error() {
        let handler = Arc::new(RecordingMicHandler::default());
        let (receiver, mut msg, original) = setup(Arc::clone(&handler));
        let mut response = signed_mdn_response(&processed(), Some(&original.as_as2_string()));
        let tampered = String::from_utf8_lossy(&response.body)
            .replace("processed", "prodessed")
            .into_bytes();
        response
            .headers
            .set(headers::CONTENT_LENGTH, tampered.len().to_string());
        response.body = tampered;

        let result = receiver.receive(&mut msg, &response, &original).await;
        assert!(matches!(result, Err(SendError::MdnVerify(_))));
        assert!(handler.matches.lock().unwrap().is_empty());
        assert!(handler.mismatches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn truncated_body_is_premature_eof() {
        let handler = Arc::new(RecordingMicHandler::default());
        let (receiver, mut msg, original) = setup(Arc::clone(&handler));
        let mut response = mdn_response(&processed(), Some(&original.as_as2_string()));
        let full_length = response.body.len();
        response.body.truncate(full_length / 2);
        // Content-Length still names the full length.

        let result = receiver.receive(&mut msg, &response, &original).await;
        assert!(matches!(result, Err(SendError::Mdn(_))));
    }

    #[tokio::test]
    async fn mdn_store_receives_the_message() {
        #[derive(Default)]
        struct CountingStore(Mutex<usize>);

        #[async_trait]
        impl MdnStore for CountingStore {
            async fn store_mdn(&self, msg: &Message) -> Result<(), SendError> {
                assert!(msg.mdn.is_some());
                *self.0.lock().unwrap() += 1;
                Ok(())
            }
        }

        let handler = Arc::new(RecordingMicHandler::default());
        let (receiver, mut msg, original) = setup(Arc::clone(&handler));
        let store = Arc::new(CountingStore::default());
        let receiver = receiver.with_mdn_store(Arc::clone(&store) as Arc<dyn MdnStore>);

        let response = mdn_response(&processed(), Some(&original.as_as2_string()));
        receiver.receive(&mut msg, &response, &original).await.unwrap();

        assert_eq!(*store.0.lock().unwrap(), 1);
    }
}
