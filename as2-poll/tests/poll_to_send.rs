//! End-to-end poller scenarios: drop a file into the outbox, poll, and
//! assert on the wire traffic and the file routing.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use as2_poll::{DirectoryPoller, PollerConfig, SentMovePolicy, StaticPartnershipResolver};
use as2_send::crypto::{
    calculate_mic, Certificate, CryptoProvider, MemoryCertificateStore, MockCryptoProvider,
    PrivateKey,
};
use as2_send::mdn::MicMatchingHandler;
use as2_send::transport::{HttpResponse, MockTransport, TransportError};
use as2_send::{ErrorHook, PendingStore, SendError, Sender, SenderConfig};
use as2_types::{
    headers, BodyPart, CompressionType, ContentTransferEncoding, Message, MessageIdGenerator, Mic,
    Partnership, SigningAlgorithm,
};

const MDN_BOUNDARY: &str = "mdnreport";

#[derive(Default)]
struct RecordingMicHandler {
    matches: Mutex<Vec<String>>,
    mismatches: Mutex<Vec<Option<String>>>,
}

impl MicMatchingHandler for RecordingMicHandler {
    fn on_mic_match(&self, _msg: &Message, returned: &str) {
        self.matches.lock().unwrap().push(returned.to_string());
    }

    fn on_mic_mismatch(&self, _msg: &Message, _original: Option<&str>, returned: Option<&str>) {
        self.mismatches
            .lock()
            .unwrap()
            .push(returned.map(String::from));
    }
}

#[derive(Default)]
struct CountingHook(AtomicUsize);

impl ErrorHook for CountingHook {
    fn terminate(&self, _msg: &Message, _error: &SendError) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    outbox: PathBuf,
    error_dir: PathBuf,
    sent_dir: PathBuf,
    pending_info: PathBuf,
    pending_data: PathBuf,
    transport: MockTransport,
    mic_handler: Arc<RecordingMicHandler>,
    hook: Arc<CountingHook>,
    poller: DirectoryPoller,
}

fn fixture(mut partnership: Partnership) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let outbox = dir.path().join("outbox");
    let error_dir = dir.path().join("error");
    let sent_dir = dir.path().join("sent");
    let pending_info = dir.path().join("pendinginfo");
    let pending_data = dir.path().join("pending");

    partnership.pending_folder = Some(pending_data.clone());

    let certificates = MemoryCertificateStore::new();
    certificates.add_certificate("mykey", Certificate::from_der(vec![1; 16]));
    certificates.add_private_key("mykey", PrivateKey::from_der(vec![2; 16]));
    certificates.add_certificate("partner", Certificate::from_der(vec![3; 16]));

    let transport = MockTransport::new();
    let mic_handler = Arc::new(RecordingMicHandler::default());
    let hook = Arc::new(CountingHook::default());

    let sender = Sender::new(
        Arc::new(transport.clone()),
        Arc::new(MockCryptoProvider::new()),
        Arc::new(certificates),
        PendingStore::new(&pending_info),
        SenderConfig::default(),
    )
    .with_mic_matching_handler(Arc::clone(&mic_handler) as Arc<dyn MicMatchingHandler>)
    .with_error_hook(Arc::clone(&hook) as Arc<dyn ErrorHook>);

    let config = PollerConfig {
        outbox_dir: outbox.clone(),
        error_dir: error_dir.clone(),
        sent_dir: Some(sent_dir.clone()),
        format: None,
        delimiters: ".-".to_string(),
        defaults: Some("subject=EDI exchange".to_string()),
        mime_type: None,
        send_filename: false,
        sent_move_policy: SentMovePolicy::LeaveInOutbox,
    };
    let poller = DirectoryPoller::new(
        config,
        Arc::new(sender),
        Arc::new(StaticPartnershipResolver::new(partnership)),
        Arc::new(MessageIdGenerator::with_host("testhost")),
    )
    .unwrap();

    Fixture {
        _dir: dir,
        outbox,
        error_dir,
        sent_dir,
        pending_info,
        pending_data,
        transport,
        mic_handler,
        hook,
        poller,
    }
}

fn base_partnership() -> Partnership {
    Partnership {
        sender_as2_id: "MyCompany".into(),
        receiver_as2_id: "PartnerCo".into(),
        sender_email: "edi@mycompany.example".into(),
        as2_url: "http://partner.example/as2".into(),
        ..Partnership::default()
    }
}

fn signed_sync_partnership() -> Partnership {
    let mut p = base_partnership();
    p.signing_algorithm = Some("sha-256".into());
    p.sender_x509_alias = Some("mykey".into());
    p.receiver_x509_alias = Some("partner".into());
    p.mdn_to = Some("edi@mycompany.example".into());
    p
}

/// The MIC this stack computes for a signed message over `data` as
/// polled from disk: octet-stream body with the binary CTE header.
fn expected_mic(data: &[u8]) -> Mic {
    let mut part = BodyPart::new(data.to_vec(), "application/octet-stream");
    part.set_header(headers::CONTENT_TRANSFER_ENCODING, "binary");
    calculate_mic(&part, SigningAlgorithm::Sha256, true, false)
}

fn mdn_response(disposition: &str, mic: &str) -> HttpResponse {
    let body = format!(
        "--{MDN_BOUNDARY}\r\n\
         Content-Type: text/plain\r\n\
         \r\n\
         ok\r\n\
         --{MDN_BOUNDARY}\r\n\
         Content-Type: message/disposition-notification\r\n\
         \r\n\
         Disposition: {disposition}\r\n\
         Received-Content-MIC: {mic}\r\n\
         \r\n\
         --{MDN_BOUNDARY}--\r\n"
    )
    .into_bytes();
    let mut response = HttpResponse::ok();
    response.headers.set(
        headers::CONTENT_TYPE,
        format!(
            "multipart/report; report-type=disposition-notification; boundary=\"{MDN_BOUNDARY}\""
        ),
    );
    response
        .headers
        .set(headers::CONTENT_LENGTH, body.len().to_string());
    response.body = body;
    response
}

fn dir_entries(dir: &std::path::Path) -> Vec<String> {
    if !dir.exists() {
        return Vec::new();
    }
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn plaintext_file_is_posted_and_moved_to_sent() {
    let mut fx = fixture(base_partnership());
    std::fs::write(fx.outbox.join("invoice.edi"), b"hello world").unwrap();

    let processed = fx.poller.poll().await;
    assert_eq!(processed, 1);

    let requests = fx.transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].body, b"hello world");
    assert_eq!(requests[0].url, "http://partner.example/as2");
    assert_eq!(
        requests[0].headers.get(headers::CONTENT_TYPE),
        Some("application/octet-stream")
    );
    assert_eq!(requests[0].headers.get(headers::SUBJECT), Some("EDI exchange"));

    assert_eq!(dir_entries(&fx.outbox), Vec::<String>::new());
    assert_eq!(dir_entries(&fx.sent_dir), vec!["invoice.edi"]);
    assert_eq!(dir_entries(&fx.error_dir), Vec::<String>::new());
    assert_eq!(
        std::fs::read(fx.sent_dir.join("invoice.edi")).unwrap(),
        b"hello world"
    );
}

#[tokio::test]
async fn signed_file_with_matching_sync_mdn() {
    let payload = vec![0x42u8; 1024];
    let mic = expected_mic(&payload);

    let mut fx = fixture(signed_sync_partnership());
    fx.transport.queue_response(mdn_response(
        "automatic-action/MDN-sent-automatically; processed",
        &mic.as_as2_string(),
    ));
    std::fs::write(fx.outbox.join("invoice.edi"), &payload).unwrap();

    fx.poller.poll().await;

    let requests = fx.transport.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0]
        .headers
        .get(headers::CONTENT_TYPE)
        .unwrap()
        .starts_with("multipart/signed"));

    assert_eq!(fx.mic_handler.matches.lock().unwrap().len(), 1);
    assert!(fx.mic_handler.mismatches.lock().unwrap().is_empty());
    assert_eq!(dir_entries(&fx.sent_dir), vec!["invoice.edi"]);
    assert_eq!(fx.hook.0.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn perturbed_mdn_mic_is_mismatch_but_still_delivered() {
    let payload = b"signed payload".to_vec();
    let mut perturbed = expected_mic(&payload).digest().to_vec();
    perturbed[0] ^= 0xFF;
    let perturbed = Mic::new(perturbed, "sha-256");

    let mut fx = fixture(signed_sync_partnership());
    fx.transport.queue_response(mdn_response(
        "automatic-action/MDN-sent-automatically; processed",
        &perturbed.as_as2_string(),
    ));
    std::fs::write(fx.outbox.join("invoice.edi"), &payload).unwrap();

    fx.poller.poll().await;

    assert_eq!(fx.mic_handler.mismatches.lock().unwrap().len(), 1);
    assert!(fx.mic_handler.matches.lock().unwrap().is_empty());
    // Delivered: exactly one attempt, file goes to sent, no error routing.
    assert_eq!(fx.transport.request_count(), 1);
    assert_eq!(dir_entries(&fx.sent_dir), vec!["invoice.edi"]);
    assert_eq!(dir_entries(&fx.error_dir), Vec::<String>::new());
}

#[tokio::test]
async fn full_pipeline_with_async_mdn_parks_pending_copy() {
    let mut partnership = signed_sync_partnership();
    partnership.encryption_algorithm = Some("aes256-cbc".into());
    partnership.compression_type = Some("zlib".into());
    partnership.compress_before_sign = true;
    partnership.receipt_delivery_option = Some("http://mycompany.example/mdn".into());

    let payload = b"compress, sign, encrypt".to_vec();
    let mut fx = fixture(partnership);
    // Async mode: the 200 carries no MDN body.
    std::fs::write(fx.outbox.join("invoice.edi"), &payload).unwrap();

    fx.poller.poll().await;

    let requests = fx.transport.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0]
        .headers
        .get(headers::CONTENT_TYPE)
        .unwrap()
        .starts_with("application/pkcs7-mime"));
    assert_eq!(
        requests[0].headers.get(headers::RECEIPT_DELIVERY_OPTION),
        Some("http://mycompany.example/mdn")
    );

    // The MIC covers the compressed part: rebuild it the way the
    // pipeline did and compare against the pending record.
    let mut source = BodyPart::new(payload.clone(), "application/octet-stream");
    source.set_header(headers::CONTENT_TRANSFER_ENCODING, "binary");
    let compressed = MockCryptoProvider::new()
        .compress(&source, CompressionType::Zlib, ContentTransferEncoding::Binary)
        .unwrap();
    let mic = calculate_mic(&compressed, SigningAlgorithm::Sha256, true, false);

    let message_id = requests[0]
        .headers
        .get(headers::MESSAGE_ID)
        .unwrap()
        .to_string();
    let record = PendingStore::new(&fx.pending_info)
        .get(&message_id)
        .await
        .unwrap();
    assert_eq!(record.mic, mic.as_as2_string());
    assert_eq!(record.pending_file, fx.pending_data.join("invoice.edi"));

    // Copy parked for reconciliation, original moved to sent.
    assert_eq!(dir_entries(&fx.pending_data), vec!["invoice.edi"]);
    assert_eq!(
        std::fs::read(fx.pending_data.join("invoice.edi")).unwrap(),
        payload
    );
    assert_eq!(dir_entries(&fx.sent_dir), vec!["invoice.edi"]);
}

#[tokio::test]
async fn transient_network_errors_are_retried_then_succeed() {
    let mut partnership = base_partnership();
    partnership.retry_count = Some(2);

    let mut fx = fixture(partnership);
    fx.transport
        .queue_failure(TransportError::Connect("connection reset".into()));
    fx.transport
        .queue_failure(TransportError::Connect("connection reset".into()));
    // Third attempt hits the default 200.
    std::fs::write(fx.outbox.join("invoice.edi"), b"retry me").unwrap();

    fx.poller.poll().await;

    assert_eq!(fx.transport.request_count(), 3);
    assert_eq!(dir_entries(&fx.sent_dir), vec!["invoice.edi"]);
    assert_eq!(dir_entries(&fx.outbox), Vec::<String>::new());
    assert_eq!(fx.hook.0.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn disposition_error_routes_file_to_error_dir() {
    let payload = b"rejected payload".to_vec();
    let mic = expected_mic(&payload);

    let mut partnership = signed_sync_partnership();
    partnership.retry_count = Some(3);
    let mut fx = fixture(partnership);
    fx.transport.queue_response(mdn_response(
        "automatic-action/MDN-sent-automatically; failed/failure: decryption-failed",
        &mic.as_as2_string(),
    ));
    std::fs::write(fx.outbox.join("invoice.edi"), &payload).unwrap();

    fx.poller.poll().await;

    // Rejected by the counterparty: no retry, terminate hook once,
    // file in the error directory.
    assert_eq!(fx.transport.request_count(), 1);
    assert_eq!(fx.hook.0.load(Ordering::SeqCst), 1);
    assert_eq!(dir_entries(&fx.error_dir), vec!["invoice.edi"]);
    assert_eq!(dir_entries(&fx.sent_dir), Vec::<String>::new());
    assert_eq!(dir_entries(&fx.outbox), Vec::<String>::new());
}

#[tokio::test]
async fn exhausted_retries_route_to_error_dir_with_suffix_on_collision() {
    let mut partnership = base_partnership();
    partnership.retry_count = Some(0);
    let mut fx = fixture(partnership);

    // Pre-existing casualty with the same name.
    std::fs::write(fx.error_dir.join("invoice.edi"), b"earlier failure").unwrap();

    let mut failure = HttpResponse::ok();
    failure.status = 500;
    failure.reason = "Internal Server Error".into();
    fx.transport.queue_response(failure);
    std::fs::write(fx.outbox.join("invoice.edi"), b"second failure").unwrap();

    fx.poller.poll().await;

    assert_eq!(
        dir_entries(&fx.error_dir),
        vec!["invoice.edi", "invoice.edi.err-001"]
    );
    assert_eq!(
        std::fs::read(fx.error_dir.join("invoice.edi.err-001")).unwrap(),
        b"second failure"
    );
    assert_eq!(fx.hook.0.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn locked_files_are_skipped() {
    // A directory is not a regular file; the probe must skip it without
    // tracking. (An exclusive-open probe also skips files another
    // process holds write-locked, which cannot be simulated portably.)
    let mut fx = fixture(base_partnership());
    std::fs::create_dir(fx.outbox.join("not-a-file")).unwrap();

    let processed = fx.poller.poll().await;
    assert_eq!(processed, 0);
    assert_eq!(fx.transport.request_count(), 0);
}

#[tokio::test]
async fn filename_format_extracts_partnership_attributes() {
    let dir = tempfile::tempdir().unwrap();
    let outbox = dir.path().join("outbox");
    let transport = MockTransport::new();

    let certificates = MemoryCertificateStore::new();
    let sender = Sender::new(
        Arc::new(transport.clone()),
        Arc::new(MockCryptoProvider::new()),
        Arc::new(certificates),
        PendingStore::new(dir.path().join("pendinginfo")),
        SenderConfig::default(),
    );

    let config = PollerConfig {
        outbox_dir: outbox.clone(),
        error_dir: dir.path().join("error"),
        sent_dir: None,
        format: Some("sender.as2_id, receiver.as2_id, attributes.fileid".to_string()),
        delimiters: "-.".to_string(),
        defaults: Some("subject=From format test".to_string()),
        mime_type: Some("application/edi-x12".to_string()),
        send_filename: true,
        sent_move_policy: SentMovePolicy::LeaveInOutbox,
    };
    let poller_partnership = base_partnership();
    let mut poller = DirectoryPoller::new(
        config,
        Arc::new(sender),
        Arc::new(StaticPartnershipResolver::new(poller_partnership)),
        Arc::new(MessageIdGenerator::with_host("testhost")),
    )
    .unwrap();

    std::fs::write(outbox.join("MyCompany-PartnerCo-12345.x12"), b"EDI data").unwrap();
    poller.poll().await;

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].headers.get(headers::CONTENT_TYPE),
        Some("application/edi-x12")
    );
    assert_eq!(
        requests[0].headers.get(headers::CONTENT_DISPOSITION),
        Some("attachment; filename=\"MyCompany-PartnerCo-12345.x12\"")
    );
    // Sent dir absent: the file is deleted after the send.
    assert_eq!(dir_entries(&outbox), Vec::<String>::new());
}

#[tokio::test]
async fn poll_loop_runs_until_shutdown() {
    let fx = fixture(base_partnership());
    let outbox = fx.outbox.clone();
    let sent_dir = fx.sent_dir.clone();
    let transport = fx.transport.clone();

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = as2_poll::spawn_poller(
        fx.poller,
        std::time::Duration::from_millis(20),
        shutdown_rx,
    );

    std::fs::write(outbox.join("invoice.edi"), b"looped").unwrap();

    // Give the loop a few cycles to pick the file up.
    for _ in 0..50 {
        if transport.request_count() > 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(transport.request_count(), 1);
    assert_eq!(dir_entries(&sent_dir), vec!["invoice.edi"]);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(2), handle)
        .await
        .expect("poller should stop after shutdown")
        .unwrap();
}
