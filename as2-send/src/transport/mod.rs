//! HTTP transport abstraction for the send path.
//!
//! The sender only sees [`HttpTransport`]; the concrete connection
//! mechanism (reqwest, mock for testing) is pluggable. Connection
//! configuration - timeouts, proxy, TLS policy - lives in
//! [`TransportConfig`] so one factory serves all messages.

mod mock;
mod reqwest;

pub use self::mock::MockTransport;
pub use self::reqwest::ReqwestTransport;

use async_trait::async_trait;
use thiserror::Error;

use as2_types::HeaderMap;

/// Default connect timeout: 60 seconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 60_000;
/// Default read timeout: 60 seconds.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 60_000;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The URL could not be parsed or is unsupported.
    #[error("invalid URL '{0}'")]
    InvalidUrl(String),

    /// Establishing the connection failed.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Writing the request failed mid-stream.
    #[error("send failed: {0}")]
    Send(String),

    /// Reading the response failed.
    #[error("receive failed: {0}")]
    Receive(String),

    /// Connect or read timeout elapsed.
    #[error("connection timeout")]
    Timeout,
}

/// HTTP request methods the sender uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// `POST` - the only method AS2 transmission needs.
    Post,
}

impl HttpMethod {
    /// The method token.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Post => "POST",
        }
    }
}

/// An outbound HTTP request, fully assembled.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Destination URL.
    pub url: String,
    /// Request method.
    pub method: HttpMethod,
    /// Headers to send, in order.
    pub headers: HeaderMap,
    /// Request body. Already owned by the message; the transport must
    /// hand it to the connection without further copies.
    pub body: Vec<u8>,
}

/// An HTTP response, status through body.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Reason phrase.
    pub reason: String,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// An empty 200 response.
    pub fn ok() -> Self {
        Self {
            status: 200,
            reason: "OK".to_string(),
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    /// Whether the status counts as a successful AS2 transmission.
    ///
    /// AS2 accepts most 2xx codes: 200, 201, 202, 204 and 206.
    pub fn is_accepted(&self) -> bool {
        matches!(self.status, 200 | 201 | 202 | 204 | 206)
    }
}

/// Pluggable HTTP connection mechanism.
///
/// Implementations are shared across concurrent sends and must be
/// `Send + Sync`. One `execute` call is one connection's lifetime.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Transmit the request and read the full response.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// TLS behavior for `https` destinations.
///
/// AS2 authenticates the peer at the S/MIME layer, not at TLS, so the
/// protocol-conventional default accepts any server certificate and
/// hostname. Deployments that do want TLS-level authentication opt into
/// [`TlsPolicy::VerifyPeer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsPolicy {
    /// Accept any server certificate and hostname (AS2 default).
    #[default]
    TrustAny,
    /// Standard WebPKI verification of certificate and hostname.
    VerifyPeer,
}

/// Connection configuration shared by all sends through one transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// TCP connect timeout in milliseconds (`connecttimeout`).
    pub connect_timeout_ms: u64,
    /// Socket read timeout in milliseconds (`readtimeout`).
    pub read_timeout_ms: u64,
    /// Optional proxy URL applied to all requests.
    pub proxy_url: Option<String>,
    /// TLS policy for `https` destinations.
    pub tls: TlsPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            proxy_url: None,
            tls: TlsPolicy::TrustAny,
        }
    }
}

/// Extract destination host and port from a URL, for the message's
/// destination attributes. Defaults the port from the scheme.
pub fn destination_of(url: &str) -> (Option<String>, Option<u16>) {
    let (scheme, rest) = match url.split_once("://") {
        Some(pair) => pair,
        None => return (None, None),
    };
    let authority = rest.split(['/', '?', '#']).next().unwrap_or("");
    let authority = authority.rsplit('@').next().unwrap_or(authority);
    if authority.is_empty() {
        return (None, None);
    }
    let (host, port) = match authority.rsplit_once(':') {
        Some((h, p)) => match p.parse::<u16>() {
            Ok(port) => (h, Some(port)),
            Err(_) => (authority, None),
        },
        None => (authority, None),
    };
    let port = port.or(match scheme.to_ascii_lowercase().as_str() {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    });
    (Some(host.to_string()), port)
}
