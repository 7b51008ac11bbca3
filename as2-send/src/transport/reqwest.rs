//! reqwest-backed HTTP transport.

use std::time::Duration;

use async_trait::async_trait;

use as2_types::HeaderMap;

use super::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, TlsPolicy, TransportConfig, TransportError};

/// Production transport on top of a shared [`reqwest::Client`].
///
/// With the default [`TlsPolicy::TrustAny`] the client accepts any server
/// certificate and hostname on `https` URLs - AS2 peer authentication
/// happens at the S/MIME layer. TLS 1.2 is the enforced minimum either
/// way.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport from connection configuration.
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .read_timeout(Duration::from_millis(config.read_timeout_ms))
            .min_tls_version(reqwest::tls::Version::TLS_1_2);

        if config.tls == TlsPolicy::TrustAny {
            builder = builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }
        if let Some(proxy_url) = &config.proxy_url {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| TransportError::InvalidUrl(format!("proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = match request.method {
            HttpMethod::Post => self.client.post(&request.url),
        };
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }

        let response = builder
            .body(request.body)
            .send()
            .await
            .map_err(classify_error)?;

        let status = response.status().as_u16();
        let reason = response
            .status()
            .canonical_reason()
            .unwrap_or_default()
            .to_string();
        let mut headers = HeaderMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.add(name.as_str(), value);
            }
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Receive(e.to_string()))?
            .to_vec();

        Ok(HttpResponse {
            status,
            reason,
            headers,
            body,
        })
    }
}

fn classify_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_connect() {
        TransportError::Connect(error.to_string())
    } else if error.is_builder() || error.is_request() {
        TransportError::InvalidUrl(error.to_string())
    } else {
        TransportError::Send(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_default_config() {
        assert!(ReqwestTransport::new(&TransportConfig::default()).is_ok());
    }

    #[test]
    fn builds_with_peer_verification() {
        let config = TransportConfig {
            tls: TlsPolicy::VerifyPeer,
            ..TransportConfig::default()
        };
        assert!(ReqwestTransport::new(&config).is_ok());
    }

    #[test]
    fn rejects_malformed_proxy_url() {
        let config = TransportConfig {
            proxy_url: Some("::not a proxy::".to_string()),
            ..TransportConfig::default()
        };
        assert!(matches!(
            ReqwestTransport::new(&config),
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn connect_failure_maps_to_transport_error() {
        // Reserved TEST-NET-1 address; nothing listens there.
        let config = TransportConfig {
            connect_timeout_ms: 50,
            ..TransportConfig::default()
        };
        let transport = ReqwestTransport::new(&config).unwrap();
        let request = HttpRequest {
            url: "http://192.0.2.1:9/as2".to_string(),
            method: HttpMethod::Post,
            headers: HeaderMap::new(),
            body: b"x".to_vec(),
        };
        let result = transport.execute(request).await;
        assert!(matches!(
            result,
            Err(TransportError::Timeout | TransportError::Connect(_) | TransportError::Send(_))
        ));
    }
}
