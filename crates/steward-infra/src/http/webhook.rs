//! reqwest-backed `WebhookTransport`.
//!
//! One request per call, no retries. The client-level timeout is the
//! handler's self-enforced deadline; timeouts and connection failures are
//! reported as `Unavailable` so they surface as downstream outages.

use std::time::Duration;

use futures_util::future::BoxFuture;
use steward_core::collaborator::{
    CollaboratorError, WebhookRequest, WebhookResponse, WebhookTransport,
};

/// Longest response body kept on the action result.
const MAX_BODY_CHARS: usize = 4096;

pub struct HttpWebhookTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpWebhookTransport {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("steward/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn build(&self, request: &WebhookRequest) -> Result<reqwest::RequestBuilder, CollaboratorError> {
        let method = reqwest::Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| CollaboratorError::Rejected(format!("invalid method '{}'", request.method)))?;
        let url = reqwest::Url::parse(&request.url)
            .map_err(|e| CollaboratorError::Rejected(format!("invalid url '{}': {e}", request.url)))?;

        let mut builder = self.client.request(method, url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        Ok(builder)
    }
}

impl WebhookTransport for HttpWebhookTransport {
    fn call<'a>(
        &'a self,
        request: &'a WebhookRequest,
    ) -> BoxFuture<'a, Result<WebhookResponse, CollaboratorError>> {
        Box::pin(async move {
            let response = self.build(request)?.send().await.map_err(|e| {
                if e.is_timeout() {
                    CollaboratorError::Unavailable(format!(
                        "webhook timed out after {:?}",
                        self.timeout
                    ))
                } else if e.is_builder() {
                    CollaboratorError::Rejected(e.to_string())
                } else {
                    CollaboratorError::Unavailable(e.to_string())
                }
            })?;

            let status = response.status().as_u16();
            let body = match response.text().await {
                Ok(text) if text.is_empty() => None,
                Ok(text) => Some(text.chars().take(MAX_BODY_CHARS).collect()),
                Err(e) => {
                    tracing::debug!(error = %e, "could not read webhook response body");
                    None
                }
            };

            tracing::debug!(url = %request.url, status, "webhook call finished");
            Ok(WebhookResponse { status, body })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one connection with a canned response; returns the raw request.
    async fn serve_once(response: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/hook", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = socket.read(&mut buf).await.unwrap();
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });
        (url, handle)
    }

    fn request(url: String, method: &str) -> WebhookRequest {
        let mut headers = BTreeMap::new();
        headers.insert("X-Steward-Event".to_string(), "donation-completed".to_string());
        WebhookRequest {
            url,
            method: method.to_string(),
            headers,
            body: Some(serde_json::json!({"amount": 50})),
        }
    }

    #[tokio::test]
    async fn test_posts_json_and_returns_status() {
        let (url, server) =
            serve_once("HTTP/1.1 201 Created\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok").await;
        let transport = HttpWebhookTransport::new(Duration::from_secs(5)).unwrap();

        let response = transport.call(&request(url, "post")).await.unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.body.as_deref(), Some("ok"));

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /hook"));
        assert!(raw.to_ascii_lowercase().contains("x-steward-event: donation-completed"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/hook", listener.local_addr().unwrap());
        drop(listener);

        let transport = HttpWebhookTransport::new(Duration::from_secs(2)).unwrap();
        let err = transport.call(&request(url, "POST")).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/hook", listener.local_addr().unwrap());
        let _server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let transport = HttpWebhookTransport::new(Duration::from_millis(200)).unwrap();
        let err = transport.call(&request(url, "POST")).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Unavailable(msg) if msg.contains("timed out")));
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let transport = HttpWebhookTransport::new(Duration::from_secs(1)).unwrap();
        let err = transport
            .call(&request("not a url".to_string(), "POST"))
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Rejected(_)));
    }
}
