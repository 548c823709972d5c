//! HTTP transport for webhook delivery with HMAC envelope signing.
//!
//! A single POST per delivery, bounded timeout, identifying `User-Agent`,
//! and an optional `X-Quill-Signature` header when the subscription carries
//! a shared secret. The transport is a trait so delivery logic tests can
//! script responses without a network.

use std::time::Duration;

use hmac::{Hmac, Mac};
use quill_core::DeliveryId;
use quill_queue::BoxFuture;
use sha2::Sha256;
use tracing::debug;

use crate::error::DeliveryError;

type HmacSha256 = Hmac<Sha256>;

/// Largest response body fragment persisted on the audit row.
pub const RESPONSE_BODY_LIMIT: usize = 4 * 1024;

/// Configuration for the webhook client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Request timeout.
    pub timeout: Duration,

    /// `User-Agent` header identifying this system and version.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: format!("Quill-Webhooks/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// One outbound delivery request.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    /// Delivery attempt id, surfaced to the receiver in headers.
    pub delivery_id: DeliveryId,

    /// Destination URL.
    pub url: String,

    /// Dotted event name, surfaced in the `X-Quill-Event` header.
    pub event_name: String,

    /// JSON envelope to send.
    pub body: serde_json::Value,

    /// Signature header value, when the subscription has a secret.
    pub signature: Option<String>,
}

/// Response summary recorded on the audit row.
#[derive(Debug, Clone)]
pub struct WebhookResponse {
    /// HTTP status code.
    pub status_code: u16,

    /// Response body, truncated to [`RESPONSE_BODY_LIMIT`].
    pub body: String,
}

impl WebhookResponse {
    /// Whether the receiver acknowledged the delivery.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Transport performing the outbound POST.
pub trait HttpTransport: Send + Sync + 'static {
    /// Sends one webhook request.
    fn post(
        &self,
        request: WebhookRequest,
    ) -> BoxFuture<'_, Result<WebhookResponse, DeliveryError>>;
}

/// Production transport over a pooled reqwest client.
pub struct WebhookClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl WebhookClient {
    /// Creates a client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the HTTP client cannot be
    /// built.
    pub fn new(config: ClientConfig) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| DeliveryError::configuration(format!("failed to build client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Creates a client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the HTTP client cannot be
    /// built.
    pub fn with_defaults() -> Result<Self, DeliveryError> {
        Self::new(ClientConfig::default())
    }
}

impl HttpTransport for WebhookClient {
    fn post(
        &self,
        request: WebhookRequest,
    ) -> BoxFuture<'_, Result<WebhookResponse, DeliveryError>> {
        Box::pin(async move {
            debug!(
                delivery_id = %request.delivery_id,
                url = %request.url,
                event = %request.event_name,
                "sending webhook"
            );

            let mut http_request = self
                .client
                .post(&request.url)
                .json(&request.body)
                .header("X-Quill-Delivery-Id", request.delivery_id.to_string())
                .header("X-Quill-Event", &request.event_name);

            if let Some(signature) = &request.signature {
                http_request = http_request.header("X-Quill-Signature", signature);
            }

            let response = http_request.send().await.map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::timeout(self.config.timeout.as_secs())
                } else if e.is_builder() || e.is_request() {
                    DeliveryError::configuration(e.to_string())
                } else {
                    DeliveryError::network(e.to_string())
                }
            })?;

            let status_code = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            let body = truncate_body(&body);

            Ok(WebhookResponse { status_code, body })
        })
    }
}

/// Computes the `X-Quill-Signature` header value.
///
/// Format: `t=<unix seconds>,s=<hex hmac>`, where the MAC covers
/// `"<timestamp>.<body>"`. Binding the timestamp into the MAC lets
/// receivers reject replayed deliveries.
pub fn sign_payload(secret: &str, timestamp: i64, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);

    let digest = mac.finalize().into_bytes();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();

    format!("t={timestamp},s={hex}")
}

/// Truncates a response body to the audit limit on a char boundary.
pub fn truncate_body(body: &str) -> String {
    if body.len() <= RESPONSE_BODY_LIMIT {
        return body.to_string();
    }
    let mut end = RESPONSE_BODY_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_and_secret_dependent() {
        let body = br#"{"event":{"name":"documents.publish"}}"#;

        let a = sign_payload("secret-one", 1_700_000_000, body);
        let b = sign_payload("secret-one", 1_700_000_000, body);
        let c = sign_payload("secret-two", 1_700_000_000, body);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("t=1700000000,s="));
    }

    #[test]
    fn signature_binds_timestamp() {
        let body = b"{}";
        assert_ne!(sign_payload("s", 1, body), sign_payload("s", 2, body));
    }

    #[test]
    fn response_success_is_2xx_only() {
        assert!(WebhookResponse { status_code: 200, body: String::new() }.is_success());
        assert!(WebhookResponse { status_code: 204, body: String::new() }.is_success());
        assert!(!WebhookResponse { status_code: 301, body: String::new() }.is_success());
        assert!(!WebhookResponse { status_code: 500, body: String::new() }.is_success());
    }

    #[test]
    fn oversized_bodies_truncated() {
        let body = "x".repeat(RESPONSE_BODY_LIMIT * 2);
        assert_eq!(truncate_body(&body).len(), RESPONSE_BODY_LIMIT);
        assert_eq!(truncate_body("ok"), "ok");
    }
}
