// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the downstream conversation service.
//!
//! Batches are POSTed to `{base}/batches`; a `{"reply": "..."}` body (or
//! `204 No Content`) tells the orchestrator what to send back. Conversation
//! context is cleared with `DELETE {base}/contexts/{tenant}/{sender}`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use zapline_config::model::HandlerConfig;
use zapline_core::{InboundBatch, InboundHandler, MessageId, TenantId, ZaplineError};

/// Wire shape of a flushed batch.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchPayload<'a> {
    tenant_id: &'a TenantId,
    sender: &'a str,
    text: &'a str,
    fragments: &'a [String],
    message_ids: &'a [MessageId],
    first_received_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
struct ReplyBody {
    #[serde(default)]
    reply: Option<String>,
}

/// Forwards batches to an HTTP endpoint and relays its reply.
///
/// Transient failures (429, 5xx, connection errors) are retried once.
#[derive(Debug, Clone)]
pub struct WebhookHandler {
    client: reqwest::Client,
    base_url: Url,
    max_retries: u32,
    retry_delay: Duration,
}

impl WebhookHandler {
    pub fn new(
        base_url: &str,
        bearer_token: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, ZaplineError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ZaplineError::Config(format!("invalid handler URL {base_url:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ZaplineError::Config(format!(
                "handler URL {base_url} cannot carry a path"
            )));
        }

        let mut headers = HeaderMap::new();
        if let Some(token) = bearer_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
                ZaplineError::Config(format!("invalid handler bearer token: {e}"))
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ZaplineError::Handler {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url,
            max_retries: 1,
            retry_delay: Duration::from_secs(1),
        })
    }

    pub fn from_config(config: &HandlerConfig, url: &str) -> Result<Self, ZaplineError> {
        Self::new(url, config.bearer_token.as_deref(), config.timeout())
    }

    /// Shortens the retry delay (tests).
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ZaplineError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ZaplineError::Config(format!("handler URL {} has no path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Sends a request, retrying transient failures. Returns the final
    /// successful response.
    async fn execute(
        &self,
        what: &str,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ZaplineError> {
        let mut attempt = 0;
        loop {
            let outcome = build().send().await;
            let error = match outcome {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    if !is_transient_status(status) || attempt >= self.max_retries {
                        return Err(ZaplineError::Handler {
                            message: format!("{what} returned {status}: {body}"),
                            source: None,
                        });
                    }
                    format!("{status}: {body}")
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(ZaplineError::Handler {
                            message: format!("{what} request failed: {e}"),
                            source: Some(Box::new(e)),
                        });
                    }
                    e.to_string()
                }
            };
            attempt += 1;
            warn!(attempt, error = %error, "{what} failed transiently, will retry");
            tokio::time::sleep(self.retry_delay).await;
        }
    }
}

#[async_trait]
impl InboundHandler for WebhookHandler {
    async fn handle_inbound_batch(
        &self,
        batch: &InboundBatch,
    ) -> Result<Option<String>, ZaplineError> {
        let url = self.endpoint(&["batches"])?;
        let payload = BatchPayload {
            tenant_id: &batch.tenant_id,
            sender: &batch.sender,
            text: &batch.text,
            fragments: &batch.fragments,
            message_ids: &batch.message_ids,
            first_received_at: batch.first_received_at,
        };

        let response = self
            .execute("batch delivery", || self.client.post(url.clone()).json(&payload))
            .await?;
        let status = response.status();
        debug!(
            tenant_id = %batch.tenant_id,
            status = %status,
            fragments = batch.fragments.len(),
            "batch delivered to handler"
        );
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let body = response.text().await.map_err(|e| ZaplineError::Handler {
            message: format!("failed to read handler response: {e}"),
            source: Some(Box::new(e)),
        })?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        let reply: ReplyBody = serde_json::from_str(&body).map_err(|e| ZaplineError::Handler {
            message: format!("failed to parse handler response: {e}"),
            source: Some(Box::new(e)),
        })?;
        Ok(reply.reply.filter(|text| !text.trim().is_empty()))
    }

    async fn clear_context(&self, tenant_id: &TenantId, sender: &str) -> Result<(), ZaplineError> {
        let url = self.endpoint(&["contexts", tenant_id.as_str(), sender])?;
        self.execute("context reset", || self.client.delete(url.clone()))
            .await?;
        debug!(tenant_id = %tenant_id, "handler context cleared");
        Ok(())
    }
}

/// Returns true for HTTP status codes worth retrying.
fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn batch() -> InboundBatch {
        InboundBatch {
            tenant_id: TenantId::from("acme"),
            sender: "5511988887777@s.whatsapp.net".into(),
            text: "oi quero um apartamento".into(),
            fragments: vec!["oi".into(), "quero".into(), "um apartamento".into()],
            message_ids: vec![MessageId::from("m1"), MessageId::from("m2"), MessageId::from("m3")],
            first_received_at: Utc::now(),
        }
    }

    fn handler(server: &MockServer) -> WebhookHandler {
        WebhookHandler::new(&server.uri(), Some("s3cret"), Duration::from_secs(5))
            .unwrap()
            .with_retry_delay(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn batch_reply_is_returned() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/batches"))
            .and(header("authorization", "Bearer s3cret"))
            .and(body_partial_json(serde_json::json!({
                "tenantId": "acme",
                "text": "oi quero um apartamento",
                "messageIds": ["m1", "m2", "m3"]
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"reply": "Temos 3 opções na Vila Mariana"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let reply = handler(&server).handle_inbound_batch(&batch()).await.unwrap();
        assert_eq!(reply.as_deref(), Some("Temos 3 opções na Vila Mariana"));
    }

    #[tokio::test]
    async fn no_content_means_no_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/batches"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let reply = handler(&server).handle_inbound_batch(&batch()).await.unwrap();
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn blank_reply_is_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/batches"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"reply": "  "})))
            .mount(&server)
            .await;

        assert!(handler(&server).handle_inbound_batch(&batch()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn transient_status_is_retried_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/batches"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/batches"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"reply": "ok"})))
            .mount(&server)
            .await;

        let reply = handler(&server).handle_inbound_batch(&batch()).await.unwrap();
        assert_eq!(reply.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/batches"))
            .respond_with(ResponseTemplate::new(422).set_body_string("unknown tenant"))
            .expect(1)
            .mount(&server)
            .await;

        let err = handler(&server).handle_inbound_batch(&batch()).await.unwrap_err();
        assert!(matches!(err, ZaplineError::Handler { .. }));
        assert!(err.to_string().contains("422"));
    }

    #[tokio::test]
    async fn context_reset_targets_the_sender() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/hooks/contexts/acme/5511988887777@s.whatsapp.net"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let handler = WebhookHandler::new(
            &format!("{}/hooks/", server.uri()),
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        handler
            .clear_context(&TenantId::from("acme"), "5511988887777@s.whatsapp.net")
            .await
            .unwrap();
    }

    #[test]
    fn invalid_url_is_a_config_error() {
        let err = WebhookHandler::new("not a url", None, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ZaplineError::Config(_)));
    }
}
