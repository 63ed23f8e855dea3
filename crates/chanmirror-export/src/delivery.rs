//! Webhook delivery with bounded retry.
//!
//! Each payload gets at most [`RetryPolicy::max_attempts`] requests:
//!
//! | Response         | Action                                             |
//! |------------------|----------------------------------------------------|
//! | 2xx              | sleep `request_delay`, done                        |
//! | 429              | sleep the server's `retry_after`, retry            |
//! | 503              | sleep `backoff_unit * attempt`, retry              |
//! | other status     | fail with [`ExportError::FatalDelivery`]           |
//! | network failure  | sleep `backoff_unit * attempt`, retry              |
//!
//! Running out of attempts is fatal as well.

use std::time::Duration;

use chanmirror_core::config::ExportConfig;
use chanmirror_core::Author;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{ExportError, Result};

/// Display identity a payload is posted under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub username: String,
    pub avatar_url: Option<String>,
    /// Send `allowed_mentions: {parse: []}` so replayed pings stay silent.
    pub suppress_mentions: bool,
}

impl From<&Author> for Persona {
    fn from(author: &Author) -> Self {
        Self {
            username: author.display_name.clone(),
            avatar_url: author.avatar_url.clone(),
            suppress_mentions: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadBody {
    /// Text message. `footer` is appended on its own line.
    Text {
        content: String,
        footer: Option<String>,
    },
    /// One file upload, with optional accompanying text.
    File {
        bytes: Vec<u8>,
        filename: String,
        content: String,
    },
}

impl PayloadBody {
    pub fn text(content: impl Into<String>) -> Self {
        PayloadBody::Text {
            content: content.into(),
            footer: None,
        }
    }

    /// The `content` field as it goes over the wire.
    pub fn rendered_content(&self) -> String {
        match self {
            PayloadBody::Text {
                content,
                footer: Some(footer),
            } => format!("{content}\n{footer}"),
            PayloadBody::Text {
                content,
                footer: None,
            } => content.clone(),
            PayloadBody::File { content, .. } => content.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryPayload {
    pub persona: Persona,
    pub body: PayloadBody,
}

impl DeliveryPayload {
    pub fn new(persona: &Persona, body: PayloadBody) -> Self {
        Self {
            persona: persona.clone(),
            body,
        }
    }

    fn kind(&self) -> &'static str {
        match self.body {
            PayloadBody::Text { .. } => "text",
            PayloadBody::File { .. } => "file",
        }
    }
}

/// JSON body accepted by an execute-webhook endpoint.
#[derive(Debug, Serialize)]
struct WebhookBody<'a> {
    username: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    allowed_mentions: Option<AllowedMentions>,
    content: String,
}

#[derive(Debug, Serialize)]
struct AllowedMentions {
    parse: Vec<String>,
}

impl<'a> WebhookBody<'a> {
    fn new(payload: &'a DeliveryPayload) -> Self {
        let persona = &payload.persona;
        Self {
            username: &persona.username,
            avatar_url: persona.avatar_url.as_deref(),
            allowed_mentions: persona
                .suppress_mentions
                .then(|| AllowedMentions { parse: Vec::new() }),
            content: payload.body.rendered_content(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: Option<f64>,
}

/// Timing knobs of the delivery client.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_unit: Duration,
    pub default_retry_after: Duration,
    /// Pause after every successful request.
    pub request_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ExportConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_unit: config.backoff_unit(),
            default_retry_after: Duration::try_from_secs_f64(config.default_retry_after_secs)
                .unwrap_or(Duration::from_secs(5)),
            request_delay: config.request_delay(),
        }
    }

    /// No waiting at all; for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_unit: Duration::ZERO,
            default_retry_after: Duration::ZERO,
            request_delay: Duration::ZERO,
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_unit * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ExportConfig::default())
    }
}

/// Posts payloads to one webhook URL, one at a time.
pub struct DeliveryClient {
    http: reqwest::Client,
    webhook_url: String,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl DeliveryClient {
    pub fn new(
        http: reqwest::Client,
        webhook_url: impl Into<String>,
        policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            http,
            webhook_url: webhook_url.into(),
            policy,
            cancel,
        }
    }

    /// Deliver `payload`, retrying rate limits and transient failures.
    ///
    /// Returns [`ExportError::Cancelled`] without sending if shutdown was
    /// requested before the attempt starts; a request already on the wire is
    /// allowed to finish.
    pub async fn deliver(&self, payload: &DeliveryPayload) -> Result<()> {
        let max = self.policy.max_attempts;

        for attempt in 1..=max {
            if self.cancel.is_cancelled() {
                return Err(ExportError::Cancelled);
            }

            debug!(kind = payload.kind(), attempt, "posting to webhook");
            let response = match self.request(payload)?.send().await {
                Ok(r) => r,
                Err(e) if attempt == max => {
                    error!(attempt, error = %e, "webhook request failed, giving up");
                    return Err(ExportError::Network {
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    let wait = self.policy.backoff(attempt);
                    warn!(
                        attempt,
                        error = %e,
                        retry_after_secs = wait.as_secs_f64(),
                        "webhook request failed, retrying"
                    );
                    self.wait(wait).await?;
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                // Courtesy delay; a cancel here just ends it early.
                tokio::select! {
                    _ = tokio::time::sleep(self.policy.request_delay) => {}
                    _ = self.cancel.cancelled() => {}
                }
                return Ok(());
            }

            let wait = match status {
                StatusCode::TOO_MANY_REQUESTS => self.retry_after(response).await,
                StatusCode::SERVICE_UNAVAILABLE => self.policy.backoff(attempt),
                _ => {
                    let body = response.text().await.unwrap_or_default();
                    error!(status = status.as_u16(), body = %body, "webhook rejected payload");
                    return Err(ExportError::FatalDelivery {
                        status: status.as_u16(),
                        body,
                    });
                }
            };

            if attempt == max {
                error!(status = status.as_u16(), attempts = max, "webhook retries exhausted");
                return Err(ExportError::RetriesExhausted {
                    status: status.as_u16(),
                    attempts: max,
                });
            }

            warn!(
                status = status.as_u16(),
                attempt,
                retry_after_secs = wait.as_secs_f64(),
                "webhook rate-limited, retrying"
            );
            self.wait(wait).await?;
        }

        // max_attempts >= 1 and the last iteration always returns.
        unreachable!("retry loop exited without returning")
    }

    fn request(&self, payload: &DeliveryPayload) -> Result<reqwest::RequestBuilder> {
        let body = WebhookBody::new(payload);
        let builder = self.http.post(&self.webhook_url);

        Ok(match &payload.body {
            PayloadBody::Text { .. } => builder.json(&body),
            PayloadBody::File {
                bytes, filename, ..
            } => {
                // Form is consumed by send(), so it is rebuilt per attempt.
                let form = Form::new()
                    .text("payload_json", serde_json::to_string(&body)?)
                    .part("file", Part::bytes(bytes.clone()).file_name(filename.clone()));
                builder.multipart(form)
            }
        })
    }

    async fn retry_after(&self, response: reqwest::Response) -> Duration {
        response
            .json::<RateLimitBody>()
            .await
            .ok()
            .and_then(|b| b.retry_after)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or(self.policy.default_retry_after)
    }

    async fn wait(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.cancel.cancelled() => Err(ExportError::Cancelled),
        }
    }
}
