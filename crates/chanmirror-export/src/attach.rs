//! Attachment routing — picks inline upload, file-host link, or skip for
//! each attachment of a batch and delivers the result.
//!
//! | Declared size            | Route                                   |
//! |--------------------------|-----------------------------------------|
//! | ≤ `inline_max_bytes`     | multipart file post to the webhook      |
//! | ≤ `host_max_bytes`       | upload to file host, post the link      |
//! | larger                   | skipped, never downloaded               |
//!
//! Each attachment is followed by a footer payload with its message's time,
//! whatever the route's outcome.

use chanmirror_core::{Attachment, Message};
use tracing::{info, warn};

use crate::batch::Batch;
use crate::chunk::relative_footer;
use crate::delivery::{DeliveryClient, DeliveryPayload, PayloadBody, Persona};
use crate::error::Result;
use crate::host::FileHost;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Inline,
    Hosted,
    Oversize,
}

/// What happened to one attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Inline,
    Hosted { url: String },
    Skipped { reason: String },
}

pub struct AttachmentRouter {
    host: FileHost,
    inline_max_bytes: u64,
    host_max_bytes: u64,
}

impl AttachmentRouter {
    pub fn new(host: FileHost, inline_max_bytes: u64, host_max_bytes: u64) -> Self {
        Self {
            host,
            inline_max_bytes,
            host_max_bytes,
        }
    }

    pub fn route(&self, size: u64) -> Route {
        if size <= self.inline_max_bytes {
            Route::Inline
        } else if size <= self.host_max_bytes {
            Route::Hosted
        } else {
            Route::Oversize
        }
    }

    /// Deliver every attachment of `batch`, in message order.
    ///
    /// Only delivery-client errors are returned; failed downloads and uploads
    /// are logged and skipped.
    pub async fn send_batch(
        &self,
        delivery: &DeliveryClient,
        persona: &Persona,
        batch: &Batch,
    ) -> Result<Vec<Outcome>> {
        let mut outcomes = Vec::new();
        for (attachment, message) in batch.attachments() {
            outcomes.push(self.send_one(delivery, persona, attachment, message).await?);
        }
        Ok(outcomes)
    }

    pub async fn send_one(
        &self,
        delivery: &DeliveryClient,
        persona: &Persona,
        attachment: &Attachment,
        message: &Message,
    ) -> Result<Outcome> {
        let name = attachment.filename.as_str();
        info!("→ {} ({:.2} MiB)", name, attachment.size_mib());

        let outcome = match self.route(attachment.size) {
            Route::Oversize => {
                let reason = format!(
                    "{:.2} MiB exceeds the file host limit of {:.2} MiB",
                    attachment.size_mib(),
                    self.host_max_bytes as f64 / (1024.0 * 1024.0)
                );
                warn!(filename = %name, message_id = message.id, "skipping attachment: {reason}");
                Outcome::Skipped { reason }
            }
            route => match attachment.read().await {
                Err(e) => {
                    warn!(filename = %name, message_id = message.id, error = %e, "skipping attachment: download failed");
                    Outcome::Skipped {
                        reason: e.to_string(),
                    }
                }
                Ok(bytes) if route == Route::Inline => {
                    let body = PayloadBody::File {
                        bytes,
                        filename: attachment.filename.clone(),
                        content: String::new(),
                    };
                    delivery.deliver(&DeliveryPayload::new(persona, body)).await?;
                    Outcome::Inline
                }
                Ok(bytes) => match self.host.upload(bytes, name).await {
                    Ok(url) => {
                        delivery
                            .deliver(&DeliveryPayload::new(persona, PayloadBody::text(url.clone())))
                            .await?;
                        Outcome::Hosted { url }
                    }
                    Err(e) => {
                        warn!(filename = %name, message_id = message.id, error = %e, "skipping attachment: file host upload failed");
                        Outcome::Skipped {
                            reason: e.to_string(),
                        }
                    }
                },
            },
        };

        let footer = PayloadBody::text(relative_footer(message.created_at));
        delivery.deliver(&DeliveryPayload::new(persona, footer)).await?;
        Ok(outcome)
    }
}
