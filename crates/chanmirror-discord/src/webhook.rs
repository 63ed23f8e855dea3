//! Outbound webhook lookup on the target channel.

use std::sync::Arc;

use serenity::builder::CreateWebhook;
use serenity::http::Http;
use serenity::model::id::ChannelId;
use serenity::model::webhook::Webhook;
use tracing::info;

use crate::error::DiscordError;

const AUDIT_LOG_REASON: &str = "Chat export";

/// URL of the webhook named `name` on `channel`, creating it if absent.
///
/// Reusing the webhook keeps repeated runs from piling up identities on the
/// target channel.
pub async fn ensure_webhook(
    http: &Arc<Http>,
    channel: ChannelId,
    name: &str,
) -> Result<String, DiscordError> {
    let existing = channel.webhooks(http).await?;
    if let Some(hook) = find_by_name(existing, name) {
        info!(webhook = %name, "Discord: reusing existing webhook");
        return Ok(hook.url()?);
    }

    let hook = channel
        .create_webhook(http, CreateWebhook::new(name).audit_log_reason(AUDIT_LOG_REASON))
        .await?;
    info!(webhook = %name, "Discord: created webhook");
    Ok(hook.url()?)
}

fn find_by_name(hooks: Vec<Webhook>, name: &str) -> Option<Webhook> {
    hooks
        .into_iter()
        .find(|w| w.name.as_deref() == Some(name) && w.token.is_some())
}
